//! Test namespace lifecycle

use std::time::Duration;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Namespace;
use kube::api::Api;
use tracing::{debug, info};

use crate::k8s::sriov::DEFAULT_NODE_POLICY;
use crate::k8s::{K8sClient, PodManager, SriovManager};
use crate::poll::{wait_for_object_absent, Poller};

/// What a cleanup pass removed
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CleanupReport {
    pub policies: usize,
    pub networks: usize,
    pub pods: usize,
}

/// Create the namespace, first waiting out a previous run's deletion
pub async fn create(client: &K8sClient, name: &str, poller: &Poller) -> Result<()> {
    let api: Api<Namespace> = Api::all(client.client().clone());
    let existing = api.get_opt(name).await.context("Failed to get namespace")?;

    if existing.as_ref().is_some_and(is_terminating) {
        info!("Namespace {} is terminating, waiting for it to go away", name);
        wait_for_deletion(client, name, poller).await?;
    }

    client.ensure_namespace(name).await
}

/// Remove everything a case may have left behind
pub async fn clean(
    sriov: &SriovManager,
    pods: &PodManager,
    operator_namespace: &str,
    test_namespace: &str,
) -> Result<CleanupReport> {
    let mut report = CleanupReport::default();

    for policy in sriov.list_policies(operator_namespace).await? {
        let Some(name) = policy.metadata.name.as_deref() else {
            continue;
        };
        if name == DEFAULT_NODE_POLICY {
            continue;
        }
        sriov.delete_policy(name, operator_namespace).await?;
        report.policies += 1;
    }

    for network in sriov.list_networks(operator_namespace).await? {
        if let Some(name) = network.metadata.name.as_deref() {
            sriov.delete_network(name, operator_namespace).await?;
            report.networks += 1;
        }
    }

    report.pods = pods.delete_all(test_namespace).await?;

    debug!("Cleanup removed {:?}", report);
    Ok(report)
}

/// Delete the namespace and wait for it to disappear
pub async fn delete(client: &K8sClient, name: &str, timeout: Duration) -> Result<()> {
    client.delete_namespace(name, timeout).await
}

pub async fn wait_for_deletion(client: &K8sClient, name: &str, poller: &Poller) -> Result<()> {
    let api: Api<Namespace> = Api::all(client.client().clone());
    wait_for_object_absent(&api, name, poller).await?;
    Ok(())
}

fn is_terminating(namespace: &Namespace) -> bool {
    namespace.metadata.deletion_timestamp.is_some()
        || namespace
            .status
            .as_ref()
            .and_then(|s| s.phase.as_deref())
            == Some("Terminating")
}
