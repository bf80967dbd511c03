//! Kubernetes client wrapper
//!
//! Provides a high-level interface to the Kubernetes API. The wrapped
//! namespace is the one the SR-IOV operator is installed in.

use std::time::Duration;

use anyhow::{Context, Result};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment};
use k8s_openapi::api::core::v1::{Namespace, Node};
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::{
    api::{Api, DeleteParams, ListParams, ObjectMeta, Patch, PatchParams, PostParams},
    runtime::wait::{await_condition, conditions},
    Client,
};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

/// CRDs the operator must have registered
pub const SRIOV_CRDS: [&str; 4] = [
    "sriovnetworks.sriovnetwork.openshift.io",
    "sriovnetworknodepolicies.sriovnetwork.openshift.io",
    "sriovnetworknodestates.sriovnetwork.openshift.io",
    "sriovoperatorconfigs.sriovnetwork.openshift.io",
];

/// Kubernetes client wrapper
#[derive(Clone)]
pub struct K8sClient {
    client: Client,
    namespace: String,
}

impl K8sClient {
    /// Create a new Kubernetes client from the ambient kubeconfig
    pub async fn new(namespace: impl Into<String>) -> Result<Self> {
        let client = Client::try_default()
            .await
            .context("Failed to create Kubernetes client")?;

        Ok(Self {
            client,
            namespace: namespace.into(),
        })
    }

    /// Get the underlying kube client
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// Operator namespace
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Check if the SR-IOV operator CRDs are registered
    pub async fn sriov_crds_installed(&self) -> Result<bool> {
        let crds: Api<CustomResourceDefinition> = Api::all(self.client.clone());
        let crd_list = crds
            .list(&ListParams::default())
            .await
            .context("Failed to list CRDs")?;

        let found = crd_list
            .items
            .iter()
            .filter(|crd| {
                crd.metadata
                    .name
                    .as_deref()
                    .map(|n| SRIOV_CRDS.contains(&n))
                    .unwrap_or(false)
            })
            .count();

        let installed = found == SRIOV_CRDS.len();
        if installed {
            info!("SR-IOV operator CRDs are installed");
        } else {
            warn!(
                "SR-IOV operator CRDs not fully installed ({}/{})",
                found,
                SRIOV_CRDS.len()
            );
        }

        Ok(installed)
    }

    /// Check if namespace exists
    pub async fn namespace_exists(&self, name: &str) -> Result<bool> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let found = namespaces
            .get_opt(name)
            .await
            .context("Failed to check namespace existence")?;
        Ok(found.is_some())
    }

    /// Create the namespace unless it already exists
    pub async fn ensure_namespace(&self, name: &str) -> Result<()> {
        if self.namespace_exists(name).await? {
            debug!("Namespace {} already exists", name);
            return Ok(());
        }

        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let namespace = Namespace {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            ..Default::default()
        };

        match namespaces.create(&PostParams::default(), &namespace).await {
            Ok(_) => {
                info!("Created namespace {}", name);
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 409 => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to create namespace {name}")),
        }
    }

    /// Delete a namespace and wait until it is gone
    pub async fn delete_namespace(&self, name: &str, timeout: Duration) -> Result<()> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());

        let uid = match namespaces
            .get_opt(name)
            .await
            .context("Failed to get namespace")?
        {
            Some(ns) => ns.metadata.uid.unwrap_or_default(),
            None => return Ok(()),
        };

        match namespaces.delete(name, &DeleteParams::default()).await {
            Ok(_) => info!("Deleting namespace {}", name),
            Err(kube::Error::Api(e)) if e.code == 404 => return Ok(()),
            Err(e) => return Err(e).with_context(|| format!("Failed to delete namespace {name}")),
        }

        let cond = await_condition(namespaces, name, conditions::is_deleted(&uid));
        tokio::time::timeout(timeout, cond)
            .await
            .with_context(|| format!("Timeout waiting for namespace {name} to be deleted"))?
            .context("Error waiting for namespace deletion")?;

        info!("Namespace {} deleted", name);
        Ok(())
    }

    /// List nodes, optionally filtered by a label selector
    pub async fn list_nodes(&self, label_selector: Option<&str>) -> Result<Vec<Node>> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let params = match label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        let list = nodes.list(&params).await.context("Failed to list nodes")?;
        Ok(list.items)
    }

    pub async fn node(&self, name: &str) -> Result<Node> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        nodes
            .get(name)
            .await
            .with_context(|| format!("Failed to get node {name}"))
    }

    /// Set a node label, or remove it when `value` is `None`
    pub async fn label_node(&self, name: &str, key: &str, value: Option<&str>) -> Result<Node> {
        let nodes: Api<Node> = Api::all(self.client.clone());
        let patch = node_label_patch(key, value);
        let node = nodes
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|| format!("Failed to label node {name}"))?;
        debug!("Node {} label {}={:?}", name, key, value);
        Ok(node)
    }

    /// DaemonSet in the operator namespace, if present
    pub async fn daemon_set(&self, name: &str) -> Result<Option<DaemonSet>> {
        let api: Api<DaemonSet> = Api::namespaced(self.client.clone(), &self.namespace);
        api.get_opt(name)
            .await
            .with_context(|| format!("Failed to get daemonset {name}"))
    }

    /// Deployment in the operator namespace, if present
    pub async fn deployment(&self, name: &str) -> Result<Option<Deployment>> {
        let api: Api<Deployment> = Api::namespaced(self.client.clone(), &self.namespace);
        api.get_opt(name)
            .await
            .with_context(|| format!("Failed to get deployment {name}"))
    }
}

/// Merge patch setting or clearing one node label
pub fn node_label_patch(key: &str, value: Option<&str>) -> Value {
    let value = match value {
        Some(v) => Value::String(v.to_string()),
        None => Value::Null,
    };
    json!({ "metadata": { "labels": { key: value } } })
}
