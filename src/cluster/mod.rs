//! Cluster discovery
//!
//! Finds the SR-IOV capable nodes and answers the cluster-state questions the
//! conformance cases poll on.

pub mod namespaces;

use std::collections::{BTreeMap, BTreeSet};

use anyhow::{anyhow, bail, Context, Result};
use k8s_openapi::api::core::v1::{Node, Pod};
use tracing::{debug, info};

use crate::k8s::pod::pod_node;
use crate::k8s::sriov::{InterfaceExt, SriovNetworkNodeState};
use crate::k8s::{K8sClient, PodManager, SriovManager};

/// Label of the config daemon pods
pub const CONFIG_DAEMON_SELECTOR: &str = "app=sriov-network-config-daemon";

/// SR-IOV capable nodes and their last observed state
#[derive(Clone, Debug, Default)]
pub struct EnabledNodes {
    pub nodes: Vec<String>,
    pub states: BTreeMap<String, SriovNetworkNodeState>,
}

impl EnabledNodes {
    /// Keep the nodes exposing at least one VF-capable interface
    pub fn from_states(states: Vec<SriovNetworkNodeState>) -> Result<Self> {
        if let Some(state) = states.iter().find(|s| !s.is_synced()) {
            bail!(
                "Sync status still in progress on {} ({})",
                state.metadata.name.as_deref().unwrap_or_default(),
                state.sync_status()
            );
        }

        let mut enabled = EnabledNodes::default();
        for state in states {
            let Some(name) = state.metadata.name.clone() else {
                continue;
            };
            if state.sriov_interfaces().next().is_some() {
                enabled.nodes.push(name.clone());
                enabled.states.insert(name, state);
            }
        }

        if enabled.nodes.is_empty() {
            bail!("No sriov enabled node found");
        }
        Ok(enabled)
    }

    pub fn first_node(&self) -> Result<&str> {
        self.nodes
            .first()
            .map(String::as_str)
            .context("No sriov enabled node found")
    }

    /// First VF-capable interface of the node
    pub fn find_one_sriov_device(&self, node: &str) -> Result<&InterfaceExt> {
        let state = self
            .states
            .get(node)
            .ok_or_else(|| anyhow!("Node {node} is not an sriov enabled node"))?;
        state
            .sriov_interfaces()
            .next()
            .ok_or_else(|| anyhow!("Unable to find sriov devices in node {node}"))
    }
}

/// Discover SR-IOV capable nodes from the operator's node states
pub async fn discover_sriov(sriov: &SriovManager, operator_namespace: &str) -> Result<EnabledNodes> {
    let states = sriov.list_node_states(operator_namespace).await?;
    let enabled = EnabledNodes::from_states(states)?;
    info!("Discovered SR-IOV nodes: {:?}", enabled.nodes);
    Ok(enabled)
}

/// At least one node state exists and all of them report `Succeeded`
pub fn is_stable(states: &[SriovNetworkNodeState]) -> bool {
    !states.is_empty() && states.iter().all(SriovNetworkNodeState::is_synced)
}

pub async fn sriov_stable(sriov: &SriovManager, operator_namespace: &str) -> Result<bool> {
    let states = sriov.list_node_states(operator_namespace).await?;
    let stable = is_stable(&states);
    if !stable {
        let pending: Vec<_> = states
            .iter()
            .filter(|s| !s.is_synced())
            .filter_map(|s| s.metadata.name.as_deref())
            .collect();
        debug!("Node states not yet synced: {:?}", pending);
    }
    Ok(stable)
}

/// Every daemon pod sits on its own node and that node is in `nodes`
pub fn daemons_on_distinct_nodes(daemons: &[Pod], nodes: &[Node]) -> bool {
    let allowed: BTreeSet<&str> = nodes
        .iter()
        .filter_map(|n| n.metadata.name.as_deref())
        .collect();
    let mut used = BTreeSet::new();

    for pod in daemons {
        let Some(node) = pod_node(pod) else {
            return false;
        };
        if !allowed.contains(node) || !used.insert(node) {
            return false;
        }
    }
    true
}

/// Config daemons run exactly on distinct nodes matching `selector`
pub async fn daemons_scheduled_on_nodes(
    client: &K8sClient,
    pods: &PodManager,
    selector: &str,
) -> Result<bool> {
    let nodes = client.list_nodes(Some(selector)).await?;
    let daemons = pods
        .list_pods(client.namespace(), Some(CONFIG_DAEMON_SELECTOR))
        .await?;
    let placed = daemons_on_distinct_nodes(&daemons, &nodes);
    debug!(
        "{} config daemons on {} nodes matching {}: {}",
        daemons.len(),
        nodes.len(),
        selector,
        placed
    );
    Ok(placed)
}

/// Allocatable count of `resource` advertised by the node, 0 when absent
pub fn capacity_of(node: &Node, resource: &str) -> i64 {
    node.status
        .as_ref()
        .and_then(|s| s.capacity.as_ref())
        .and_then(|c| c.get(resource))
        .and_then(|q| q.0.parse().ok())
        .unwrap_or(0)
}

pub async fn resource_capacity(client: &K8sClient, node: &str, resource: &str) -> Result<i64> {
    let node = client.node(node).await?;
    Ok(capacity_of(&node, resource))
}
