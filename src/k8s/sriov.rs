//! SR-IOV operator custom resources
//!
//! Serde mirrors of the `sriovnetwork.openshift.io/v1` resources and of the
//! Multus `NetworkAttachmentDefinition`, plus a small manager for the CRUD
//! calls the conformance cases make against them.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use kube::api::{Api, DeleteParams, ListParams, Patch, PatchParams, PostParams};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::K8sClient;
use crate::poll::{wait_for_object, PollError, Poller};

/// Name of the operator's singleton configuration object
pub const DEFAULT_OPERATOR_CONFIG: &str = "default";

/// Name of the node policy the operator owns and that must survive cleanup
pub const DEFAULT_NODE_POLICY: &str = "default";

/// Annotation the operator sets on rendered attachment definitions
pub const RESOURCE_NAME_ANNOTATION: &str = "k8s.v1.cni.cncf.io/resourceName";

/// SriovNetwork: a network the operator renders into a NetworkAttachmentDefinition
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovNetwork",
    plural = "sriovnetworks",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkSpec {
    /// Namespace of the rendered NetworkAttachmentDefinition
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub network_namespace: String,

    /// Device plugin resource name, without the vendor prefix
    pub resource_name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub capabilities: String,

    /// IPAM configuration as a JSON string
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub ipam: String,

    #[serde(default)]
    pub vlan: i32,

    #[serde(rename = "vlanQoS", default)]
    pub vlan_qos: i32,

    /// on | off
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub spoof_chk: String,

    /// on | off
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub trust: String,

    /// enable | disable | auto
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub link_state: String,

    /// Mbps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tx_rate: Option<i32>,

    /// Mbps
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_tx_rate: Option<i32>,
}

/// SriovNetworkNodePolicy: how VFs get configured on matching nodes
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovNetworkNodePolicy",
    plural = "sriovnetworknodepolicies",
    namespaced
)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNodePolicySpec {
    pub resource_name: String,

    #[serde(default)]
    pub node_selector: BTreeMap<String, String>,

    /// Higher priority policies override lower ones (0 is highest)
    #[serde(default)]
    pub priority: i32,

    #[serde(default, skip_serializing_if = "is_zero")]
    pub mtu: i32,

    pub num_vfs: i32,

    pub nic_selector: SriovNetworkNicSelector,

    /// netdevice | vfio-pci
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub device_type: String,

    #[serde(default)]
    pub is_rdma: bool,
}

fn is_zero(value: &i32) -> bool {
    *value == 0
}

/// NIC selection for a node policy
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNicSelector {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub vendor: String,

    #[serde(rename = "deviceID", default, skip_serializing_if = "String::is_empty")]
    pub device_id: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_devices: Vec<String>,

    /// PF names, optionally suffixed with a VF range (`ens1f0#2-4`)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pf_names: Vec<String>,
}

/// SriovNetworkNodeState: desired and observed SR-IOV state of one node
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovNetworkNodeState",
    plural = "sriovnetworknodestates",
    namespaced,
    status = "SriovNetworkNodeStateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNodeStateSpec {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub dp_config_version: String,

    #[serde(default)]
    pub interfaces: Vec<Interface>,
}

/// Desired configuration of one PF
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Interface {
    pub pci_address: String,

    #[serde(default)]
    pub num_vfs: i32,

    #[serde(default)]
    pub mtu: i32,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub link_type: String,

    #[serde(default)]
    pub vf_groups: Vec<VfGroup>,
}

/// A VF range of one PF bound to a resource
#[derive(Clone, Debug, Serialize, Deserialize, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VfGroup {
    #[serde(default)]
    pub resource_name: String,

    #[serde(default)]
    pub device_type: String,

    #[serde(default)]
    pub vf_range: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub policy_name: String,
}

impl VfGroup {
    /// Same resource, device type and range; the owning policy is ignored
    pub fn matches(&self, resource_name: &str, device_type: &str, vf_range: &str) -> bool {
        self.resource_name == resource_name
            && self.device_type == device_type
            && self.vf_range == vf_range
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SriovNetworkNodeStateStatus {
    #[serde(default)]
    pub interfaces: Vec<InterfaceExt>,

    /// InProgress | Succeeded | Failed
    #[serde(default)]
    pub sync_status: String,

    #[serde(default)]
    pub last_sync_error: String,
}

/// Observed state of one PF
#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct InterfaceExt {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mac: String,

    #[serde(default)]
    pub driver: String,

    #[serde(default)]
    pub pci_address: String,

    #[serde(default)]
    pub vendor: String,

    #[serde(rename = "deviceID", default)]
    pub device_id: String,

    #[serde(default)]
    pub mtu: i32,

    #[serde(default)]
    pub num_vfs: i32,

    #[serde(default)]
    pub link_speed: String,

    #[serde(default)]
    pub link_type: String,

    #[serde(rename = "totalvfs", default)]
    pub total_vfs: i32,

    #[serde(rename = "Vfs", default)]
    pub vfs: Vec<VirtualFunction>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VirtualFunction {
    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub mac: String,

    #[serde(default)]
    pub assigned: String,

    #[serde(default)]
    pub driver: String,

    #[serde(default)]
    pub pci_address: String,

    #[serde(default)]
    pub vendor: String,

    #[serde(rename = "deviceID", default)]
    pub device_id: String,

    #[serde(rename = "Vlan", default)]
    pub vlan: i32,

    #[serde(default)]
    pub mtu: i32,

    #[serde(rename = "vfID", default)]
    pub vf_id: i32,
}

impl SriovNetworkNodeState {
    pub fn sync_status(&self) -> &str {
        self.status
            .as_ref()
            .map(|s| s.sync_status.as_str())
            .unwrap_or("")
    }

    pub fn is_synced(&self) -> bool {
        self.sync_status() == "Succeeded"
    }

    /// Observed interfaces that can expose VFs
    pub fn sriov_interfaces(&self) -> impl Iterator<Item = &InterfaceExt> {
        self.status
            .iter()
            .flat_map(|s| s.interfaces.iter())
            .filter(|i| i.total_vfs > 0)
    }

    /// Desired configuration of the named PF
    pub fn spec_interface(&self, name: &str) -> Option<&Interface> {
        self.spec.interfaces.iter().find(|i| i.name == name)
    }

    /// Observed state of the named PF
    pub fn status_interface(&self, name: &str) -> Option<&InterfaceExt> {
        self.status
            .as_ref()
            .and_then(|s| s.interfaces.iter().find(|i| i.name == name))
    }
}

/// SriovOperatorConfig: operator-wide settings
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "sriovnetwork.openshift.io",
    version = "v1",
    kind = "SriovOperatorConfig",
    plural = "sriovoperatorconfigs",
    namespaced,
    status = "SriovOperatorConfigStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct SriovOperatorConfigSpec {
    /// Nodes the config daemon is scheduled on
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config_daemon_node_selector: BTreeMap<String, String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_injector: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub enable_operator_webhook: Option<bool>,
}

#[derive(Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct SriovOperatorConfigStatus {
    #[serde(default)]
    pub injector: String,

    #[serde(default)]
    pub operator_webhook: String,
}

/// Multus network attachment rendered by the operator
#[derive(CustomResource, Clone, Debug, Serialize, Deserialize, Default, JsonSchema)]
#[kube(
    group = "k8s.cni.cncf.io",
    version = "v1",
    kind = "NetworkAttachmentDefinition",
    plural = "network-attachment-definitions",
    namespaced
)]
pub struct NetworkAttachmentDefinitionSpec {
    /// CNI configuration as a JSON string
    #[serde(default)]
    pub config: String,
}

/// CRUD on the operator's resources
#[derive(Clone)]
pub struct SriovManager {
    client: K8sClient,
}

impl SriovManager {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    fn networks(&self, namespace: &str) -> Api<SriovNetwork> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    fn policies(&self, namespace: &str) -> Api<SriovNetworkNodePolicy> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    fn node_states(&self, namespace: &str) -> Api<SriovNetworkNodeState> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    fn operator_configs(&self, namespace: &str) -> Api<SriovOperatorConfig> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    pub fn net_attach_defs(&self, namespace: &str) -> Api<NetworkAttachmentDefinition> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    /// Create a SriovNetwork in the namespace set on its metadata
    pub async fn create_network(&self, network: &SriovNetwork) -> Result<SriovNetwork> {
        let namespace = network
            .metadata
            .namespace
            .as_deref()
            .context("SriovNetwork has no namespace")?;
        let created = self
            .networks(namespace)
            .create(&PostParams::default(), network)
            .await
            .context("Failed to create SriovNetwork")?;
        info!(
            "Created SriovNetwork {}/{}",
            namespace,
            created.metadata.name.as_deref().unwrap_or_default()
        );
        Ok(created)
    }

    pub async fn delete_network(&self, name: &str, namespace: &str) -> Result<()> {
        self.networks(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("Failed to delete SriovNetwork {namespace}/{name}"))?;
        debug!("Deleted SriovNetwork {}/{}", namespace, name);
        Ok(())
    }

    pub async fn list_networks(&self, namespace: &str) -> Result<Vec<SriovNetwork>> {
        let list = self
            .networks(namespace)
            .list(&ListParams::default())
            .await
            .context("Failed to list SriovNetworks")?;
        Ok(list.items)
    }

    /// Create a node policy; `generateName` is honoured
    pub async fn create_policy(
        &self,
        policy: &SriovNetworkNodePolicy,
    ) -> Result<SriovNetworkNodePolicy> {
        let namespace = policy
            .metadata
            .namespace
            .as_deref()
            .context("SriovNetworkNodePolicy has no namespace")?;
        let created = self
            .policies(namespace)
            .create(&PostParams::default(), policy)
            .await
            .context("Failed to create SriovNetworkNodePolicy")?;
        info!(
            "Created SriovNetworkNodePolicy {}/{} ({} VFs of {:?})",
            namespace,
            created.metadata.name.as_deref().unwrap_or_default(),
            created.spec.num_vfs,
            created.spec.nic_selector.pf_names
        );
        Ok(created)
    }

    pub async fn list_policies(&self, namespace: &str) -> Result<Vec<SriovNetworkNodePolicy>> {
        let list = self
            .policies(namespace)
            .list(&ListParams::default())
            .await
            .context("Failed to list SriovNetworkNodePolicies")?;
        Ok(list.items)
    }

    pub async fn delete_policy(&self, name: &str, namespace: &str) -> Result<()> {
        self.policies(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .with_context(|| format!("Failed to delete SriovNetworkNodePolicy {namespace}/{name}"))?;
        debug!("Deleted SriovNetworkNodePolicy {}/{}", namespace, name);
        Ok(())
    }

    pub async fn node_state(&self, node: &str, namespace: &str) -> Result<SriovNetworkNodeState> {
        self.node_states(namespace)
            .get(node)
            .await
            .with_context(|| format!("Failed to get SriovNetworkNodeState {node}"))
    }

    pub async fn list_node_states(&self, namespace: &str) -> Result<Vec<SriovNetworkNodeState>> {
        let list = self
            .node_states(namespace)
            .list(&ListParams::default())
            .await
            .context("Failed to list SriovNetworkNodeStates")?;
        Ok(list.items)
    }

    pub async fn operator_config(&self, namespace: &str) -> Result<SriovOperatorConfig> {
        self.operator_configs(namespace)
            .get(DEFAULT_OPERATOR_CONFIG)
            .await
            .context("Failed to get SriovOperatorConfig")
    }

    /// Replace the config daemon node selector; an empty map clears it
    pub async fn set_config_daemon_node_selector(
        &self,
        namespace: &str,
        selector: BTreeMap<String, String>,
    ) -> Result<SriovOperatorConfig> {
        let value = if selector.is_empty() {
            serde_json::Value::Null
        } else {
            serde_json::to_value(&selector).context("Failed to encode node selector")?
        };
        let patch = serde_json::json!({ "spec": { "configDaemonNodeSelector": value } });

        let updated = self
            .operator_configs(namespace)
            .patch(
                DEFAULT_OPERATOR_CONFIG,
                &PatchParams::default(),
                &Patch::Merge(&patch),
            )
            .await
            .context("Failed to patch SriovOperatorConfig")?;
        info!("Config daemon node selector set to {:?}", selector);
        Ok(updated)
    }

    /// Wait for the attachment definition rendered from a SriovNetwork
    pub async fn wait_for_net_attach_def(
        &self,
        name: &str,
        namespace: &str,
        poller: &Poller,
    ) -> Result<NetworkAttachmentDefinition, PollError> {
        let api = self.net_attach_defs(namespace);
        wait_for_object(&api, name, poller).await
    }
}
