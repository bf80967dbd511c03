//! Network helpers
//!
//! Builders for the operator's network resources and readers for what the
//! CNI leaves behind on pods and nodes.

pub mod cni;
pub mod iplink;

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use kube::api::ObjectMeta;
use serde::Deserialize;

use crate::k8s::sriov::{
    SriovNetwork, SriovNetworkNicSelector, SriovNetworkNodePolicy, SriovNetworkNodePolicySpec,
    SriovNetworkSpec,
};

/// Annotation Multus writes with the attached interfaces
pub const NETWORKS_STATUS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks-status";
const NETWORK_STATUS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/network-status";

/// host-local IPv4 range shared by the VF cases
pub const HOST_LOCAL_IPAM: &str = r#"{"type":"host-local","subnet":"10.10.10.0/24","rangeStart":"10.10.10.171","rangeEnd":"10.10.10.181","routes":[{"dst":"0.0.0.0/0"}],"gateway":"10.10.10.1"}"#;

/// host-local IPv6 range
pub const HOST_LOCAL_IPV6_IPAM: &str = r#"{"type": "host-local","ranges": [[{"subnet": "3ffe:ffff:0:01ff::/64"}]],"dataDir": "/run/my-orchestrator/container-ipam-state"}"#;

pub const DEVICE_NETDEVICE: &str = "netdevice";
pub const DEVICE_VFIO_PCI: &str = "vfio-pci";

const POLICY_PRIORITY: i32 = 99;

fn on_off(enabled: bool) -> String {
    let value = if enabled { "on" } else { "off" };
    value.to_string()
}

/// SriovNetwork definition builder
#[derive(Clone, Debug)]
pub struct SriovNetworkConfig {
    pub name: String,
    pub operator_namespace: String,
    pub spec: SriovNetworkSpec,
}

impl SriovNetworkConfig {
    /// Network rendered into `target_namespace` with host-local IPv4 addressing
    pub fn new(
        name: impl Into<String>,
        operator_namespace: impl Into<String>,
        target_namespace: impl Into<String>,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            operator_namespace: operator_namespace.into(),
            spec: SriovNetworkSpec {
                network_namespace: target_namespace.into(),
                resource_name: resource_name.into(),
                ipam: HOST_LOCAL_IPAM.to_string(),
                ..Default::default()
            },
        }
    }

    pub fn with_ipam(mut self, ipam: impl Into<String>) -> Self {
        self.spec.ipam = ipam.into();
        self
    }

    pub fn with_vlan(mut self, vlan: i32, qos: i32) -> Self {
        self.spec.vlan = vlan;
        self.spec.vlan_qos = qos;
        self
    }

    pub fn with_spoof_chk(mut self, enabled: bool) -> Self {
        self.spec.spoof_chk = on_off(enabled);
        self
    }

    pub fn with_trust(mut self, enabled: bool) -> Self {
        self.spec.trust = on_off(enabled);
        self
    }

    /// enable | disable | auto
    pub fn with_link_state(mut self, state: impl Into<String>) -> Self {
        self.spec.link_state = state.into();
        self
    }

    /// Rates in Mbps
    pub fn with_tx_rates(mut self, max: i32, min: i32) -> Self {
        self.spec.max_tx_rate = Some(max);
        self.spec.min_tx_rate = Some(min);
        self
    }

    /// Namespace the attachment definition lands in
    pub fn target_namespace(&self) -> &str {
        if self.spec.network_namespace.is_empty() {
            &self.operator_namespace
        } else {
            &self.spec.network_namespace
        }
    }

    pub fn to_resource(&self) -> SriovNetwork {
        let mut network = SriovNetwork::new(&self.name, self.spec.clone());
        network.metadata.namespace = Some(self.operator_namespace.clone());
        network
    }
}

/// SriovNetworkNodePolicy definition builder
#[derive(Clone, Debug)]
pub struct NodePolicyConfig {
    pub generate_name: String,
    pub operator_namespace: String,
    pub pf_name: String,
    pub vf_range: Option<String>,
    pub spec: SriovNetworkNodePolicySpec,
}

impl NodePolicyConfig {
    /// Policy for `num_vfs` netdevice VFs of `pf_name` on `node`
    pub fn new(
        generate_name: impl Into<String>,
        operator_namespace: impl Into<String>,
        pf_name: impl Into<String>,
        node: impl Into<String>,
        num_vfs: i32,
        resource_name: impl Into<String>,
    ) -> Self {
        Self {
            generate_name: generate_name.into(),
            operator_namespace: operator_namespace.into(),
            pf_name: pf_name.into(),
            vf_range: None,
            spec: SriovNetworkNodePolicySpec {
                resource_name: resource_name.into(),
                node_selector: BTreeMap::from([(
                    "kubernetes.io/hostname".to_string(),
                    node.into(),
                )]),
                priority: POLICY_PRIORITY,
                num_vfs,
                device_type: DEVICE_NETDEVICE.to_string(),
                ..Default::default()
            },
        }
    }

    /// Restrict the policy to a VF range of the PF (`2-4`)
    pub fn with_vf_range(mut self, range: impl Into<String>) -> Self {
        self.vf_range = Some(range.into());
        self
    }

    pub fn with_mtu(mut self, mtu: i32) -> Self {
        self.spec.mtu = mtu;
        self
    }

    pub fn with_device_type(mut self, device_type: impl Into<String>) -> Self {
        self.spec.device_type = device_type.into();
        self
    }

    pub fn pf_selector(&self) -> String {
        match &self.vf_range {
            Some(range) => format!("{}#{}", self.pf_name, range),
            None => self.pf_name.clone(),
        }
    }

    pub fn to_resource(&self) -> SriovNetworkNodePolicy {
        let mut spec = self.spec.clone();
        spec.nic_selector = SriovNetworkNicSelector {
            pf_names: vec![self.pf_selector()],
            ..Default::default()
        };

        SriovNetworkNodePolicy {
            metadata: ObjectMeta {
                generate_name: Some(self.generate_name.clone()),
                namespace: Some(self.operator_namespace.clone()),
                ..Default::default()
            },
            spec,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NetworkStatus {
    #[serde(default)]
    interface: String,
    #[serde(default)]
    ips: Vec<String>,
}

/// Addresses the CNI assigned to `ifname`, `None` when the pod has no such interface
pub fn sriov_nic_ips(pod: &Pod, ifname: &str) -> Result<Option<Vec<String>>> {
    let annotations = pod.metadata.annotations.as_ref();
    let raw = annotations
        .and_then(|a| a.get(NETWORKS_STATUS_ANNOTATION))
        .or_else(|| annotations.and_then(|a| a.get(NETWORK_STATUS_ANNOTATION)))
        .context("Pod has no network status annotation")?;

    let networks: Vec<NetworkStatus> =
        serde_json::from_str(raw).context("Failed to parse network status annotation")?;

    Ok(networks
        .into_iter()
        .find(|n| n.interface == ifname)
        .map(|n| n.ips))
}
