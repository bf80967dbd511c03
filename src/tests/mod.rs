//! SR-IOV operator conformance cases
//!
//! ## Test Categories
//!
//! ### Operator (1-4)
//! - Operator deployment, daemonsets, attachment rendering, node policy
//!
//! ### Configuration (5-7)
//! - Config daemon node selector, PF partitioning, overlapping PF ranges
//!
//! ### VF flags (8-12)
//! - Spoof check, trust, link state, rate limit, vlan and QoS
//!
//! ### Resource injector, MTU and IPv6 (13-15)
//! - Downward API volume, jumbo frames, IPv6 ping

mod vf_flags;

pub use configuration::{ConfigDaemonNodeSelectorTest, OverlappingPfRangesTest, PfPartitioningTest};
pub use injector::DownwardApiTest;
pub use ipv6::Ipv6PingTest;
pub use mtu::JumboFramesTest;
pub use operator::{
    NetAttachDefRenderingTest, NodePolicyAppliedTest, OperatorDaemonSetsTest,
    OperatorDeploymentTest,
};
pub use vf_flags::VfFlagTest;

use std::time::Duration;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::Pod;
use tracing::info;

use crate::cluster::{self, EnabledNodes};
use crate::config::AppConfig;
use crate::k8s::sriov::{
    InterfaceExt, NetworkAttachmentDefinition, SriovNetworkNodePolicy, SriovNetworkNodeState,
};
use crate::k8s::{K8sClient, PodManager, SriovManager, TestPodConfig};
use crate::models::TestCase;
use crate::network::{NodePolicyConfig, SriovNetworkConfig};
use crate::poll::{wait_for_object_absent, Poller};
use assert::skip;

/// Number of VFs the node policies of the cases ask for
pub const TEST_NUM_VFS: i32 = 5;

/// Cluster handles and settings shared by every case
#[derive(Clone)]
pub struct TestContext {
    pub client: K8sClient,
    pub pods: PodManager,
    pub sriov: SriovManager,
    pub config: AppConfig,
    nodes: Option<EnabledNodes>,
}

impl TestContext {
    pub fn new(client: K8sClient, config: AppConfig) -> Self {
        Self {
            pods: PodManager::new(client.clone()),
            sriov: SriovManager::new(client.clone()),
            client,
            config,
            nodes: None,
        }
    }

    pub fn set_nodes(&mut self, nodes: EnabledNodes) {
        self.nodes = Some(nodes);
    }

    pub fn operator_namespace(&self) -> &str {
        &self.config.operator_namespace
    }

    pub fn test_namespace(&self) -> &str {
        &self.config.test_namespace
    }

    /// Nodes found by discovery before the run
    pub fn enabled_nodes(&self) -> Result<&EnabledNodes> {
        self.nodes
            .as_ref()
            .context("No SR-IOV node discovery result available")
    }

    /// First SR-IOV node and its first VF-capable device
    pub fn first_device(&self) -> Result<(String, InterfaceExt)> {
        let nodes = self.enabled_nodes()?;
        let node = nodes.first_node()?;
        let device = nodes.find_one_sriov_device(node)?.clone();
        Ok((node.to_string(), device))
    }

    /// Skip unless the device can host `num_vfs` VFs
    pub fn require_vfs(&self, device: &InterfaceExt, num_vfs: i32) -> Result<()> {
        if device.total_vfs < num_vfs {
            return Err(skip(format!(
                "device {} supports {} VFs, {} needed",
                device.name, device.total_vfs, num_vfs
            )));
        }
        Ok(())
    }

    /// Poller at the retry interval, each attempt bounded by the API timeout
    pub fn poller(&self, description: impl Into<String>, timeout: Duration) -> Poller {
        let timeouts = &self.config.timeouts;
        Poller::new(description, timeouts.retry_interval(), timeout)
            .with_attempt_timeout(timeouts.api_timeout())
    }

    /// Test pod in the test namespace running the configured image
    pub fn pod_config(&self) -> TestPodConfig {
        TestPodConfig::new(self.test_namespace()).with_image(&self.config.test_image)
    }

    /// Wait until every node state reports `Succeeded`
    pub async fn wait_stable(&self) -> Result<()> {
        self.wait_sync(true, self.config.timeouts.stabilization()).await
    }

    /// Wait until the config daemons have picked up a change
    pub async fn wait_unstable(&self) -> Result<()> {
        self.wait_sync(false, self.config.timeouts.stabilization_start())
            .await
    }

    async fn wait_sync(&self, stable: bool, timeout: Duration) -> Result<()> {
        let (sriov, ns) = (&self.sriov, self.operator_namespace());
        let description = if stable {
            "SR-IOV node states to be synced"
        } else {
            "SR-IOV node states to start syncing"
        };
        self.poller(description, timeout)
            .until_eq(move || cluster::sriov_stable(sriov, ns), stable)
            .await?;
        Ok(())
    }

    /// Wait for the node to advertise `expected` units of a resource
    pub async fn wait_capacity(
        &self,
        node: &str,
        resource: &str,
        expected: i64,
        timeout: Duration,
    ) -> Result<()> {
        let client = &self.client;
        let resource = self.config.resource(resource);
        let resource = resource.as_str();
        self.poller(format!("{resource} capacity on {node} to be {expected}"), timeout)
            .until_eq(
                move || cluster::resource_capacity(client, node, resource),
                expected,
            )
            .await?;
        Ok(())
    }

    /// Poll the node's SR-IOV state until `accept` holds for it
    pub async fn wait_node_state<F>(
        &self,
        node: &str,
        description: &str,
        timeout: Duration,
        accept: F,
    ) -> Result<SriovNetworkNodeState>
    where
        F: Fn(&SriovNetworkNodeState) -> bool,
    {
        let (sriov, ns) = (&self.sriov, self.operator_namespace());
        let accept = &accept;
        let state = self
            .poller(format!("node state of {node}: {description}"), timeout)
            .until_some(move || async move {
                let state = sriov.node_state(node, ns).await?;
                Ok(accept(&state).then_some(state))
            })
            .await?;
        Ok(state)
    }

    pub async fn create_policy(&self, policy: &NodePolicyConfig) -> Result<SriovNetworkNodePolicy> {
        self.sriov.create_policy(&policy.to_resource()).await
    }

    /// Create the network and wait for its attachment definition
    pub async fn create_network(
        &self,
        network: &SriovNetworkConfig,
    ) -> Result<NetworkAttachmentDefinition> {
        self.sriov.create_network(&network.to_resource()).await?;
        let poller = self.poller(
            format!("attachment definition {}", network.name),
            self.config.timeouts.net_attach_def(),
        );
        let nad = self
            .sriov
            .wait_for_net_attach_def(&network.name, network.target_namespace(), &poller)
            .await?;
        Ok(nad)
    }

    /// Delete the network and wait for its attachment definition to go away
    pub async fn remove_network(&self, network: &SriovNetworkConfig) -> Result<()> {
        self.sriov
            .delete_network(&network.name, &network.operator_namespace)
            .await?;
        let api = self.sriov.net_attach_defs(network.target_namespace());
        let poller = self.poller(
            format!("attachment definition {} to be removed", network.name),
            self.config.timeouts.object(),
        );
        wait_for_object_absent(&api, &network.name, &poller).await?;
        Ok(())
    }

    /// Create the pod and wait for it to run
    pub async fn start_pod(&self, pod: &TestPodConfig) -> Result<Pod> {
        self.pods.create_test_pod(pod).await?;
        self.wait_pod_phase(pod, "Running").await
    }

    pub async fn wait_pod_phase(&self, pod: &TestPodConfig, phase: &str) -> Result<Pod> {
        let timeouts = &self.config.timeouts;
        self.pods
            .wait_phase(
                &pod.name,
                &pod.namespace,
                phase,
                timeouts.pod_phase(),
                timeouts.retry_interval(),
            )
            .await
    }
}

/// Run a specific test case
pub async fn run_test(test_case: TestCase, ctx: &TestContext) -> Result<()> {
    info!("Running {}", test_case);

    match test_case {
        TestCase::OperatorDeployment => OperatorDeploymentTest::new().run(ctx).await,
        TestCase::OperatorDaemonSets => OperatorDaemonSetsTest::new().run(ctx).await,
        TestCase::NetAttachDefRendering => NetAttachDefRenderingTest::new().run(ctx).await,
        TestCase::NodePolicyApplied => NodePolicyAppliedTest::new().run(ctx).await,
        TestCase::ConfigDaemonNodeSelector => ConfigDaemonNodeSelectorTest::new().run(ctx).await,
        TestCase::PfPartitioning => PfPartitioningTest::new().run(ctx).await,
        TestCase::OverlappingPfRanges => OverlappingPfRangesTest::new().run(ctx).await,
        TestCase::SpoofCheck => VfFlagTest::spoof_check().run(ctx).await,
        TestCase::Trust => VfFlagTest::trust().run(ctx).await,
        TestCase::LinkState => VfFlagTest::link_state().run(ctx).await,
        TestCase::RateLimit => VfFlagTest::rate_limit().run(ctx).await,
        TestCase::VlanQos => VfFlagTest::vlan_qos().run(ctx).await,
        TestCase::DownwardApi => DownwardApiTest::new().run(ctx).await,
        TestCase::JumboFrames => JumboFramesTest::new().run(ctx).await,
        TestCase::Ipv6Ping => Ipv6PingTest::new().run(ctx).await,
    }
}
