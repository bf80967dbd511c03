//! VF flag tests
//!
//! Tests 8-12: Spoof check, trust, link state, rate limit, vlan and QoS
//!
//! Each case attaches a pod to a SriovNetwork carrying the flag, finds the
//! VF that left the host network namespace with a host-network debug pod and
//! checks that VF's line in `ip link show <pf>`.

use anyhow::{bail, Result};
use k8s_openapi::api::core::v1::Pod;
use tracing::{debug, info};

use super::assert::{check, check_eq, fail, skip};
use super::{TestContext, TEST_NUM_VFS};
use crate::k8s::sriov::InterfaceExt;
use crate::k8s::pod::ExecOutput;
use crate::k8s::TestPodConfig;
use crate::models::TestCase;
use crate::network::iplink::{
    find_moved_vf, is_missing_device, vf_line, vf_line_contains, VfSearchError,
};
use crate::network::{NodePolicyConfig, SriovNetworkConfig};

const FIXTURE_RESOURCE: &str = "testresource";
const MELLANOX_DRIVER: &str = "mlx5_core";

/// Node, PF and debug pod shared by the VF flag cases
pub struct VfFixture {
    pub node: String,
    pub device: InterfaceExt,
    pub resource: String,
    pub debug_pod: Pod,
}

impl VfFixture {
    /// Carve VFs out of `device` and start a debug pod in the node's network namespace
    pub async fn setup(ctx: &TestContext, node: String, device: InterfaceExt) -> Result<Self> {
        let resource = FIXTURE_RESOURCE.to_string();
        let policy = NodePolicyConfig::new(
            "test-policy",
            ctx.operator_namespace(),
            &device.name,
            &node,
            TEST_NUM_VFS,
            &resource,
        );
        ctx.create_policy(&policy).await?;

        let pf = device.name.as_str();
        ctx.wait_node_state(
            &node,
            &format!("{pf} to have {TEST_NUM_VFS} VFs"),
            ctx.config.timeouts.node_state(),
            |state| {
                state
                    .spec_interface(pf)
                    .is_some_and(|iface| iface.num_vfs == TEST_NUM_VFS)
            },
        )
        .await?;
        ctx.wait_stable().await?;

        let debug_pod = ctx
            .start_pod(&ctx.pod_config().with_host_network(&node))
            .await?;
        info!("VF fixture ready on {} ({})", node, pf);

        Ok(Self {
            node,
            device,
            resource,
            debug_pod,
        })
    }

    /// `(vf index, missing from host)` for every VF of the PF
    async fn scan_vfs(&self, ctx: &TestContext) -> Result<Vec<(u32, bool)>> {
        let mut seen = Vec::new();
        for vf in 0..TEST_NUM_VFS as u32 {
            let netdev = format!("{}v{}", self.device.name, vf);
            let output = ctx
                .pods
                .exec(&self.debug_pod, &["ip", "link", "show", netdev.as_str()])
                .await?;
            let missing = netdev_missing(&netdev, &output)?;
            debug!("VF netdev {} missing from host: {}", netdev, missing);
            seen.push((vf, missing));
        }
        Ok(seen)
    }

    /// Run a pod on `network` and check the line of its VF for every needle
    pub async fn validate(&self, ctx: &TestContext, network: &str, needles: &[String]) -> Result<()> {
        let before = self.scan_vfs(ctx).await?;
        check_eq!(
            find_moved_vf(&before),
            Err(VfSearchError::NoneMoved),
            "VFs missing from the host before the pod started"
        );

        let pod_config: TestPodConfig = ctx.pod_config().with_network(network);
        let pod = ctx.start_pod(&pod_config).await?;

        let addr = ctx.pods.exec(&pod, &["ip", "addr", "show", "dev", "net1"]).await?;
        check!(
            addr.stderr.is_empty(),
            "net1 missing in pod {}: {}",
            pod_config.name,
            addr.stderr.trim()
        );

        let after = self.scan_vfs(ctx).await?;
        let vf = find_moved_vf(&after).map_err(|e| fail(e.to_string()))?;

        let link = ctx
            .pods
            .exec(&self.debug_pod, &["ip", "link", "show", self.device.name.as_str()])
            .await?;
        let wanted: Vec<&str> = needles.iter().map(String::as_str).collect();
        check!(
            vf_line_contains(&link.stdout, vf, &wanted),
            "{:?} not found for vf {} of {} on {}: {}",
            wanted,
            vf,
            self.device.name,
            self.node,
            vf_line(&link.stdout, vf).unwrap_or("no vf line")
        );

        ctx.pods.delete_pod(&pod_config.name, &pod_config.namespace).await
    }
}

/// Whether `ip link show <netdev>` reports the netdev gone from the host
fn netdev_missing(netdev: &str, output: &ExecOutput) -> Result<bool> {
    if is_missing_device(&output.combined()) {
        return Ok(true);
    }
    if !output.success {
        bail!(
            "ip link show {} failed (exit code {:?}): {}",
            netdev,
            output.exit_code,
            output
                .failure
                .as_deref()
                .unwrap_or_else(|| output.stderr.trim())
        );
    }
    Ok(false)
}

/// A flag carried by a SriovNetwork and its rendering in `ip link show`
#[derive(Clone, Debug, PartialEq)]
pub enum VfFlag {
    SpoofCheck(bool),
    Trust(bool),
    LinkState(&'static str),
    TxRates { max: i32, min: i32 },
    Vlan { vlan: i32, qos: i32 },
}

impl VfFlag {
    pub fn apply(&self, network: SriovNetworkConfig) -> SriovNetworkConfig {
        match self {
            VfFlag::SpoofCheck(enabled) => network.with_spoof_chk(*enabled),
            VfFlag::Trust(enabled) => network.with_trust(*enabled),
            VfFlag::LinkState(state) => network.with_link_state(*state),
            VfFlag::TxRates { max, min } => network.with_tx_rates(*max, *min),
            VfFlag::Vlan { vlan, qos } => network.with_vlan(*vlan, *qos),
        }
    }

    /// Text `ip link show` prints for the VF
    pub fn expected(&self) -> Vec<String> {
        let on_off = |enabled: bool| if enabled { "on" } else { "off" };
        match self {
            VfFlag::SpoofCheck(enabled) => vec![format!("spoof checking {}", on_off(*enabled))],
            VfFlag::Trust(enabled) => vec![format!("trust {}", on_off(*enabled))],
            VfFlag::LinkState(state) => vec![format!("link-state {state}")],
            VfFlag::TxRates { max, min } => vec![
                format!("max_tx_rate {max}Mbps"),
                format!("min_tx_rate {min}Mbps"),
            ],
            VfFlag::Vlan { vlan, qos } => vec![format!("vlan {vlan}"), format!("qos {qos}")],
        }
    }
}

/// Tests 8-12: one SriovNetwork per flag value, validated in turn
#[derive(Clone, Debug)]
pub struct VfFlagTest {
    pub test_case: TestCase,
    pub network: String,
    pub variants: Vec<VfFlag>,
    pub required_driver: Option<&'static str>,
}

impl VfFlagTest {
    pub fn new(test_case: TestCase, network: impl Into<String>) -> Self {
        Self {
            test_case,
            network: network.into(),
            variants: Vec::new(),
            required_driver: None,
        }
    }

    pub fn add_variant(mut self, flag: VfFlag) -> Self {
        self.variants.push(flag);
        self
    }

    /// Skip unless the PF is driven by `driver`
    pub fn require_driver(mut self, driver: &'static str) -> Self {
        self.required_driver = Some(driver);
        self
    }

    pub fn spoof_check() -> Self {
        Self::new(TestCase::SpoofCheck, "spoofnetwork")
            .add_variant(VfFlag::SpoofCheck(true))
            .add_variant(VfFlag::SpoofCheck(false))
    }

    pub fn trust() -> Self {
        Self::new(TestCase::Trust, "trustnetwork")
            .add_variant(VfFlag::Trust(true))
            .add_variant(VfFlag::Trust(false))
    }

    pub fn link_state() -> Self {
        Self::new(TestCase::LinkState, "statenetwork")
            .add_variant(VfFlag::LinkState("enable"))
            .add_variant(VfFlag::LinkState("disable"))
            .add_variant(VfFlag::LinkState("auto"))
    }

    pub fn rate_limit() -> Self {
        Self::new(TestCase::RateLimit, "ratenetwork")
            .add_variant(VfFlag::TxRates { max: 100, min: 40 })
            .require_driver(MELLANOX_DRIVER)
    }

    pub fn vlan_qos() -> Self {
        Self::new(TestCase::VlanQos, "quosnetwork").add_variant(VfFlag::Vlan { vlan: 1, qos: 2 })
    }

    pub async fn run(&self, ctx: &TestContext) -> Result<()> {
        info!("Running {}", self.test_case.name());
        let (node, device) = ctx.first_device()?;

        if let Some(driver) = self.required_driver {
            if device.driver != driver {
                return Err(skip(format!(
                    "{} is driven by {}, {} needed",
                    device.name, device.driver, driver
                )));
            }
        }
        ctx.require_vfs(&device, TEST_NUM_VFS)?;

        let fixture = VfFixture::setup(ctx, node, device).await?;

        for flag in &self.variants {
            let network = flag.apply(SriovNetworkConfig::new(
                &self.network,
                ctx.operator_namespace(),
                ctx.test_namespace(),
                &fixture.resource,
            ));
            debug!("Validating {:?} on {}", flag, network.name);

            ctx.create_network(&network).await?;
            fixture.validate(ctx, &network.name, &flag.expected()).await?;
            ctx.remove_network(&network).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_case_variants() {
        assert_eq!(VfFlagTest::spoof_check().variants.len(), 2);
        assert_eq!(VfFlagTest::link_state().variants.len(), 3);
        assert_eq!(VfFlagTest::rate_limit().required_driver, Some("mlx5_core"));
        assert_eq!(VfFlagTest::vlan_qos().network, "quosnetwork");
    }

    #[test]
    fn test_flag_expected_text() {
        assert_eq!(VfFlag::SpoofCheck(false).expected(), vec!["spoof checking off"]);
        assert_eq!(VfFlag::Trust(true).expected(), vec!["trust on"]);
        assert_eq!(
            VfFlag::TxRates { max: 100, min: 40 }.expected(),
            vec!["max_tx_rate 100Mbps", "min_tx_rate 40Mbps"]
        );
    }

    #[test]
    fn test_flag_applied_to_network() {
        let base = || SriovNetworkConfig::new("n", "op", "test", "testresource");

        let network = VfFlag::Vlan { vlan: 1, qos: 2 }.apply(base());
        assert_eq!((network.spec.vlan, network.spec.vlan_qos), (1, 2));

        let network = VfFlag::LinkState("disable").apply(base());
        assert_eq!(network.spec.link_state, "disable");

        let network = VfFlag::TxRates { max: 100, min: 40 }.apply(base());
        assert_eq!(network.spec.max_tx_rate, Some(100));
        assert_eq!(network.spec.min_tx_rate, Some(40));
    }

    #[test]
    fn test_expected_text_matches_vf_line() {
        let line = "    vf 3     link/ether 8a:41:2c:3b:9e:03 brd ff:ff:ff:ff:ff:ff, vlan 1, qos 2, spoof checking off, link-state disable, trust on";
        for flag in [
            VfFlag::Vlan { vlan: 1, qos: 2 },
            VfFlag::SpoofCheck(false),
            VfFlag::LinkState("disable"),
            VfFlag::Trust(true),
        ] {
            let expected = flag.expected();
            let needles: Vec<&str> = expected.iter().map(String::as_str).collect();
            assert!(vf_line_contains(line, 3, &needles), "{flag:?}");
        }
    }

    #[test]
    fn test_netdev_missing_only_when_device_is_gone() {
        let gone = ExecOutput {
            stderr: "Device \"ens1f0v2\" does not exist.\n".to_string(),
            exit_code: Some(1),
            success: false,
            ..Default::default()
        };
        assert!(netdev_missing("ens1f0v2", &gone).unwrap());

        let present = ExecOutput {
            stdout: "12: ens1f0v2: <BROADCAST,MULTICAST> mtu 1500\n".to_string(),
            exit_code: Some(0),
            success: true,
            ..Default::default()
        };
        assert!(!netdev_missing("ens1f0v2", &present).unwrap());
    }

    #[test]
    fn test_netdev_lookup_failure_is_an_error() {
        let no_ip = ExecOutput {
            stderr: "sh: ip: command not found\n".to_string(),
            exit_code: Some(127),
            success: false,
            failure: Some("command terminated with non-zero exit code".to_string()),
            ..Default::default()
        };
        let err = netdev_missing("ens1f0v0", &no_ip).unwrap_err();
        assert!(err.to_string().contains("exit code Some(127)"));
    }
}
