//! Configuration module
//!
//! Settings shared by the run; `file` loads them, `env` overlays them.

pub mod env;
pub mod file;

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::k8s::pod::DEFAULT_TEST_IMAGE;
use env::EnvConfig;

pub const DEFAULT_OPERATOR_NAMESPACE: &str = "openshift-sriov-network-operator";
pub const DEFAULT_TEST_NAMESPACE: &str = "sriov-conformance-testing";

/// Application configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Namespace the SR-IOV operator runs in
    pub operator_namespace: String,

    /// Namespace test pods and attachment definitions are created in
    pub test_namespace: String,

    /// Image of the test pods
    pub test_image: String,

    /// Prefix of the extended resources the device plugin advertises
    pub resource_prefix: String,

    /// Where the JUnit report is written
    pub junit_path: Option<String>,

    /// Leave the test namespace in place after the run
    pub keep_namespace: bool,

    /// Run the overlapping PF range case, which fails on operators that
    /// still accept overlapping policies
    pub check_overlapping_ranges: bool,

    pub timeouts: TimeoutConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            operator_namespace: DEFAULT_OPERATOR_NAMESPACE.to_string(),
            test_namespace: DEFAULT_TEST_NAMESPACE.to_string(),
            test_image: DEFAULT_TEST_IMAGE.to_string(),
            resource_prefix: "openshift.io".to_string(),
            junit_path: Some("junit.xml".to_string()),
            keep_namespace: false,
            check_overlapping_ranges: false,
            timeouts: TimeoutConfig::default(),
        }
    }
}

impl AppConfig {
    /// Overlay values set in the environment
    pub fn apply_env(&mut self, env: &EnvConfig) {
        if let Some(ns) = &env.operator_namespace {
            self.operator_namespace = ns.clone();
        }
        if let Some(ns) = &env.test_namespace {
            self.test_namespace = ns.clone();
        }
        if let Some(image) = &env.test_image {
            self.test_image = image.clone();
        }
        if let Some(path) = &env.junit_path {
            self.junit_path = Some(path.clone());
        }
        if let Some(keep) = env.keep_namespace {
            self.keep_namespace = keep;
        }
    }

    /// Extended resource name for a device plugin resource
    pub fn resource(&self, name: &str) -> String {
        format!("{}/{}", self.resource_prefix, name)
    }
}

/// Poll intervals and timeouts, in seconds
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub retry_interval_secs: u64,
    pub api_timeout_secs: u64,
    pub object_secs: u64,
    pub stabilization_secs: u64,
    /// How long a new policy may take to make the node states leave `Succeeded`
    pub stabilization_start_secs: u64,
    pub pod_phase_secs: u64,
    pub capacity_secs: u64,
    pub net_attach_def_secs: u64,
    pub daemon_placement_secs: u64,
    pub daemon_reschedule_secs: u64,
    pub node_state_secs: u64,
    pub node_state_update_secs: u64,
    pub namespace_delete_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            retry_interval_secs: 1,
            api_timeout_secs: 10,
            object_secs: 60,
            stabilization_secs: 600,
            stabilization_start_secs: 120,
            pod_phase_secs: 180,
            capacity_secs: 180,
            net_attach_def_secs: 10,
            daemon_placement_secs: 180,
            daemon_reschedule_secs: 60,
            node_state_secs: 60,
            node_state_update_secs: 180,
            namespace_delete_secs: 300,
        }
    }
}

impl TimeoutConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    pub fn object(&self) -> Duration {
        Duration::from_secs(self.object_secs)
    }

    pub fn stabilization(&self) -> Duration {
        Duration::from_secs(self.stabilization_secs)
    }

    pub fn stabilization_start(&self) -> Duration {
        Duration::from_secs(self.stabilization_start_secs)
    }

    pub fn pod_phase(&self) -> Duration {
        Duration::from_secs(self.pod_phase_secs)
    }

    pub fn capacity(&self) -> Duration {
        Duration::from_secs(self.capacity_secs)
    }

    pub fn net_attach_def(&self) -> Duration {
        Duration::from_secs(self.net_attach_def_secs)
    }

    pub fn daemon_placement(&self) -> Duration {
        Duration::from_secs(self.daemon_placement_secs)
    }

    pub fn daemon_reschedule(&self) -> Duration {
        Duration::from_secs(self.daemon_reschedule_secs)
    }

    pub fn node_state(&self) -> Duration {
        Duration::from_secs(self.node_state_secs)
    }

    pub fn node_state_update(&self) -> Duration {
        Duration::from_secs(self.node_state_update_secs)
    }

    pub fn namespace_delete(&self) -> Duration {
        Duration::from_secs(self.namespace_delete_secs)
    }
}
