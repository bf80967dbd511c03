//! Kubernetes API client module
//!
//! Provides access to core resources and to the SR-IOV operator's custom
//! resources.

mod client;
pub mod pod;
pub mod sriov;

pub use client::K8sClient;
pub use pod::{PodManager, TestPodConfig};
pub use sriov::SriovManager;
