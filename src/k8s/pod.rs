//! Pod management for test execution
//!
//! Provides test pod definitions, lifecycle calls and command execution over
//! the exec websocket.

use std::collections::BTreeMap;
use std::time::Duration;

use anyhow::{Context, Result};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Status;
use kube::api::{Api, AttachParams, DeleteParams, ListParams, ObjectMeta, PostParams};
use rand::Rng;
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

use super::K8sClient;
use crate::poll::Poller;

/// Multus annotation listing the networks to attach
pub const NETWORKS_ANNOTATION: &str = "k8s.v1.cni.cncf.io/networks";

pub const DEFAULT_TEST_IMAGE: &str = "quay.io/schseba/utility-container:latest";

const NAME_PREFIX: &str = "testpod";
const NAME_SUFFIX_LEN: usize = 12;
const NAME_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Random DNS-safe suffix in the style of the apiserver's generateName
pub fn random_suffix(len: usize) -> String {
    let mut rng = rand::rng();
    (0..len)
        .map(|_| NAME_ALPHABET[rng.random_range(0..NAME_ALPHABET.len())] as char)
        .collect()
}

/// Pod manager for test operations
#[derive(Clone)]
pub struct PodManager {
    client: K8sClient,
}

impl PodManager {
    pub fn new(client: K8sClient) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Pod> {
        Api::namespaced(self.client.client().clone(), namespace)
    }

    /// Create a test pod
    pub async fn create_test_pod(&self, config: &TestPodConfig) -> Result<Pod> {
        let pod = config.to_pod();
        let api = self.api(&config.namespace);
        let created = api
            .create(&PostParams::default(), &pod)
            .await
            .with_context(|| format!("Failed to create test pod {}", config.name))?;
        info!(
            "Created pod {}/{} (networks: {:?})",
            config.namespace, config.name, config.networks
        );
        Ok(created)
    }

    /// Wait for the pod to reach `phase`, returning the pod as last read
    pub async fn wait_phase(
        &self,
        name: &str,
        namespace: &str,
        phase: &str,
        timeout: Duration,
        interval: Duration,
    ) -> Result<Pod> {
        let api = self.api(namespace);
        let poller = Poller::new(format!("pod {name} to be {phase}"), interval, timeout);

        let api = &api;
        let pod = poller
            .until_some(move || async move {
                let pod = api
                    .get(name)
                    .await
                    .with_context(|| format!("Failed to get pod {name}"))?;
                let current = pod_phase(&pod).unwrap_or("Unknown");
                debug!("Pod {} is {}", name, current);
                Ok((current == phase).then_some(pod))
            })
            .await?;

        Ok(pod)
    }

    /// Execute a command in the pod's first container
    pub async fn exec(&self, pod: &Pod, command: &[&str]) -> Result<ExecOutput> {
        let name = pod.metadata.name.as_deref().context("Pod has no name")?;
        let namespace = pod
            .metadata
            .namespace
            .as_deref()
            .context("Pod has no namespace")?;

        let params = AttachParams {
            stdin: false,
            stdout: true,
            stderr: true,
            tty: false,
            ..Default::default()
        };

        debug!("Executing in {}/{}: {:?}", namespace, name, command);
        let mut attached = self
            .api(namespace)
            .exec(name, command.iter().copied(), &params)
            .await
            .with_context(|| format!("Failed to exec into pod {namespace}/{name}"))?;

        let stdout = attached.stdout();
        let stderr = attached.stderr();
        let status = attached.take_status();

        let (stdout, stderr) = futures::join!(read_stream(stdout), read_stream(stderr));
        let status = match status {
            Some(status) => status.await,
            None => None,
        };

        attached
            .join()
            .await
            .context("Exec session ended with an error")?;

        Ok(ExecOutput::from_parts(stdout?, stderr?, status))
    }

    /// Delete pod without a grace period
    pub async fn delete_pod(&self, name: &str, namespace: &str) -> Result<()> {
        let api = self.api(namespace);
        match api.delete(name, &DeleteParams::default().grace_period(0)).await {
            Ok(_) => {
                debug!("Deleted pod {}/{}", namespace, name);
                Ok(())
            }
            Err(kube::Error::Api(e)) if e.code == 404 => Ok(()),
            Err(e) => Err(e).with_context(|| format!("Failed to delete pod {namespace}/{name}")),
        }
    }

    /// List pods with label selector
    pub async fn list_pods(
        &self,
        namespace: &str,
        label_selector: Option<&str>,
    ) -> Result<Vec<Pod>> {
        let api = self.api(namespace);
        let params = match label_selector {
            Some(selector) => ListParams::default().labels(selector),
            None => ListParams::default(),
        };
        let list = api.list(&params).await.context("Failed to list pods")?;
        Ok(list.items)
    }

    /// Delete every pod in the namespace
    pub async fn delete_all(&self, namespace: &str) -> Result<usize> {
        let pods = self.list_pods(namespace, None).await?;
        let count = pods.len();
        for pod in pods {
            if let Some(name) = pod.metadata.name.as_deref() {
                self.delete_pod(name, namespace).await?;
            }
        }
        Ok(count)
    }
}

async fn read_stream<R>(stream: Option<R>) -> Result<String>
where
    R: tokio::io::AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut stream) = stream {
        stream
            .read_to_end(&mut buf)
            .await
            .context("Failed to read exec output")?;
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

pub fn pod_phase(pod: &Pod) -> Option<&str> {
    pod.status.as_ref().and_then(|s| s.phase.as_deref())
}

pub fn pod_node(pod: &Pod) -> Option<&str> {
    pod.spec.as_ref().and_then(|s| s.node_name.as_deref())
}

/// Result of a command run in a container
#[derive(Clone, Debug, Default)]
pub struct ExecOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: Option<i32>,
    pub success: bool,
    /// Message of the exec failure status, if any
    pub failure: Option<String>,
}

impl ExecOutput {
    fn from_parts(stdout: String, stderr: String, status: Option<Status>) -> Self {
        let (success, exit_code, failure) = match status {
            Some(status) if status.status.as_deref() == Some("Success") => (true, Some(0), None),
            Some(status) => (false, exit_code_of(&status), status.message),
            None => (true, None, None),
        };
        Self {
            stdout,
            stderr,
            exit_code,
            success,
            failure,
        }
    }

    /// Stdout followed by stderr, the way a terminal would show them
    pub fn combined(&self) -> String {
        format!("{}{}", self.stdout, self.stderr)
    }
}

fn exit_code_of(status: &Status) -> Option<i32> {
    status
        .details
        .as_ref()?
        .causes
        .as_ref()?
        .iter()
        .find(|c| c.reason.as_deref() == Some("ExitCode"))
        .and_then(|c| c.message.as_deref())
        .and_then(|m| m.parse().ok())
}

/// Test pod configuration
#[derive(Clone, Debug)]
pub struct TestPodConfig {
    pub name: String,
    pub namespace: String,
    pub image: String,
    pub command: Vec<String>,
    pub labels: BTreeMap<String, String>,
    pub networks: Vec<String>,
    pub host_network: bool,
    pub node_name: Option<String>,
    pub node_selector: BTreeMap<String, String>,
    pub restart_policy: Option<String>,
    pub privileged: bool,
}

impl TestPodConfig {
    /// Pod with a generated `testpod` name that sleeps forever
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            name: format!("{}{}", NAME_PREFIX, random_suffix(NAME_SUFFIX_LEN)),
            namespace: namespace.into(),
            image: DEFAULT_TEST_IMAGE.to_string(),
            command: vec![
                "/bin/bash".to_string(),
                "-c".to_string(),
                "sleep INF".to_string(),
            ],
            labels: BTreeMap::new(),
            networks: Vec::new(),
            host_network: false,
            node_name: None,
            node_selector: BTreeMap::new(),
            restart_policy: None,
            privileged: false,
        }
    }

    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }

    /// Attach a secondary network by NetworkAttachmentDefinition name
    pub fn with_network(mut self, network: impl Into<String>) -> Self {
        self.networks.push(network.into());
        self
    }

    /// Run a shell command instead of sleeping
    pub fn with_command(mut self, command: impl Into<String>) -> Self {
        self.command = vec!["/bin/bash".to_string(), "-c".to_string(), command.into()];
        self
    }

    /// Privileged pod in the node's network namespace, pinned to `node`
    pub fn with_host_network(mut self, node: impl Into<String>) -> Self {
        self.host_network = true;
        self.privileged = true;
        self.node_name = Some(node.into());
        self
    }

    pub fn with_node_selector(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.node_selector.insert(key.into(), value.into());
        self
    }

    /// Pin to a node through its hostname label
    pub fn on_node(self, node: impl Into<String>) -> Self {
        self.with_node_selector("kubernetes.io/hostname", node)
    }

    pub fn with_restart_policy(mut self, policy: impl Into<String>) -> Self {
        self.restart_policy = Some(policy.into());
        self
    }

    pub fn to_pod(&self) -> Pod {
        let mut annotations = BTreeMap::new();
        if !self.networks.is_empty() {
            annotations.insert(NETWORKS_ANNOTATION.to_string(), self.networks.join(","));
        }

        let mut container = Container {
            name: "test".to_string(),
            image: Some(self.image.clone()),
            command: Some(self.command.clone()),
            ..Default::default()
        };
        if self.privileged {
            container.security_context = Some(k8s_openapi::api::core::v1::SecurityContext {
                privileged: Some(true),
                ..Default::default()
            });
        }

        Pod {
            metadata: ObjectMeta {
                name: Some(self.name.clone()),
                namespace: Some(self.namespace.clone()),
                labels: (!self.labels.is_empty()).then(|| self.labels.clone()),
                annotations: (!annotations.is_empty()).then_some(annotations),
                ..Default::default()
            },
            spec: Some(PodSpec {
                containers: vec![container],
                termination_grace_period_seconds: Some(0),
                host_network: self.host_network.then_some(true),
                node_name: self.node_name.clone(),
                node_selector: (!self.node_selector.is_empty())
                    .then(|| self.node_selector.clone()),
                restart_policy: self.restart_policy.clone(),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}
