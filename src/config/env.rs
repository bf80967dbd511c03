//! Environment variable configuration
//!
//! Provides environment variable overrides for configuration.

use std::env;

/// Environment variable prefix
const ENV_PREFIX: &str = "SRIOV_CONFORMANCE";

/// Unprefixed variable the operator's own tooling uses
const OPERATOR_NAMESPACE_VAR: &str = "OPERATOR_NAMESPACE";

/// Environment configuration from environment variables
#[derive(Clone, Debug, Default)]
pub struct EnvConfig {
    /// From SRIOV_CONFORMANCE_OPERATOR_NAMESPACE, else OPERATOR_NAMESPACE
    pub operator_namespace: Option<String>,
    /// From SRIOV_CONFORMANCE_TEST_NAMESPACE
    pub test_namespace: Option<String>,
    /// From SRIOV_CONFORMANCE_TEST_IMAGE
    pub test_image: Option<String>,
    /// From SRIOV_CONFORMANCE_JUNIT
    pub junit_path: Option<String>,
    /// From SRIOV_CONFORMANCE_KEEP_NAMESPACE
    pub keep_namespace: Option<bool>,
    /// From SRIOV_CONFORMANCE_CONFIG
    pub config_file: Option<String>,
    /// From SRIOV_CONFORMANCE_VERBOSE
    pub verbose: Option<bool>,
    /// From SRIOV_CONFORMANCE_FORMAT
    pub format: Option<String>,
    /// From KUBECONFIG
    pub kubeconfig: Option<String>,
}

impl EnvConfig {
    /// Load configuration from environment variables
    pub fn load() -> Self {
        Self {
            operator_namespace: get_env("OPERATOR_NAMESPACE")
                .or_else(|| non_empty(env::var(OPERATOR_NAMESPACE_VAR).ok())),
            test_namespace: get_env("TEST_NAMESPACE"),
            test_image: get_env("TEST_IMAGE"),
            junit_path: get_env("JUNIT"),
            keep_namespace: get_env_bool("KEEP_NAMESPACE"),
            config_file: get_env("CONFIG"),
            verbose: get_env_bool("VERBOSE"),
            format: get_env("FORMAT"),
            kubeconfig: env::var("KUBECONFIG").ok(),
        }
    }

    /// Check if any environment variables are set
    pub fn has_any(&self) -> bool {
        self.operator_namespace.is_some()
            || self.test_namespace.is_some()
            || self.test_image.is_some()
            || self.junit_path.is_some()
            || self.keep_namespace.is_some()
            || self.config_file.is_some()
            || self.verbose.is_some()
            || self.format.is_some()
    }

    /// Print current environment configuration
    pub fn print_summary(&self) {
        println!("Environment Configuration:");
        println!("  {}_OPERATOR_NAMESPACE: {:?}", ENV_PREFIX, self.operator_namespace);
        println!("  {}_TEST_NAMESPACE:     {:?}", ENV_PREFIX, self.test_namespace);
        println!("  {}_TEST_IMAGE:         {:?}", ENV_PREFIX, self.test_image);
        println!("  {}_JUNIT:              {:?}", ENV_PREFIX, self.junit_path);
        println!("  {}_KEEP_NAMESPACE:     {:?}", ENV_PREFIX, self.keep_namespace);
        println!("  {}_CONFIG:             {:?}", ENV_PREFIX, self.config_file);
        println!("  KUBECONFIG:                           {:?}", self.kubeconfig);
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Get environment variable with prefix
fn get_env(name: &str) -> Option<String> {
    non_empty(env::var(format!("{ENV_PREFIX}_{name}")).ok())
}

/// Get environment variable as boolean
fn get_env_bool(name: &str) -> Option<bool> {
    get_env(name).map(|v| {
        matches!(
            v.to_lowercase().as_str(),
            "1" | "true" | "yes" | "on" | "enabled"
        )
    })
}

/// Print all recognised environment variables
pub fn print_env_help() {
    println!("Environment Variables:");
    println!();
    println!("  {ENV_PREFIX}_OPERATOR_NAMESPACE  Namespace of the SR-IOV operator");
    println!("  {OPERATOR_NAMESPACE_VAR}                    Same, used when the above is unset");
    println!("  {ENV_PREFIX}_TEST_NAMESPACE      Namespace for test pods");
    println!("  {ENV_PREFIX}_TEST_IMAGE          Image of the test pods");
    println!("  {ENV_PREFIX}_JUNIT               Path of the JUnit report");
    println!("  {ENV_PREFIX}_KEEP_NAMESPACE      Keep the test namespace (true/false)");
    println!("  {ENV_PREFIX}_CONFIG              Path to configuration file");
    println!("  {ENV_PREFIX}_VERBOSE             Enable verbose output (true/false)");
    println!("  {ENV_PREFIX}_FORMAT              Output format (table, json, csv, summary)");
    println!("  KUBECONFIG                           Path to kubeconfig file");
    println!();
    println!("Example:");
    println!("  export {OPERATOR_NAMESPACE_VAR}=sriov-network-operator");
    println!("  sriov-conformance test --category \"VF flags\"");
}

/// Builder for setting environment variables in tests
#[cfg(test)]
pub struct EnvBuilder {
    vars: Vec<(String, String)>,
}

#[cfg(test)]
impl EnvBuilder {
    pub fn new() -> Self {
        Self { vars: Vec::new() }
    }

    pub fn var(mut self, name: &str, value: impl Into<String>) -> Self {
        self.vars.push((format!("{ENV_PREFIX}_{name}"), value.into()));
        self
    }

    pub fn raw(mut self, key: &str, value: impl Into<String>) -> Self {
        self.vars.push((key.to_string(), value.into()));
        self
    }

    /// Apply and return guard that restores on drop
    pub fn apply_scoped(self) -> EnvGuard {
        let previous: Vec<_> = self
            .vars
            .iter()
            .map(|(k, _)| (k.clone(), env::var(k).ok()))
            .collect();

        for (key, value) in self.vars {
            env::set_var(key, value);
        }

        EnvGuard { previous }
    }
}

/// Guard that restores environment variables on drop
#[cfg(test)]
pub struct EnvGuard {
    previous: Vec<(String, Option<String>)>,
}

#[cfg(test)]
impl Drop for EnvGuard {
    fn drop(&mut self) {
        for (key, value) in &self.previous {
            match value {
                Some(v) => env::set_var(key, v),
                None => env::remove_var(key),
            }
        }
    }
}
