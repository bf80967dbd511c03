//! Test execution runner
//!
//! Runs the conformance cases one after another between the suite hooks:
//! `before_all` prepares the test namespace and discovers the SR-IOV nodes,
//! `before_each` removes what the previous case left behind and waits for
//! the node states to settle, `after_all` cleans up.

use anyhow::Result;
use chrono::Utc;
use tracing::{error, info, warn};

use crate::cluster::{self, namespaces};
use crate::config::AppConfig;
use crate::k8s::K8sClient;
use crate::models::{SuiteSummary, TestCase, TestResult, TestStatus};
use crate::poll::PollError;
use crate::tests::{self, assert::CheckError, TestContext};
use crate::utils::timer::Timer;

pub const SUITE_NAME: &str = "SRIOV Operator conformance tests";

/// Test runner for the SR-IOV conformance suite
pub struct TestRunner {
    ctx: TestContext,
    skip: Vec<u8>,
    discovery_error: Option<String>,
}

impl TestRunner {
    pub fn new(client: K8sClient, config: AppConfig) -> Self {
        Self {
            ctx: TestContext::new(client, config),
            skip: Vec::new(),
            discovery_error: None,
        }
    }

    /// Case numbers to report as skipped without running them
    pub fn with_skip(mut self, skip: Vec<u8>) -> Self {
        self.skip = skip;
        self
    }

    /// Create the test namespace, settle the cluster and discover SR-IOV nodes.
    ///
    /// A discovery failure does not abort the run; cases that need SR-IOV
    /// nodes report it as their error.
    pub async fn before_all(&mut self) -> Result<()> {
        let ctx = &self.ctx;
        let namespace = ctx.test_namespace().to_string();
        let poller = ctx.poller(
            format!("namespace {namespace} to be deleted"),
            ctx.config.timeouts.namespace_delete(),
        );
        namespaces::create(&ctx.client, &namespace, &poller).await?;
        namespaces::clean(
            &ctx.sriov,
            &ctx.pods,
            ctx.operator_namespace(),
            ctx.test_namespace(),
        )
        .await?;

        let discovered = match ctx.wait_stable().await {
            Ok(()) => cluster::discover_sriov(&ctx.sriov, ctx.operator_namespace()).await,
            Err(e) => Err(e),
        };

        match discovered {
            Ok(nodes) => {
                self.ctx.set_nodes(nodes);
                self.discovery_error = None;
            }
            Err(e) => {
                warn!("SR-IOV node discovery failed: {:#}", e);
                self.discovery_error = Some(format!("{e:#}"));
            }
        }
        Ok(())
    }

    /// Remove leftovers of earlier cases and wait for the node states to settle
    async fn before_each(&self) -> Result<()> {
        let ctx = &self.ctx;
        namespaces::clean(
            &ctx.sriov,
            &ctx.pods,
            ctx.operator_namespace(),
            ctx.test_namespace(),
        )
        .await?;

        if self.discovery_error.is_none() {
            ctx.wait_stable().await?;
        }
        Ok(())
    }

    /// Clean up and delete the test namespace unless asked to keep it
    pub async fn after_all(&self) -> Result<()> {
        let ctx = &self.ctx;
        namespaces::clean(
            &ctx.sriov,
            &ctx.pods,
            ctx.operator_namespace(),
            ctx.test_namespace(),
        )
        .await?;

        if ctx.config.keep_namespace {
            info!("Keeping namespace {}", ctx.test_namespace());
            return Ok(());
        }
        namespaces::delete(
            &ctx.client,
            ctx.test_namespace(),
            ctx.config.timeouts.namespace_delete(),
        )
        .await
    }

    /// Run a single test case
    pub async fn run_test(&self, test_case: TestCase) -> TestResult {
        if self.skip.contains(&test_case.number()) {
            return TestResult::skip(test_case, "Skipped by configuration");
        }

        if test_case.requires_sriov_nodes() {
            if let Some(reason) = &self.discovery_error {
                return TestResult::error(test_case, 0, format!("No SR-IOV nodes: {reason}"));
            }
        }

        let mut timer = Timer::start(test_case.to_string());

        if let Err(e) = self.before_each().await {
            error!("Setup for {} failed: {:#}", test_case, e);
            return TestResult::error(
                test_case,
                timer.elapsed_ms(),
                format!("setup failed: {e:#}"),
            );
        }

        timer.phase("setup");

        let outcome = tests::run_test(test_case, &self.ctx).await;
        timer.phase("run");
        let duration_ms = timer.stop();

        match outcome {
            Ok(()) => TestResult::pass(test_case, duration_ms),
            Err(e) => {
                let message = format!("{e:#}");
                match classify(&e) {
                    TestStatus::Skip => TestResult::skip(test_case, message),
                    TestStatus::Fail => {
                        error!("{} failed: {}", test_case, message);
                        TestResult::fail(test_case, duration_ms, message)
                    }
                    _ => {
                        error!("{} errored: {}", test_case, message);
                        TestResult::error(test_case, duration_ms, message)
                    }
                }
            }
        }
    }

    /// Run the given cases sequentially between the suite hooks
    pub async fn run_tests(&mut self, test_cases: &[TestCase]) -> Result<SuiteSummary> {
        info!("Running {} conformance case(s)", test_cases.len());
        let started_at = Utc::now();

        self.before_all().await?;

        let mut results = Vec::new();
        for &test_case in test_cases {
            let result = self.run_test(test_case).await;
            info!("  {}", result);
            results.push(result);
        }

        if let Err(e) = self.after_all().await {
            warn!("Suite cleanup failed: {:#}", e);
        }

        let summary = SuiteSummary::new(SUITE_NAME, started_at, results);
        info!(
            "Suite completed in {}ms - Pass: {}/{} ({:.1}%)",
            summary.total_duration_ms,
            summary.passed,
            summary.total,
            summary.pass_rate()
        );
        Ok(summary)
    }
}

/// Status a case's error maps to
pub fn classify(error: &anyhow::Error) -> TestStatus {
    if let Some(check) = error.downcast_ref::<CheckError>() {
        return match check {
            CheckError::Skipped(_) => TestStatus::Skip,
            CheckError::Assertion(_) => TestStatus::Fail,
        };
    }

    match error.downcast_ref::<PollError>() {
        Some(poll) if poll.is_timeout() => TestStatus::Fail,
        _ => TestStatus::Error,
    }
}
