//! Test result models for SR-IOV operator conformance
//!
//! Defines test cases, results, and status types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// All 15 conformance cases
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestCase {
    // Operator tests (1-4)
    OperatorDeployment,
    OperatorDaemonSets,
    NetAttachDefRendering,
    NodePolicyApplied,

    // Configuration tests (5-7)
    ConfigDaemonNodeSelector,
    PfPartitioning,
    OverlappingPfRanges,

    // VF flag tests (8-12)
    SpoofCheck,
    Trust,
    LinkState,
    RateLimit,
    VlanQos,

    // Injector, MTU and IPv6 tests (13-15)
    DownwardApi,
    JumboFrames,
    Ipv6Ping,
}

impl TestCase {
    /// Get test case number (1-15)
    pub fn number(&self) -> u8 {
        match self {
            TestCase::OperatorDeployment => 1,
            TestCase::OperatorDaemonSets => 2,
            TestCase::NetAttachDefRendering => 3,
            TestCase::NodePolicyApplied => 4,
            TestCase::ConfigDaemonNodeSelector => 5,
            TestCase::PfPartitioning => 6,
            TestCase::OverlappingPfRanges => 7,
            TestCase::SpoofCheck => 8,
            TestCase::Trust => 9,
            TestCase::LinkState => 10,
            TestCase::RateLimit => 11,
            TestCase::VlanQos => 12,
            TestCase::DownwardApi => 13,
            TestCase::JumboFrames => 14,
            TestCase::Ipv6Ping => 15,
        }
    }

    /// Get test case name
    pub fn name(&self) -> &'static str {
        match self {
            TestCase::OperatorDeployment => "Operator deployment available",
            TestCase::OperatorDaemonSets => "Operator daemonsets present",
            TestCase::NetAttachDefRendering => "Network attachment rendering",
            TestCase::NodePolicyApplied => "Node policy applied to node state",
            TestCase::ConfigDaemonNodeSelector => "Config daemon node selector",
            TestCase::PfPartitioning => "PF partitioning",
            TestCase::OverlappingPfRanges => "Overlapping PF ranges rejected",
            TestCase::SpoofCheck => "VF spoof check",
            TestCase::Trust => "VF trust",
            TestCase::LinkState => "VF link state",
            TestCase::RateLimit => "VF rate limit",
            TestCase::VlanQos => "VF vlan and QoS",
            TestCase::DownwardApi => "Downward API injection",
            TestCase::JumboFrames => "Jumbo frames",
            TestCase::Ipv6Ping => "IPv6 secondary interfaces ping",
        }
    }

    /// Get test category
    pub fn category(&self) -> &'static str {
        match self {
            TestCase::OperatorDeployment
            | TestCase::OperatorDaemonSets
            | TestCase::NetAttachDefRendering
            | TestCase::NodePolicyApplied => "Operator",
            TestCase::ConfigDaemonNodeSelector
            | TestCase::PfPartitioning
            | TestCase::OverlappingPfRanges => "Configuration",
            TestCase::SpoofCheck
            | TestCase::Trust
            | TestCase::LinkState
            | TestCase::RateLimit
            | TestCase::VlanQos => "VF flags",
            TestCase::DownwardApi => "Resource injector",
            TestCase::JumboFrames => "MTU",
            TestCase::Ipv6Ping => "IPv6",
        }
    }

    /// Id of the case in the upstream test plan
    pub fn upstream_id(&self) -> Option<u32> {
        match self {
            TestCase::ConfigDaemonNodeSelector => Some(26186),
            TestCase::PfPartitioning => Some(27633),
            TestCase::OverlappingPfRanges => Some(27630),
            TestCase::SpoofCheck => Some(25959),
            TestCase::Trust => Some(25960),
            TestCase::LinkState => Some(25961),
            TestCase::RateLimit | TestCase::VlanQos => Some(25963),
            TestCase::DownwardApi => Some(25815),
            TestCase::JumboFrames => Some(27662),
            _ => None,
        }
    }

    /// Whether the case needs a discovered SR-IOV capable node
    pub fn requires_sriov_nodes(&self) -> bool {
        !matches!(
            self,
            TestCase::OperatorDeployment
                | TestCase::OperatorDaemonSets
                | TestCase::NetAttachDefRendering
                | TestCase::ConfigDaemonNodeSelector
        )
    }

    /// Get all test cases
    pub fn all() -> Vec<TestCase> {
        vec![
            TestCase::OperatorDeployment,
            TestCase::OperatorDaemonSets,
            TestCase::NetAttachDefRendering,
            TestCase::NodePolicyApplied,
            TestCase::ConfigDaemonNodeSelector,
            TestCase::PfPartitioning,
            TestCase::OverlappingPfRanges,
            TestCase::SpoofCheck,
            TestCase::Trust,
            TestCase::LinkState,
            TestCase::RateLimit,
            TestCase::VlanQos,
            TestCase::DownwardApi,
            TestCase::JumboFrames,
            TestCase::Ipv6Ping,
        ]
    }

    /// Parse from test number
    pub fn from_number(n: u8) -> Option<TestCase> {
        Self::all().into_iter().find(|case| case.number() == n)
    }

    /// Cases of a category, matched case-insensitively
    pub fn in_category(category: &str) -> Vec<TestCase> {
        Self::all()
            .into_iter()
            .filter(|case| case.category().eq_ignore_ascii_case(category))
            .collect()
    }
}

impl fmt::Display for TestCase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Test {}: {}", self.number(), self.name())
    }
}

/// Test execution status
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TestStatus {
    Pass,
    Fail,
    Skip,
    Error,
}

impl TestStatus {
    pub fn symbol(&self) -> &'static str {
        match self {
            TestStatus::Pass => "✓",
            TestStatus::Fail => "✗",
            TestStatus::Skip => "○",
            TestStatus::Error => "!",
        }
    }
}

impl fmt::Display for TestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TestStatus::Pass => write!(f, "PASS"),
            TestStatus::Fail => write!(f, "FAIL"),
            TestStatus::Skip => write!(f, "SKIP"),
            TestStatus::Error => write!(f, "ERROR"),
        }
    }
}

/// Result of a single test execution
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct TestResult {
    pub test_case: TestCase,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub message: Option<String>,
}

impl TestResult {
    pub fn pass(test_case: TestCase, duration_ms: u64) -> Self {
        Self {
            test_case,
            status: TestStatus::Pass,
            duration_ms,
            message: None,
        }
    }

    pub fn fail(test_case: TestCase, duration_ms: u64, message: impl Into<String>) -> Self {
        Self {
            test_case,
            status: TestStatus::Fail,
            duration_ms,
            message: Some(message.into()),
        }
    }

    pub fn skip(test_case: TestCase, reason: impl Into<String>) -> Self {
        Self {
            test_case,
            status: TestStatus::Skip,
            duration_ms: 0,
            message: Some(reason.into()),
        }
    }

    pub fn error(test_case: TestCase, duration_ms: u64, error: impl Into<String>) -> Self {
        Self {
            test_case,
            status: TestStatus::Error,
            duration_ms,
            message: Some(error.into()),
        }
    }
}

impl fmt::Display for TestResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} [{}ms]",
            self.status.symbol(),
            self.test_case,
            self.duration_ms
        )?;
        if let Some(msg) = &self.message {
            write!(f, " - {msg}")?;
        }
        Ok(())
    }
}

/// Summary of a suite run
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SuiteSummary {
    pub suite: String,
    pub started_at: DateTime<Utc>,
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub errors: usize,
    pub total_duration_ms: u64,
    pub results: Vec<TestResult>,
}

impl SuiteSummary {
    pub fn new(suite: impl Into<String>, started_at: DateTime<Utc>, results: Vec<TestResult>) -> Self {
        let count = |status: TestStatus| results.iter().filter(|r| r.status == status).count();
        let passed = count(TestStatus::Pass);
        let failed = count(TestStatus::Fail);
        let skipped = count(TestStatus::Skip);
        let errors = count(TestStatus::Error);
        let total_duration_ms = results.iter().map(|r| r.duration_ms).sum();

        Self {
            suite: suite.into(),
            started_at,
            total: results.len(),
            passed,
            failed,
            skipped,
            errors,
            total_duration_ms,
            results,
        }
    }

    /// Pass rate over the cases that actually ran
    pub fn pass_rate(&self) -> f64 {
        let ran = self.total - self.skipped;
        if ran == 0 {
            0.0
        } else {
            (self.passed as f64 / ran as f64) * 100.0
        }
    }

    /// No failures and no errors; skips are fine
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.errors == 0
    }
}

impl fmt::Display for SuiteSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} ({})",
            self.suite,
            self.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        )?;
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        for result in &self.results {
            writeln!(f, "  {result}")?;
        }
        writeln!(f, "━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━")?;
        writeln!(
            f,
            "Total: {} | Pass: {} | Fail: {} | Skip: {} | Error: {}",
            self.total, self.passed, self.failed, self.skipped, self.errors
        )?;
        writeln!(
            f,
            "Pass Rate: {:.1}% | Duration: {}ms",
            self.pass_rate(),
            self.total_duration_ms
        )
    }
}
