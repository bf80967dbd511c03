//! Data models for SR-IOV operator conformance testing
//!
//! This module contains the test case catalogue and result types.

mod test_result;

pub use test_result::{SuiteSummary, TestCase, TestResult, TestStatus};
