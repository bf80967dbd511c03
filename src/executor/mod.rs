//! Test execution engine
//!
//! Provides sequential execution of the conformance cases.

mod runner;

pub use runner::TestRunner;
