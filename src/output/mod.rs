//! Output formatting module
//!
//! Provides various output formats for test results and the JUnit report.

mod formatter;
pub mod junit;

pub use formatter::{write_results_to_file, OutputFormat, ResultFormatter};
