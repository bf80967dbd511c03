//! JUnit XML report
//!
//! One `<testsuite>` with a `<testcase>` per conformance case, readable by CI
//! result viewers.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::info;

use crate::models::{SuiteSummary, TestStatus};

/// Render the summary as a JUnit XML document
pub fn render(summary: &SuiteSummary) -> String {
    let mut xml = String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n");

    let _ = writeln!(
        xml,
        "<testsuite name=\"{}\" tests=\"{}\" failures=\"{}\" errors=\"{}\" skipped=\"{}\" time=\"{}\" timestamp=\"{}\">",
        escape(&summary.suite),
        summary.total,
        summary.failed,
        summary.errors,
        summary.skipped,
        seconds(summary.total_duration_ms),
        summary.started_at.format("%Y-%m-%dT%H:%M:%S")
    );

    for result in &summary.results {
        let case = result.test_case;
        let _ = write!(
            xml,
            "  <testcase name=\"{}\" classname=\"{}\" time=\"{}\"",
            escape(&format!("[{}] {}", case.category(), case.name())),
            escape(&summary.suite),
            seconds(result.duration_ms)
        );

        let message = escape(result.message.as_deref().unwrap_or_default());
        match result.status {
            TestStatus::Pass => xml.push_str("></testcase>\n"),
            TestStatus::Skip => {
                let _ = writeln!(xml, ">\n    <skipped message=\"{message}\"></skipped>\n  </testcase>");
            }
            TestStatus::Fail => {
                let _ = writeln!(
                    xml,
                    ">\n    <failure message=\"{message}\" type=\"Failure\">{message}</failure>\n  </testcase>"
                );
            }
            TestStatus::Error => {
                let _ = writeln!(
                    xml,
                    ">\n    <error message=\"{message}\" type=\"Error\">{message}</error>\n  </testcase>"
                );
            }
        }
    }

    xml.push_str("</testsuite>\n");
    xml
}

/// Write the report, creating parent directories as needed
pub fn write_report(path: impl AsRef<Path>, summary: &SuiteSummary) -> Result<()> {
    let path = path.as_ref();
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }
    std::fs::write(path, render(summary))
        .with_context(|| format!("Failed to write JUnit report: {}", path.display()))?;
    info!("JUnit report written to {}", path.display());
    Ok(())
}

fn seconds(duration_ms: u64) -> String {
    format!("{:.3}", duration_ms as f64 / 1000.0)
}

fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            '\n' | '\t' | '\r' => escaped.push(c),
            c if c.is_control() => {}
            c => escaped.push(c),
        }
    }
    escaped
}
