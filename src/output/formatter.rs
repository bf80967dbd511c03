//! Output formatters for test results
//!
//! Provides JSON, CSV, Table, and summary output formats.

use anyhow::{Context, Result};
use std::io::Write;

use crate::models::{SuiteSummary, TestResult, TestStatus};

/// Output format options
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Table,
    Json,
    JsonPretty,
    Csv,
    Summary,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "table" => Some(OutputFormat::Table),
            "json" => Some(OutputFormat::Json),
            "json-pretty" | "jsonpretty" => Some(OutputFormat::JsonPretty),
            "csv" => Some(OutputFormat::Csv),
            "summary" => Some(OutputFormat::Summary),
            _ => None,
        }
    }
}

/// Result formatter
pub struct ResultFormatter {
    format: OutputFormat,
    colorize: bool,
}

impl ResultFormatter {
    pub fn new(format: OutputFormat) -> Self {
        Self {
            format,
            colorize: true,
        }
    }

    pub fn no_color(mut self) -> Self {
        self.colorize = false;
        self
    }

    /// Format a single test result
    pub fn format_result(&self, result: &TestResult) -> String {
        match self.format {
            OutputFormat::Table => self.format_result_table(result),
            OutputFormat::Json => serde_json::to_string(result).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(result).unwrap_or_default(),
            OutputFormat::Csv => csv_rows(std::slice::from_ref(result), false).unwrap_or_default(),
            OutputFormat::Summary => self.format_result_summary(result),
        }
    }

    fn format_result_table(&self, result: &TestResult) -> String {
        let status_str = if self.colorize {
            match result.status {
                TestStatus::Pass => "\x1b[32m✓ PASS\x1b[0m",
                TestStatus::Fail => "\x1b[31m✗ FAIL\x1b[0m",
                TestStatus::Skip => "\x1b[33m○ SKIP\x1b[0m",
                TestStatus::Error => "\x1b[31m! ERROR\x1b[0m",
            }
        } else {
            match result.status {
                TestStatus::Pass => "✓ PASS",
                TestStatus::Fail => "✗ FAIL",
                TestStatus::Skip => "○ SKIP",
                TestStatus::Error => "! ERROR",
            }
        };

        format!(
            "{:2}. {:34} {} [{:>8}ms]",
            result.test_case.number(),
            result.test_case.name(),
            status_str,
            result.duration_ms
        )
    }

    fn format_result_summary(&self, result: &TestResult) -> String {
        format!(
            "{} {} ({}ms)",
            result.status.symbol(),
            result.test_case.name(),
            result.duration_ms
        )
    }

    /// Format a suite summary
    pub fn format_summary(&self, summary: &SuiteSummary) -> String {
        match self.format {
            OutputFormat::Table => self.format_summary_table(summary),
            OutputFormat::Json => serde_json::to_string(summary).unwrap_or_default(),
            OutputFormat::JsonPretty => serde_json::to_string_pretty(summary).unwrap_or_default(),
            OutputFormat::Csv => csv_rows(&summary.results, true).unwrap_or_default(),
            OutputFormat::Summary => self.format_summary_brief(summary),
        }
    }

    fn format_summary_table(&self, summary: &SuiteSummary) -> String {
        let mut output = String::new();

        output.push_str("\n╔══════════════════════════════════════════════════════════════════╗\n");
        output.push_str(&format!(" {}\n", summary.suite));
        output.push_str(&format!(
            " Started {}\n",
            summary.started_at.format("%Y-%m-%d %H:%M:%S UTC")
        ));
        output.push_str("╠══════════════════════════════════════════════════════════════════╣\n");

        for result in &summary.results {
            output.push_str(&format!(" {}\n", self.format_result_table(result)));
            if result.status != TestStatus::Pass {
                if let Some(message) = &result.message {
                    output.push_str(&format!("       {}\n", first_line(message)));
                }
            }
        }

        output.push_str("╠══════════════════════════════════════════════════════════════════╣\n");

        let pass_str = if self.colorize {
            format!("\x1b[32m{}\x1b[0m", summary.passed)
        } else {
            summary.passed.to_string()
        };
        let fail_str = if self.colorize && summary.failed > 0 {
            format!("\x1b[31m{}\x1b[0m", summary.failed)
        } else {
            summary.failed.to_string()
        };

        output.push_str(&format!(
            " Total: {:2} | Pass: {} | Fail: {} | Skip: {:2} | Error: {:2}\n",
            summary.total, pass_str, fail_str, summary.skipped, summary.errors
        ));
        output.push_str(&format!(
            " Pass Rate: {:5.1}% | Duration: {}ms\n",
            summary.pass_rate(),
            summary.total_duration_ms
        ));
        output.push_str("╚══════════════════════════════════════════════════════════════════╝\n");

        output
    }

    fn format_summary_brief(&self, summary: &SuiteSummary) -> String {
        format!(
            "{}: {}/{} passed, {} skipped ({:.1}%) in {}ms",
            summary.suite,
            summary.passed,
            summary.total,
            summary.skipped,
            summary.pass_rate(),
            summary.total_duration_ms
        )
    }
}

impl Default for ResultFormatter {
    fn default() -> Self {
        Self::new(OutputFormat::Table)
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default()
}

fn csv_rows(results: &[TestResult], header: bool) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());

    if header {
        writer.write_record([
            "test_num",
            "test_name",
            "category",
            "status",
            "duration_ms",
            "message",
        ])?;
    }

    for result in results {
        writer.write_record([
            result.test_case.number().to_string(),
            result.test_case.name().to_string(),
            result.test_case.category().to_string(),
            result.status.to_string(),
            result.duration_ms.to_string(),
            result.message.clone().unwrap_or_default(),
        ])?;
    }

    let bytes = writer
        .into_inner()
        .map_err(|e| anyhow::anyhow!("Failed to flush CSV output: {}", e.error()))?;
    String::from_utf8(bytes).context("CSV output is not UTF-8")
}

/// Write results to a file
pub fn write_results_to_file(
    path: &str,
    summary: &SuiteSummary,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let formatter = ResultFormatter::new(format).no_color();
    let content = formatter.format_summary(summary);

    let mut file = std::fs::File::create(path)
        .with_context(|| format!("Failed to create {path}"))?;
    file.write_all(content.as_bytes())?;

    Ok(())
}
