//! CLI argument parsing
//!
//! Defines command-line interface using clap.

use clap::{Parser, Subcommand};

/// SR-IOV Network Operator conformance suite
#[derive(Parser, Debug)]
#[command(name = "sriov-conformance")]
#[command(version)]
#[command(about = "Validate an SR-IOV Network Operator deployment against a live cluster")]
#[command(long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (defaults to the first one found in the usual locations)
    #[arg(short, long, global = true)]
    pub config: Option<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run conformance cases
    Test(TestArgs),

    /// List conformance cases
    List(ListArgs),

    /// Show the SR-IOV nodes and devices the operator reports
    Discover(DiscoverArgs),

    /// Manage the configuration file
    Config(ConfigArgs),

    /// Show recognised environment variables
    Env,
}

/// Arguments for test command
#[derive(Parser, Debug)]
pub struct TestArgs {
    /// Specific case number to run (1-15)
    #[arg(short = 't', long)]
    pub case: Option<u8>,

    /// Run only the cases of one category
    #[arg(long, conflicts_with = "case")]
    pub category: Option<String>,

    /// Case numbers to skip, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub skip: Vec<u8>,

    /// Output format (table, json, json-pretty, csv, summary)
    #[arg(short, long)]
    pub format: Option<String>,

    /// Path of the JUnit report
    #[arg(short, long)]
    pub junit: Option<String>,

    /// Also write results to a file in the chosen format
    #[arg(short, long)]
    pub output: Option<String>,

    /// Namespace of the SR-IOV operator
    #[arg(long)]
    pub operator_namespace: Option<String>,

    /// Namespace for test pods
    #[arg(long)]
    pub test_namespace: Option<String>,

    /// Keep the test namespace after the run
    #[arg(long)]
    pub keep_namespace: bool,

    /// Run the overlapping VF range case
    #[arg(long)]
    pub check_overlapping_ranges: bool,
}

/// Arguments for list command
#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Show category and upstream case id
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for discover command
#[derive(Parser, Debug)]
pub struct DiscoverArgs {
    /// Namespace of the SR-IOV operator
    #[arg(long)]
    pub operator_namespace: Option<String>,
}

/// Arguments for config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Write an example configuration file
    Init {
        /// Destination path
        #[arg(short, long, default_value = "./sriov-conformance.yaml")]
        output: String,

        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },

    /// Show the effective configuration
    Show {
        /// Output format (yaml, json)
        #[arg(short, long, default_value = "yaml")]
        format: String,
    },

    /// Validate a configuration file
    Validate {
        /// File to validate (defaults to the one found in the usual locations)
        file: Option<String>,
    },
}
