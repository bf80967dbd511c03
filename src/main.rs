//! SR-IOV Network Operator conformance suite
//!
//! Drives a live cluster running the SR-IOV Network Operator through fifteen
//! conformance cases: operator components, node policies and the networks
//! they back, VF flags, downward API injection, jumbo frames and IPv6.
//!
//! ## Usage
//!
//! ```bash
//! # Run every case
//! sriov-conformance test
//!
//! # Run one case, or one category
//! sriov-conformance test --case 8
//! sriov-conformance test --category "VF flags" --junit reports/junit.xml
//!
//! # Show what the operator discovered
//! sriov-conformance discover
//!
//! # List the cases
//! sriov-conformance list --detailed
//! ```

use anyhow::{bail, Context, Result};
use clap::Parser;
use tracing::{info, warn};

mod cli;
mod cluster;
mod config;
mod executor;
mod k8s;
mod models;
mod network;
mod output;
mod poll;
mod tests;
mod utils;

use cli::Args;
use config::env::{print_env_help, EnvConfig};
use config::file::ConfigFile;
use executor::TestRunner;
use k8s::{K8sClient, SriovManager};
use models::TestCase;
use output::{OutputFormat, ResultFormatter};
use utils::logger::{init_logger, LogLevel};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let env = EnvConfig::load();

    init_logger(LogLevel::from_verbose(
        args.verbose || env.verbose.unwrap_or(false),
    ));

    match args.command {
        cli::Command::Test(test_args) => {
            let file = load_config(args.config.as_deref(), &env)?;
            let success = run_tests(test_args, file, &env).await?;
            if !success {
                std::process::exit(1);
            }
        }
        cli::Command::List(list_args) => {
            list_tests(list_args);
        }
        cli::Command::Discover(discover_args) => {
            let file = load_config(args.config.as_deref(), &env)?;
            discover(discover_args, file).await?;
        }
        cli::Command::Config(config_args) => {
            manage_config(config_args, args.config.as_deref(), &env)?;
        }
        cli::Command::Env => {
            print_env_help();
            println!();
            if env.has_any() {
                env.print_summary();
            } else {
                println!("No SRIOV_CONFORMANCE_* variables are set.");
            }
        }
    }

    Ok(())
}

/// Configuration file from `--config`, the environment or the usual locations
fn load_config(path: Option<&str>, env: &EnvConfig) -> Result<ConfigFile> {
    let mut file = match path.or(env.config_file.as_deref()) {
        Some(path) => ConfigFile::load(path)?,
        None => ConfigFile::load_default()?,
    };
    file.app.apply_env(env);
    Ok(file)
}

async fn run_tests(args: cli::TestArgs, file: ConfigFile, env: &EnvConfig) -> Result<bool> {
    for test_case in file.skipped_cases() {
        info!("Skipping {} per configuration file", test_case);
    }
    let ConfigFile {
        app: mut config,
        mut skip,
        ..
    } = file;

    if let Some(ns) = args.operator_namespace {
        config.operator_namespace = ns;
    }
    if let Some(ns) = args.test_namespace {
        config.test_namespace = ns;
    }
    if let Some(path) = args.junit {
        config.junit_path = Some(path);
    }
    config.keep_namespace |= args.keep_namespace;
    config.check_overlapping_ranges |= args.check_overlapping_ranges;

    let test_cases = select_cases(args.case, args.category.as_deref())?;

    for n in args.skip {
        if TestCase::from_number(n).is_none() {
            bail!("Invalid test number to skip: {n} (expected 1-15)");
        }
        if !skip.contains(&n) {
            skip.push(n);
        }
    }

    let format_name = args
        .format
        .or_else(|| env.format.clone())
        .unwrap_or_else(|| "table".to_string());
    let format = OutputFormat::from_str(&format_name)
        .ok_or_else(|| anyhow::anyhow!("Unknown output format: {format_name}"))?;

    let client = K8sClient::new(config.operator_namespace.clone()).await?;
    if !client.sriov_crds_installed().await? {
        bail!(
            "SR-IOV operator CRDs are not installed; is the operator deployed in {}?",
            config.operator_namespace
        );
    }

    info!(
        "Operator namespace {}, test namespace {}",
        config.operator_namespace, config.test_namespace
    );

    let junit_path = config.junit_path.clone();
    let mut runner = TestRunner::new(client, config).with_skip(skip);
    let summary = runner.run_tests(&test_cases).await?;

    let formatter = ResultFormatter::new(format);
    println!("{}", formatter.format_summary(&summary));

    if let Some(path) = junit_path {
        output::junit::write_report(&path, &summary)?;
    }

    if let Some(path) = args.output {
        output::write_results_to_file(&path, &summary, format)?;
        info!("Results written to {}", path);
    }

    Ok(summary.is_success())
}

/// Cases picked by number or category, all of them otherwise
fn select_cases(case: Option<u8>, category: Option<&str>) -> Result<Vec<TestCase>> {
    if let Some(n) = case {
        let test_case = TestCase::from_number(n)
            .ok_or_else(|| anyhow::anyhow!("Invalid test number: {n} (expected 1-15)"))?;
        return Ok(vec![test_case]);
    }

    if let Some(category) = category {
        let cases = TestCase::in_category(category);
        if cases.is_empty() {
            bail!("No cases in category: {category}");
        }
        return Ok(cases);
    }

    Ok(TestCase::all())
}

fn list_tests(args: cli::ListArgs) {
    let all = TestCase::all();
    println!("\nSR-IOV Operator Conformance Cases ({} total)\n", all.len());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");

    let mut current_category = "";

    for test_case in all {
        let category = test_case.category();
        if category != current_category {
            println!("\n{category}:");
            println!("──────────────────────────────────────────────────────────────────────");
            current_category = category;
        }

        if args.detailed {
            let upstream = test_case
                .upstream_id()
                .map(|id| format!("upstream {id}"))
                .unwrap_or_else(|| "-".to_string());
            let nodes = if test_case.requires_sriov_nodes() {
                "needs SR-IOV nodes"
            } else {
                ""
            };
            println!(
                "  {:2}. {:34} [{:12}] {}",
                test_case.number(),
                test_case.name(),
                upstream,
                nodes
            );
        } else {
            println!("  {:2}. {}", test_case.number(), test_case.name());
        }
    }

    println!("\n━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━\n");
}

async fn discover(args: cli::DiscoverArgs, file: ConfigFile) -> Result<()> {
    let namespace = args
        .operator_namespace
        .unwrap_or(file.app.operator_namespace);

    let client = K8sClient::new(namespace.clone()).await?;
    let sriov = SriovManager::new(client);
    let states = sriov
        .list_node_states(&namespace)
        .await
        .with_context(|| format!("Failed to list node states in {namespace}"))?;

    if states.is_empty() {
        warn!("No SriovNetworkNodeState objects in {}", namespace);
        return Ok(());
    }

    println!("\nSR-IOV Node States ({namespace})\n");
    for state in &states {
        println!(
            "{} [{}]",
            state.metadata.name.as_deref().unwrap_or_default(),
            state.sync_status()
        );
        let mut any = false;
        for iface in state.sriov_interfaces() {
            any = true;
            println!(
                "  {:12} {:14} {:10} vendor={} device={} vfs={}/{} mtu={}",
                iface.name,
                iface.pci_address,
                iface.driver,
                iface.vendor,
                iface.device_id,
                iface.num_vfs,
                iface.total_vfs,
                iface.mtu
            );
        }
        if !any {
            println!("  (no VF-capable interfaces)");
        }
    }
    println!();

    Ok(())
}

fn manage_config(args: cli::ConfigArgs, path: Option<&str>, env: &EnvConfig) -> Result<()> {
    use std::path::Path;

    match args.action {
        cli::ConfigAction::Init { output, force } => {
            let path = Path::new(&output);
            if path.exists() && !force {
                bail!("Configuration file already exists: {output}. Use --force to overwrite.");
            }

            ConfigFile::example().save(path)?;
            println!("✓ Configuration file created: {output}");
            println!("\nEdit the file to customize your settings.");
        }

        cli::ConfigAction::Show { format } => {
            let config = load_config(path, env)?;
            let output = if format == "json" {
                serde_json::to_string_pretty(&config)?
            } else {
                serde_yaml::to_string(&config)?
            };
            println!("{output}");
        }

        cli::ConfigAction::Validate { file } => {
            let path = file
                .or_else(|| path.map(str::to_string))
                .or_else(|| {
                    ConfigFile::find().map(|p| p.to_string_lossy().to_string())
                })
                .unwrap_or_else(|| "./sriov-conformance.yaml".to_string());

            match ConfigFile::load(&path) {
                Ok(_) => {
                    println!("✓ Configuration file is valid: {path}");
                }
                Err(e) => {
                    println!("✗ Configuration file is invalid: {path}");
                    println!("  Error: {e:#}");
                    return Err(e);
                }
            }
        }
    }

    Ok(())
}
