//! Command-line interface module for dropsort.
//!
//! This module handles all CLI-related functionality including:
//! - Argument parsing
//! - Config file discovery
//! - Running the watch service until Ctrl-C
//! - Validating a config file and explaining routing decisions

use crate::config::{Config, ConfigError, ConfigSource, FileSource};
use crate::engine::{Decision, RoutingEngine};
use crate::output::OutputFormatter;
use crate::snapshot::ConfigStore;
use crate::watcher::{Service, WatchOptions};
use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing::error;

/// Watch a drop directory and route new files by keyword rules.
#[derive(Parser, Debug)]
#[command(name = "dropsort", version, about, long_about = None)]
pub struct Cli {
    /// Path to the configuration file (YAML or TOML)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Watch the source directory and move new files (default)
    Watch(WatchArgs),

    /// Validate the configuration and print its rules
    Check {
        /// Print the validated configuration as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show where files with these names would go, without moving anything
    Explain {
        #[arg(required = true)]
        names: Vec<String>,
    },
}

#[derive(Args, Debug, Clone)]
pub struct WatchArgs {
    /// Number of routing workers
    #[arg(long, default_value_t = 4)]
    pub workers: usize,

    /// Debounce window for config file changes, in milliseconds
    #[arg(long, default_value_t = 500)]
    pub debounce_ms: u64,

    /// Do not reload the configuration when the file changes
    #[arg(long)]
    pub no_reload: bool,
}

impl Default for WatchArgs {
    fn default() -> Self {
        Self {
            workers: 4,
            debounce_ms: 500,
            no_reload: false,
        }
    }
}

impl From<&WatchArgs> for WatchOptions {
    fn from(args: &WatchArgs) -> Self {
        Self {
            workers: args.workers,
            reload: !args.no_reload,
            debounce_ms: args.debounce_ms,
        }
    }
}

/// Runs the command selected on the command line.
///
/// # Examples
///
/// ```no_run
/// use clap::Parser;
/// use dropsort::cli::{Cli, run_cli};
///
/// # async fn demo() -> anyhow::Result<()> {
/// let cli = Cli::parse_from(["dropsort", "--config", "dropsort.yaml", "check"]);
/// run_cli(cli).await?;
/// # Ok(())
/// # }
/// ```
pub async fn run_cli(cli: Cli) -> anyhow::Result<()> {
    let command = cli
        .command
        .unwrap_or_else(|| Command::Watch(WatchArgs::default()));

    match command {
        Command::Watch(args) => watch(cli.config.as_deref(), &args).await,
        Command::Check { json } => {
            let config = load_config(cli.config.as_deref())?;
            check(&config, json)
        }
        Command::Explain { names } => {
            let config = load_config(cli.config.as_deref())?;
            explain(&config, &names);
            Ok(())
        }
    }
}

/// Discovers and validates the configuration without starting anything.
pub fn load_config(config_path: Option<&Path>) -> Result<Config, ConfigError> {
    FileSource::discover(config_path)?.load()
}

/// Runs the watch service until Ctrl-C.
pub async fn watch(config_path: Option<&Path>, args: &WatchArgs) -> anyhow::Result<()> {
    let source = FileSource::discover(config_path)?;
    let store = ConfigStore::open(source).context("Invalid config file")?;

    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {e}");
            std::future::pending::<()>().await;
        }
    };

    Service::run(store, WatchOptions::from(args), shutdown)
        .await
        .context("Watch service failed")?;
    Ok(())
}

/// Prints a validated configuration, as a table or as JSON.
pub fn check(config: &Config, json: bool) -> anyhow::Result<()> {
    if json {
        let rendered =
            serde_json::to_string_pretty(config).context("Failed to serialize configuration")?;
        println!("{rendered}");
        return Ok(());
    }

    OutputFormatter::rule_table(config);
    println!();
    OutputFormatter::success("Configuration is valid");
    Ok(())
}

/// Prints and returns the routing decision for each name.
///
/// Arguments may be plain file names or paths; only the last component is
/// matched, the same as for watched files.
pub fn explain<'a>(config: &'a Config, names: &[String]) -> Vec<Decision<'a>> {
    OutputFormatter::dry_run_notice("No files are moved");

    names
        .iter()
        .map(|name| {
            let file_name = Path::new(name)
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| name.clone());
            let decision = RoutingEngine::decide(&file_name, config);
            OutputFormatter::decision(&file_name, &decision);
            decision
        })
        .collect()
}
