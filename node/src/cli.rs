//! # CLI Interface
//!
//! Command-line structure of `xvault-node`, built with `clap` derive.
//! Four subcommands: `run`, `simulate`, `init` and `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;

/// xvault devnet operator node.
///
/// Hosts a source ledger and a destination ledger connected by an
/// in-memory router, serves an HTTP API to drive them and exposes
/// Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "xvault-node",
    about = "xvault devnet operator node",
    version,
    propagate_version = true
)]
pub struct XvaultNodeCli {
    /// Log output format.
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    pub log_format: LogFormat,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the devnet and serve the API.
    Run(RunArgs),
    /// Run the reference settlement scenario in-process and print a report.
    Simulate(SimulateArgs),
    /// Write a default devnet configuration into the data directory.
    Init(InitArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `run` subcommand.
#[derive(Parser, Debug)]
pub struct RunArgs {
    /// Devnet configuration file (JSON).
    ///
    /// When omitted, `devnet.json` in the data directory is used if it
    /// exists, otherwise the built-in defaults.
    #[arg(long, short = 'c', env = "XVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the ledger database.
    #[arg(long, short = 'd', env = "XVAULT_DATA_DIR", default_value = ".xvault")]
    pub data_dir: PathBuf,

    /// Port for the REST API.
    #[arg(long, env = "XVAULT_API_PORT", default_value_t = 9841)]
    pub api_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "XVAULT_METRICS_PORT", default_value_t = 9842)]
    pub metrics_port: u16,

    /// Ignore any saved snapshot and start from the configuration.
    #[arg(long)]
    pub fresh: bool,
}

/// Arguments for the `simulate` subcommand.
#[derive(Parser, Debug)]
pub struct SimulateArgs {
    /// Devnet configuration file (JSON). Defaults reproduce the
    /// reference vault.
    #[arg(long, short = 'c', env = "XVAULT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Deposit amount in asset base units.
    #[arg(long, default_value_t = 100_000_000)]
    pub amount: u64,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Data directory to initialize.
    #[arg(long, short = 'd', env = "XVAULT_DATA_DIR", default_value = ".xvault")]
    pub data_dir: PathBuf,

    /// Overwrite an existing `devnet.json`.
    #[arg(long)]
    pub force: bool,
}
