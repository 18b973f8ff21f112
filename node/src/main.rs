// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # xvault Devnet Node
//!
//! Entry point for the `xvault-node` binary. Parses CLI arguments,
//! initializes logging and metrics, restores the devnet from its snapshot
//! and serves the HTTP API.
//!
//! Subcommands:
//!
//! - `run`      start the devnet and serve the API
//! - `simulate` run the reference scenario and print a JSON report
//! - `init`     write a default `devnet.json`
//! - `version`  print build version information

mod api;
mod cli;
mod logging;
mod metrics;
mod simulate;

use anyhow::{Context, Result};
use clap::Parser;
use parking_lot::Mutex;
use std::path::Path;
use std::sync::Arc;
use tokio::signal;

use xvault_contracts::devnet::{Devnet, DevnetConfig};
use xvault_protocol::storage::LedgerDB;

use cli::{Commands, XvaultNodeCli};
use metrics::NodeMetrics;

/// Configuration file name inside the data directory.
const CONFIG_FILE: &str = "devnet.json";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = XvaultNodeCli::parse();
    logging::init_logging(logging::DEFAULT_DIRECTIVE, cli.log_format);

    match cli.command {
        Commands::Run(args) => run_node(args).await,
        Commands::Simulate(args) => run_simulation(args),
        Commands::Init(args) => init_node(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// Starts the devnet: API server and metrics endpoint.
async fn run_node(args: cli::RunArgs) -> Result<()> {
    tracing::info!(
        api_port = args.api_port,
        metrics_port = args.metrics_port,
        data_dir = %args.data_dir.display(),
        "starting xvault-node"
    );

    // --- Persistent storage ---
    let db_path = args.data_dir.join("db");
    std::fs::create_dir_all(&db_path)
        .with_context(|| format!("failed to create database directory: {}", db_path.display()))?;
    let db = Arc::new(
        LedgerDB::open(&db_path)
            .with_context(|| format!("failed to open database at {}", db_path.display()))?,
    );
    tracing::info!(path = %db_path.display(), "database opened");

    // --- Devnet ---
    let restored = if args.fresh {
        None
    } else {
        Devnet::load(&db).context("failed to read devnet snapshot")?
    };
    let devnet = match restored {
        Some(net) => {
            tracing::info!(
                queued = net.router.pending(),
                total_shares = net.source.total_shares(),
                "devnet restored from snapshot"
            );
            net
        }
        None => {
            let config_path = args
                .config
                .clone()
                .unwrap_or_else(|| args.data_dir.join(CONFIG_FILE));
            let config = load_config(&config_path, args.config.is_some())?;
            let net = Devnet::new(config).context("invalid devnet configuration")?;
            net.save(&db).context("failed to write initial snapshot")?;
            tracing::info!("fresh devnet created");
            net
        }
    };

    // --- Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics.observe(&devnet.status());

    // --- Application state ---
    let devnet = Arc::new(Mutex::new(devnet));
    let app_state = api::AppState {
        version: format!(
            "{} (protocol {})",
            env!("CARGO_PKG_VERSION"),
            xvault_protocol::config::PROTOCOL_VERSION,
        ),
        devnet: Arc::clone(&devnet),
        db: Some(Arc::clone(&db)),
        metrics: Arc::clone(&node_metrics),
        events: api::EventLog::default(),
    };

    // --- API server ---
    let api_router = api::create_router(app_state);
    let api_addr = format!("0.0.0.0:{}", args.api_port);
    let api_listener = tokio::net::TcpListener::bind(&api_addr)
        .await
        .with_context(|| format!("failed to bind API listener on {}", api_addr))?;
    tracing::info!("API server listening on {}", api_addr);

    // --- Metrics server ---
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));
    let metrics_addr = format!("0.0.0.0:{}", args.metrics_port);
    let metrics_listener = tokio::net::TcpListener::bind(&metrics_addr)
        .await
        .with_context(|| format!("failed to bind metrics listener on {}", metrics_addr))?;
    tracing::info!("Metrics server listening on {}", metrics_addr);

    // --- Serve ---
    tokio::select! {
        res = axum::serve(api_listener, api_router) => {
            if let Err(e) = res {
                tracing::error!("API server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("Metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    devnet
        .lock()
        .save(&db)
        .context("failed to write final snapshot")?;
    db.flush().context("failed to flush database")?;
    tracing::info!("xvault-node stopped");
    Ok(())
}

/// Runs the reference scenario and prints its report to stdout.
fn run_simulation(args: cli::SimulateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => load_config(path, true)?,
        None => DevnetConfig::default(),
    };
    let report = simulate::run(config, args.amount).context("simulation failed")?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Writes a default `devnet.json` into the data directory.
fn init_node(args: cli::InitArgs) -> Result<()> {
    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let config_path = data_dir.join(CONFIG_FILE);
    if config_path.exists() && !args.force {
        anyhow::bail!(
            "{} already exists (pass --force to overwrite)",
            config_path.display()
        );
    }
    let json = DevnetConfig::default().to_json_pretty()?;
    std::fs::write(&config_path, json)
        .with_context(|| format!("failed to write {}", config_path.display()))?;

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!("  Configuration  : {}", config_path.display());

    Ok(())
}

/// Reads a devnet configuration. A missing file falls back to the defaults
/// unless it was named explicitly.
fn load_config(path: &Path, required: bool) -> Result<DevnetConfig> {
    if !path.exists() && !required {
        tracing::info!(path = %path.display(), "no configuration file, using defaults");
        return Ok(DevnetConfig::default());
    }
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read configuration {}", path.display()))?;
    let config = DevnetConfig::from_json(&json)
        .with_context(|| format!("invalid configuration {}", path.display()))?;
    tracing::info!(path = %path.display(), "configuration loaded");
    Ok(config)
}

/// Prints version information to stdout.
fn print_version() {
    println!("xvault-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", xvault_protocol::config::PROTOCOL_VERSION);
    println!("wire        {}", xvault_protocol::config::WIRE_VERSION);
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn missing_optional_config_uses_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config(&dir.path().join(CONFIG_FILE), false).expect("defaults");
        assert_eq!(config, DevnetConfig::default());
    }

    #[test]
    fn missing_required_config_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(load_config(&dir.path().join("absent.json"), true).is_err());
    }

    #[test]
    fn init_writes_loadable_config() {
        let dir = tempfile::tempdir().expect("tempdir");
        let data_dir: PathBuf = dir.path().join("node");
        init_node(cli::InitArgs {
            data_dir: data_dir.clone(),
            force: false,
        })
        .expect("init");

        let config = load_config(&data_dir.join(CONFIG_FILE), true).expect("load");
        assert_eq!(config, DevnetConfig::default());

        let again = init_node(cli::InitArgs {
            data_dir,
            force: false,
        });
        assert!(again.is_err());
    }
}
