//! # Muster - Swarm Bootstrap Node Agent
//!
//! Brings a node into a Docker Swarm. Run once per node at provisioning
//! time: the manager initializes the swarm and publishes join tokens,
//! workers wait for the manager, fetch a token, and join.
//!
//! ## Architecture
//! ```text
//! Orchestrator ─┬─ manager: MembershipManager.initialize → TokenPublisher
//!               └─ worker:  JoinCoordinator
//!                             ├─ ReachabilityProber (manager:2377)
//!                             ├─ TokenSource (file | ssh | docker)
//!                             └─ MembershipManager.join
//! ```
//!
//! Exit codes: 0 member/manager ready, 1 failed, 2 invalid configuration.

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod cluster;
mod config;
mod coordinator;
mod exec;
mod orchestrator;
mod probe;
mod token;

use config::{AppConfig, BootstrapConfig, TokenBackendKind};
use muster_common::constants::exit_codes;
use orchestrator::{Collaborators, Orchestrator};

/// Muster - Docker Swarm bootstrap coordinator
#[derive(Parser, Debug)]
#[command(name = "muster")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/muster.toml", env = "MUSTER_CONFIG")]
    config: String,

    /// Node role: manager or worker (overrides config)
    #[arg(short, long, env = "MUSTER_ROLE")]
    role: Option<String>,

    /// Manager private address (overrides config)
    #[arg(short, long, env = "MUSTER_MANAGER_ADDRESS")]
    manager_address: Option<String>,

    /// Address the manager advertises to the swarm (overrides config)
    #[arg(long, env = "MUSTER_ADVERTISE_ADDRESS")]
    advertise_address: Option<String>,

    /// Swarm management port (overrides config)
    #[arg(long, env = "MUSTER_SWARM_PORT")]
    swarm_port: Option<u16>,

    /// Total join attempts (overrides config)
    #[arg(long, env = "MUSTER_MAX_RETRIES")]
    max_retries: Option<u32>,

    /// Seconds between join attempts (overrides config)
    #[arg(long, env = "MUSTER_RETRY_INTERVAL")]
    retry_interval: Option<u64>,

    /// Probe/SSH connect timeout in seconds (overrides config)
    #[arg(long, env = "MUSTER_CONNECT_TIMEOUT")]
    connect_timeout: Option<u64>,

    /// Node identifier (overrides config)
    #[arg(long, env = "MUSTER_NODE_ID")]
    node_id: Option<String>,

    /// Token backend, repeatable and tried in order (overrides config)
    #[arg(long, value_enum, env = "MUSTER_TOKEN_SOURCES", value_delimiter = ',')]
    token_source: Vec<TokenBackendKind>,

    /// Shared token directory (overrides config)
    #[arg(long, env = "MUSTER_TOKEN_DIR")]
    token_dir: Option<PathBuf>,

    /// SSH user for token pulls (overrides config)
    #[arg(long, env = "MUSTER_SSH_USER")]
    ssh_user: Option<String>,

    /// SSH private key for token pulls (overrides config)
    #[arg(long, env = "MUSTER_SSH_KEY")]
    ssh_key: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    // Parse CLI arguments
    let args = Args::parse();

    // Initialize logging
    if let Err(e) = init_logging(&args.log_level, args.json_logs) {
        eprintln!("muster: failed to initialize logging: {:#}", e);
        return ExitCode::from(exit_codes::FAILED);
    }

    info!("⚓ Starting Muster v{}", env!("CARGO_PKG_VERSION"));

    // Load and validate configuration
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("muster: invalid configuration: {:#}", e);
            return ExitCode::from(exit_codes::INVALID_CONFIG);
        }
    };
    info!(
        node_id = %config.node_id,
        role = %config.role,
        manager = %config.manager_address,
        "📋 Configuration loaded"
    );

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        wait_for_signal().await;
        info!("🛑 Shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    let collaborators = Collaborators::from_config(&config);
    let outcome = Orchestrator::new(config, collaborators, shutdown_rx).run().await;

    if outcome.is_success() {
        println!("muster: {}", outcome.summary());
    } else {
        eprintln!("muster: {}", outcome.summary());
    }

    ExitCode::from(outcome.exit_code())
}

/// Read the config file, apply CLI overrides, and validate
fn load_config(args: &Args) -> Result<BootstrapConfig> {
    let raw = AppConfig::load(&args.config, args)?;
    Ok(BootstrapConfig::try_from(raw)?)
}

/// Resolve on SIGINT, or SIGTERM on Unix
async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    // Logs go to stderr; stdout carries only the final status line
    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .try_init()?;
    }

    Ok(())
}
