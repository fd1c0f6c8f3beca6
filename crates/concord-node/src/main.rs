//! # Concord Node
//!
//! One member of a fixed-size process group. Each node keeps a Lamport clock
//! and offers three coordination services to its clients:
//! total-order multicast, token-ring mutual exclusion, and bully leader
//! election.
//!
//! ## Architecture
//! ```text
//! client ──HTTP──▶ routes ──▶ Node (engine) ──Transport──▶ peer nodes
//!                               │
//!                          DeliveryLog
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

mod config;
mod engine;
mod routes;
mod state;
mod transport;

use crate::config::AppConfig;
use crate::state::AppState;

/// Concord coordination node
#[derive(Parser, Debug)]
#[command(name = "concord-node")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "config/concord.toml")]
    config: String,

    /// Listen address (overrides config)
    #[arg(short, long, env = "LISTEN_ADDR")]
    listen: Option<String>,

    /// Process id, e.g. "2" or "coord-app-2" (overrides config)
    #[arg(long, env = "PROCESS_ID")]
    process_id: Option<String>,

    /// Group size (overrides config)
    #[arg(long, env = "NUM_PROCESSES")]
    num_processes: Option<u32>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "LOG_LEVEL")]
    log_level: String,

    /// Enable JSON logging output
    #[arg(long, default_value = "false")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // A missing .env is fine
    dotenvy::dotenv().ok();

    let args = Args::parse();

    init_logging(&args.log_level, args.json_logs)?;

    info!("Starting Concord node v{}", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load(&args.config, &args)?;
    let setup = config.validate().context("Invalid configuration")?;
    info!(
        process_id = %setup.node.process_id,
        group_size = setup.node.group_size,
        token_holder = ?setup.node.initial_token_holder,
        "Configuration loaded from {}",
        args.config
    );

    let state = AppState::new(setup, config.delivery_log_capacity)?;
    let app = routes::create_router(state);

    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("Failed to bind {}", config.listen_addr))?;
    info!("Concord node listening on {}", config.listen_addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Concord node shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
            std::future::pending::<()>().await;
        }
    }
}

/// Initialize structured logging with tracing
fn init_logging(level: &str, json: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    if json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init()
            .context("Failed to install log subscriber")?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_thread_ids(true))
            .try_init()
            .context("Failed to install log subscriber")?;
    }

    Ok(())
}
