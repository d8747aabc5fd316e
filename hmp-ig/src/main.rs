//! hmp-ig - Ingestion System
//!
//! Receives per-source sensor records over HTTP, correlates them into raw
//! sessions, applies the missing-data policy, and routes sessions (and,
//! during evaluation, labels) to the downstream pipeline systems.

use anyhow::Result;
use clap::Parser;
use hmp_common::config;
use hmp_ig::engine::IngestionEngine;
use hmp_ig::router::SessionRouter;
use hmp_ig::server::{self, AppState};
use std::path::PathBuf;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "hmp-ig", about = "HMP Ingestion System")]
struct Args {
    /// Path to the JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    info!("Starting HMP Ingestion System (hmp-ig) v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    // Resolve and load configuration (CLI arg > env var > working directory)
    let config_path = config::resolve_config_path(args.config.as_deref());
    info!("Configuration: {}", config_path.display());
    let config = config::load_config(&config_path)?;

    info!(
        "Initial phase: {} (production limit {}, evaluation limit {})",
        config.resolved_initial_phase(),
        config.production_sessions,
        config.evaluation_sessions
    );
    if config.service_flag {
        info!("Service flag set: phase auto-advance disabled");
    }

    // Downstream router with bounded send timeout
    let router = SessionRouter::new(
        &config.preparation_address,
        &config.evaluation_address,
        Duration::from_secs(config.send_timeout_seconds),
    )?;
    info!("Preparation System: {}", config.preparation_address);
    info!("Evaluation System: {}", config.evaluation_address);

    // Channel between the transport handlers and the single engine consumer
    let (engine_tx, engine_rx) = mpsc::channel(config.channel_capacity);

    let (engine, snapshot_rx) = IngestionEngine::new(&config, engine_rx, router);
    tokio::spawn(engine.run());

    let state = AppState::new(engine_tx, snapshot_rx);
    let bind_addr = config.bind_addr();
    info!("Health check: http://{}/health", bind_addr);
    server::start(&bind_addr, state).await?;

    Ok(())
}
