//! arbscan entry point
//!
//! Loads the chain configuration, wires the coordinator to the sink, and
//! runs until interrupted.
//!
//! Author: AI-Generated
//! Created: 2026-02-06

use anyhow::Result;
use arbscan::worker::Coordinator;
use clap::Parser;
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::sync::{mpsc, watch};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "arbscan", about = "Multi-chain DEX arbitrage opportunity detector")]
struct Args {
    /// Path to the chains TOML file.
    #[arg(long, env = "ARBSCAN_CONFIG", default_value = "config/chains.toml")]
    config: PathBuf,

    /// Emit JSON logs instead of the human format.
    #[arg(long, env = "ARBSCAN_LOG_JSON", default_value_t = false)]
    log_json: bool,

    /// Override the sink JSONL path from the config.
    #[arg(long, env = "ARBSCAN_SINK_PATH")]
    sink_path: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if args.log_json {
        tracing_subscriber::fmt().with_env_filter(filter).json().init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .init();
    }

    let config = arbscan::load_config(&args.config)?;
    let enabled: Vec<&str> = config.enabled_chains().map(|c| c.name.as_str()).collect();
    info!("arbscan starting: chains {:?}", enabled);

    let sink_path = args
        .sink_path
        .or_else(|| config.sink_path.clone().map(PathBuf::from));
    let (sink_tx, sink_rx) = mpsc::channel(1024);
    let sink_task = tokio::spawn(arbscan::sink::run_sink(sink_rx, sink_path, None));

    // Raw log subscriptions are wired by the chain collaborator; without
    // one, every worker runs on polling alone.
    let log_feeds = HashMap::new();

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let coordinator = Coordinator::new(config);
    let coordinator_task = tokio::spawn(coordinator.run(log_feeds, shutdown_rx, sink_tx));

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");
    let _ = shutdown_tx.send(true);

    let _ = coordinator_task.await;
    let _ = sink_task.await;
    info!("arbscan stopped");
    Ok(())
}
