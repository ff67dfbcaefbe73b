//! Worker pool process: spawns the configured number of pull-based workers.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use abacus::{telemetry, worker, Settings};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "abacus-worker")]
#[command(about = "Worker pool for the abacus orchestrator")]
#[command(version)]
struct Cli {
    /// Environment file to load before reading configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,

    /// Number of worker clients; overrides COMPUTING_POWER.
    #[arg(long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match &cli.env_file {
        Some(path) => {
            dotenvy::from_path(path)
                .with_context(|| format!("failed to load env file {}", path.display()))?;
        }
        None => {
            let _ = dotenvy::dotenv();
        }
    }

    telemetry::init();
    let settings = Settings::from_env();
    let workers = cli.workers.unwrap_or(settings.computing_power).max(1);

    info!(
        workers,
        endpoint = %settings.dispatcher_endpoint(),
        "starting worker pool"
    );

    for handle in worker::spawn_pool(&settings, workers) {
        handle.await.context("worker task failed")?;
    }
    Ok(())
}
