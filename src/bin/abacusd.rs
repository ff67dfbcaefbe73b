//! Orchestrator daemon: HTTP API plus the gRPC dispatcher.

#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]

use abacus::api::AppState;
use abacus::{rpc, telemetry, Scheduler, Settings, TaskStore};
use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "abacusd")]
#[command(about = "Distributed arithmetic evaluation orchestrator")]
#[command(version)]
struct Cli {
    /// Environment file to load before reading configuration.
    #[arg(long)]
    env_file: Option<PathBuf>,
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

    let store = Arc::new(
        TaskStore::open(&settings.database_name)
            .with_context(|| format!("failed to open store at {}", settings.database_name))?,
    );
    let scheduler = Arc::new(Scheduler::new(store, settings.latencies));
    let state = AppState::new(scheduler.clone(), &settings.jwt_secret);

    info!(
        http_port = settings.http_port,
        grpc_port = settings.grpc_port,
        database = %settings.database_name,
        "starting orchestrator"
    );

    tokio::select! {
        result = rpc::serve(scheduler, settings.grpc_port) => {
            result.context("dispatcher server failed")?;
        }
        result = abacus::api::serve(state, settings.http_port) => {
            result.context("http server failed")?;
        }
    }
    Ok(())
}
