//! Winch Server
//!
//! A single-node control plane that runs external command-line tools as
//! tracked jobs.
//!
//! Architecture:
//! - Repositories: SQLite persistence for jobs and their captured output
//! - Services: Business logic (job lifecycle, log reads, stream watching)
//! - Executor: Subprocess spawning, line capture, redaction, completion
//! - Scheduler: Background promotion of queued jobs to running
//! - API: axum HTTP surface, including the SSE streaming gateway
//!
//! Jobs are created queued over HTTP, started by the scheduler, and
//! observable live through any number of concurrent streaming sessions.

mod api;
mod config;
mod db;
mod events;
mod executor;
mod overlay;
mod repository;
mod scheduler;
mod service;

#[cfg(test)]
mod test_util;

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::api::AppState;
use crate::config::Config;
use crate::events::JobBroker;
use crate::executor::Executor;
use crate::overlay::EnvPrefixOverlay;
use crate::scheduler::Scheduler;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "winch_server=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting winch server...");

    let config = Config::from_env();
    config.validate().context("Invalid configuration")?;

    std::fs::create_dir_all(&config.data_root).with_context(|| {
        format!(
            "Failed to create data root {}",
            config.data_root.display()
        )
    })?;

    info!("Connecting to database...");

    let database = db::Db::connect(&config.database_url)
        .await
        .context("Failed to connect to the database")?;

    database
        .migrate()
        .await
        .context("Failed to run database migrations")?;

    let broker = JobBroker::new();
    let executor = Arc::new(Executor::new(
        database.clone(),
        broker.clone(),
        Arc::new(EnvPrefixOverlay::new(config.job_env_prefix.clone())),
        config.data_root.clone(),
    ));

    // Jobs left running by a previous process have no subprocess behind
    // them; fail them before the scheduler starts promoting new work
    let recovered = executor
        .recover_orphaned()
        .await
        .context("Failed to recover orphaned jobs")?;
    if recovered > 0 {
        info!("Recovered {} orphaned job(s)", recovered);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = Scheduler::new(
        database.clone(),
        executor,
        config.schedule_interval,
    )
    .spawn(shutdown_rx);

    let app = api::create_router(AppState {
        db: database,
        broker,
        stream_fallback: config.stream_fallback,
    });

    info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .context("Failed to bind to address")?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown_tx))
        .await
        .context("Server error")?;

    scheduler_handle.await.context("Scheduler task panicked")?;

    info!("Shutdown complete");
    Ok(())
}

async fn shutdown_signal(shutdown_tx: watch::Sender<bool>) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown signal received");
    let _ = shutdown_tx.send(true);
}
