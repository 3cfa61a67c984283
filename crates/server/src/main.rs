//! seamcache entry point.
//!
//! Boots the worker (resume, install, activate) and then serves the caching
//! proxy until Ctrl-C. Background cache work is drained before exit.
//! Logging goes to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use seamcache_client::{FetchClient, FetchConfig};
use seamcache_core::{AppConfig, CacheDb, Manifest};
use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

mod error;
mod handler;
mod worker;

use handler::AppState;
use worker::{Worker, WorkerSettings, WorkerState};

// Event handlers never run in parallel; background work interleaves at awaits.
#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load().context("loading configuration")?;
    let settings = WorkerSettings::from_config(&config)?;

    let db = CacheDb::open(&config.db_path)
        .await
        .with_context(|| format!("opening cache store at {}", config.db_path.display()))?;
    let network = Arc::new(FetchClient::new(FetchConfig::from(&config))?);

    let origin = settings.origin.clone();
    let worker = Arc::new(Worker::new(db, network, Manifest::default(), settings));
    let state = worker.start().await?;

    tracing::info!(
        version = %config.cache_name(),
        state = ?state,
        origin = %origin,
        "worker started"
    );
    if state == WorkerState::Installed {
        tracing::info!(path = handler::ACTIVATE_PATH, "waiting for activation request");
    }

    let listener = TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("binding {}", config.listen_addr))?;
    tracing::info!(addr = %config.listen_addr, "serving");

    let app = handler::router(AppState { worker: worker.clone(), origin, body_limit: config.max_bytes });
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    let pending = worker.pending().len();
    if pending > 0 {
        tracing::info!(pending, "waiting for background cache work");
    }
    worker.pending().drain().await;

    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}
