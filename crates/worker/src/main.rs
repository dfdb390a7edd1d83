//! piggybank-sw entry point.
//!
//! Loads configuration, registers the configured worker version against the
//! store database and reports what ended up cached. Logs go to stderr as JSON.

use std::sync::Arc;

use anyhow::{Context, Result};
use piggybank_client::{FetchConfig, HttpFetcher};
use piggybank_core::{AppConfig, CacheStorage};
use piggybank_worker::{RegisterOutcome, Registration, WorkerConfig};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(origin = %config.origin, "starting piggybank-sw");

    let storage = CacheStorage::open(&config.db_path)
        .await
        .with_context(|| format!("opening store database {}", config.db_path.display()))?;
    let store_name = config.store_name();
    if storage.has(&store_name).await? {
        tracing::info!(store = %store_name, "reinstalling existing version");
    }

    let fetcher = HttpFetcher::new(FetchConfig::from(&config))?;
    let worker_config = WorkerConfig::from_app(&config)?;

    let mut registration = Registration::new(storage.clone(), Arc::new(fetcher));
    match registration.register(worker_config).await? {
        RegisterOutcome::Activated(report) => {
            tracing::info!(pruned = ?report.pruned, claim_clients = report.claim_clients, "worker activated");
        }
        RegisterOutcome::Waiting(report) => {
            tracing::info!(store = %report.store_name, "worker installed and waiting");
        }
    }
    registration.flush_writes().await;

    let stores = storage.keys().await?;
    let current = storage.open_store(&store_name).await?;
    let keys = current.keys().await?;
    tracing::info!(stores = ?stores, entries = current.count().await?, keys = ?keys, "cache ready");

    Ok(())
}
