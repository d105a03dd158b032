//! `MailBridge` - local JSON-RPC mail service
//!
//! Serves the mail operations of `mailbridge-core` over a single HTTP
//! endpoint for automation tools and the `mailbridge-cli` client.

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![forbid(unsafe_code)]

mod config;
mod server;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use config::Config;
use mailbridge_core::{Dispatcher, MailService, MemoryStore, ServiceSettings};

const DEFAULT_LOG_FILTER: &str = "mailbridge=info,mailbridge_core=info";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load().await?;

    // Initialize logging
    let fallback = config
        .log_filter
        .clone()
        .unwrap_or_else(|| DEFAULT_LOG_FILTER.to_string());
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| fallback.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting MailBridge");

    let store = load_store(&config.store_path).await?;
    let settings = ServiceSettings {
        scratch_dir: config.scratch_dir.clone(),
    };
    let dispatcher = Dispatcher::new(MailService::new(Arc::new(store), settings));

    let listener = tokio::net::TcpListener::bind(config.socket_addr())
        .await
        .with_context(|| format!("binding {}", config.socket_addr()))?;
    info!(address = %listener.local_addr()?, "MailBridge listening");

    axum::serve(listener, server::router(dispatcher))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("MailBridge stopped");
    Ok(())
}

/// Loads the store snapshot, starting empty when there is none.
async fn load_store(path: &Path) -> anyhow::Result<MemoryStore> {
    if !path.exists() {
        warn!(path = %path.display(), "Store snapshot not found, serving an empty store");
        return Ok(MemoryStore::new());
    }

    let store = MemoryStore::load(path)
        .await
        .with_context(|| format!("loading store snapshot {}", path.display()))?;
    info!(path = %path.display(), "Store snapshot loaded");
    Ok(store)
}

async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Shutdown requested"),
        Err(err) => {
            warn!(%err, "Cannot listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    }
}
