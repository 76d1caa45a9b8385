//! Gatekeeper service binary.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client ──▶ request id / trace / timeout / security headers
//!                    │
//!                    ▼
//!              gateway middleware
//!     identity → transport → classify → rate limit → credential → CSRF + action token
//!                    │
//!                    ▼
//!              application handlers ──▶ action token store (memory + snapshot)
//!
//!     Background: maintenance sweep, config watcher (API key only), metrics exporter
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;

use gatekeeper::config::loader::{apply_env_overrides, load_config};
use gatekeeper::config::validation::validate_config;
use gatekeeper::config::watcher::ConfigWatcher;
use gatekeeper::config::GatewayConfig;
use gatekeeper::lifecycle::{maintenance, shutdown, Shutdown};
use gatekeeper::observability::{logging, metrics};
use gatekeeper::store::MemoryActionTokenStore;
use gatekeeper::{clock, GatewayState, HttpServer};

#[derive(Parser, Debug)]
#[command(name = "gatekeeper", version, about = "Request gating layer for the approval service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, env = "GATEKEEPER_CONFIG")]
    config: Option<PathBuf>,

    /// Override the listener bind address.
    #[arg(short, long, env = "GATEKEEPER_LISTEN")]
    listen: Option<String>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "GATEKEEPER_LOG_LEVEL")]
    log_level: Option<String>,

    /// Emit logs as JSON.
    #[arg(long, env = "GATEKEEPER_JSON_LOGS")]
    json_logs: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => load_config(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => {
            let mut config = GatewayConfig::default();
            apply_env_overrides(&mut config, |name| std::env::var(name).ok());
            config
        }
    };
    if let Some(listen) = &args.listen {
        config.listener.bind_address = listen.clone();
    }
    if let Some(level) = &args.log_level {
        config.observability.log_level = level.clone();
    }

    logging::init_logging(&config.observability.log_level, args.json_logs)
        .context("installing log subscriber")?;
    tracing::info!(version = env!("CARGO_PKG_VERSION"), "gatekeeper starting");

    if let Err(errors) = validate_config(&config) {
        for error in &errors {
            tracing::error!(%error, "Invalid configuration");
        }
        anyhow::bail!("configuration has {} error(s)", errors.len());
    }

    tracing::info!(
        bind_address = %config.listener.bind_address,
        rules = config.endpoints.rules.len(),
        scopes = config.rate_limit.scopes.len(),
        force_https = config.transport.force_https,
        request_timeout_secs = config.timeouts.request_secs,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let store = match &config.action_tokens.snapshot_path {
        Some(path) => MemoryActionTokenStore::load_from_file(path, config.action_tokens.revoke_siblings)
            .context("loading action token snapshot")?,
        None => MemoryActionTokenStore::new(config.action_tokens.revoke_siblings, None),
    };

    let sweep_interval = Duration::from_secs(config.maintenance.sweep_interval_secs);
    let bind_address = config.listener.bind_address.clone();
    let state = GatewayState::new(config, Arc::new(store.clone()), clock::system());

    let shutdown = Shutdown::new();
    let maintenance_task = tokio::spawn(maintenance::run(state.clone(), sweep_interval, shutdown.clone()));

    // Kept alive for the life of the process.
    let _watcher = match &args.config {
        Some(path) => {
            let (watcher, mut updates) = ConfigWatcher::new(path);
            let api_key = state.api_key();
            tokio::spawn(async move {
                while let Some(config) = updates.recv().await {
                    api_key.reload(&config.auth);
                }
            });
            match watcher.run() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::warn!(error = %e, "Config watcher unavailable, hot reload disabled");
                    None
                }
            }
        }
        None => None,
    };

    let listener = TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("binding {bind_address}"))?;
    tracing::info!(address = %listener.local_addr()?, "Listening for connections");

    let server = HttpServer::new(state);
    let signal = {
        let shutdown = shutdown.clone();
        async move {
            shutdown::wait_for_signal().await;
            shutdown.trigger();
        }
    };
    server.run(listener, signal).await.context("serving HTTP")?;

    shutdown.trigger();
    if let Err(e) = maintenance_task.await {
        tracing::warn!(error = %e, "Maintenance task ended abnormally");
    }
    if let Err(e) = store.save_to_file() {
        tracing::error!(error = %e, "Failed to save action token snapshot");
    }

    tracing::info!("Shutdown complete");
    Ok(())
}
