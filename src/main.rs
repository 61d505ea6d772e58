//! PPN Gateway - transaction submission front door for a PPN node
//!
//! Accepts batches of signed transactions (or argument sets for the node to
//! sign), attaches routing addresses, forwards them to the node's pool and
//! reports per-item success or failure.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

mod api;
mod backend;
mod config;
mod error;
mod gateway;
mod metrics;
mod rewards;
mod tx;

use api::AppState;
use backend::NodeBackend;
use config::Settings;
use gateway::Gateway;
use metrics::MetricsServer;
use rewards::{FileAddressLists, RewardAggregator};
use tx::AddrLocker;

const HEALTH_CHECK_INTERVAL_SECS: u64 = 30;
const SHUTDOWN_GRACE_SECS: u64 = 10;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting PPN Gateway v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration with {} node RPC URL(s)",
        settings.node.rpc_urls.len()
    );

    let node = Arc::new(NodeBackend::new(&settings.node).context("Failed to create node backend")?);
    let gateway = Arc::new(Gateway::new(node.clone(), Arc::new(AddrLocker::new())));
    let rewards = Arc::new(RewardAggregator::new(Box::new(FileAddressLists::new(
        &settings.rewards,
    ))));

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // Start API server
    let api_handle = tokio::spawn({
        let state = AppState {
            gateway,
            rewards,
            request_timeout: settings.gateway.request_timeout(),
            shutdown: shutdown_rx,
        };
        let api_config = settings.api.clone();
        async move {
            if let Err(e) = api::run_server(api_config, state).await {
                error!("API server error: {}", e);
            }
        }
    });

    // Start metrics server
    let metrics_handle = if settings.metrics.enabled {
        let server = MetricsServer::new(settings.metrics.port);
        Some(tokio::spawn(async move {
            if let Err(e) = server.run().await {
                error!("Metrics server error: {}", e);
            }
        }))
    } else {
        None
    };

    // Health check loop
    let health_handle = tokio::spawn({
        let node = node.clone();
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(HEALTH_CHECK_INTERVAL_SECS))
                    .await;

                if node.health_check().await {
                    metrics::record_health_check();
                } else {
                    warn!("Node health check failed");
                    metrics::record_health_check_failure();
                }
            }
        }
    });

    info!("PPN Gateway is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // In-flight batches fail their remaining items as cancelled
    let _ = shutdown_tx.send(true);
    if tokio::time::timeout(tokio::time::Duration::from_secs(SHUTDOWN_GRACE_SECS), api_handle)
        .await
        .is_err()
    {
        warn!("API server did not stop within {}s", SHUTDOWN_GRACE_SECS);
    }

    // Abort background tasks
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("PPN Gateway stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ppn_gateway=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
