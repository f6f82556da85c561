//! zk transaction watcher service
//!
//! Watches zkSync transactions and L1 deposits for a wallet session and
//! publishes status changes and refresh requests to observers.

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use zk_tx_watcher::api::{self, AppState};
use zk_tx_watcher::chain::{EthereumProvider, ZkSyncProvider};
use zk_tx_watcher::config::Settings;
use zk_tx_watcher::events::{self, EventRefresher};
use zk_tx_watcher::metrics::{self, MetricsServer};
use zk_tx_watcher::state::InMemoryStatusStore;
use zk_tx_watcher::watch::WatchEngine;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    init_logging();

    info!("Starting zk transaction watcher v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let settings = Settings::load()?;
    info!(
        "Loaded configuration (refresh debounce {}ms)",
        settings.watcher.refresh_debounce_ms
    );

    // Observer channel shared by the store and the refresher
    let event_tx = events::channel();
    let store = Arc::new(InMemoryStatusStore::with_events(event_tx.clone()));

    // Initialize chain connections
    let zksync = Arc::new(
        ZkSyncProvider::new(&settings.zksync).context("Failed to create zkSync provider")?,
    );
    let ethereum = Arc::new(
        EthereumProvider::new(&settings.ethereum)
            .context("Failed to create Ethereum provider")?,
    );
    info!("Chain connections initialized");

    // Initialize watch engine
    let engine = Arc::new(WatchEngine::new(
        store,
        zksync.clone(),
        Arc::new(EventRefresher::new(event_tx.clone())),
        &settings.watcher,
    ));
    info!("Watch engine initialized");

    // Start API server
    let api_handle = tokio::spawn({
        let config = settings.api.clone();
        let state = AppState {
            engine: engine.clone(),
            ethereum: ethereum.clone(),
        };
        async move {
            if let Err(e) = api::run_server(config, state).await {
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

    // Log every status change for observers without a UI
    let observer_handle = tokio::spawn({
        let mut rx = event_tx.subscribe();
        async move {
            loop {
                match rx.recv().await {
                    Ok(event) => debug!("Watch event: {:?}", event),
                    Err(RecvError::Lagged(skipped)) => {
                        warn!("Event observer lagged, skipped {} events", skipped)
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        }
    });

    // Health check loop
    let health_handle = tokio::spawn({
        let zksync = zksync.clone();
        let ethereum = ethereum.clone();
        let interval = settings.watcher.health_check_interval_secs;
        async move {
            loop {
                tokio::time::sleep(tokio::time::Duration::from_secs(interval)).await;

                let (zksync_ok, ethereum_ok) =
                    futures::join!(zksync.health_check(), ethereum.health_check());
                if !zksync_ok {
                    warn!("zkSync health check failed");
                }
                if !ethereum_ok {
                    warn!("Ethereum health check failed");
                }

                metrics::record_layer_health("zksync", zksync_ok);
                metrics::record_layer_health("ethereum", ethereum_ok);
                metrics::record_health_check();
            }
        }
    });

    info!("zk transaction watcher is running");
    info!("API server: http://{}:{}", settings.api.host, settings.api.port);
    if settings.metrics.enabled {
        info!("Metrics: http://0.0.0.0:{}/metrics", settings.metrics.port);
    }

    // Wait for shutdown signal
    shutdown_signal().await;

    info!("Shutdown signal received, stopping...");

    // Outstanding watches are dropped, not awaited
    let abandoned = engine.abandon_all();
    if abandoned > 0 {
        info!("Abandoned {} outstanding watches", abandoned);
    }

    // Abort background tasks
    api_handle.abort();
    observer_handle.abort();
    health_handle.abort();
    if let Some(h) = metrics_handle {
        h.abort();
    }

    info!("zk transaction watcher stopped");
    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,zk_tx_watcher=debug,hyper=warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true).with_thread_ids(true))
        .init();
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
