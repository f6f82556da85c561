//! Prometheus metrics for monitoring
//!
//! Exposes metrics for:
//! - Watch starts and duplicate requests
//! - Milestone and receipt failures
//! - Refresh requests versus fired refreshes
//! - RPC endpoint health
//! - Store events by type

use crate::chain::Milestone;
use crate::error::{WatcherError, WatcherResult};
use crate::events::WatchEvent;

use axum::{http::StatusCode, routing::get, Router};
use lazy_static::lazy_static;
use prometheus::{
    register_int_counter, register_int_counter_vec, register_int_gauge,
    register_int_gauge_vec, Encoder, IntCounter, IntCounterVec, IntGauge, IntGaugeVec,
    TextEncoder,
};
use std::net::SocketAddr;
use tracing::info;

lazy_static! {
    // Watch metrics
    pub static ref WATCHES_STARTED: IntCounterVec = register_int_counter_vec!(
        "zk_watcher_watches_started_total",
        "Watches started by kind",
        &["kind"]
    ).expect("metric can be registered");

    pub static ref WATCHES_DUPLICATE: IntCounterVec = register_int_counter_vec!(
        "zk_watcher_watches_duplicate_total",
        "Watch requests ignored because the item was already watched",
        &["kind"]
    ).expect("metric can be registered");

    pub static ref ACTIVE_WATCHES: IntGauge = register_int_gauge!(
        "zk_watcher_active_watches",
        "Watch tasks currently running"
    ).expect("metric can be registered");

    // Confirmation metrics
    pub static ref MILESTONE_FAILURES: IntCounterVec = register_int_counter_vec!(
        "zk_watcher_milestone_failures_total",
        "Milestone waits that failed and were recorded as verified",
        &["milestone"]
    ).expect("metric can be registered");

    pub static ref RECEIPT_FAILURES: IntCounter = register_int_counter!(
        "zk_watcher_receipt_failures_total",
        "Deposit receipt waits that failed and were recorded as committed"
    ).expect("metric can be registered");

    pub static ref TX_VERIFIED: IntCounter = register_int_counter!(
        "zk_watcher_transactions_verified_total",
        "Transactions that reached the verified state"
    ).expect("metric can be registered");

    pub static ref DEPOSITS_COMMITTED: IntCounter = register_int_counter!(
        "zk_watcher_deposits_committed_total",
        "Deposits removed from the pending list"
    ).expect("metric can be registered");

    // Refresh metrics
    pub static ref REFRESH_REQUESTED: IntCounter = register_int_counter!(
        "zk_watcher_refresh_requested_total",
        "Balance refresh requests"
    ).expect("metric can be registered");

    pub static ref REFRESH_FIRED: IntCounter = register_int_counter!(
        "zk_watcher_refresh_fired_total",
        "Balance refreshes actually run after debouncing"
    ).expect("metric can be registered");

    // Health metrics
    pub static ref LAYER_HEALTHY: IntGaugeVec = register_int_gauge_vec!(
        "zk_watcher_layer_healthy",
        "Whether the last RPC health check of a layer succeeded",
        &["layer"]
    ).expect("metric can be registered");

    pub static ref HEALTH_CHECKS: IntCounter = register_int_counter!(
        "zk_watcher_health_checks_total",
        "Health check rounds run"
    ).expect("metric can be registered");

    // Store metrics
    pub static ref STORE_EVENTS: IntCounterVec = register_int_counter_vec!(
        "zk_watcher_store_events_total",
        "Events published to observers by type",
        &["event_type"]
    ).expect("metric can be registered");
}

/// Prometheus metrics server
pub struct MetricsServer {
    port: u16,
}

impl MetricsServer {
    pub fn new(port: u16) -> Self {
        Self { port }
    }

    pub async fn run(&self) -> WatcherResult<()> {
        let app = Router::new().route("/metrics", get(metrics_handler));

        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        info!("Starting metrics server on {}", addr);

        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .map_err(|e| WatcherError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        axum::serve(listener, app)
            .await
            .map_err(|e| WatcherError::Internal(format!("Metrics server failed: {}", e)))?;

        Ok(())
    }
}

async fn metrics_handler() -> Result<String, StatusCode> {
    render().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)
}

/// Encode all registered metrics in the text exposition format
pub fn render() -> WatcherResult<String> {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    encoder
        .encode(&metric_families, &mut buffer)
        .map_err(|e| WatcherError::Internal(e.to_string()))?;
    String::from_utf8(buffer).map_err(|e| WatcherError::Internal(e.to_string()))
}

// Helper functions to record metrics

pub fn record_watch_started(kind: &str) {
    WATCHES_STARTED.with_label_values(&[kind]).inc();
}

pub fn record_duplicate_watch(kind: &str) {
    WATCHES_DUPLICATE.with_label_values(&[kind]).inc();
}

pub fn record_active_watches(count: usize) {
    ACTIVE_WATCHES.set(count as i64);
}

pub fn record_milestone_failure(milestone: Milestone) {
    MILESTONE_FAILURES
        .with_label_values(&[milestone.as_str()])
        .inc();
}

pub fn record_receipt_failure() {
    RECEIPT_FAILURES.inc();
}

pub fn record_transaction_verified() {
    TX_VERIFIED.inc();
}

pub fn record_deposit_committed() {
    DEPOSITS_COMMITTED.inc();
}

pub fn record_refresh_requested() {
    REFRESH_REQUESTED.inc();
}

pub fn record_refresh_fired() {
    REFRESH_FIRED.inc();
}

pub fn record_layer_health(layer: &str, healthy: bool) {
    LAYER_HEALTHY
        .with_label_values(&[layer])
        .set(if healthy { 1 } else { 0 });
}

pub fn record_health_check() {
    HEALTH_CHECKS.inc();
}

pub fn record_event(event: &WatchEvent) {
    STORE_EVENTS.with_label_values(&[event.name()]).inc();
}
