//! Debounced balance/history refresh

use super::BalanceRefresher;

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, warn};

/// Coalesces refresh requests into one delayed refresh.
///
/// Each `request` replaces the pending timer, so a refresh only fires after a
/// quiet period of `delay` following the last request. Fired refreshes run
/// one at a time.
pub struct RefreshScheduler {
    refresher: Arc<dyn BalanceRefresher>,
    delay: Duration,
    history_offset: u64,
    /// The single outstanding timer
    pending: Mutex<Option<JoinHandle<()>>>,
    /// Held for the duration of a fired refresh
    in_flight: Arc<tokio::sync::Mutex<()>>,
}

impl RefreshScheduler {
    pub fn new(refresher: Arc<dyn BalanceRefresher>, delay: Duration, history_offset: u64) -> Self {
        Self {
            refresher,
            delay,
            history_offset,
            pending: Mutex::new(None),
            in_flight: Arc::new(tokio::sync::Mutex::new(())),
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Schedule a refresh, superseding any pending one
    pub fn request(&self) {
        let mut pending = self.lock_pending();
        if let Some(timer) = pending.take() {
            timer.abort();
        }

        let deadline = Instant::now() + self.delay;
        let refresher = self.refresher.clone();
        let in_flight = self.in_flight.clone();
        let offset = self.history_offset;
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep_until(deadline).await;
            // Detached so a later request cannot abort a refresh mid-flight
            tokio::spawn(run_refresh(refresher, in_flight, offset));
        }));

        crate::metrics::record_refresh_requested();
    }

    /// Drop the pending refresh without firing it.
    ///
    /// Returns whether a timer was outstanding.
    pub fn cancel_pending(&self) -> bool {
        match self.lock_pending().take() {
            Some(timer) => {
                let was_pending = !timer.is_finished();
                timer.abort();
                if was_pending {
                    debug!("Pending balance refresh cancelled");
                }
                was_pending
            }
            None => false,
        }
    }

    /// Whether a refresh is scheduled but has not fired yet
    pub fn is_pending(&self) -> bool {
        self.lock_pending()
            .as_ref()
            .map(|timer| !timer.is_finished())
            .unwrap_or(false)
    }

    fn lock_pending(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        if let Some(timer) = self.lock_pending().take() {
            timer.abort();
        }
    }
}

async fn run_refresh(
    refresher: Arc<dyn BalanceRefresher>,
    in_flight: Arc<tokio::sync::Mutex<()>>,
    history_offset: u64,
) {
    let _running = in_flight.lock().await;
    crate::metrics::record_refresh_fired();
    debug!("Refreshing balances and history");

    if let Err(e) = refresher.refresh_balances(true).await {
        warn!("Balance refresh failed: {}", e);
    }
    if let Err(e) = refresher.refresh_history(history_offset, true).await {
        warn!("History refresh failed: {}", e);
    }
}
