//! Watch events and observer plumbing
//!
//! Every store mutation and every fired refresh is published on a broadcast
//! channel so UI layers can re-render without polling the store.

use crate::error::WatcherResult;
use crate::state::{DepositStatus, TxStatus};
use crate::watch::BalanceRefresher;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Capacity of the observer channel
pub const EVENT_CHANNEL_CAPACITY: usize = 1024;

/// Events emitted by the status store and the refresh scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WatchEvent {
    /// A watched transaction moved to a new status
    TransactionStatus { hash: String, status: TxStatus },

    /// A transaction reached `Verified` and left the active map
    TransactionEvicted { hash: String },

    /// A token's deposit list changed
    DepositsChanged {
        token: String,
        hash: String,
        status: DepositStatus,
        revision: u64,
    },

    /// A withdrawal got its L1 counterpart
    WithdrawalLinked { tx_hash: String, eth_tx_hash: String },

    /// Balances should be re-fetched
    BalancesRefreshRequested { force: bool },

    /// Transaction history should be re-fetched
    HistoryRefreshRequested { offset: u64, force: bool },
}

impl WatchEvent {
    /// Get event name for metrics
    pub fn name(&self) -> &'static str {
        match self {
            WatchEvent::TransactionStatus { .. } => "transaction_status",
            WatchEvent::TransactionEvicted { .. } => "transaction_evicted",
            WatchEvent::DepositsChanged { .. } => "deposits_changed",
            WatchEvent::WithdrawalLinked { .. } => "withdrawal_linked",
            WatchEvent::BalancesRefreshRequested { .. } => "balances_refresh_requested",
            WatchEvent::HistoryRefreshRequested { .. } => "history_refresh_requested",
        }
    }
}

/// Create the shared observer channel
pub fn channel() -> broadcast::Sender<WatchEvent> {
    let (tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    tx
}

/// Publish an event, ignoring the no-subscriber case
pub fn publish(tx: &broadcast::Sender<WatchEvent>, event: WatchEvent) {
    crate::metrics::record_event(&event);
    if tx.send(event).is_err() {
        // No receivers, that's okay
    }
}

/// Balance refresher that hands the refresh off to event subscribers
///
/// The wallet UI owns the actual balance and history queries; this adapter
/// turns the scheduler's fired refresh into events it can act on.
pub struct EventRefresher {
    event_tx: broadcast::Sender<WatchEvent>,
}

impl EventRefresher {
    pub fn new(event_tx: broadcast::Sender<WatchEvent>) -> Self {
        Self { event_tx }
    }
}

#[async_trait]
impl BalanceRefresher for EventRefresher {
    async fn refresh_balances(&self, force: bool) -> WatcherResult<()> {
        debug!("Requesting balance refresh (force={})", force);
        publish(&self.event_tx, WatchEvent::BalancesRefreshRequested { force });
        Ok(())
    }

    async fn refresh_history(&self, offset: u64, force: bool) -> WatcherResult<()> {
        debug!("Requesting history refresh from offset {} (force={})", offset, force);
        publish(&self.event_tx, WatchEvent::HistoryRefreshRequested { offset, force });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_event_refresher_publishes_both_requests() {
        let tx = channel();
        let mut rx = tx.subscribe();
        let refresher = EventRefresher::new(tx);

        refresher.refresh_balances(true).await.unwrap();
        refresher.refresh_history(0, true).await.unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            WatchEvent::BalancesRefreshRequested { force: true }
        );
        assert_eq!(
            rx.recv().await.unwrap(),
            WatchEvent::HistoryRefreshRequested {
                offset: 0,
                force: true
            }
        );
    }

    #[test]
    fn test_publish_without_subscribers_is_silent() {
        let tx = channel();
        publish(
            &tx,
            WatchEvent::TransactionEvicted {
                hash: "sync-tx:01".to_string(),
            },
        );
    }

    #[test]
    fn test_event_serialization_is_tagged() {
        let event = WatchEvent::TransactionStatus {
            hash: "sync-tx:01".to_string(),
            status: TxStatus::Committed,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "transaction_status");
        assert_eq!(json["status"], "Committed");
    }
}
