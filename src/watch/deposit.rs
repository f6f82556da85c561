//! Deposit watch state machine
//!
//! `Initiated -> Committed (removed)`. A deposit leaves its token list once
//! its L1 receipt settles, whether the receipt wait succeeded or not.

use super::refresh::RefreshScheduler;
use crate::chain::DepositHandle;
use crate::state::{DepositUpdate, StatusStore};

use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watches L1 deposits until their receipt settles
pub struct DepositWatcher {
    store: Arc<dyn StatusStore>,
    scheduler: Arc<RefreshScheduler>,
    /// Skip a watch whose (token, hash) is already listed
    guard_duplicates: bool,
}

impl DepositWatcher {
    pub fn new(
        store: Arc<dyn StatusStore>,
        scheduler: Arc<RefreshScheduler>,
        guard_duplicates: bool,
    ) -> Self {
        Self {
            store,
            scheduler,
            guard_duplicates,
        }
    }

    /// Watch a deposit of `amount` (smallest unit) of `token`.
    ///
    /// Without the duplicate guard a second watch of the same deposit
    /// overwrites the listed record. Returns `false` only when the guard
    /// rejected the watch.
    pub async fn watch(&self, deposit: &dyn DepositHandle, token: &str, amount: &str) -> bool {
        let eth_tx_hash = deposit.eth_tx_hash();
        let initiated = DepositUpdate::initiated(eth_tx_hash.clone(), amount);

        if self.guard_duplicates {
            if self.store.claim_deposit(token, initiated).is_none() {
                debug!("Deposit {} for {} is already watched", eth_tx_hash, token);
                crate::metrics::record_duplicate_watch("deposit");
                return false;
            }
        } else {
            self.store.upsert_deposit(token, initiated);
        }
        crate::metrics::record_watch_started("deposit");

        if let Err(e) = deposit.await_receipt().await {
            warn!(
                "Receipt wait for deposit {} failed, marking committed: {}",
                eth_tx_hash, e
            );
            crate::metrics::record_receipt_failure();
        }

        self.scheduler.request();
        self.store
            .upsert_deposit(token, DepositUpdate::committed(eth_tx_hash.clone()));
        crate::metrics::record_deposit_committed();
        info!("Deposit {} of {} {} committed", eth_tx_hash, amount, token);
        true
    }
}
