//! Transaction watch state machine
//!
//! `Pending -> Committed -> Verified (evicted)`. Notifier failures are
//! recorded as `Verified` so a transaction never stays pending forever.

use super::refresh::RefreshScheduler;
use crate::chain::{ChainNotifier, Milestone};
use crate::state::{StatusStore, TxStatus};

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Watches zk transactions through commit and verify
pub struct TransactionWatcher {
    store: Arc<dyn StatusStore>,
    notifier: Arc<dyn ChainNotifier>,
    scheduler: Arc<RefreshScheduler>,
}

impl TransactionWatcher {
    pub fn new(
        store: Arc<dyn StatusStore>,
        notifier: Arc<dyn ChainNotifier>,
        scheduler: Arc<RefreshScheduler>,
    ) -> Self {
        Self {
            store,
            notifier,
            scheduler,
        }
    }

    /// Watch `tx_hash` until it is verified.
    ///
    /// `already_submitted` skips the commit wait for transactions known to be
    /// committed elsewhere. Returns `false` without doing anything when the
    /// hash is already being watched.
    pub async fn watch(&self, tx_hash: &str, already_submitted: bool) -> bool {
        if !self.store.claim_transaction(tx_hash) {
            debug!("Transaction {} is already watched", tx_hash);
            crate::metrics::record_duplicate_watch("transaction");
            return false;
        }
        crate::metrics::record_watch_started("transaction");
        let mut claim = ClaimGuard {
            store: self.store.as_ref(),
            tx_hash,
            armed: true,
        };

        if already_submitted {
            self.store
                .upsert_transaction(tx_hash, TxStatus::Committed, committed_props("external"));
        } else {
            match self.notifier.await_milestone(tx_hash, Milestone::Commit).await {
                Ok(()) => {
                    self.store
                        .upsert_transaction(tx_hash, TxStatus::Committed, committed_props("notifier"));
                    self.scheduler.request();
                }
                Err(e) => {
                    warn!("Commit wait for {} failed, marking verified: {}", tx_hash, e);
                    crate::metrics::record_milestone_failure(Milestone::Commit);
                    claim.disarm();
                    self.finish(tx_hash);
                    return true;
                }
            }
        }
        claim.disarm();

        if let Err(e) = self.notifier.await_milestone(tx_hash, Milestone::Verify).await {
            warn!("Verify wait for {} failed, marking verified: {}", tx_hash, e);
            crate::metrics::record_milestone_failure(Milestone::Verify);
        }
        self.finish(tx_hash);
        true
    }

    fn finish(&self, tx_hash: &str) {
        self.store
            .upsert_transaction(tx_hash, TxStatus::Verified, HashMap::new());
        self.scheduler.request();
        crate::metrics::record_transaction_verified();
        info!("Transaction {} verified", tx_hash);
    }
}

/// Gives the hash back when a watch is dropped before its commit.
///
/// Disarmed once the commit wait resolved, so a later claim on the same hash
/// by another watch is never touched.
struct ClaimGuard<'a> {
    store: &'a dyn StatusStore,
    tx_hash: &'a str,
    armed: bool,
}

impl ClaimGuard<'_> {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ClaimGuard<'_> {
    fn drop(&mut self) {
        if self.armed && self.store.release_claim(self.tx_hash) {
            debug!("Watch of {} dropped before commit", self.tx_hash);
        }
    }
}

fn committed_props(source: &str) -> HashMap<String, String> {
    HashMap::from([
        ("committedAt".to_string(), Utc::now().to_rfc3339()),
        ("commitSource".to_string(), source.to_string()),
    ])
}
