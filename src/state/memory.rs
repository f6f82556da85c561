//! In-memory status store

use super::store::{
    DepositRecord, DepositStatus, DepositUpdate, StatusStore, TxStatus, WatchedTransaction,
};
use crate::events::{self, WatchEvent};

use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::broadcast;
use tracing::debug;

/// Process-lifetime status store backed by concurrent maps
pub struct InMemoryStatusStore {
    /// Watched transactions: tx_hash -> entry
    transactions: DashMap<String, WatchedTransaction>,
    /// Pending deposits: token symbol -> insertion-ordered records
    deposits: DashMap<String, Vec<DepositRecord>>,
    /// Bumped on every deposit-list mutation
    deposit_revision: AtomicU64,
    /// Withdrawal tx_hash -> L1 tx hash
    withdrawal_links: DashMap<String, String>,
    /// Observer channel
    event_tx: broadcast::Sender<WatchEvent>,
}

impl InMemoryStatusStore {
    /// Create a store with its own event channel
    pub fn new() -> Self {
        Self::with_events(events::channel())
    }

    /// Create a store publishing on an existing event channel
    pub fn with_events(event_tx: broadcast::Sender<WatchEvent>) -> Self {
        Self {
            transactions: DashMap::new(),
            deposits: DashMap::new(),
            deposit_revision: AtomicU64::new(0),
            withdrawal_links: DashMap::new(),
            event_tx,
        }
    }

    fn bump_revision(&self) -> u64 {
        self.deposit_revision.fetch_add(1, Ordering::SeqCst) + 1
    }
}

impl Default for InMemoryStatusStore {
    fn default() -> Self {
        Self::new()
    }
}

impl StatusStore for InMemoryStatusStore {
    fn transaction(&self, hash: &str) -> Option<WatchedTransaction> {
        self.transactions.get(hash).map(|t| t.clone())
    }

    fn transactions(&self) -> Vec<WatchedTransaction> {
        self.transactions.iter().map(|e| e.value().clone()).collect()
    }

    fn claim_transaction(&self, hash: &str) -> bool {
        match self.transactions.entry(hash.to_string()) {
            Entry::Occupied(_) => return false,
            Entry::Vacant(slot) => {
                slot.insert(WatchedTransaction {
                    hash: hash.to_string(),
                    status: TxStatus::Pending,
                    props: HashMap::new(),
                    updated_at: Utc::now(),
                });
            }
        }

        events::publish(
            &self.event_tx,
            WatchEvent::TransactionStatus {
                hash: hash.to_string(),
                status: TxStatus::Pending,
            },
        );
        true
    }

    fn upsert_transaction(&self, hash: &str, status: TxStatus, props: HashMap<String, String>) {
        if status == TxStatus::Verified {
            self.remove_transaction(hash);
            return;
        }

        {
            let mut entry = self
                .transactions
                .entry(hash.to_string())
                .or_insert_with(|| WatchedTransaction {
                    hash: hash.to_string(),
                    status,
                    props: HashMap::new(),
                    updated_at: Utc::now(),
                });
            entry.status = status;
            entry.props.extend(props);
            entry.updated_at = Utc::now();
        }

        debug!("Transaction {} is now {}", hash, status);
        events::publish(
            &self.event_tx,
            WatchEvent::TransactionStatus {
                hash: hash.to_string(),
                status,
            },
        );
    }

    fn release_claim(&self, hash: &str) -> bool {
        let released = self
            .transactions
            .remove_if(hash, |_, tx| tx.status == TxStatus::Pending)
            .is_some();
        if released {
            debug!("Claim on {} released before commit", hash);
            events::publish(
                &self.event_tx,
                WatchEvent::TransactionEvicted {
                    hash: hash.to_string(),
                },
            );
        }
        released
    }

    fn remove_transaction(&self, hash: &str) -> Option<WatchedTransaction> {
        let removed = self.transactions.remove(hash).map(|(_, tx)| tx);
        if removed.is_some() {
            debug!("Transaction {} evicted", hash);
            events::publish(
                &self.event_tx,
                WatchEvent::TransactionEvicted {
                    hash: hash.to_string(),
                },
            );
        }
        removed
    }

    fn upsert_deposit(&self, token: &str, update: DepositUpdate) -> u64 {
        let hash = update.hash.clone();
        let status = update.status;

        let revision = {
            let mut list = self.deposits.entry(token.to_string()).or_default();
            match list.iter().position(|r| r.hash == update.hash) {
                // Settled deposits are never listed
                None if status == DepositStatus::Committed => {}
                None => list.push(update.into_record()),
                Some(index) if status == DepositStatus::Committed => {
                    list.remove(index);
                }
                Some(index) => {
                    let record = &mut list[index];
                    record.status = status;
                    if let Some(amount) = update.amount {
                        record.amount = amount;
                    }
                    if let Some(confirmations) = update.confirmations {
                        record.confirmations = confirmations;
                    }
                }
            }
            self.bump_revision()
        };

        debug!(
            "Deposit {} for {} is now {} (revision {})",
            hash, token, status, revision
        );
        events::publish(
            &self.event_tx,
            WatchEvent::DepositsChanged {
                token: token.to_string(),
                hash,
                status,
                revision,
            },
        );
        revision
    }

    fn claim_deposit(&self, token: &str, update: DepositUpdate) -> Option<u64> {
        let hash = update.hash.clone();
        let status = update.status;

        let revision = {
            let mut list = self.deposits.entry(token.to_string()).or_default();
            if list.iter().any(|r| r.hash == update.hash) {
                return None;
            }
            list.push(update.into_record());
            self.bump_revision()
        };

        events::publish(
            &self.event_tx,
            WatchEvent::DepositsChanged {
                token: token.to_string(),
                hash,
                status,
                revision,
            },
        );
        Some(revision)
    }

    fn deposits(&self, token: &str) -> Vec<DepositRecord> {
        self.deposits
            .get(token)
            .map(|list| list.clone())
            .unwrap_or_default()
    }

    fn all_deposits(&self) -> HashMap<String, Vec<DepositRecord>> {
        self.deposits
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect()
    }

    fn deposit_revision(&self) -> u64 {
        self.deposit_revision.load(Ordering::SeqCst)
    }

    fn set_withdrawal_link(&self, tx_hash: &str, eth_tx_hash: &str) -> bool {
        match self.withdrawal_links.entry(tx_hash.to_string()) {
            Entry::Occupied(existing) => {
                if existing.get() != eth_tx_hash {
                    debug!(
                        "Withdrawal {} already linked to {}, ignoring {}",
                        tx_hash,
                        existing.get(),
                        eth_tx_hash
                    );
                }
                return false;
            }
            Entry::Vacant(slot) => {
                slot.insert(eth_tx_hash.to_string());
            }
        }

        events::publish(
            &self.event_tx,
            WatchEvent::WithdrawalLinked {
                tx_hash: tx_hash.to_string(),
                eth_tx_hash: eth_tx_hash.to_string(),
            },
        );
        true
    }

    fn withdrawal_link(&self, tx_hash: &str) -> Option<String> {
        self.withdrawal_links.get(tx_hash).map(|l| l.clone())
    }

    fn subscribe(&self) -> broadcast::Receiver<WatchEvent> {
        self.event_tx.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn props(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_claim_is_exclusive() {
        let store = InMemoryStatusStore::new();
        assert!(store.claim_transaction("sync-tx:aa"));
        assert!(!store.claim_transaction("sync-tx:aa"));
        assert_eq!(
            store.transaction("sync-tx:aa").unwrap().status,
            TxStatus::Pending
        );
    }

    #[test]
    fn test_upsert_merges_props_and_verified_evicts() {
        let store = InMemoryStatusStore::new();
        store.upsert_transaction("sync-tx:aa", TxStatus::Committed, props(&[("kind", "Transfer")]));
        store.upsert_transaction("sync-tx:aa", TxStatus::Committed, props(&[("block", "12")]));

        let tx = store.transaction("sync-tx:aa").unwrap();
        assert_eq!(tx.status, TxStatus::Committed);
        assert_eq!(tx.props.get("kind").map(String::as_str), Some("Transfer"));
        assert_eq!(tx.props.get("block").map(String::as_str), Some("12"));

        store.upsert_transaction("sync-tx:aa", TxStatus::Verified, HashMap::new());
        assert!(store.transaction("sync-tx:aa").is_none());
        assert!(store.transactions().is_empty());
    }

    #[test]
    fn test_verified_for_unknown_hash_is_noop() {
        let store = InMemoryStatusStore::new();
        store.upsert_transaction("sync-tx:bb", TxStatus::Verified, HashMap::new());
        assert!(store.transaction("sync-tx:bb").is_none());
    }

    #[test]
    fn test_deposit_lifecycle_and_revision() {
        let store = InMemoryStatusStore::new();
        assert_eq!(store.deposit_revision(), 0);

        store.upsert_deposit("ETH", DepositUpdate::initiated("0x01", "1000"));
        store.upsert_deposit("ETH", DepositUpdate::initiated("0x02", "2000"));
        let list = store.deposits("ETH");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].hash, "0x01");
        assert_eq!(list[1].hash, "0x02");
        assert_eq!(list[0].status, DepositStatus::Initiated);
        assert_eq!(list[0].confirmations, 1);

        let revision = store.upsert_deposit("ETH", DepositUpdate::committed("0x01"));
        assert_eq!(revision, 3);
        let list = store.deposits("ETH");
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].hash, "0x02");
    }

    #[test]
    fn test_committed_for_unknown_deposit_creates_nothing() {
        let store = InMemoryStatusStore::new();
        let revision = store.upsert_deposit("DAI", DepositUpdate::committed("0x09"));
        assert_eq!(revision, 1);
        assert!(store.deposits("DAI").is_empty());
    }

    #[test]
    fn test_deposit_overwrite_keeps_position() {
        let store = InMemoryStatusStore::new();
        store.upsert_deposit("ETH", DepositUpdate::initiated("0x01", "1000"));
        store.upsert_deposit("ETH", DepositUpdate::initiated("0x02", "2000"));
        store.upsert_deposit("ETH", DepositUpdate::initiated("0x01", "1500"));

        let list = store.deposits("ETH");
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].hash, "0x01");
        assert_eq!(list[0].amount, "1500");
    }

    #[test]
    fn test_claim_deposit_rejects_duplicate() {
        let store = InMemoryStatusStore::new();
        assert_eq!(
            store.claim_deposit("ETH", DepositUpdate::initiated("0x01", "1000")),
            Some(1)
        );
        assert_eq!(
            store.claim_deposit("ETH", DepositUpdate::initiated("0x01", "5")),
            None
        );
        assert_eq!(store.deposits("ETH")[0].amount, "1000");
        assert_eq!(store.deposit_revision(), 1);
    }

    #[test]
    fn test_deposits_are_token_scoped() {
        let store = InMemoryStatusStore::new();
        store.upsert_deposit("ETH", DepositUpdate::initiated("0x01", "1"));
        store.upsert_deposit("USDC", DepositUpdate::initiated("0x01", "2"));

        assert_eq!(store.deposits("ETH")[0].amount, "1");
        assert_eq!(store.deposits("USDC")[0].amount, "2");
        assert!(store.deposits("DAI").is_empty());
        assert_eq!(store.all_deposits().len(), 2);
    }

    #[test]
    fn test_withdrawal_link_is_write_once() {
        let store = InMemoryStatusStore::new();
        assert!(store.set_withdrawal_link("0xA", "0xB"));
        assert!(!store.set_withdrawal_link("0xA", "0xC"));
        assert_eq!(store.withdrawal_link("0xA").as_deref(), Some("0xB"));
        assert_eq!(store.withdrawal_link("0xunknown"), None);
    }

    #[tokio::test]
    async fn test_mutations_are_published() {
        let store = InMemoryStatusStore::new();
        let mut rx = store.subscribe();

        store.claim_transaction("sync-tx:aa");
        store.upsert_transaction("sync-tx:aa", TxStatus::Verified, HashMap::new());
        store.upsert_deposit("ETH", DepositUpdate::initiated("0x01", "1"));
        store.set_withdrawal_link("sync-tx:aa", "0xbeef");

        assert_eq!(rx.recv().await.unwrap().name(), "transaction_status");
        assert_eq!(rx.recv().await.unwrap().name(), "transaction_evicted");
        assert_eq!(
            rx.recv().await.unwrap(),
            WatchEvent::DepositsChanged {
                token: "ETH".to_string(),
                hash: "0x01".to_string(),
                status: DepositStatus::Initiated,
                revision: 1,
            }
        );
        assert_eq!(rx.recv().await.unwrap().name(), "withdrawal_linked");
    }

    #[test]
    fn test_interleaved_writers_do_not_corrupt() {
        let store = Arc::new(InMemoryStatusStore::new());
        let handles: Vec<_> = (0..8)
            .map(|t| {
                let store = store.clone();
                std::thread::spawn(move || {
                    for i in 0..100 {
                        let hash = format!("0x{:02x}{:03}", t, i);
                        store.upsert_deposit("ETH", DepositUpdate::initiated(hash.clone(), "1"));
                        store.upsert_transaction(&hash, TxStatus::Committed, HashMap::new());
                        if i % 2 == 0 {
                            store.upsert_deposit("ETH", DepositUpdate::committed(hash.clone()));
                            store.upsert_transaction(&hash, TxStatus::Verified, HashMap::new());
                        }
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(store.deposits("ETH").len(), 400);
        assert_eq!(store.transactions().len(), 400);
        assert_eq!(store.deposit_revision(), 1200);
    }

    #[test]
    fn test_release_claim_only_drops_pending() {
        let store = InMemoryStatusStore::new();
        assert!(!store.release_claim("sync-tx:r1"));

        assert!(store.claim_transaction("sync-tx:r1"));
        assert!(store.release_claim("sync-tx:r1"));
        assert!(store.transaction("sync-tx:r1").is_none());
        assert!(store.claim_transaction("sync-tx:r1"));

        store.upsert_transaction("sync-tx:r1", TxStatus::Committed, HashMap::new());
        assert!(!store.release_claim("sync-tx:r1"));
        assert_eq!(
            store.transaction("sync-tx:r1").unwrap().status,
            TxStatus::Committed
        );
    }
}
