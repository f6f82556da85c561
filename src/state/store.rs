//! Status store contract and record types

use crate::events::WatchEvent;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tokio::sync::broadcast;

/// Confirmation stage of a watched zk transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TxStatus {
    /// Watch claimed, commit not yet observed
    Pending,
    Committed,
    /// Terminal; never retained in the store
    Verified,
}

impl fmt::Display for TxStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TxStatus::Pending => "Pending",
            TxStatus::Committed => "Committed",
            TxStatus::Verified => "Verified",
        };
        f.write_str(s)
    }
}

/// Lifecycle stage of an L1 deposit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DepositStatus {
    Initiated,
    /// Terminal; the record leaves its token list
    Committed,
}

impl fmt::Display for DepositStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DepositStatus::Initiated => f.write_str("Initiated"),
            DepositStatus::Committed => f.write_str("Committed"),
        }
    }
}

/// A zk transaction being watched through commit and verify
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WatchedTransaction {
    pub hash: String,
    pub status: TxStatus,
    /// Free-form auxiliary properties
    pub props: HashMap<String, String>,
    pub updated_at: DateTime<Utc>,
}

/// An in-flight deposit shown in a token's pending list
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    pub hash: String,
    /// Decimal string in the token's smallest unit
    pub amount: String,
    pub status: DepositStatus,
    pub confirmations: u32,
}

/// A single deposit-list mutation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DepositUpdate {
    pub hash: String,
    pub amount: Option<String>,
    pub status: DepositStatus,
    pub confirmations: Option<u32>,
}

impl DepositUpdate {
    /// First sighting of a deposit
    pub fn initiated(hash: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            amount: Some(amount.into()),
            status: DepositStatus::Initiated,
            confirmations: Some(1),
        }
    }

    /// Deposit settled; removes the record
    pub fn committed(hash: impl Into<String>) -> Self {
        Self {
            hash: hash.into(),
            amount: None,
            status: DepositStatus::Committed,
            confirmations: None,
        }
    }

    pub(crate) fn into_record(self) -> DepositRecord {
        DepositRecord {
            hash: self.hash,
            amount: self.amount.unwrap_or_default(),
            status: self.status,
            confirmations: self.confirmations.unwrap_or(0),
        }
    }
}

/// Shared keyed state mutated by the watch machines and read by observers.
///
/// Every method is one atomic logical update; callers never read a key and
/// then write it back in two steps.
pub trait StatusStore: Send + Sync {
    /// Get a watched transaction
    fn transaction(&self, hash: &str) -> Option<WatchedTransaction>;

    /// Snapshot of every watched transaction
    fn transactions(&self) -> Vec<WatchedTransaction>;

    /// Insert `hash` as `Pending` unless it is already present.
    ///
    /// Returns `false` when the hash was already tracked.
    fn claim_transaction(&self, hash: &str) -> bool;

    /// Set the status of a transaction, merging `props` into its properties.
    ///
    /// Writing `Verified` removes the entry instead.
    fn upsert_transaction(&self, hash: &str, status: TxStatus, props: HashMap<String, String>);

    /// Drop `hash` only while it is still `Pending`.
    ///
    /// Returns whether a claim was released.
    fn release_claim(&self, hash: &str) -> bool;

    /// Drop a transaction regardless of its status
    fn remove_transaction(&self, hash: &str) -> Option<WatchedTransaction>;

    /// Apply a deposit-list mutation and return the new revision
    fn upsert_deposit(&self, token: &str, update: DepositUpdate) -> u64;

    /// Append a deposit unless one with the same hash is already listed.
    ///
    /// Returns the new revision, or `None` when the deposit was present.
    fn claim_deposit(&self, token: &str, update: DepositUpdate) -> Option<u64>;

    /// Pending deposits for a token, in insertion order
    fn deposits(&self, token: &str) -> Vec<DepositRecord>;

    /// Pending deposits for every token
    fn all_deposits(&self) -> HashMap<String, Vec<DepositRecord>>;

    /// Revision counter bumped on every deposit-list mutation
    fn deposit_revision(&self) -> u64;

    /// Record the L1 transaction of a withdrawal; first write wins
    fn set_withdrawal_link(&self, tx_hash: &str, eth_tx_hash: &str) -> bool;

    /// L1 transaction of a withdrawal, if known
    fn withdrawal_link(&self, tx_hash: &str) -> Option<String>;

    /// Subscribe to store change events
    fn subscribe(&self) -> broadcast::Receiver<WatchEvent>;
}
