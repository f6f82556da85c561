//! Chain module - confirmation sources for watched transactions
//!
//! This module provides:
//! - The chain notifier contract used by the transaction watch machine
//! - The deposit handle contract used by the deposit watch machine
//! - zkSync `tx_info` polling and L1 receipt polling adapters

pub mod deposit;
pub mod provider;

pub use deposit::{EthDepositHandle, EthereumProvider};
pub use provider::{TxInfo, ZkSyncProvider};

use crate::error::{WatcherError, WatcherResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Confirmation milestones of the zk chain's finality process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Milestone {
    /// Included in a committed block
    Commit,
    /// Block proof verified on L1
    Verify,
}

impl Milestone {
    pub fn as_str(&self) -> &'static str {
        match self {
            Milestone::Commit => "COMMIT",
            Milestone::Verify => "VERIFY",
        }
    }
}

impl fmt::Display for Milestone {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Waits for a transaction to reach a confirmation milestone
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChainNotifier: Send + Sync {
    /// Resolve once `tx_hash` reached `milestone`, or fail
    async fn await_milestone(&self, tx_hash: &str, milestone: Milestone) -> WatcherResult<()>;
}

/// An L1 transaction whose receipt can be awaited
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DepositHandle: Send + Sync {
    /// Hash of the deposit transaction on the settlement layer
    fn eth_tx_hash(&self) -> String;

    /// Resolve once the deposit receipt is confirmed, or fail
    async fn await_receipt(&self) -> WatcherResult<()>;
}

/// Prefix of zkSync transaction hashes
pub const SYNC_TX_PREFIX: &str = "sync-tx:";

/// Prefix of L1 transaction hashes
pub const ETH_TX_PREFIX: &str = "0x";

/// Normalize a zkSync transaction hash to `sync-tx:` plus lowercase hex.
///
/// Accepts 32-byte hex with a `sync-tx:` or `0x` prefix, or none, so the same
/// body always maps to the same key.
pub fn normalize_tx_hash(hash: &str) -> WatcherResult<String> {
    Ok(format!("{}{}", SYNC_TX_PREFIX, hash_body(hash)?))
}

/// Normalize an L1 transaction hash to `0x` plus lowercase hex
pub fn normalize_eth_tx_hash(hash: &str) -> WatcherResult<String> {
    Ok(format!("{}{}", ETH_TX_PREFIX, hash_body(hash)?))
}

fn hash_body(hash: &str) -> WatcherResult<String> {
    let trimmed = hash.trim();
    let body = trimmed
        .strip_prefix(SYNC_TX_PREFIX)
        .or_else(|| trimmed.strip_prefix("0x"))
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);

    let bytes = hex::decode(body).map_err(|e| WatcherError::InvalidHash(format!("{}: {}", hash, e)))?;
    if bytes.len() != 32 {
        return Err(WatcherError::InvalidHash(format!(
            "{}: expected 32 bytes, got {}",
            hash,
            bytes.len()
        )));
    }

    Ok(hex::encode(bytes))
}
