//! zkSync JSON-RPC notifier
//!
//! The zkSync v1 API reports a transaction's progress through `tx_info`:
//! the block it landed in and whether that block is committed and verified.
//! Milestones are awaited by polling it.

use super::{ChainNotifier, Milestone};
use crate::config::ZkSyncConfig;
use crate::error::{WatcherError, WatcherResult};
use crate::tx::{ChangePubKeyFee, Fee, FeeProvider};

use async_trait::async_trait;
use ethers::providers::{Http, Provider};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

/// Response of the `tx_info` method
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxInfo {
    pub executed: bool,
    pub success: Option<bool>,
    pub fail_reason: Option<String>,
    pub block: Option<TxBlockInfo>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxBlockInfo {
    pub block_number: u64,
    pub committed: bool,
    pub verified: bool,
}

impl TxInfo {
    /// Whether the transaction reached `milestone`.
    ///
    /// An executed transaction that did not succeed fails every milestone.
    pub fn reached(&self, tx_hash: &str, milestone: Milestone) -> WatcherResult<bool> {
        if self.executed && self.success == Some(false) {
            return Err(WatcherError::TransactionFailed {
                tx_hash: tx_hash.to_string(),
                reason: self
                    .fail_reason
                    .clone()
                    .unwrap_or_else(|| "unknown".to_string()),
            });
        }

        Ok(match (&self.block, milestone) {
            (Some(block), Milestone::Commit) => block.committed,
            (Some(block), Milestone::Verify) => block.verified,
            (None, _) => false,
        })
    }
}

/// zkSync provider that polls `tx_info` until a milestone is reached
pub struct ZkSyncProvider {
    provider: Provider<Http>,
    poll_interval: Duration,
}

impl ZkSyncProvider {
    /// Create a new zkSync provider
    pub fn new(config: &ZkSyncConfig) -> WatcherResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str()).map_err(|e| {
            WatcherError::Config(format!("Invalid zkSync RPC URL {}: {}", config.rpc_url, e))
        })?;

        Ok(Self {
            provider,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Fetch the current status of a transaction
    pub async fn tx_info(&self, tx_hash: &str) -> WatcherResult<TxInfo> {
        let info: TxInfo = self.provider.request("tx_info", [tx_hash]).await?;
        Ok(info)
    }

    /// Check that the RPC endpoint answers
    pub async fn health_check(&self) -> bool {
        match self
            .provider
            .request::<_, serde_json::Value>("contract_address", ())
            .await
        {
            Ok(_) => true,
            Err(e) => {
                warn!("zkSync health check failed: {}", e);
                false
            }
        }
    }
}

#[async_trait]
impl ChainNotifier for ZkSyncProvider {
    async fn await_milestone(&self, tx_hash: &str, milestone: Milestone) -> WatcherResult<()> {
        loop {
            match self.tx_info(tx_hash).await {
                Ok(info) => {
                    if info.reached(tx_hash, milestone)? {
                        debug!("Transaction {} reached {}", tx_hash, milestone);
                        return Ok(());
                    }
                }
                Err(e) if e.is_retryable() => {
                    warn!("tx_info for {} failed, will retry: {}", tx_hash, e);
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}

#[async_trait]
impl FeeProvider for ZkSyncProvider {
    async fn transaction_fee(
        &self,
        tx_type: ChangePubKeyFee,
        address: &str,
        token: &str,
    ) -> WatcherResult<Fee> {
        let params = serde_json::json!([tx_type, address, token]);
        self.provider
            .request("get_tx_fee", params)
            .await
            .map_err(|e| WatcherError::FeeQuote(e.to_string()))
    }
}
