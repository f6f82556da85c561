//! L1 deposit handles backed by Ethereum receipt polling

use super::DepositHandle;
use crate::config::EthereumConfig;
use crate::error::{WatcherError, WatcherResult};

use async_trait::async_trait;
use ethers::providers::{Http, Middleware, Provider};
use ethers::types::{TransactionReceipt, H256, U64};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Ethereum provider that hands out deposit handles
pub struct EthereumProvider {
    provider: Arc<Provider<Http>>,
    confirmation_blocks: u64,
    poll_interval: Duration,
}

impl EthereumProvider {
    /// Create a new Ethereum provider
    pub fn new(config: &EthereumConfig) -> WatcherResult<Self> {
        let provider = Provider::<Http>::try_from(config.rpc_url.as_str()).map_err(|e| {
            WatcherError::Config(format!("Invalid Ethereum RPC URL {}: {}", config.rpc_url, e))
        })?;

        Ok(Self {
            provider: Arc::new(provider),
            confirmation_blocks: config.confirmation_blocks,
            poll_interval: Duration::from_millis(config.poll_interval_ms),
        })
    }

    /// Build a handle for an already-broadcast deposit transaction
    pub fn deposit_handle(&self, eth_tx_hash: &str) -> WatcherResult<EthDepositHandle> {
        let tx_hash: H256 = eth_tx_hash
            .parse()
            .map_err(|e| WatcherError::InvalidHash(format!("{}: {}", eth_tx_hash, e)))?;

        Ok(EthDepositHandle {
            provider: self.provider.clone(),
            tx_hash,
            confirmation_blocks: self.confirmation_blocks,
            poll_interval: self.poll_interval,
        })
    }

    /// Check that the RPC endpoint answers
    pub async fn health_check(&self) -> bool {
        match self.provider.get_block_number().await {
            Ok(_) => true,
            Err(e) => {
                warn!("Ethereum health check failed: {}", e);
                false
            }
        }
    }
}

/// A deposit transaction on L1
pub struct EthDepositHandle {
    provider: Arc<Provider<Http>>,
    tx_hash: H256,
    confirmation_blocks: u64,
    poll_interval: Duration,
}

/// Whether a receipt is final enough to call the deposit settled
pub fn receipt_settled(
    receipt: &TransactionReceipt,
    current_block: u64,
    confirmation_blocks: u64,
) -> WatcherResult<bool> {
    if receipt.status == Some(U64::zero()) {
        return Err(WatcherError::DepositReverted {
            eth_tx_hash: format!("{:?}", receipt.transaction_hash),
        });
    }

    let Some(block) = receipt.block_number else {
        return Ok(false);
    };
    let confirmations = current_block.saturating_sub(block.as_u64()) + 1;
    Ok(confirmations >= confirmation_blocks)
}

#[async_trait]
impl DepositHandle for EthDepositHandle {
    fn eth_tx_hash(&self) -> String {
        format!("{:?}", self.tx_hash)
    }

    async fn await_receipt(&self) -> WatcherResult<()> {
        loop {
            let polled: WatcherResult<bool> = async {
                match self.provider.get_transaction_receipt(self.tx_hash).await? {
                    Some(receipt) => {
                        let current_block = self.provider.get_block_number().await?.as_u64();
                        receipt_settled(&receipt, current_block, self.confirmation_blocks)
                    }
                    None => Ok(false),
                }
            }
            .await;

            match polled {
                Ok(true) => {
                    debug!("Deposit {:?} confirmed", self.tx_hash);
                    return Ok(());
                }
                Ok(false) => {}
                Err(e) if e.is_retryable() => {
                    warn!("Receipt poll for {:?} failed, will retry: {}", self.tx_hash, e);
                }
                Err(e) => return Err(e),
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }
}
