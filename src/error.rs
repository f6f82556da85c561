//! Error types for the transaction watcher

use ethers::providers::RpcError;
use thiserror::Error;

/// Main error type for the watcher
#[derive(Error, Debug)]
pub enum WatcherError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Chain connection error on {layer}: {message}")]
    ChainConnection { layer: String, message: String },

    #[error("Transaction {tx_hash} failed: {reason}")]
    TransactionFailed { tx_hash: String, reason: String },

    #[error("Deposit {eth_tx_hash} reverted on L1")]
    DepositReverted { eth_tx_hash: String },

    #[error("Invalid transaction hash: {0}")]
    InvalidHash(String),

    #[error("Fee quote error: {0}")]
    FeeQuote(String),

    #[error("Wallet error: {0}")]
    Wallet(String),

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: String },

    #[error("Rate limited on {layer}")]
    RateLimited { layer: String },

    #[error("RPC request rejected ({code}): {message}")]
    RpcRejected { code: i64, message: String },

    #[error("Malformed RPC response: {0}")]
    MalformedResponse(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl WatcherError {
    /// Check if a poller should keep going after this error
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WatcherError::ChainConnection { .. }
                | WatcherError::Timeout { .. }
                | WatcherError::RateLimited { .. }
        )
    }
}

impl From<ethers::providers::ProviderError> for WatcherError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        let message = e.to_string();
        if message.contains("429") || message.to_lowercase().contains("rate limit") {
            return WatcherError::RateLimited {
                layer: "rpc".to_string(),
            };
        }

        // Error responses and undecodable payloads are permanent
        if let Some(response) = e.as_error_response() {
            return WatcherError::RpcRejected {
                code: response.code,
                message: response.message.clone(),
            };
        }
        if e.is_serde_error() {
            return WatcherError::MalformedResponse(message);
        }

        WatcherError::ChainConnection {
            layer: "rpc".to_string(),
            message,
        }
    }
}

/// Result type for watcher operations
pub type WatcherResult<T> = Result<T, WatcherError>;
