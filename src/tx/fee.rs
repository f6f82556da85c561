//! ChangePubKey fee quotes
//!
//! Accounts signing through an ERC-1271 contract must authorize their signing
//! key on L1 before the quote is meaningful, so the quote waits for that
//! authorization when it is missing.

use crate::chain::DepositHandle;
use crate::error::{WatcherError, WatcherResult};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info};

/// How the account's L1 signer proves ownership
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum VerificationMethod {
    #[serde(rename = "ECDSA")]
    Ecdsa,
    #[serde(rename = "ERC-1271")]
    Erc1271,
}

/// Authorization label sent with a ChangePubKey fee request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangePubKeyAuth {
    Onchain,
    #[serde(rename = "ECDSA")]
    Ecdsa,
    #[serde(rename = "ECDSALegacyMessage")]
    EcdsaLegacyMessage,
}

impl ChangePubKeyAuth {
    pub fn for_method(method: VerificationMethod) -> Self {
        match method {
            VerificationMethod::Erc1271 => Self::Onchain,
            VerificationMethod::Ecdsa => Self::EcdsaLegacyMessage,
        }
    }
}

/// Transaction type of a ChangePubKey fee request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ChangePubKeyFee {
    pub change_pub_key: ChangePubKeyAuth,
}

/// Fee quote as returned by the zk-layer provider, amounts in smallest units
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fee {
    pub fee_type: ChangePubKeyFee,
    pub gas_tx_amount: String,
    pub gas_price_wei: String,
    pub gas_fee: String,
    pub zkp_fee: String,
    pub total_fee: String,
}

/// Wallet account as seen by the fee quote
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeAccount: Send + Sync {
    fn verification_method(&self) -> VerificationMethod;

    async fn is_onchain_auth_signing_key_set(&self) -> WatcherResult<bool>;

    /// Submit the L1 authorization of the signing key
    async fn set_onchain_auth_signing_key(&self) -> WatcherResult<Arc<dyn DepositHandle>>;
}

/// zk-layer fee endpoint
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FeeProvider: Send + Sync {
    async fn transaction_fee(
        &self,
        tx_type: ChangePubKeyFee,
        address: &str,
        token: &str,
    ) -> WatcherResult<Fee>;
}

/// One-shot ChangePubKey fee quotes
pub struct FeeQuoteService {
    account: Arc<dyn FeeAccount>,
    provider: Arc<dyn FeeProvider>,
}

impl FeeQuoteService {
    pub fn new(account: Arc<dyn FeeAccount>, provider: Arc<dyn FeeProvider>) -> Self {
        Self { account, provider }
    }

    /// Quote the ChangePubKey fee for `address` paid in `token`
    pub async fn change_pub_key_fee(&self, address: &str, token: &str) -> WatcherResult<Fee> {
        let method = self.account.verification_method();

        if method == VerificationMethod::Erc1271
            && !self.account.is_onchain_auth_signing_key_set().await?
        {
            let auth_tx = self.account.set_onchain_auth_signing_key().await?;
            info!(
                "Waiting for onchain signing key authorization {} of {}",
                auth_tx.eth_tx_hash(),
                address
            );
            auth_tx.await_receipt().await.map_err(|e| {
                WatcherError::Wallet(format!("Signing key authorization failed: {}", e))
            })?;
        }

        let tx_type = ChangePubKeyFee {
            change_pub_key: ChangePubKeyAuth::for_method(method),
        };
        debug!(
            "Requesting {:?} fee for {} in {}",
            tx_type.change_pub_key, address, token
        );

        self.provider
            .transaction_fee(tx_type, address, token)
            .await
            .map_err(|e| match e {
                WatcherError::FeeQuote(_) => e,
                other => WatcherError::FeeQuote(other.to_string()),
            })
    }
}
