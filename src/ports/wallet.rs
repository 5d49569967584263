//! Wallet port
//!
//! The core never touches key material; it only asks the wallet to sign.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::execution::{SignedTransaction, UnsignedTransaction};
use crate::domain::{Side, TradeError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WalletError {
    #[error("Keypair error: {0}")]
    Keypair(String),

    #[error("Signing failed: {0}")]
    Signing(String),

    #[error("RPC error: {0}")]
    Rpc(String),

    #[error("Invalid asset id: {0}")]
    InvalidAsset(String),
}

impl From<WalletError> for TradeError {
    fn from(err: WalletError) -> Self {
        match err {
            WalletError::Rpc(_) => TradeError::TransientNetworkError(err.to_string()),
            WalletError::Keypair(_) | WalletError::Signing(_) | WalletError::InvalidAsset(_) => {
                TradeError::WalletFailure(err.to_string())
            }
        }
    }
}

/// A fill produced without touching the chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedFill {
    pub side: Side,
    pub asset_id: String,
    pub base_amount: f64,
    pub asset_amount: f64,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Wallet: Send + Sync {
    /// Public address
    fn address(&self) -> String;

    async fn sign_transaction(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, WalletError>;

    /// Base currency balance, UI units
    async fn get_balance(&self) -> Result<f64, WalletError>;

    /// Balance of one asset, UI units
    async fn asset_balance(&self, asset_id: &str) -> Result<f64, WalletError>;

    /// Demo fills move paper balances; real wallets ignore them
    fn record_simulated_fill(&self, _fill: &SimulatedFill) {}
}
