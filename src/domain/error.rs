//! Trade Error Taxonomy
//!
//! Every failure an order can end with. The executor retries only the
//! variants for which [`TradeError::is_retryable`] holds.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail")]
pub enum TradeError {
    /// Quote failed the order's constraints. Never retried.
    #[error("Quote rejected: {0}")]
    ValidationError(String),

    #[error("Network error: {0}")]
    TransientNetworkError(String),

    /// Transaction may still land; balance must be reconciled first
    #[error("Confirmation timed out for {tx_ref} - UNCONFIRMED, verify manually")]
    ConfirmationTimeout { tx_ref: String },

    #[error("Transaction failed on chain: {0}")]
    ConfirmationFailed(String),

    #[error("Insufficient balance: have {have:.6}, need {need:.6}")]
    InsufficientBalance { have: f64, need: f64 },

    /// Key material or signing problem; never retried
    #[error("Wallet error: {0}")]
    WalletFailure(String),

    #[error("Kill switch active: {0}")]
    KillSwitchActive(String),

    #[error("Order abandoned: {0}")]
    Abandoned(String),
}

impl TradeError {
    /// Network hiccups and on-chain failures get another attempt with a fresh quote
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            TradeError::TransientNetworkError(_) | TradeError::ConfirmationFailed(_)
        )
    }

    /// Errors that end the request immediately, whatever the attempt count
    pub fn is_terminal(&self) -> bool {
        !self.is_retryable()
    }

    /// Short machine-friendly label used in logs and the trade journal
    pub fn label(&self) -> &'static str {
        match self {
            TradeError::ValidationError(_) => "validation",
            TradeError::TransientNetworkError(_) => "network",
            TradeError::ConfirmationTimeout { .. } => "confirmation_timeout",
            TradeError::ConfirmationFailed(_) => "confirmation_failed",
            TradeError::InsufficientBalance { .. } => "insufficient_balance",
            TradeError::WalletFailure(_) => "wallet",
            TradeError::KillSwitchActive(_) => "kill_switch",
            TradeError::Abandoned(_) => "abandoned",
        }
    }
}
