//! Quote / execute port
//!
//! The swap router is opaque: it quotes, builds an unsigned transaction for a
//! quote, accepts the signed transaction and reports its on-chain status.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{Quote, TradeError};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum RouterError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Rate limited")]
    RateLimited,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("No route: {0}")]
    NoRoute(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Submission rejected: {0}")]
    Rejected(String),
}

impl RouterError {
    /// Worth another attempt with a fresh quote
    pub fn is_transient(&self) -> bool {
        match self {
            RouterError::Http(_)
            | RouterError::Timeout(_)
            | RouterError::RateLimited
            | RouterError::Parse(_)
            | RouterError::Rejected(_) => true,
            RouterError::Api { status, .. } => *status == 429 || *status >= 500,
            RouterError::NoRoute(_) | RouterError::InvalidRequest(_) => false,
        }
    }
}

impl From<RouterError> for TradeError {
    fn from(err: RouterError) -> Self {
        if err.is_transient() {
            TradeError::TransientNetworkError(err.to_string())
        } else {
            TradeError::ValidationError(err.to_string())
        }
    }
}

/// Quote request in UI units
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub input_asset: String,
    pub output_asset: String,
    pub amount: f64,
    pub slippage_bps: u16,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnsignedTransaction {
    /// Wire-encoded transaction
    pub bytes: Vec<u8>,
    pub last_valid_block_height: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedTransaction {
    pub bytes: Vec<u8>,
    /// First signature, used as the transaction reference
    pub signature: String,
}

/// Amounts actually moved by a confirmed transaction, UI units
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExecutedAmounts {
    pub in_amount: f64,
    pub out_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ConfirmationStatus {
    Pending,
    Confirmed { executed: Option<ExecutedAmounts> },
    Failed(String),
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait QuoteExecuteService: Send + Sync {
    fn name(&self) -> &str;

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, RouterError>;

    /// Build the swap transaction for a quote, paid by `owner`
    async fn prepare(&self, quote: &Quote, owner: &str) -> Result<UnsignedTransaction, RouterError>;

    /// Returns the transaction reference
    async fn submit(&self, quote: &Quote, tx: &SignedTransaction) -> Result<String, RouterError>;

    async fn confirm(&self, tx_ref: &str) -> Result<ConfirmationStatus, RouterError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_router_error_classification() {
        assert!(RouterError::RateLimited.is_transient());
        assert!(RouterError::Api { status: 503, message: "down".into() }.is_transient());
        assert!(!RouterError::Api { status: 400, message: "bad".into() }.is_transient());
        assert!(!RouterError::NoRoute("MintA".into()).is_transient());
    }

    #[test]
    fn test_maps_into_trade_error() {
        let err: TradeError = RouterError::Http("reset".into()).into();
        assert!(err.is_retryable());
        let err: TradeError = RouterError::NoRoute("MintA".into()).into();
        assert!(matches!(err, TradeError::ValidationError(_)));
    }
}
