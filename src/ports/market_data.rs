//! Market data port
//!
//! Pull-based candidate discovery plus point price lookups for monitoring.

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::{CandidateRecord, PriceObservation};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MarketDataError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Rate limited: {0}")]
    RateLimited(String),

    #[error("Data parsing error: {0}")]
    Parse(String),

    #[error("No price for {0}")]
    NoPrice(String),
}

/// Source of candidate assets and prices.
///
/// Prices are base currency per asset unit.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Candidates for one scan cycle. Records are validated by the caller.
    async fn list_candidates(&self) -> Result<Vec<CandidateRecord>, MarketDataError>;

    /// Current price of one asset
    async fn price(&self, asset_id: &str) -> Result<PriceObservation, MarketDataError>;
}
