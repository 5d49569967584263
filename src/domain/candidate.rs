//! Candidate
//!
//! Strict snapshot of a tradable asset. Market data sources hand over loose
//! [`CandidateRecord`]s; only records that convert cleanly become a
//! [`Candidate`], everything else is quarantined at the boundary.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CandidateError {
    #[error("Missing asset identifier")]
    MissingId,

    #[error("Field {field} is not a finite number: {value}")]
    NotFinite { field: &'static str, value: f64 },

    #[error("Field {field} must be >= 0, got {value}")]
    Negative { field: &'static str, value: f64 },
}

/// Loosely-typed record as delivered by a market data source
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateRecord {
    pub id: Option<String>,
    pub symbol: Option<String>,
    pub name: Option<String>,
    pub liquidity_usd: Option<f64>,
    pub volume_24h_usd: Option<f64>,
    pub holders: Option<u64>,
    pub price_change_24h_pct: Option<f64>,
}

/// Validated asset snapshot, immutable once built
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Mint address
    pub id: String,
    pub symbol: String,
    pub name: String,
    /// Pool liquidity in USD
    pub liquidity: f64,
    /// 24h traded volume in USD
    pub volume_24h: f64,
    /// Unknown when the source does not report holders
    pub holder_count: Option<u64>,
    /// 24h price change in percent (12.5 = +12.5%)
    pub price_change_pct: f64,
    /// Unix seconds
    pub discovered_at: u64,
}

impl Candidate {
    /// Volume relative to pool depth
    pub fn volume_liquidity_ratio(&self) -> f64 {
        if self.liquidity <= 0.0 {
            return f64::INFINITY;
        }
        self.volume_24h / self.liquidity
    }

    /// Validate a raw record, stamping it with the discovery time
    pub fn from_record(record: CandidateRecord, discovered_at: u64) -> Result<Self, CandidateError> {
        let id = record
            .id
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or(CandidateError::MissingId)?;

        let liquidity = non_negative("liquidity_usd", record.liquidity_usd.unwrap_or(0.0))?;
        let volume_24h = non_negative("volume_24h_usd", record.volume_24h_usd.unwrap_or(0.0))?;

        let price_change_pct = record.price_change_24h_pct.unwrap_or(0.0);
        if !price_change_pct.is_finite() {
            return Err(CandidateError::NotFinite {
                field: "price_change_24h_pct",
                value: price_change_pct,
            });
        }

        let symbol = record.symbol.unwrap_or_default();
        let name = record.name.unwrap_or_else(|| symbol.clone());

        Ok(Self {
            id,
            symbol,
            name,
            liquidity,
            volume_24h,
            holder_count: record.holders,
            price_change_pct,
            discovered_at,
        })
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<f64, CandidateError> {
    if !value.is_finite() {
        return Err(CandidateError::NotFinite { field, value });
    }
    if value < 0.0 {
        return Err(CandidateError::Negative { field, value });
    }
    Ok(value)
}
