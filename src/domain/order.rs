//! Orders
//!
//! Requests handed to the order executor and the results it returns.

use serde::{Deserialize, Serialize};

use super::error::TradeError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Limits a quote must satisfy before it may be executed
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct OrderConstraints {
    /// Maximum acceptable slippage in basis points
    pub max_slippage_bps: u16,
    /// Maximum acceptable price impact in percent
    pub max_price_impact_pct: f64,
}

impl Default for OrderConstraints {
    fn default() -> Self {
        Self {
            max_slippage_bps: 50,
            max_price_impact_pct: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderRequest {
    pub side: Side,
    pub asset_id: String,
    /// Base currency for BUY, asset units for SELL
    pub amount: f64,
    pub constraints: OrderConstraints,
}

impl OrderRequest {
    pub fn buy(asset_id: &str, base_amount: f64, constraints: OrderConstraints) -> Self {
        Self {
            side: Side::Buy,
            asset_id: asset_id.to_string(),
            amount: base_amount,
            constraints,
        }
    }

    pub fn sell(asset_id: &str, asset_amount: f64, constraints: OrderConstraints) -> Self {
        Self {
            side: Side::Sell,
            asset_id: asset_id.to_string(),
            amount: asset_amount,
            constraints,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Confirmed,
    Failed,
    /// Submitted but not confirmed in time; may still land
    TimedOut,
}

/// Terminal outcome of one [`OrderRequest`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderResult {
    pub side: Side,
    pub asset_id: String,
    pub status: OrderStatus,
    pub requested_amount: f64,
    /// Base currency per asset unit
    pub executed_price: Option<f64>,
    /// Asset units bought or sold
    pub executed_amount: Option<f64>,
    /// Base currency spent (BUY) or received (SELL)
    pub base_amount: Option<f64>,
    pub tx_ref: Option<String>,
    /// Attempts beyond the first
    pub retries: u32,
    pub latency_ms: u64,
    pub error: Option<TradeError>,
    pub demo: bool,
    /// Unix seconds
    pub timestamp: u64,
}

impl OrderResult {
    pub fn is_confirmed(&self) -> bool {
        self.status == OrderStatus::Confirmed
    }

    pub fn is_timed_out(&self) -> bool {
        self.status == OrderStatus::TimedOut
    }

    /// Human-readable outcome for operators
    pub fn summary(&self) -> String {
        match self.status {
            OrderStatus::Confirmed => format!(
                "{} {} CONFIRMED: {:.6} @ {:.10} (tx {}, retries {}{})",
                self.side,
                self.asset_id,
                self.executed_amount.unwrap_or_default(),
                self.executed_price.unwrap_or_default(),
                self.tx_ref.as_deref().unwrap_or("-"),
                self.retries,
                if self.demo { ", demo" } else { "" },
            ),
            OrderStatus::Failed => format!(
                "{} {} FAILED after {} retries: {}",
                self.side,
                self.asset_id,
                self.retries,
                self.error
                    .as_ref()
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "unknown error".to_string()),
            ),
            OrderStatus::TimedOut => format!(
                "{} {} UNCONFIRMED - verify manually (tx {})",
                self.side,
                self.asset_id,
                self.tx_ref.as_deref().unwrap_or("-"),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(status: OrderStatus) -> OrderResult {
        OrderResult {
            side: Side::Buy,
            asset_id: "MintA".to_string(),
            status,
            requested_amount: 0.1,
            executed_price: Some(0.000_01),
            executed_amount: Some(10_000.0),
            base_amount: Some(0.1),
            tx_ref: Some("sig123".to_string()),
            retries: 0,
            latency_ms: 800,
            error: None,
            demo: false,
            timestamp: 0,
        }
    }

    #[test]
    fn test_builders() {
        let req = OrderRequest::buy("MintA", 0.1, OrderConstraints::default());
        assert_eq!(req.side, Side::Buy);
        assert_eq!(req.amount, 0.1);

        let req = OrderRequest::sell("MintA", 10_000.0, OrderConstraints::default());
        assert_eq!(req.side, Side::Sell);
    }

    #[test]
    fn test_summary_markers() {
        assert!(result(OrderStatus::Confirmed).summary().contains("CONFIRMED"));
        assert!(result(OrderStatus::TimedOut).summary().contains("verify manually"));

        let mut failed = result(OrderStatus::Failed);
        failed.error = Some(TradeError::ValidationError("impact 6%".into()));
        assert!(failed.summary().contains("impact 6%"));
    }

    #[test]
    fn test_status_serde() {
        let json = serde_json::to_string(&OrderStatus::TimedOut).unwrap();
        assert_eq!(json, "\"TIMED_OUT\"");
    }
}
