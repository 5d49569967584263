//! Jupiter Quote Types
//!
//! Wire structures for the `/quote` endpoint. Amounts are raw token units.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JupiterQuoteRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Raw units (lamports for SOL)
    pub amount: u64,
    pub slippage_bps: u16,
    #[serde(default)]
    pub only_direct_routes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteResponse {
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    /// Minimum output after slippage
    pub other_amount_threshold: String,
    pub swap_mode: String,
    pub slippage_bps: u16,
    /// Fraction as a string ("0.012" = 1.2%)
    #[serde(default)]
    pub price_impact_pct: String,
    pub route_plan: Vec<RoutePlanStep>,
    #[serde(default)]
    pub context_slot: Option<u64>,
    /// Unknown fields are kept so the quote round-trips into /swap intact
    #[serde(flatten)]
    pub extra: std::collections::HashMap<String, serde_json::Value>,
}

impl QuoteResponse {
    pub fn input_amount(&self) -> Option<u64> {
        self.in_amount.parse().ok()
    }

    pub fn output_amount(&self) -> Option<u64> {
        self.out_amount.parse().ok()
    }

    /// Price impact in percent (1.2 = 1.2%)
    pub fn price_impact_percent(&self) -> f64 {
        self.price_impact_pct.parse::<f64>().unwrap_or(0.0) * 100.0
    }

    /// "Raydium > Orca"
    pub fn route_label(&self) -> String {
        self.route_plan
            .iter()
            .map(|step| step.swap_info.label.as_str())
            .collect::<Vec<_>>()
            .join(" > ")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoutePlanStep {
    pub swap_info: SwapInfo,
    pub percent: u8,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapInfo {
    pub amm_key: String,
    /// DEX name, e.g. "Raydium"
    pub label: String,
    pub input_mint: String,
    pub output_mint: String,
    pub in_amount: String,
    pub out_amount: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_amount: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fee_mint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    const QUOTE_JSON: &str = r#"{
        "inputMint": "So11111111111111111111111111111111111111112",
        "outputMint": "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v",
        "inAmount": "1000000000",
        "outAmount": "150000000",
        "otherAmountThreshold": "149250000",
        "swapMode": "ExactIn",
        "slippageBps": 50,
        "priceImpactPct": "0.0012",
        "routePlan": [
            {"swapInfo": {"ammKey": "p1", "label": "Raydium", "inputMint": "a", "outputMint": "b",
                          "inAmount": "1", "outAmount": "2"}, "percent": 100},
            {"swapInfo": {"ammKey": "p2", "label": "Orca", "inputMint": "b", "outputMint": "c",
                          "inAmount": "2", "outAmount": "3"}, "percent": 100}
        ],
        "contextSlot": 1234,
        "timeTaken": 0.01
    }"#;

    #[test]
    fn test_quote_response_parsing() {
        let quote: QuoteResponse = serde_json::from_str(QUOTE_JSON).unwrap();
        assert_eq!(quote.input_amount(), Some(1_000_000_000));
        assert_eq!(quote.output_amount(), Some(150_000_000));
        assert!((quote.price_impact_percent() - 0.12).abs() < 1e-9);
        assert_eq!(quote.route_label(), "Raydium > Orca");
    }

    #[test]
    fn test_unknown_fields_survive_reserialization() {
        let quote: QuoteResponse = serde_json::from_str(QUOTE_JSON).unwrap();
        let value = serde_json::to_value(&quote).unwrap();
        assert_eq!(value["timeTaken"], 0.01);
        assert_eq!(value["otherAmountThreshold"], "149250000");
    }
}
