//! DexScreener market data source
//!
//! Candidate discovery from the DexScreener pair search and per-token price
//! lookups. Only Solana pairs quoted in SOL are used, so `priceNative` is
//! already base currency per asset unit.

use std::collections::HashSet;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;

use crate::application::SOL_MINT;
use crate::domain::{CandidateRecord, PriceObservation};
use crate::ports::{MarketDataError, MarketDataSource};

const SOLANA_CHAIN: &str = "solana";

#[derive(Debug, Clone, PartialEq)]
pub struct DexScreenerConfig {
    pub api_base_url: String,
    /// Search queries run each scan; results are merged by mint
    pub queries: Vec<String>,
    pub max_candidates: usize,
    pub timeout: Duration,
}

impl Default for DexScreenerConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.dexscreener.com/latest/dex".to_string(),
            queries: vec!["SOL".to_string()],
            max_candidates: 30,
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Debug, Deserialize)]
struct PairsResponse {
    #[serde(default)]
    pairs: Option<Vec<serde_json::Value>>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Pair {
    chain_id: Option<String>,
    base_token: Option<PairToken>,
    quote_token: Option<PairToken>,
    price_native: Option<String>,
    liquidity: Option<Liquidity>,
    volume: Option<Window>,
    price_change: Option<Window>,
}

#[derive(Debug, Default, Deserialize)]
struct PairToken {
    address: Option<String>,
    name: Option<String>,
    symbol: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Liquidity {
    usd: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct Window {
    h24: Option<f64>,
}

impl Pair {
    fn is_sol_quoted(&self) -> bool {
        self.chain_id.as_deref() == Some(SOLANA_CHAIN)
            && self
                .quote_token
                .as_ref()
                .and_then(|t| t.address.as_deref())
                == Some(SOL_MINT)
    }

    fn base_address(&self) -> Option<&str> {
        self.base_token.as_ref().and_then(|t| t.address.as_deref())
    }

    fn liquidity_usd(&self) -> f64 {
        self.liquidity.as_ref().and_then(|l| l.usd).unwrap_or(0.0)
    }

    fn into_record(self) -> CandidateRecord {
        let base = self.base_token.unwrap_or_default();
        CandidateRecord {
            id: base.address,
            symbol: base.symbol,
            name: base.name,
            liquidity_usd: self.liquidity.and_then(|l| l.usd),
            volume_24h_usd: self.volume.and_then(|v| v.h24),
            holders: None,
            price_change_24h_pct: self.price_change.and_then(|p| p.h24),
        }
    }
}

/// Candidate records from a pairs payload. Pairs that do not even have the
/// expected shape still yield an empty record so the caller can count them.
pub fn parse_candidates(payload: serde_json::Value, limit: usize) -> Result<Vec<CandidateRecord>, MarketDataError> {
    let response: PairsResponse =
        serde_json::from_value(payload).map_err(|e| MarketDataError::Parse(e.to_string()))?;
    let mut seen = HashSet::new();
    let mut records = Vec::new();

    for raw in response.pairs.unwrap_or_default() {
        if records.len() >= limit {
            break;
        }
        let pair: Pair = match serde_json::from_value(raw) {
            Ok(pair) => pair,
            Err(e) => {
                tracing::debug!("Unparseable DexScreener pair: {}", e);
                records.push(CandidateRecord::default());
                continue;
            }
        };
        if !pair.is_sol_quoted() {
            continue;
        }
        if let Some(address) = pair.base_address() {
            if !seen.insert(address.to_string()) {
                continue;
            }
        }
        records.push(pair.into_record());
    }
    Ok(records)
}

/// SOL price of `mint` from the deepest SOL-quoted pair
pub fn parse_price(payload: serde_json::Value, mint: &str) -> Result<f64, MarketDataError> {
    let response: PairsResponse =
        serde_json::from_value(payload).map_err(|e| MarketDataError::Parse(e.to_string()))?;

    response
        .pairs
        .unwrap_or_default()
        .into_iter()
        .filter_map(|raw| serde_json::from_value::<Pair>(raw).ok())
        .filter(|pair| pair.is_sol_quoted() && pair.base_address() == Some(mint))
        .filter_map(|pair| {
            let price = pair.price_native.as_deref()?.parse::<f64>().ok()?;
            (price.is_finite() && price > 0.0).then_some((pair.liquidity_usd(), price))
        })
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, price)| price)
        .ok_or_else(|| MarketDataError::NoPrice(mint.to_string()))
}

pub struct DexScreenerSource {
    config: DexScreenerConfig,
    http: Client,
}

impl DexScreenerSource {
    pub fn new(config: DexScreenerConfig) -> Result<Self, MarketDataError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MarketDataError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    async fn get<T: DeserializeOwned>(&self, url: &str, query: &[(&str, &str)]) -> Result<T, MarketDataError> {
        let response = self
            .http
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| MarketDataError::Http(e.to_string()))?;

        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            return Err(MarketDataError::RateLimited(url.to_string()));
        }
        if !status.is_success() {
            return Err(MarketDataError::Http(format!("{} returned {}", url, status)));
        }
        response
            .json()
            .await
            .map_err(|e| MarketDataError::Parse(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl MarketDataSource for DexScreenerSource {
    async fn list_candidates(&self) -> Result<Vec<CandidateRecord>, MarketDataError> {
        let url = format!("{}/search", self.config.api_base_url);
        let mut records: Vec<CandidateRecord> = Vec::new();
        let mut last_error = None;

        for query in &self.config.queries {
            let remaining = self.config.max_candidates.saturating_sub(records.len());
            if remaining == 0 {
                break;
            }
            match self.get::<serde_json::Value>(&url, &[("q", query.as_str())]).await {
                Ok(payload) => {
                    for record in parse_candidates(payload, remaining)? {
                        let duplicate = record.id.is_some()
                            && records.iter().any(|r| r.id == record.id);
                        if !duplicate {
                            records.push(record);
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!("DexScreener search '{}' failed: {}", query, e);
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if records.is_empty() => Err(e),
            _ => {
                tracing::debug!("DexScreener returned {} candidate records", records.len());
                Ok(records)
            }
        }
    }

    async fn price(&self, asset_id: &str) -> Result<PriceObservation, MarketDataError> {
        let url = format!("{}/tokens/{}", self.config.api_base_url, asset_id);
        let payload: serde_json::Value = self.get(&url, &[]).await?;
        Ok(PriceObservation::at(parse_price(payload, asset_id)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pair(mint: &str, quote: &str, liquidity: f64, price_native: &str) -> serde_json::Value {
        json!({
            "chainId": "solana",
            "pairAddress": "Pair1",
            "baseToken": { "address": mint, "name": "Wind", "symbol": "WND" },
            "quoteToken": { "address": quote, "name": "Wrapped SOL", "symbol": "SOL" },
            "priceNative": price_native,
            "priceUsd": "0.0012",
            "liquidity": { "usd": liquidity, "base": 1000, "quote": 10 },
            "volume": { "h24": 42000.5, "h6": 1000 },
            "priceChange": { "h24": -3.2 },
            "pairCreatedAt": 1_700_000_000_123u64
        })
    }

    #[test]
    fn test_parse_candidates_maps_pair_fields() {
        let records = parse_candidates(json!({ "pairs": [pair("MintA", SOL_MINT, 55000.0, "0.00001")] }), 10).unwrap();

        assert_eq!(records.len(), 1);
        let r = &records[0];
        assert_eq!(r.id.as_deref(), Some("MintA"));
        assert_eq!(r.symbol.as_deref(), Some("WND"));
        assert_eq!(r.liquidity_usd, Some(55000.0));
        assert_eq!(r.volume_24h_usd, Some(42000.5));
        assert_eq!(r.price_change_24h_pct, Some(-3.2));
        assert_eq!(r.holders, None);
    }

    #[test]
    fn test_parse_candidates_filters_and_dedupes() {
        let mut other_chain = pair("MintB", SOL_MINT, 1.0, "1");
        other_chain["chainId"] = json!("ethereum");
        let payload = json!({ "pairs": [
            pair("MintA", SOL_MINT, 1.0, "1"),
            pair("MintA", SOL_MINT, 2.0, "1"),
            pair("MintC", "USDCMint", 1.0, "1"),
            other_chain,
            pair("MintD", SOL_MINT, 1.0, "1"),
        ]});

        let ids: Vec<_> = parse_candidates(payload, 10)
            .unwrap()
            .into_iter()
            .filter_map(|r| r.id)
            .collect();
        assert_eq!(ids, vec!["MintA", "MintD"]);
    }

    #[test]
    fn test_malformed_pair_is_passed_on_as_empty_record() {
        let mut bad = pair("MintA", SOL_MINT, 1.0, "1");
        bad["liquidity"] = json!({ "usd": "lots" });
        let records = parse_candidates(json!({ "pairs": [bad] }), 10).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].id.is_none());
    }

    #[test]
    fn test_parse_candidates_respects_limit_and_null_pairs() {
        let payload = json!({ "pairs": [
            pair("MintA", SOL_MINT, 1.0, "1"),
            pair("MintB", SOL_MINT, 1.0, "1"),
        ]});
        assert_eq!(parse_candidates(payload, 1).unwrap().len(), 1);
        assert!(parse_candidates(json!({ "pairs": null }), 10).unwrap().is_empty());
    }

    #[test]
    fn test_parse_price_uses_deepest_sol_pair() {
        let payload = json!({ "pairs": [
            pair("MintA", SOL_MINT, 1000.0, "0.00002"),
            pair("MintA", SOL_MINT, 90000.0, "0.00001"),
            pair("MintA", "USDCMint", 500000.0, "0.0015"),
        ]});
        assert_eq!(parse_price(payload, "MintA").unwrap(), 0.00001);
    }

    #[test]
    fn test_parse_price_without_pairs() {
        let err = parse_price(json!({ "pairs": [] }), "MintA").unwrap_err();
        assert_eq!(err, MarketDataError::NoPrice("MintA".into()));

        let zero = json!({ "pairs": [pair("MintA", SOL_MINT, 1.0, "0")] });
        assert!(parse_price(zero, "MintA").is_err());
    }
}
