//! Jupiter router
//!
//! [`QuoteExecuteService`] over the Jupiter API and a Solana RPC node.
//! Jupiter works in raw token units; the rest of the system works in UI
//! units, so mint decimals are looked up once and cached.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::client::JupiterClient;
use super::quote::{JupiterQuoteRequest, QuoteResponse};
use super::swap::{SwapRequest, SwapResponse};
use crate::adapters::solana::{SignatureState, SolanaClient, SolanaClientError};
use crate::application::SOL_MINT;
use crate::domain::Quote;
use crate::ports::{
    ConfirmationStatus, QuoteExecuteService, QuoteRequest, RouterError, SignedTransaction,
    UnsignedTransaction,
};

impl From<SolanaClientError> for RouterError {
    fn from(err: SolanaClientError) -> Self {
        match err {
            SolanaClientError::RpcError(msg) => RouterError::Http(msg),
            SolanaClientError::TransactionError(msg) => RouterError::Rejected(msg),
            other => RouterError::InvalidRequest(other.to_string()),
        }
    }
}

pub struct JupiterRouter {
    client: JupiterClient,
    rpc: Arc<SolanaClient>,
    decimals: RwLock<HashMap<String, u8>>,
}

impl JupiterRouter {
    pub fn new(client: JupiterClient, rpc: Arc<SolanaClient>) -> Self {
        let mut decimals = HashMap::new();
        decimals.insert(SOL_MINT.to_string(), 9);
        Self {
            client,
            rpc,
            decimals: RwLock::new(decimals),
        }
    }

    async fn decimals(&self, mint: &str) -> Result<u8, RouterError> {
        if let Some(d) = self.decimals.read().await.get(mint) {
            return Ok(*d);
        }
        let d = self.rpc.mint_decimals(mint).await?;
        self.decimals.write().await.insert(mint.to_string(), d);
        Ok(d)
    }
}

/// UI amount to raw units
pub fn to_raw(amount: f64, decimals: u8) -> Result<u64, RouterError> {
    let raw = (amount * 10f64.powi(decimals as i32)).floor();
    if !raw.is_finite() || raw < 1.0 || raw > u64::MAX as f64 {
        return Err(RouterError::InvalidRequest(format!(
            "amount {} not representable with {} decimals",
            amount, decimals
        )));
    }
    Ok(raw as u64)
}

pub fn to_ui(raw: u64, decimals: u8) -> f64 {
    raw as f64 / 10f64.powi(decimals as i32)
}

/// Domain quote from a Jupiter response
pub fn quote_from_response(
    response: &QuoteResponse,
    input_decimals: u8,
    output_decimals: u8,
) -> Result<Quote, RouterError> {
    let in_raw = response
        .input_amount()
        .ok_or_else(|| RouterError::Parse(format!("bad inAmount {}", response.in_amount)))?;
    let out_raw = response
        .output_amount()
        .ok_or_else(|| RouterError::Parse(format!("bad outAmount {}", response.out_amount)))?;
    let route = serde_json::to_value(response).map_err(|e| RouterError::Parse(e.to_string()))?;

    Ok(Quote {
        input_asset: response.input_mint.clone(),
        output_asset: response.output_mint.clone(),
        in_amount: to_ui(in_raw, input_decimals),
        out_amount: to_ui(out_raw, output_decimals),
        price_impact_pct: response.price_impact_percent(),
        slippage_bps: response.slippage_bps,
        route_label: Some(response.route_label()),
        route,
    })
}

#[async_trait]
impl QuoteExecuteService for JupiterRouter {
    fn name(&self) -> &str {
        "jupiter"
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, RouterError> {
        let input_decimals = self.decimals(&request.input_asset).await?;
        let output_decimals = self.decimals(&request.output_asset).await?;
        let wire = JupiterQuoteRequest {
            input_mint: request.input_asset.clone(),
            output_mint: request.output_asset.clone(),
            amount: to_raw(request.amount, input_decimals)?,
            slippage_bps: request.slippage_bps,
            only_direct_routes: false,
        };
        let response = self.client.get_quote(&wire).await?;
        quote_from_response(&response, input_decimals, output_decimals)
    }

    async fn prepare(&self, quote: &Quote, owner: &str) -> Result<UnsignedTransaction, RouterError> {
        if quote.route.is_null() {
            return Err(RouterError::InvalidRequest("quote carries no Jupiter route".into()));
        }
        let request = SwapRequest::new(owner.to_string(), quote.route.clone())
            .with_priority_fee(self.client.config().priority_fee_lamports);
        let response: SwapResponse = self.client.get_swap_transaction(&request).await?;
        let bytes = response
            .transaction_bytes()
            .map_err(|e| RouterError::Parse(format!("swap transaction: {}", e)))?;
        Ok(UnsignedTransaction {
            bytes,
            last_valid_block_height: Some(response.last_valid_block_height),
        })
    }

    async fn submit(&self, _quote: &Quote, tx: &SignedTransaction) -> Result<String, RouterError> {
        let versioned = bincode::deserialize(&tx.bytes)
            .map_err(|e| RouterError::InvalidRequest(format!("signed transaction: {}", e)))?;
        Ok(self.rpc.send_transaction(versioned).await?)
    }

    async fn confirm(&self, tx_ref: &str) -> Result<ConfirmationStatus, RouterError> {
        Ok(match self.rpc.signature_state(tx_ref).await? {
            SignatureState::Unknown => ConfirmationStatus::Pending,
            SignatureState::Succeeded => ConfirmationStatus::Confirmed { executed: None },
            SignatureState::Failed(e) => ConfirmationStatus::Failed(e.to_string()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_ui_conversion() {
        assert_eq!(to_raw(0.1, 9).unwrap(), 100_000_000);
        assert_eq!(to_raw(1.5, 6).unwrap(), 1_500_000);
        assert!((to_ui(150_000_000, 6) - 150.0).abs() < 1e-9);
        assert!(to_raw(0.0, 9).is_err());
        assert!(to_raw(f64::NAN, 9).is_err());
    }

    #[test]
    fn test_quote_conversion() {
        let response: QuoteResponse = serde_json::from_value(serde_json::json!({
            "inputMint": SOL_MINT,
            "outputMint": "MintA",
            "inAmount": "100000000",
            "outAmount": "2500000",
            "otherAmountThreshold": "2487500",
            "swapMode": "ExactIn",
            "slippageBps": 50,
            "priceImpactPct": "0.031",
            "routePlan": []
        }))
        .unwrap();

        let quote = quote_from_response(&response, 9, 6).unwrap();
        assert!((quote.in_amount - 0.1).abs() < 1e-12);
        assert!((quote.out_amount - 2.5).abs() < 1e-12);
        assert!((quote.price_impact_pct - 3.1).abs() < 1e-9);
        assert_eq!(quote.route["otherAmountThreshold"], "2487500");
    }
}
