//! Jupiter API Client
//!
//! HTTP client for the Jupiter swap API (`/quote` and `/swap`).

use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;

use super::quote::{JupiterQuoteRequest, QuoteResponse};
use super::swap::{SwapRequest, SwapResponse};
use crate::ports::RouterError;

#[derive(Debug, Clone, PartialEq)]
pub struct JupiterConfig {
    pub api_base_url: String,
    /// Optional API key for higher rate limits
    pub api_key: Option<String>,
    pub timeout: Duration,
    /// Extra attempts after a 429 before giving up
    pub rate_limit_retries: u32,
    /// Priority fee passed to /swap, lamports
    pub priority_fee_lamports: Option<u64>,
}

impl Default for JupiterConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.jup.ag/swap/v1".to_string(),
            api_key: None,
            timeout: Duration::from_secs(15),
            rate_limit_retries: 2,
            priority_fee_lamports: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct JupiterClient {
    config: JupiterConfig,
    http: Client,
}

impl JupiterClient {
    pub fn new(config: JupiterConfig) -> Result<Self, RouterError> {
        let http = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| RouterError::Http(format!("Failed to create HTTP client: {}", e)))?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &JupiterConfig {
        &self.config
    }

    pub async fn get_quote(&self, request: &JupiterQuoteRequest) -> Result<QuoteResponse, RouterError> {
        let url = format!("{}/quote", self.config.api_base_url);
        let mut req = self.http.get(&url).query(&[
            ("inputMint", request.input_mint.as_str()),
            ("outputMint", request.output_mint.as_str()),
            ("amount", &request.amount.to_string()),
            ("slippageBps", &request.slippage_bps.to_string()),
        ]);
        if request.only_direct_routes {
            req = req.query(&[("onlyDirectRoutes", "true")]);
        }
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = self.send_with_rate_limit(req).await?;
        handle_response(response).await
    }

    pub async fn get_swap_transaction(&self, request: &SwapRequest) -> Result<SwapResponse, RouterError> {
        let url = format!("{}/swap", self.config.api_base_url);
        let mut req = self.http.post(&url).json(request);
        if let Some(ref api_key) = self.config.api_key {
            req = req.header("x-api-key", api_key);
        }

        let response = self.send_with_rate_limit(req).await?;
        handle_response(response).await
    }

    /// Send, backing off on 429. Other failures are returned to the caller,
    /// which owns the retry policy.
    async fn send_with_rate_limit(&self, req: reqwest::RequestBuilder) -> Result<reqwest::Response, RouterError> {
        let mut attempt = 0;
        loop {
            let request = req
                .try_clone()
                .ok_or_else(|| RouterError::InvalidRequest("request body not clonable".into()))?;
            let response = request.send().await.map_err(map_reqwest_error)?;

            if response.status() != StatusCode::TOO_MANY_REQUESTS {
                return Ok(response);
            }
            if attempt >= self.config.rate_limit_retries {
                return Err(RouterError::RateLimited);
            }
            let backoff = Duration::from_secs(2u64.pow(attempt + 1));
            tracing::warn!(
                "Jupiter rate limited (429), backing off for {:?} (attempt {}/{})",
                backoff,
                attempt + 1,
                self.config.rate_limit_retries
            );
            tokio::time::sleep(backoff).await;
            attempt += 1;
        }
    }
}

fn map_reqwest_error(e: reqwest::Error) -> RouterError {
    if e.is_timeout() {
        RouterError::Timeout(e.to_string())
    } else {
        RouterError::Http(e.to_string())
    }
}

async fn handle_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, RouterError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(classify_error(status, body));
    }
    response
        .json()
        .await
        .map_err(|e| RouterError::Parse(format!("Failed to parse response: {}", e)))
}

fn classify_error(status: StatusCode, body: String) -> RouterError {
    if status == StatusCode::TOO_MANY_REQUESTS {
        return RouterError::RateLimited;
    }
    if body.contains("NO_ROUTES_FOUND")
        || body.contains("COULD_NOT_FIND_ANY_ROUTE")
        || body.contains("TOKEN_NOT_TRADABLE")
    {
        return RouterError::NoRoute(body);
    }
    RouterError::Api {
        status: status.as_u16(),
        message: body,
    }
}
