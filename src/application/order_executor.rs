//! Order Executor
//!
//! Turns an [`OrderRequest`] into a terminal [`OrderResult`]:
//! quote, validate, build, sign, submit, confirm. Transient failures are
//! retried with a fresh quote each time; validation failures and unconfirmed
//! transactions end the request immediately.

use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::Instant;

use super::safety_monitor::SafetyMonitor;
use super::unix_now;
use crate::domain::{
    BackoffPolicy, ErrorSource, ExponentialBackoff, OrderConstraints, OrderRequest, OrderResult,
    OrderStatus, Quote, QuoteCheck, QuoteError, QuoteValidator, Side, TradeError,
};
use crate::ports::{
    ConfirmationStatus, ExecutedAmounts, Notifier, Persistence, QuoteExecuteService, QuoteRequest,
    RouterError, SimulatedFill, TradeEvent, TradeLogEntry, Wallet,
};

/// Wrapped SOL mint, the default base asset
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";

#[derive(Debug, Clone, PartialEq)]
pub struct ExecutorConfig {
    /// Asset every order is priced in
    pub base_asset: String,
    pub max_retries: u32,
    pub quote_timeout: Duration,
    /// Applies to building and submitting the transaction
    pub submit_timeout: Duration,
    /// Per confirmation poll
    pub confirm_poll_timeout: Duration,
    pub confirm_poll_interval: Duration,
    /// Overall confirmation deadline
    pub confirmation_timeout: Duration,
    /// Base currency kept back for fees on every buy
    pub fee_reserve: f64,
    /// Validate quotes but never submit
    pub demo: bool,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            base_asset: SOL_MINT.to_string(),
            max_retries: 3,
            quote_timeout: Duration::from_secs(10),
            submit_timeout: Duration::from_secs(15),
            confirm_poll_timeout: Duration::from_secs(5),
            confirm_poll_interval: Duration::from_secs(1),
            confirmation_timeout: Duration::from_secs(30),
            fee_reserve: 0.01,
            demo: true,
        }
    }
}

/// What a successful attempt produced
struct Fill {
    quote: Quote,
    executed: Option<ExecutedAmounts>,
    tx_ref: String,
    demo: bool,
}

enum AttemptError {
    Failed { error: TradeError, source: ErrorSource },
    /// Submitted but not confirmed before the deadline
    Unconfirmed { tx_ref: String },
}

impl AttemptError {
    fn failed(error: TradeError, source: ErrorSource) -> Self {
        AttemptError::Failed { error, source }
    }
}

async fn call_with_timeout<T, F>(
    limit: Duration,
    fut: F,
    source: ErrorSource,
    op: &str,
) -> Result<T, AttemptError>
where
    F: Future<Output = Result<T, RouterError>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(e)) => Err(AttemptError::failed(e.into(), source)),
        Err(_) => Err(AttemptError::failed(
            TradeError::TransientNetworkError(format!("{} timed out after {:?}", op, limit)),
            source,
        )),
    }
}

pub struct OrderExecutor {
    config: ExecutorConfig,
    router: Arc<dyn QuoteExecuteService>,
    fallback: Option<Arc<dyn QuoteExecuteService>>,
    wallet: Arc<dyn Wallet>,
    safety: Arc<SafetyMonitor>,
    persistence: Arc<dyn Persistence>,
    notifier: Arc<dyn Notifier>,
    backoff: Arc<dyn BackoffPolicy>,
    shutdown: watch::Receiver<bool>,
    demo_counter: AtomicU64,
}

impl OrderExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ExecutorConfig,
        router: Arc<dyn QuoteExecuteService>,
        wallet: Arc<dyn Wallet>,
        safety: Arc<SafetyMonitor>,
        persistence: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            config,
            router,
            fallback: None,
            wallet,
            safety,
            persistence,
            notifier,
            backoff: Arc::new(ExponentialBackoff::default()),
            shutdown,
            demo_counter: AtomicU64::new(0),
        }
    }

    /// Router used for retries
    pub fn with_fallback(mut self, fallback: Arc<dyn QuoteExecuteService>) -> Self {
        self.fallback = Some(fallback);
        self
    }

    pub fn with_backoff(mut self, backoff: Arc<dyn BackoffPolicy>) -> Self {
        self.backoff = backoff;
        self
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn is_demo(&self) -> bool {
        self.config.demo
    }

    /// Spend `base_amount` of the base asset on `asset_id`
    pub async fn buy(&self, asset_id: &str, base_amount: f64, constraints: OrderConstraints) -> OrderResult {
        self.execute(&OrderRequest::buy(asset_id, base_amount, constraints), "entry", None)
            .await
    }

    /// Sell `asset_amount` units of `asset_id` for the base asset
    pub async fn sell(&self, asset_id: &str, asset_amount: f64, constraints: OrderConstraints) -> OrderResult {
        self.execute(&OrderRequest::sell(asset_id, asset_amount, constraints), "exit", None)
            .await
    }

    /// Run a request to completion. The result is always logged, journaled
    /// and reported, whatever the outcome.
    pub async fn execute(&self, request: &OrderRequest, context: &str, confidence: Option<f64>) -> OrderResult {
        let started = Instant::now();
        let result = self.run(request, started).await;
        self.finish(result, context, confidence).await
    }

    /// Quote and check an order without executing it
    pub async fn preview(
        &self,
        request: &OrderRequest,
    ) -> Result<(Quote, Result<QuoteCheck, QuoteError>), TradeError> {
        let quote_request = self.quote_request(request);
        let quote = match tokio::time::timeout(self.config.quote_timeout, self.router.quote(&quote_request)).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(TradeError::TransientNetworkError(
                    "quote timed out".to_string(),
                ))
            }
        };
        let check = QuoteValidator::from(&request.constraints).validate_quote(&quote);
        Ok((quote, check))
    }

    async fn run(&self, request: &OrderRequest, started: Instant) -> OrderResult {
        if request.side == Side::Buy {
            if let Err(error) = self.check_balance(request).await {
                return self.failed(request, error, 0, started);
            }
        }

        let mut attempt: u32 = 0;
        loop {
            if attempt > 0 && !self.wait_before_retry(attempt).await {
                return self.failed(
                    request,
                    TradeError::Abandoned("shutdown requested before retry".to_string()),
                    attempt - 1,
                    started,
                );
            }

            let router = self.router_for(attempt);
            match self.attempt(router.as_ref(), request).await {
                Ok(fill) => return self.filled(request, fill, attempt, started),
                Err(AttemptError::Unconfirmed { tx_ref }) => {
                    return self.unconfirmed(request, tx_ref, attempt, started)
                }
                Err(AttemptError::Failed { error, source }) => {
                    if error.is_terminal() {
                        return self.failed(request, error, attempt, started);
                    }
                    self.safety
                        .record_error(source, &error.to_string(), unix_now())
                        .await;
                    if attempt >= self.config.max_retries {
                        return self.failed(request, error, attempt, started);
                    }
                    tracing::warn!(
                        "{} {} attempt {} via {} failed: {} - retrying",
                        request.side,
                        request.asset_id,
                        attempt + 1,
                        router.name(),
                        error
                    );
                    attempt += 1;
                }
            }
        }
    }

    /// Sleep out the backoff. Returns false if shutdown was requested.
    async fn wait_before_retry(&self, attempt: u32) -> bool {
        if *self.shutdown.borrow() {
            return false;
        }
        let delay = self.backoff.delay(attempt);
        let mut shutdown = self.shutdown.clone();
        tokio::select! {
            _ = tokio::time::sleep(delay) => true,
            Ok(_) = shutdown.wait_for(|stop| *stop) => false,
        }
    }

    fn router_for(&self, attempt: u32) -> Arc<dyn QuoteExecuteService> {
        match (&self.fallback, attempt) {
            (Some(fallback), n) if n > 0 => fallback.clone(),
            _ => self.router.clone(),
        }
    }

    async fn check_balance(&self, request: &OrderRequest) -> Result<(), TradeError> {
        let balance = match tokio::time::timeout(self.config.quote_timeout, self.wallet.get_balance()).await {
            Ok(Ok(balance)) => balance,
            Ok(Err(e)) => {
                self.safety
                    .record_error(ErrorSource::Wallet, &e.to_string(), unix_now())
                    .await;
                return Err(e.into());
            }
            Err(_) => {
                let msg = "balance lookup timed out".to_string();
                self.safety
                    .record_error(ErrorSource::Wallet, &msg, unix_now())
                    .await;
                return Err(TradeError::TransientNetworkError(msg));
            }
        };

        let need = request.amount + self.config.fee_reserve;
        if balance < need {
            return Err(TradeError::InsufficientBalance { have: balance, need });
        }
        Ok(())
    }

    fn quote_request(&self, request: &OrderRequest) -> QuoteRequest {
        let (input_asset, output_asset) = match request.side {
            Side::Buy => (self.config.base_asset.clone(), request.asset_id.clone()),
            Side::Sell => (request.asset_id.clone(), self.config.base_asset.clone()),
        };
        QuoteRequest {
            input_asset,
            output_asset,
            amount: request.amount,
            slippage_bps: request.constraints.max_slippage_bps,
        }
    }

    async fn attempt(
        &self,
        router: &dyn QuoteExecuteService,
        request: &OrderRequest,
    ) -> Result<Fill, AttemptError> {
        // Always a fresh quote; a stale one is never resubmitted
        let quote = call_with_timeout(
            self.config.quote_timeout,
            router.quote(&self.quote_request(request)),
            ErrorSource::Quote,
            "quote",
        )
        .await?;

        let check = QuoteValidator::from(&request.constraints)
            .validate_quote(&quote)
            .map_err(|e| AttemptError::failed(e.into(), ErrorSource::Quote))?;
        for warning in &check.warnings {
            tracing::warn!(asset = %request.asset_id, "{}", warning);
        }

        if self.config.demo {
            return Ok(self.simulate(request, quote));
        }

        let owner = self.wallet.address();
        let unsigned = call_with_timeout(
            self.config.submit_timeout,
            router.prepare(&quote, &owner),
            ErrorSource::Submit,
            "prepare",
        )
        .await?;

        let signed = self
            .wallet
            .sign_transaction(unsigned)
            .await
            .map_err(|e| AttemptError::failed(e.into(), ErrorSource::Wallet))?;
        let signature = signed.signature.clone();

        let tx_ref = match tokio::time::timeout(self.config.submit_timeout, router.submit(&quote, &signed)).await {
            Ok(Ok(tx_ref)) => tx_ref,
            Ok(Err(e)) => return Err(AttemptError::failed(e.into(), ErrorSource::Submit)),
            // The transaction may have been broadcast; treat as unconfirmed
            Err(_) => {
                tracing::warn!("Submit of {} timed out, outcome unknown", signature);
                return Err(AttemptError::Unconfirmed { tx_ref: signature });
            }
        };

        tracing::info!(
            "Submitted {} {} via {}: {}",
            request.side,
            request.asset_id,
            router.name(),
            tx_ref
        );

        let executed = self.await_confirmation(router, &tx_ref).await?;
        Ok(Fill {
            quote,
            executed,
            tx_ref,
            demo: false,
        })
    }

    async fn await_confirmation(
        &self,
        router: &dyn QuoteExecuteService,
        tx_ref: &str,
    ) -> Result<Option<ExecutedAmounts>, AttemptError> {
        let deadline = Instant::now() + self.config.confirmation_timeout;
        loop {
            match tokio::time::timeout(self.config.confirm_poll_timeout, router.confirm(tx_ref)).await {
                Ok(Ok(ConfirmationStatus::Confirmed { executed })) => return Ok(executed),
                Ok(Ok(ConfirmationStatus::Failed(reason))) => {
                    return Err(AttemptError::failed(
                        TradeError::ConfirmationFailed(reason),
                        ErrorSource::Confirm,
                    ))
                }
                Ok(Ok(ConfirmationStatus::Pending)) => {}
                Ok(Err(e)) => tracing::debug!("Confirmation poll for {} failed: {}", tx_ref, e),
                Err(_) => tracing::debug!("Confirmation poll for {} timed out", tx_ref),
            }

            let now = Instant::now();
            if now >= deadline {
                return Err(AttemptError::Unconfirmed {
                    tx_ref: tx_ref.to_string(),
                });
            }
            tokio::time::sleep(self.config.confirm_poll_interval.min(deadline - now)).await;
        }
    }

    fn simulate(&self, request: &OrderRequest, quote: Quote) -> Fill {
        let n = self.demo_counter.fetch_add(1, Ordering::Relaxed);
        let (base_amount, asset_amount) = side_amounts(request.side, quote.in_amount, quote.out_amount);
        self.wallet.record_simulated_fill(&SimulatedFill {
            side: request.side,
            asset_id: request.asset_id.clone(),
            base_amount,
            asset_amount,
        });
        Fill {
            quote,
            executed: None,
            tx_ref: format!("demo-{}-{}", unix_now(), n),
            demo: true,
        }
    }

    fn result(&self, request: &OrderRequest, status: OrderStatus, retries: u32, started: Instant) -> OrderResult {
        OrderResult {
            side: request.side,
            asset_id: request.asset_id.clone(),
            status,
            requested_amount: request.amount,
            executed_price: None,
            executed_amount: None,
            base_amount: None,
            tx_ref: None,
            retries,
            latency_ms: started.elapsed().as_millis() as u64,
            error: None,
            demo: self.config.demo,
            timestamp: unix_now(),
        }
    }

    fn filled(&self, request: &OrderRequest, fill: Fill, retries: u32, started: Instant) -> OrderResult {
        // Prefer what the chain reports over what was quoted
        let (base, asset, price) = match fill.executed {
            Some(executed) => {
                let (base, asset) = side_amounts(request.side, executed.in_amount, executed.out_amount);
                (base, asset, (asset > 0.0).then(|| base / asset))
            }
            None => {
                let (base, asset) = side_amounts(request.side, fill.quote.in_amount, fill.quote.out_amount);
                (base, asset, fill.quote.price_for(request.side))
            }
        };

        let mut result = self.result(request, OrderStatus::Confirmed, retries, started);
        result.executed_price = price;
        result.executed_amount = Some(asset);
        result.base_amount = Some(base);
        result.tx_ref = Some(fill.tx_ref);
        result.demo = fill.demo;
        result
    }

    fn unconfirmed(&self, request: &OrderRequest, tx_ref: String, retries: u32, started: Instant) -> OrderResult {
        let mut result = self.result(request, OrderStatus::TimedOut, retries, started);
        result.error = Some(TradeError::ConfirmationTimeout {
            tx_ref: tx_ref.clone(),
        });
        result.tx_ref = Some(tx_ref);
        result
    }

    fn failed(&self, request: &OrderRequest, error: TradeError, retries: u32, started: Instant) -> OrderResult {
        let mut result = self.result(request, OrderStatus::Failed, retries, started);
        result.error = Some(error);
        result
    }

    async fn finish(&self, result: OrderResult, context: &str, confidence: Option<f64>) -> OrderResult {
        match result.status {
            OrderStatus::Confirmed => tracing::info!("{}", result.summary()),
            OrderStatus::TimedOut => tracing::error!("{}", result.summary()),
            OrderStatus::Failed => tracing::warn!(
                error = result.error.as_ref().map_or("unknown", TradeError::label),
                "{}",
                result.summary()
            ),
        }

        let entry = TradeLogEntry {
            result: result.clone(),
            context: context.to_string(),
            confidence,
        };
        if let Err(e) = self.persistence.append_trade_log(&entry) {
            tracing::error!("Failed to append trade log: {}", e);
        }

        self.notifier.notify(TradeEvent::Order {
            result: result.clone(),
            context: context.to_string(),
        });
        self.safety.observe_order(&result, unix_now()).await;
        result
    }
}

/// (base, asset) for a side given router input/output amounts
fn side_amounts(side: Side, in_amount: f64, out_amount: f64) -> (f64, f64) {
    match side {
        Side::Buy => (in_amount, out_amount),
        Side::Sell => (out_amount, in_amount),
    }
}
