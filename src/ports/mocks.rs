//! Scripted in-memory port implementations for tests and dry runs.
//!
//! Each fake records its calls and replays queued responses, falling back to
//! a default behaviour once the script runs out.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use super::execution::{
    ConfirmationStatus, ExecutedAmounts, QuoteExecuteService, QuoteRequest, RouterError,
    SignedTransaction, UnsignedTransaction,
};
use super::market_data::{MarketDataError, MarketDataSource};
use super::notifier::{Notifier, TradeEvent};
use super::persistence::{Persistence, PersistenceError, TradeLogEntry};
use super::wallet::{SimulatedFill, Wallet, WalletError};
use crate::domain::{BlacklistEntry, CandidateRecord, Position, PriceObservation, Quote};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Router quoting at a fixed asset price (base per asset unit)
#[derive(Debug)]
pub struct ScriptedRouter {
    name: String,
    base_asset: String,
    price: Mutex<f64>,
    price_impact_pct: Mutex<f64>,
    slippage_bps: u16,
    quote_script: Mutex<VecDeque<Result<Quote, RouterError>>>,
    submit_script: Mutex<VecDeque<Result<String, RouterError>>>,
    confirm_script: Mutex<VecDeque<Result<ConfirmationStatus, RouterError>>>,
    default_confirm: Mutex<ConfirmationStatus>,
    quote_calls: AtomicUsize,
    submit_calls: AtomicUsize,
    confirm_calls: AtomicUsize,
    tx_counter: AtomicU64,
}

impl ScriptedRouter {
    pub fn new(base_asset: &str, price: f64) -> Self {
        Self {
            name: "scripted".to_string(),
            base_asset: base_asset.to_string(),
            price: Mutex::new(price),
            price_impact_pct: Mutex::new(0.5),
            slippage_bps: 50,
            quote_script: Mutex::new(VecDeque::new()),
            submit_script: Mutex::new(VecDeque::new()),
            confirm_script: Mutex::new(VecDeque::new()),
            default_confirm: Mutex::new(ConfirmationStatus::Confirmed { executed: None }),
            quote_calls: AtomicUsize::new(0),
            submit_calls: AtomicUsize::new(0),
            confirm_calls: AtomicUsize::new(0),
            tx_counter: AtomicU64::new(0),
        }
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.to_string();
        self
    }

    pub fn with_price_impact(self, pct: f64) -> Self {
        *lock(&self.price_impact_pct) = pct;
        self
    }

    pub fn set_price(&self, price: f64) {
        *lock(&self.price) = price;
    }

    pub fn push_quote(&self, quote: Result<Quote, RouterError>) {
        lock(&self.quote_script).push_back(quote);
    }

    pub fn push_submit(&self, result: Result<String, RouterError>) {
        lock(&self.submit_script).push_back(result);
    }

    pub fn push_confirm(&self, status: Result<ConfirmationStatus, RouterError>) {
        lock(&self.confirm_script).push_back(status);
    }

    /// Status returned once the confirm script is empty
    pub fn set_default_confirm(&self, status: ConfirmationStatus) {
        *lock(&self.default_confirm) = status;
    }

    pub fn quote_calls(&self) -> usize {
        self.quote_calls.load(Ordering::SeqCst)
    }

    pub fn submit_calls(&self) -> usize {
        self.submit_calls.load(Ordering::SeqCst)
    }

    pub fn confirm_calls(&self) -> usize {
        self.confirm_calls.load(Ordering::SeqCst)
    }

    /// Quote the router would give right now for a request
    pub fn quote_for(&self, request: &QuoteRequest) -> Quote {
        let price = *lock(&self.price);
        let out_amount = if request.input_asset == self.base_asset {
            request.amount / price
        } else {
            request.amount * price
        };
        Quote {
            input_asset: request.input_asset.clone(),
            output_asset: request.output_asset.clone(),
            in_amount: request.amount,
            out_amount,
            price_impact_pct: *lock(&self.price_impact_pct),
            slippage_bps: self.slippage_bps.min(request.slippage_bps),
            route_label: Some(self.name.clone()),
            route: serde_json::Value::Null,
        }
    }
}

#[async_trait]
impl QuoteExecuteService for ScriptedRouter {
    fn name(&self) -> &str {
        &self.name
    }

    async fn quote(&self, request: &QuoteRequest) -> Result<Quote, RouterError> {
        self.quote_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = lock(&self.quote_script).pop_front() {
            return scripted;
        }
        Ok(self.quote_for(request))
    }

    async fn prepare(&self, _quote: &Quote, _owner: &str) -> Result<UnsignedTransaction, RouterError> {
        Ok(UnsignedTransaction {
            bytes: vec![0u8; 8],
            last_valid_block_height: None,
        })
    }

    async fn submit(&self, _quote: &Quote, tx: &SignedTransaction) -> Result<String, RouterError> {
        self.submit_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = lock(&self.submit_script).pop_front() {
            return scripted;
        }
        let n = self.tx_counter.fetch_add(1, Ordering::SeqCst);
        Ok(format!("{}-{}", tx.signature, n))
    }

    async fn confirm(&self, _tx_ref: &str) -> Result<ConfirmationStatus, RouterError> {
        self.confirm_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(scripted) = lock(&self.confirm_script).pop_front() {
            return scripted;
        }
        Ok(lock(&self.default_confirm).clone())
    }
}

/// Helper for a confirmation that reports executed amounts
pub fn confirmed_with(in_amount: f64, out_amount: f64) -> ConfirmationStatus {
    ConfirmationStatus::Confirmed {
        executed: Some(ExecutedAmounts {
            in_amount,
            out_amount,
        }),
    }
}

/// Market data with settable candidates and per-asset price sequences
#[derive(Debug)]
pub struct ScriptedMarket {
    candidates: Mutex<Result<Vec<CandidateRecord>, MarketDataError>>,
    prices: Mutex<HashMap<String, VecDeque<PriceObservation>>>,
    list_calls: AtomicUsize,
    price_calls: AtomicUsize,
}

impl Default for ScriptedMarket {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedMarket {
    pub fn new() -> Self {
        Self {
            candidates: Mutex::new(Ok(Vec::new())),
            prices: Mutex::new(HashMap::new()),
            list_calls: AtomicUsize::new(0),
            price_calls: AtomicUsize::new(0),
        }
    }

    pub fn set_candidates(&self, records: Vec<CandidateRecord>) {
        *lock(&self.candidates) = Ok(records);
    }

    pub fn fail_candidates(&self, err: MarketDataError) {
        *lock(&self.candidates) = Err(err);
    }

    /// Queue prices for an asset; the last one repeats forever
    pub fn push_prices(&self, asset_id: &str, prices: impl IntoIterator<Item = PriceObservation>) {
        lock(&self.prices)
            .entry(asset_id.to_string())
            .or_default()
            .extend(prices);
    }

    pub fn set_price(&self, asset_id: &str, price: f64) {
        let mut prices = lock(&self.prices);
        let queue = prices.entry(asset_id.to_string()).or_default();
        queue.clear();
        queue.push_back(PriceObservation::at(price));
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn price_calls(&self) -> usize {
        self.price_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MarketDataSource for ScriptedMarket {
    async fn list_candidates(&self) -> Result<Vec<CandidateRecord>, MarketDataError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        lock(&self.candidates).clone()
    }

    async fn price(&self, asset_id: &str) -> Result<PriceObservation, MarketDataError> {
        self.price_calls.fetch_add(1, Ordering::SeqCst);
        let mut prices = lock(&self.prices);
        let queue = prices
            .get_mut(asset_id)
            .ok_or_else(|| MarketDataError::NoPrice(asset_id.to_string()))?;
        if queue.len() > 1 {
            queue
                .pop_front()
                .ok_or_else(|| MarketDataError::NoPrice(asset_id.to_string()))
        } else {
            queue
                .front()
                .copied()
                .ok_or_else(|| MarketDataError::NoPrice(asset_id.to_string()))
        }
    }
}

/// Wallet with settable balances and a dummy signer
#[derive(Debug)]
pub struct StaticWallet {
    address: String,
    balance: Mutex<f64>,
    assets: Mutex<HashMap<String, f64>>,
    signed: AtomicUsize,
}

impl StaticWallet {
    pub fn new(balance: f64) -> Self {
        Self {
            address: "TestWa11et1111111111111111111111111111111111".to_string(),
            balance: Mutex::new(balance),
            assets: Mutex::new(HashMap::new()),
            signed: AtomicUsize::new(0),
        }
    }

    pub fn set_balance(&self, balance: f64) {
        *lock(&self.balance) = balance;
    }

    pub fn set_asset_balance(&self, asset_id: &str, amount: f64) {
        lock(&self.assets).insert(asset_id.to_string(), amount);
    }

    pub fn signed_count(&self) -> usize {
        self.signed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Wallet for StaticWallet {
    fn address(&self) -> String {
        self.address.clone()
    }

    async fn sign_transaction(&self, tx: UnsignedTransaction) -> Result<SignedTransaction, WalletError> {
        let n = self.signed.fetch_add(1, Ordering::SeqCst);
        Ok(SignedTransaction {
            bytes: tx.bytes,
            signature: format!("sig{}", n),
        })
    }

    async fn get_balance(&self) -> Result<f64, WalletError> {
        Ok(*lock(&self.balance))
    }

    async fn asset_balance(&self, asset_id: &str) -> Result<f64, WalletError> {
        Ok(lock(&self.assets).get(asset_id).copied().unwrap_or(0.0))
    }

    fn record_simulated_fill(&self, _fill: &SimulatedFill) {}
}

/// Collects every event
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<TradeEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TradeEvent> {
        lock(&self.events).clone()
    }

    pub fn messages(&self) -> Vec<String> {
        lock(&self.events).iter().map(|e| e.to_string()).collect()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, event: TradeEvent) {
        lock(&self.events).push(event);
    }
}

/// Persistence kept in memory
#[derive(Debug, Default)]
pub struct MemoryPersistence {
    trades: Mutex<Vec<TradeLogEntry>>,
    blacklist: Mutex<Vec<BlacklistEntry>>,
    positions: Mutex<Vec<Position>>,
}

impl MemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trades(&self) -> Vec<TradeLogEntry> {
        lock(&self.trades).clone()
    }

    pub fn positions(&self) -> Vec<Position> {
        lock(&self.positions).clone()
    }

    pub fn blacklist(&self) -> Vec<BlacklistEntry> {
        lock(&self.blacklist).clone()
    }
}

impl Persistence for MemoryPersistence {
    fn append_trade_log(&self, entry: &TradeLogEntry) -> Result<(), PersistenceError> {
        lock(&self.trades).push(entry.clone());
        Ok(())
    }

    fn recent_trades(&self, limit: usize) -> Result<Vec<TradeLogEntry>, PersistenceError> {
        let trades = lock(&self.trades);
        let start = trades.len().saturating_sub(limit);
        Ok(trades[start..].to_vec())
    }

    fn load_blacklist(&self) -> Result<Vec<BlacklistEntry>, PersistenceError> {
        Ok(lock(&self.blacklist).clone())
    }

    fn save_blacklist(&self, entries: &[BlacklistEntry]) -> Result<(), PersistenceError> {
        *lock(&self.blacklist) = entries.to_vec();
        Ok(())
    }

    fn load_positions(&self) -> Result<Vec<Position>, PersistenceError> {
        Ok(lock(&self.positions).clone())
    }

    fn save_positions(&self, positions: &[Position]) -> Result<(), PersistenceError> {
        *lock(&self.positions) = positions.to_vec();
        Ok(())
    }
}
