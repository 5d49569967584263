//! Safety Monitor
//!
//! Owns the API error window behind the kill switch, the wallet balance
//! floor and the asset blacklist. The kill switch only stops new buys;
//! exits keep running.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::domain::{
    Blacklist, BlacklistEntry, ErrorSource, ErrorWindow, OrderResult, OrderStatus, TradeError,
    TradingState, DEFAULT_BLACKLIST_SECS,
};
use crate::ports::{Notifier, Persistence, QuoteExecuteService, QuoteRequest, TradeEvent, Wallet};

/// USDC, the output of the router check at startup
pub const PREFLIGHT_QUOTE_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreflightCheck {
    WalletAddress,
    /// Balance lookup over RPC
    Network,
    BalanceFloor,
    Router,
}

impl std::fmt::Display for PreflightCheck {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            PreflightCheck::WalletAddress => "wallet address",
            PreflightCheck::Network => "network",
            PreflightCheck::BalanceFloor => "balance floor",
            PreflightCheck::Router => "router",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PreflightResult {
    pub check: PreflightCheck,
    pub passed: bool,
    pub detail: String,
}

/// Startup checks run before the trading loop
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PreflightReport {
    pub results: Vec<PreflightResult>,
}

impl PreflightReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &PreflightResult> {
        self.results.iter().filter(|r| !r.passed)
    }

    fn push(&mut self, check: PreflightCheck, passed: bool, detail: String) {
        if passed {
            tracing::info!("Preflight {}: ok ({})", check, detail);
        } else {
            tracing::error!("Preflight {}: FAILED ({})", check, detail);
        }
        self.results.push(PreflightResult { check, passed, detail });
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct SafetyConfig {
    pub max_api_errors: u32,
    pub error_window_secs: u64,
    /// 0 = manual reset only
    pub kill_switch_cooldown_secs: u64,
    /// Base currency
    pub min_wallet_balance: f64,
    pub blacklist_secs: u64,
}

impl Default for SafetyConfig {
    fn default() -> Self {
        Self {
            max_api_errors: 10,
            error_window_secs: 300,
            kill_switch_cooldown_secs: 0,
            min_wallet_balance: 0.01,
            blacklist_secs: DEFAULT_BLACKLIST_SECS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyReport {
    pub kill_switch: bool,
    pub kill_switch_reason: Option<String>,
    pub errors_in_window: usize,
    pub errors_by_source: BTreeMap<ErrorSource, usize>,
    pub cooldown_remaining_secs: Option<u64>,
    pub last_balance: Option<f64>,
    pub min_wallet_balance: f64,
    pub blacklist_size: usize,
}

pub struct SafetyMonitor {
    config: SafetyConfig,
    state: Arc<TradingState>,
    window: RwLock<ErrorWindow>,
    blacklist: RwLock<Blacklist>,
    last_balance: RwLock<Option<f64>>,
    notifier: Arc<dyn Notifier>,
    persistence: Arc<dyn Persistence>,
}

impl SafetyMonitor {
    pub fn new(
        config: SafetyConfig,
        state: Arc<TradingState>,
        notifier: Arc<dyn Notifier>,
        persistence: Arc<dyn Persistence>,
    ) -> Self {
        let window = ErrorWindow::with_config(
            config.max_api_errors,
            config.error_window_secs,
            config.kill_switch_cooldown_secs,
        );
        Self {
            config,
            state,
            window: RwLock::new(window),
            blacklist: RwLock::new(Blacklist::new()),
            last_balance: RwLock::new(None),
            notifier,
            persistence,
        }
    }

    pub fn config(&self) -> &SafetyConfig {
        &self.config
    }

    /// Restore the persisted blacklist, dropping expired entries
    pub async fn load_blacklist(&self, now: u64) -> usize {
        match self.persistence.load_blacklist() {
            Ok(entries) => {
                let restored = Blacklist::from_entries(entries, now);
                let count = restored.len();
                *self.blacklist.write().await = restored;
                tracing::info!("Loaded {} blacklist entries", count);
                count
            }
            Err(e) => {
                tracing::warn!("Failed to load blacklist: {}", e);
                0
            }
        }
    }

    /// Count one API error; trips the kill switch at the threshold
    pub async fn record_error(&self, source: ErrorSource, detail: &str, now: u64) {
        tracing::warn!(source = %source, "API error: {}", detail);
        let tripped = self.window.write().await.record(source, now);
        if let Some(reason) = tripped {
            self.state.set_kill_switch(true);
            self.notifier.notify(TradeEvent::KillSwitchTripped { reason });
        }
    }

    /// Look at a terminal order result.
    ///
    /// Transient failures were already counted per attempt by the executor,
    /// so only unconfirmed orders add to the window here.
    pub async fn observe_order(&self, result: &OrderResult, now: u64) {
        match result.status {
            OrderStatus::Confirmed => self.state.record_confirmed(),
            OrderStatus::TimedOut => {
                self.state.record_unconfirmed();
                let tx = result.tx_ref.as_deref().unwrap_or("-");
                self.record_error(ErrorSource::Confirm, &format!("unconfirmed tx {}", tx), now)
                    .await;
            }
            OrderStatus::Failed => {
                self.state.record_failed();
                if let Some(TradeError::InsufficientBalance { have, need }) = &result.error {
                    self.notifier.notify(TradeEvent::InsufficientBalance {
                        have: *have,
                        need: *need,
                    });
                }
            }
        }
    }

    pub fn kill_switch_active(&self) -> bool {
        self.state.kill_switch_active()
    }

    pub async fn kill_switch_reason(&self) -> Option<String> {
        self.window.read().await.trip_reason().map(str::to_string)
    }

    /// Operator reset of the kill switch and the error window
    pub async fn clear_kill_switch(&self) {
        self.window.write().await.reset();
        if self.state.kill_switch_active() {
            self.state.set_kill_switch(false);
            tracing::info!("Kill switch cleared");
            self.notifier.notify(TradeEvent::KillSwitchCleared);
        }
    }

    /// Periodic housekeeping: cooldown auto-reset and blacklist expiry
    pub async fn tick(&self, now: u64) {
        let reset = self.window.write().await.try_auto_reset(now);
        if reset && self.state.kill_switch_active() {
            self.state.set_kill_switch(false);
            self.notifier.notify(TradeEvent::KillSwitchCleared);
        }

        let purged = self.blacklist.write().await.purge_expired(now);
        if purged > 0 {
            tracing::debug!("Purged {} expired blacklist entries", purged);
            self.persist_blacklist().await;
        }
    }

    /// Record the balance and report whether it clears the floor
    pub async fn check_balance(&self, balance: f64) -> bool {
        *self.last_balance.write().await = Some(balance);
        if balance < self.config.min_wallet_balance {
            tracing::warn!(
                "Wallet balance {:.6} below floor {:.6}, skipping buys",
                balance,
                self.config.min_wallet_balance
            );
            self.notifier.notify(TradeEvent::BalanceBelowFloor {
                balance,
                floor: self.config.min_wallet_balance,
            });
            return false;
        }
        true
    }

    pub async fn is_blacklisted(&self, asset_id: &str, now: u64) -> bool {
        self.blacklist.read().await.contains(asset_id, now)
    }

    /// Copy of the blacklist for a scan cycle
    pub async fn blacklist_snapshot(&self) -> Blacklist {
        self.blacklist.read().await.clone()
    }

    pub async fn blacklist_entries(&self) -> Vec<BlacklistEntry> {
        self.blacklist.read().await.entries()
    }

    /// Blacklist an asset for the configured duration
    pub async fn blacklist_add(&self, asset_id: &str, reason: &str, now: u64) {
        self.blacklist_add_for(asset_id, reason, now, Some(self.config.blacklist_secs))
            .await;
    }

    /// `ttl_secs = None` blacklists permanently
    pub async fn blacklist_add_for(
        &self,
        asset_id: &str,
        reason: &str,
        now: u64,
        ttl_secs: Option<u64>,
    ) {
        self.blacklist
            .write()
            .await
            .add(asset_id, reason, now, ttl_secs);
        tracing::info!(asset = %asset_id, "Blacklisted: {}", reason);
        self.persist_blacklist().await;
    }

    pub async fn blacklist_remove(&self, asset_id: &str) -> bool {
        let removed = self.blacklist.write().await.remove(asset_id);
        if removed {
            tracing::info!(asset = %asset_id, "Removed from blacklist");
            self.persist_blacklist().await;
        }
        removed
    }

    pub async fn report(&self, now: u64) -> SafetyReport {
        let window = self.window.write().await.state(now);
        SafetyReport {
            kill_switch: self.state.kill_switch_active(),
            kill_switch_reason: window.trip_reason,
            errors_in_window: window.errors_in_window,
            errors_by_source: window.by_source,
            cooldown_remaining_secs: window.cooldown_remaining_secs,
            last_balance: *self.last_balance.read().await,
            min_wallet_balance: self.config.min_wallet_balance,
            blacklist_size: self.blacklist.read().await.len(),
        }
    }

    /// Cold-start checks: the wallet has an address, its balance can be read
    /// and clears the floor, and the router answers a small quote.
    ///
    /// Every check runs even after a failure so the report is complete.
    pub async fn preflight(
        &self,
        wallet: &dyn Wallet,
        router: &dyn QuoteExecuteService,
        sample: &QuoteRequest,
        timeout: Duration,
    ) -> PreflightReport {
        let mut report = PreflightReport::default();

        let address = wallet.address();
        report.push(
            PreflightCheck::WalletAddress,
            !address.is_empty(),
            if address.is_empty() { "no address".to_string() } else { address },
        );

        match tokio::time::timeout(timeout, wallet.get_balance()).await {
            Ok(Ok(balance)) => {
                report.push(PreflightCheck::Network, true, "balance read".to_string());
                let floor = self.config.min_wallet_balance;
                let clears = self.check_balance(balance).await;
                report.push(
                    PreflightCheck::BalanceFloor,
                    clears,
                    format!("{:.6} against floor {:.6}", balance, floor),
                );
            }
            Ok(Err(e)) => {
                report.push(PreflightCheck::Network, false, e.to_string());
                report.push(PreflightCheck::BalanceFloor, false, "balance unknown".to_string());
            }
            Err(_) => {
                report.push(PreflightCheck::Network, false, format!("timed out after {:?}", timeout));
                report.push(PreflightCheck::BalanceFloor, false, "balance unknown".to_string());
            }
        }

        match tokio::time::timeout(timeout, router.quote(sample)).await {
            Ok(Ok(quote)) if quote.out_amount > 0.0 => report.push(
                PreflightCheck::Router,
                true,
                format!("{} quoted {} -> {:.6}", router.name(), sample.amount, quote.out_amount),
            ),
            Ok(Ok(_)) => report.push(PreflightCheck::Router, false, "empty quote".to_string()),
            Ok(Err(e)) => report.push(PreflightCheck::Router, false, e.to_string()),
            Err(_) => report.push(PreflightCheck::Router, false, format!("timed out after {:?}", timeout)),
        }

        report
    }

    pub async fn last_balance(&self) -> Option<f64> {
        *self.last_balance.read().await
    }

    async fn persist_blacklist(&self) {
        let entries = self.blacklist.read().await.entries();
        if let Err(e) = self.persistence.save_blacklist(&entries) {
            tracing::error!("Failed to persist blacklist: {}", e);
        }
    }
}
