//! Trading Loop
//!
//! Drives discrete scan cycles: fetch candidates, score them, size the
//! approved ones and buy under the admission gates. Position monitoring runs
//! on its own task so a slow scan never delays an exit.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;

use super::asset_locks::AssetLocks;
use super::order_executor::OrderExecutor;
use super::position_manager::PositionManager;
use super::safety_monitor::SafetyMonitor;
use super::unix_now;
use crate::domain::{
    AdmissionDenied, AllocationPolicy, Candidate, ErrorSource, ExitReason, OrderConstraints,
    OrderRequest, OrderStatus, Reservation, RiskEvaluator, SessionStats, TradingState,
};
use crate::ports::{MarketDataSource, Notifier, TradeEvent, Wallet};

#[derive(Debug, Clone, PartialEq)]
pub struct TradingLoopConfig {
    pub scan_interval: Duration,
    pub monitor_interval: Duration,
    pub status_interval: Duration,
    pub max_open_positions: usize,
    pub max_daily_trades: u32,
    pub allocation: AllocationPolicy,
    pub constraints: OrderConstraints,
    /// Base currency kept back from sizing for fees
    pub fee_reserve: f64,
    /// Concurrent buys per cycle
    pub workers: usize,
    /// Soft rejects scoring below this are blacklisted; 0 disables
    pub auto_blacklist_below: f64,
    /// Sell everything on shutdown
    pub flatten_on_stop: bool,
}

impl Default for TradingLoopConfig {
    fn default() -> Self {
        Self {
            scan_interval: Duration::from_secs(45),
            monitor_interval: Duration::from_secs(15),
            status_interval: Duration::from_secs(300),
            max_open_positions: 3,
            max_daily_trades: 10,
            allocation: AllocationPolicy::default(),
            constraints: OrderConstraints::default(),
            fee_reserve: 0.01,
            workers: 4,
            auto_blacklist_below: 0.2,
            flatten_on_stop: false,
        }
    }
}

/// Why a cycle issued no buys
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleHalt {
    KillSwitch,
    BalanceUnavailable,
    BelowBalanceFloor,
    MarketDataUnavailable,
}

/// What one scan cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleReport {
    pub halted: Option<CycleHalt>,
    pub candidates: usize,
    /// Records that failed validation at the boundary
    pub malformed: usize,
    pub approved: usize,
    pub buys_attempted: usize,
    pub buys_confirmed: usize,
    pub buys_unconfirmed: usize,
    pub admission_denied: usize,
    pub auto_blacklisted: usize,
}

#[derive(Debug)]
enum BuyOutcome {
    Skipped,
    Denied(AdmissionDenied),
    Confirmed,
    Unconfirmed,
    Failed,
}

/// A buy that was submitted but never confirmed
#[derive(Debug, Clone, PartialEq)]
struct UnreconciledBuy {
    reservation: Reservation,
    base_amount: f64,
    tx_ref: Option<String>,
    since: u64,
}

pub struct TradingLoop {
    config: TradingLoopConfig,
    risk: RiskEvaluator,
    market: Arc<dyn MarketDataSource>,
    executor: Arc<OrderExecutor>,
    positions: Arc<PositionManager>,
    safety: Arc<SafetyMonitor>,
    wallet: Arc<dyn Wallet>,
    notifier: Arc<dyn Notifier>,
    state: Arc<TradingState>,
    locks: AssetLocks,
    unreconciled: RwLock<HashMap<String, UnreconciledBuy>>,
    malformed_total: AtomicU64,
    workers: Arc<Semaphore>,
    started_at: u64,
}

impl TradingLoop {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: TradingLoopConfig,
        risk: RiskEvaluator,
        market: Arc<dyn MarketDataSource>,
        executor: Arc<OrderExecutor>,
        positions: Arc<PositionManager>,
        safety: Arc<SafetyMonitor>,
        wallet: Arc<dyn Wallet>,
        notifier: Arc<dyn Notifier>,
        state: Arc<TradingState>,
        locks: AssetLocks,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            config,
            risk,
            market,
            executor,
            positions,
            safety,
            wallet,
            notifier,
            state,
            locks,
            unreconciled: RwLock::new(HashMap::new()),
            malformed_total: AtomicU64::new(0),
            workers,
            started_at: unix_now(),
        }
    }

    pub fn config(&self) -> &TradingLoopConfig {
        &self.config
    }

    pub fn positions(&self) -> &Arc<PositionManager> {
        &self.positions
    }

    /// Run until the shutdown channel flips to true
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) -> SessionStats {
        tracing::info!(
            "Trading loop started (scan every {:?}, monitor every {:?}, max {} open / {} per day)",
            self.config.scan_interval,
            self.config.monitor_interval,
            self.config.max_open_positions,
            self.config.max_daily_trades
        );
        self.notifier.notify(TradeEvent::Started {
            demo: self.executor.is_demo(),
            wallet: self.wallet.address(),
        });

        let monitor = tokio::spawn(
            Arc::clone(&self.positions).run_monitor(self.config.monitor_interval, shutdown.clone()),
        );

        let mut scan = tokio::time::interval(self.config.scan_interval);
        scan.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut status = tokio::time::interval(self.config.status_interval);
        status.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // first status tick fires immediately
        status.tick().await;

        loop {
            tokio::select! {
                _ = scan.tick() => {
                    let report = self.run_cycle(unix_now()).await;
                    tracing::debug!("Cycle finished: {:?}", report);
                }
                _ = status.tick() => {
                    self.report_status().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("Shutdown requested, stopping trading loop");
        if let Err(e) = monitor.await {
            tracing::error!("Position monitor task failed: {}", e);
        }
        if self.config.flatten_on_stop {
            let results = self.positions.close_all(ExitReason::Shutdown).await;
            tracing::info!("Flattened {} positions on stop", results.len());
        }
        self.positions.persist().await;

        let stats = self.session_stats().await;
        tracing::info!("Session: {}", stats);
        self.notifier.notify(TradeEvent::Stopped {
            stats: stats.clone(),
        });
        stats
    }

    /// One scan cycle. Never fails; problems are logged and the next
    /// interval tries again.
    pub async fn run_cycle(self: &Arc<Self>, now: u64) -> CycleReport {
        let mut report = CycleReport::default();

        self.state.roll_day(Utc::now().date_naive());
        self.safety.tick(now).await;
        self.reconcile_unconfirmed(now).await;

        if self.state.kill_switch_active() {
            tracing::debug!("Kill switch active, skipping buys");
            report.halted = Some(CycleHalt::KillSwitch);
            return report;
        }

        let balance = match self.wallet.get_balance().await {
            Ok(balance) => balance,
            Err(e) => {
                self.safety
                    .record_error(ErrorSource::Wallet, &e.to_string(), now)
                    .await;
                report.halted = Some(CycleHalt::BalanceUnavailable);
                return report;
            }
        };
        if !self.safety.check_balance(balance).await {
            report.halted = Some(CycleHalt::BelowBalanceFloor);
            return report;
        }

        let records = match self.market.list_candidates().await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!("Candidate fetch failed: {}", e);
                self.safety
                    .record_error(ErrorSource::MarketData, &e.to_string(), now)
                    .await;
                report.halted = Some(CycleHalt::MarketDataUnavailable);
                return report;
            }
        };

        let mut candidates = Vec::with_capacity(records.len());
        for record in records {
            let label = record.id.clone().unwrap_or_else(|| "<missing>".to_string());
            match Candidate::from_record(record, now) {
                Ok(candidate) => candidates.push(candidate),
                Err(e) => {
                    tracing::warn!("Dropping malformed candidate {}: {}", label, e);
                    report.malformed += 1;
                }
            }
        }
        self.malformed_total
            .fetch_add(report.malformed as u64, Ordering::Relaxed);
        report.candidates = candidates.len();

        let blacklist = self.safety.blacklist_snapshot().await;
        let mut budget = balance - self.config.fee_reserve;
        let mut buys = JoinSet::new();

        for candidate in candidates {
            if self.at_limits() {
                tracing::debug!("Position or daily limit reached, ending scan");
                break;
            }
            if self.positions.has_position(&candidate.id).await
                || self.unreconciled.read().await.contains_key(&candidate.id)
                || self.locks.is_locked(&candidate.id)
            {
                continue;
            }

            let assessment = self.risk.evaluate(&candidate, &blacklist, now);
            if !assessment.approve {
                tracing::debug!(
                    asset = %candidate.id,
                    "Rejected {} (confidence {:.2}, flags {:?})",
                    candidate.symbol,
                    assessment.confidence,
                    assessment.flags
                );
                if !assessment.is_hard_reject() && assessment.confidence < self.config.auto_blacklist_below {
                    self.safety
                        .blacklist_add(
                            &candidate.id,
                            &format!("auto: confidence {:.2}", assessment.confidence),
                            now,
                        )
                        .await;
                    report.auto_blacklisted += 1;
                }
                continue;
            }
            report.approved += 1;

            let Some(size) = self.config.allocation.size(assessment.confidence, budget) else {
                tracing::info!(
                    asset = %candidate.id,
                    "Approved {} but remaining budget {:.4} is below the minimum order",
                    candidate.symbol,
                    budget
                );
                continue;
            };
            budget -= size;

            tracing::info!(
                asset = %candidate.id,
                "Buying {} for {:.4} (confidence {:.2})",
                candidate.symbol,
                size,
                assessment.confidence
            );
            report.buys_attempted += 1;
            let this = Arc::clone(self);
            let confidence = assessment.confidence;
            buys.spawn(async move {
                let _permit = this.workers.clone().acquire_owned().await.ok();
                this.try_buy(&candidate.id, size, confidence).await
            });
        }

        while let Some(joined) = buys.join_next().await {
            match joined {
                Ok(BuyOutcome::Confirmed) => report.buys_confirmed += 1,
                Ok(BuyOutcome::Unconfirmed) => report.buys_unconfirmed += 1,
                Ok(BuyOutcome::Denied(reason)) => {
                    tracing::debug!("Admission denied: {}", reason);
                    report.admission_denied += 1;
                }
                Ok(BuyOutcome::Failed) | Ok(BuyOutcome::Skipped) => {}
                Err(e) => tracing::error!("Buy task failed: {}", e),
            }
        }

        report
    }

    fn at_limits(&self) -> bool {
        self.state.open_positions() >= self.config.max_open_positions
            || self.state.daily_trades() >= self.config.max_daily_trades
    }

    /// Admission gates run here, immediately before the order is issued
    async fn try_buy(&self, asset_id: &str, size: f64, confidence: f64) -> BuyOutcome {
        let Some(_guard) = self.locks.try_acquire(asset_id) else {
            return BuyOutcome::Skipped;
        };
        if self.positions.has_position(asset_id).await {
            return BuyOutcome::Skipped;
        }
        let reservation = match self
            .state
            .try_admit(self.config.max_open_positions, self.config.max_daily_trades)
        {
            Ok(reservation) => reservation,
            Err(denied) => return BuyOutcome::Denied(denied),
        };

        let request = OrderRequest::buy(asset_id, size, self.config.constraints);
        let result = self.executor.execute(&request, "entry", Some(confidence)).await;

        match result.status {
            OrderStatus::Confirmed => match self.positions.open_from_fill(&result, unix_now()).await {
                Ok(_) => BuyOutcome::Confirmed,
                Err(e) => {
                    tracing::error!(asset = %asset_id, "Bought but could not open position: {}", e);
                    self.state.release_admission(reservation);
                    BuyOutcome::Failed
                }
            },
            OrderStatus::TimedOut => {
                // the reservation stays until the wallet tells us what happened
                self.unreconciled.write().await.insert(
                    asset_id.to_string(),
                    UnreconciledBuy {
                        reservation,
                        base_amount: size,
                        tx_ref: result.tx_ref.clone(),
                        since: unix_now(),
                    },
                );
                BuyOutcome::Unconfirmed
            }
            OrderStatus::Failed => {
                self.state.release_admission(reservation);
                BuyOutcome::Failed
            }
        }
    }

    /// Settle buys that never confirmed by reading the wallet
    async fn reconcile_unconfirmed(&self, now: u64) {
        let pending: Vec<(String, UnreconciledBuy)> = self
            .unreconciled
            .read()
            .await
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        for (asset_id, buy) in pending {
            let Some(_guard) = self.locks.try_acquire(&asset_id) else {
                continue;
            };
            let held = match self.wallet.asset_balance(&asset_id).await {
                Ok(held) => held,
                Err(e) => {
                    tracing::warn!(asset = %asset_id, "Balance check for unconfirmed buy failed: {}", e);
                    continue;
                }
            };

            if held > 0.0 {
                let entry_price = buy.base_amount / held;
                match self
                    .positions
                    .adopt(&asset_id, entry_price, held, buy.base_amount, now)
                    .await
                {
                    Ok(_) => tracing::info!(
                        asset = %asset_id,
                        "Unconfirmed buy {} landed, adopted {:.4}",
                        buy.tx_ref.as_deref().unwrap_or("-"),
                        held
                    ),
                    Err(e) => {
                        tracing::error!(asset = %asset_id, "Cannot adopt holdings: {}", e);
                        self.state.release_admission(buy.reservation);
                    }
                }
            } else {
                tracing::info!(
                    asset = %asset_id,
                    "Unconfirmed buy {} did not land after {}s, releasing slot",
                    buy.tx_ref.as_deref().unwrap_or("-"),
                    now.saturating_sub(buy.since)
                );
                self.state.release_admission(buy.reservation);
            }
            self.unreconciled.write().await.remove(&asset_id);
        }
    }

    async fn report_status(&self) {
        let stats = self.session_stats().await;
        tracing::info!("Status: {}", stats);
        self.notifier.notify(TradeEvent::Status(stats));

        if self.state.kill_switch_active() {
            let reason = self
                .safety
                .kill_switch_reason()
                .await
                .unwrap_or_else(|| "unknown".to_string());
            self.notifier.notify(TradeEvent::KillSwitchSustained { reason });
        }
    }

    pub async fn session_stats(&self) -> SessionStats {
        let closed = self.positions.closed_trades().await;
        SessionStats {
            counters: self.state.counters(),
            closed_trades: closed.len(),
            winning_trades: closed.iter().filter(|t| t.realized_pnl_base > 0.0).count(),
            realized_pnl: closed.iter().map(|t| t.realized_pnl_base).sum(),
            base_balance: self.safety.last_balance().await,
            uptime_secs: unix_now().saturating_sub(self.started_at),
            demo: self.executor.is_demo(),
        }
    }

    /// Candidate records rejected at the boundary since start
    pub fn malformed_total(&self) -> u64 {
        self.malformed_total.load(Ordering::Relaxed)
    }
}
