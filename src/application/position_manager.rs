//! Position Manager
//!
//! Owns every open position. Each monitoring tick reads one price per open
//! position, applies the exit rules and sells what they select. Positions
//! are evaluated concurrently, bounded by the worker semaphore, and sells
//! for one asset never overlap with any other order for that asset.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{watch, RwLock, Semaphore};
use tokio::task::JoinSet;

use super::asset_locks::{AssetGuard, AssetLocks};
use super::order_executor::OrderExecutor;
use super::safety_monitor::SafetyMonitor;
use super::unix_now;
use crate::domain::{
    observe_and_evaluate, ClosedTrade, ErrorSource, ExitParams, ExitReason, OrderConstraints,
    OrderRequest, OrderResult, OrderStatus, Position, PositionError, PositionState, TradingState,
};
use crate::ports::{MarketDataSource, Notifier, Persistence, TradeEvent, Wallet};

/// Asset balances at or below this are treated as empty
const DUST: f64 = 1e-9;

#[derive(Debug, Clone, PartialEq)]
pub struct PositionManagerConfig {
    /// Exit thresholds given to newly opened positions
    pub exit: ExitParams,
    pub constraints: OrderConstraints,
    /// Concurrent position evaluations per tick
    pub workers: usize,
}

impl Default for PositionManagerConfig {
    fn default() -> Self {
        Self {
            exit: ExitParams::default(),
            constraints: OrderConstraints::default(),
            workers: 4,
        }
    }
}

pub struct PositionManager {
    config: PositionManagerConfig,
    positions: RwLock<HashMap<String, Position>>,
    closed: RwLock<Vec<ClosedTrade>>,
    executor: Arc<OrderExecutor>,
    market: Arc<dyn MarketDataSource>,
    wallet: Arc<dyn Wallet>,
    safety: Arc<SafetyMonitor>,
    persistence: Arc<dyn Persistence>,
    notifier: Arc<dyn Notifier>,
    state: Arc<TradingState>,
    locks: AssetLocks,
    workers: Arc<Semaphore>,
}

impl PositionManager {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: PositionManagerConfig,
        executor: Arc<OrderExecutor>,
        market: Arc<dyn MarketDataSource>,
        wallet: Arc<dyn Wallet>,
        safety: Arc<SafetyMonitor>,
        persistence: Arc<dyn Persistence>,
        notifier: Arc<dyn Notifier>,
        state: Arc<TradingState>,
        locks: AssetLocks,
    ) -> Self {
        let workers = Arc::new(Semaphore::new(config.workers.max(1)));
        Self {
            config,
            positions: RwLock::new(HashMap::new()),
            closed: RwLock::new(Vec::new()),
            executor,
            market,
            wallet,
            safety,
            persistence,
            notifier,
            state,
            locks,
            workers,
        }
    }

    pub fn config(&self) -> &PositionManagerConfig {
        &self.config
    }

    /// Open a position from a confirmed buy.
    ///
    /// Entry price and amount come from the executed fill. The admission slot
    /// reserved for the buy becomes the live position.
    pub async fn open_from_fill(&self, result: &OrderResult, now: u64) -> Result<Position, PositionError> {
        let entry_price = result.executed_price.unwrap_or(f64::NAN);
        let amount = result.executed_amount.unwrap_or(f64::NAN);
        let base_spent = result.base_amount.unwrap_or(result.requested_amount);
        let position = Position::open(
            &result.asset_id,
            entry_price,
            amount,
            base_spent,
            now,
            result.tx_ref.clone(),
            self.config.exit,
        )?;
        self.insert(position.clone()).await;
        Ok(position)
    }

    /// Open a position for holdings found during reconciliation of an
    /// unconfirmed buy
    pub async fn adopt(
        &self,
        asset_id: &str,
        entry_price: f64,
        amount: f64,
        base_spent: f64,
        now: u64,
    ) -> Result<Position, PositionError> {
        let mut position = Position::open(
            asset_id,
            entry_price,
            amount,
            base_spent,
            now,
            None,
            self.config.exit,
        )?;
        position.adopted = true;
        self.insert(position.clone()).await;
        Ok(position)
    }

    async fn insert(&self, position: Position) {
        tracing::info!(
            asset = %position.asset_id,
            "Position opened: {:.4} @ {:.10}{}",
            position.entry_amount,
            position.entry_price,
            if position.adopted { " (adopted)" } else { "" }
        );
        self.notifier.notify(TradeEvent::PositionOpened {
            asset_id: position.asset_id.clone(),
            entry_price: position.entry_price,
            amount: position.entry_amount,
            adopted: position.adopted,
        });
        self.positions
            .write()
            .await
            .insert(position.asset_id.clone(), position);
        self.persist().await;
    }

    /// Reload positions saved by a previous run. Positions caught mid-sell
    /// come back open and are reconciled against the wallet first.
    pub async fn restore(&self) -> usize {
        let saved = match self.persistence.load_positions() {
            Ok(saved) => saved,
            Err(e) => {
                tracing::warn!("Failed to load saved positions: {}", e);
                return 0;
            }
        };

        let mut positions = self.positions.write().await;
        for mut position in saved {
            match position.state {
                PositionState::Closed => continue,
                PositionState::Closing | PositionState::FailedClose => {
                    position.state = PositionState::Open;
                    position.awaiting_reconciliation = true;
                }
                PositionState::Open => {}
            }
            positions.insert(position.asset_id.clone(), position);
        }
        let count = positions.len();
        drop(positions);

        self.state.restore_open_positions(count);
        if count > 0 {
            tracing::info!("Restored {} open positions", count);
        }
        count
    }

    /// One monitoring pass over every open position. Returns the number of
    /// sells issued.
    pub async fn tick(self: &Arc<Self>, now: u64) -> usize {
        let assets: Vec<String> = {
            let mut positions = self.positions.write().await;
            for position in positions.values_mut() {
                if position.state == PositionState::FailedClose && position.reopen().is_ok() {
                    tracing::info!(
                        asset = %position.asset_id,
                        "Retrying exit after failed close (attempt {})",
                        position.failed_close_attempts + 1
                    );
                }
            }
            positions
                .values()
                .filter(|p| p.is_open())
                .map(|p| p.asset_id.clone())
                .collect()
        };

        let mut tasks = JoinSet::new();
        for asset_id in assets {
            let manager = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = manager.workers.clone().acquire_owned().await.ok()?;
                manager.evaluate_position(&asset_id, now).await
            });
        }

        let mut sells = 0;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(_)) => sells += 1,
                Ok(None) => {}
                Err(e) => tracing::error!("Position evaluation task failed: {}", e),
            }
        }
        sells
    }

    /// Evaluate one position and sell it if an exit rule fires. Returns the
    /// sell result, or `None` when nothing was ordered.
    pub async fn evaluate_position(&self, asset_id: &str, now: u64) -> Option<OrderResult> {
        // An order for this asset is already in flight
        let guard = self.locks.try_acquire(asset_id)?;

        let awaiting = {
            let positions = self.positions.read().await;
            let position = positions.get(asset_id).filter(|p| p.is_open())?;
            position.awaiting_reconciliation
        };
        if awaiting && self.reconcile(asset_id, now).await {
            return None;
        }

        let observation = match self.market.price(asset_id).await {
            Ok(observation) => observation,
            Err(e) => {
                self.safety
                    .record_error(ErrorSource::MarketData, &e.to_string(), now)
                    .await;
                return None;
            }
        };

        let (exit, mark_raised) = {
            let mut positions = self.positions.write().await;
            let position = positions.get_mut(asset_id)?;
            let previous_mark = position.high_water_mark;
            let verdict = observe_and_evaluate(position, &observation, now);
            let mark_raised = position.high_water_mark > previous_mark;
            let exit = match verdict {
                Some(reason) => match position.begin_close(reason) {
                    Ok(()) => {
                        tracing::info!(
                            asset = %asset_id,
                            "Exit {}: pnl {:+.2}% (hwm {:.10}, last {:.10})",
                            reason,
                            position.unrealized_pnl_pct,
                            position.high_water_mark,
                            position.last_price
                        );
                        Some((reason, position.entry_amount))
                    }
                    Err(e) => {
                        tracing::warn!(asset = %asset_id, "Cannot close: {}", e);
                        None
                    }
                },
                None => None,
            };
            (exit, mark_raised)
        };

        let Some((reason, amount)) = exit else {
            // a restart must resume trailing from the same peak
            if mark_raised {
                self.persist().await;
            }
            return None;
        };
        Some(self.sell(asset_id, amount, reason, now, guard).await)
    }

    /// Close one position outside the exit rules (operator or shutdown)
    pub async fn close_position(&self, asset_id: &str, reason: ExitReason, now: u64) -> Option<OrderResult> {
        let guard = self.locks.acquire(asset_id).await;
        let amount = {
            let mut positions = self.positions.write().await;
            let position = positions.get_mut(asset_id)?;
            if position.state == PositionState::FailedClose {
                position.reopen().ok()?;
            }
            position.begin_close(reason).ok()?;
            position.entry_amount
        };
        Some(self.sell(asset_id, amount, reason, now, guard).await)
    }

    /// Sell every open position, e.g. when flattening on shutdown
    pub async fn close_all(self: &Arc<Self>, reason: ExitReason) -> Vec<OrderResult> {
        let assets: Vec<String> = self.positions.read().await.keys().cloned().collect();
        let mut tasks = JoinSet::new();
        for asset_id in assets {
            let manager = Arc::clone(self);
            tasks.spawn(async move {
                let _permit = manager.workers.clone().acquire_owned().await.ok()?;
                manager.close_position(&asset_id, reason, unix_now()).await
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Some(result)) => results.push(result),
                Ok(None) => {}
                Err(e) => tracing::error!("Close task failed: {}", e),
            }
        }
        results
    }

    async fn sell(
        &self,
        asset_id: &str,
        amount: f64,
        reason: ExitReason,
        now: u64,
        _guard: AssetGuard,
    ) -> OrderResult {
        let request = OrderRequest::sell(asset_id, amount, self.config.constraints);
        let result = self
            .executor
            .execute(&request, &format!("exit: {}", reason), None)
            .await;
        self.apply_sell_result(asset_id, reason, &result, now).await;
        result
    }

    /// Move a Closing position according to the sell outcome
    pub async fn apply_sell_result(&self, asset_id: &str, reason: ExitReason, result: &OrderResult, now: u64) {
        match result.status {
            OrderStatus::Confirmed => {
                let (exit_price, base_received) = match (result.executed_price, result.base_amount) {
                    (Some(price), Some(base)) => (price, base),
                    _ => {
                        let last = self.last_price(asset_id).await.unwrap_or_default();
                        (last, last * result.requested_amount)
                    }
                };
                self.finalize_close(asset_id, exit_price, base_received, reason, now, result.tx_ref.clone())
                    .await;
            }
            OrderStatus::TimedOut => {
                let mut positions = self.positions.write().await;
                if let Some(position) = positions.get_mut(asset_id) {
                    if position.fail_close().is_ok() && position.reopen().is_ok() {
                        position.awaiting_reconciliation = true;
                        tracing::warn!(
                            asset = %asset_id,
                            "Exit unconfirmed, balance will be checked before the next attempt"
                        );
                    }
                }
                drop(positions);
                self.persist().await;
            }
            OrderStatus::Failed => {
                let mut positions = self.positions.write().await;
                if let Some(position) = positions.get_mut(asset_id) {
                    if position.fail_close().is_ok() {
                        tracing::warn!(
                            asset = %asset_id,
                            "Exit failed ({} failed closes), retrying next tick",
                            position.failed_close_attempts
                        );
                    }
                }
                drop(positions);
                self.persist().await;
            }
        }
    }

    /// Check the wallet after an unconfirmed sell. Returns true if the
    /// position turned out to be sold and was closed.
    async fn reconcile(&self, asset_id: &str, now: u64) -> bool {
        let balance = match self.wallet.asset_balance(asset_id).await {
            Ok(balance) => balance,
            Err(e) => {
                tracing::warn!(asset = %asset_id, "Reconciliation balance check failed: {}", e);
                return true;
            }
        };

        if balance > DUST {
            let mut positions = self.positions.write().await;
            if let Some(position) = positions.get_mut(asset_id) {
                position.awaiting_reconciliation = false;
            }
            tracing::info!(asset = %asset_id, "Unconfirmed exit did not land, still holding {:.4}", balance);
            return false;
        }

        let (reason, last_price, amount) = {
            let mut positions = self.positions.write().await;
            let Some(position) = positions.get_mut(asset_id) else {
                return true;
            };
            let reason = position.pending_exit.unwrap_or(ExitReason::Manual);
            if position.begin_close(reason).is_err() {
                return true;
            }
            (reason, position.last_price, position.entry_amount)
        };
        tracing::info!(asset = %asset_id, "Unconfirmed exit landed, closing position");
        self.finalize_close(asset_id, last_price, last_price * amount, reason, now, None)
            .await;
        true
    }

    async fn finalize_close(
        &self,
        asset_id: &str,
        exit_price: f64,
        base_received: f64,
        reason: ExitReason,
        now: u64,
        exit_tx: Option<String>,
    ) {
        let removed = {
            let mut positions = self.positions.write().await;
            match positions.remove(asset_id) {
                Some(mut position) => {
                    if let Err(e) = position.mark_closed() {
                        tracing::warn!(asset = %asset_id, "{}", e);
                    }
                    Some(position)
                }
                None => None,
            }
        };
        let Some(position) = removed else {
            return;
        };

        let trade = ClosedTrade::from_position(&position, exit_price, base_received, reason, now, exit_tx);
        tracing::info!(
            asset = %asset_id,
            "Position closed ({}): {:+.2}% / {:+.6}",
            reason,
            trade.realized_pnl_pct,
            trade.realized_pnl_base
        );
        self.state.position_closed();
        self.closed.write().await.push(trade.clone());
        self.notifier.notify(TradeEvent::PositionClosed(trade));
        self.persist().await;
    }

    /// Watch positions until shutdown
    pub async fn run_monitor(self: Arc<Self>, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let sells = self.tick(unix_now()).await;
                    if sells > 0 {
                        tracing::debug!("Monitor tick issued {} sells", sells);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("Position monitor stopped");
    }

    pub async fn open_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.positions.read().await.values().cloned().collect();
        positions.sort_by_key(|p| p.entry_time);
        positions
    }

    pub async fn position(&self, asset_id: &str) -> Option<Position> {
        self.positions.read().await.get(asset_id).cloned()
    }

    pub async fn has_position(&self, asset_id: &str) -> bool {
        self.positions.read().await.contains_key(asset_id)
    }

    pub async fn closed_trades(&self) -> Vec<ClosedTrade> {
        self.closed.read().await.clone()
    }

    pub async fn realized_pnl(&self) -> f64 {
        self.closed
            .read()
            .await
            .iter()
            .map(|t| t.realized_pnl_base)
            .sum()
    }

    async fn last_price(&self, asset_id: &str) -> Option<f64> {
        self.positions.read().await.get(asset_id).map(|p| p.last_price)
    }

    /// Save the open-position set
    pub async fn persist(&self) {
        let positions = self.open_positions().await;
        if let Err(e) = self.persistence.save_positions(&positions) {
            tracing::error!("Failed to persist positions: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::order_executor::{ExecutorConfig, SOL_MINT};
    use crate::application::safety_monitor::SafetyConfig;
    use crate::domain::{NoBackoff, PriceObservation, Side};
    use crate::ports::mocks::{
        MemoryPersistence, RecordingNotifier, ScriptedMarket, ScriptedRouter, StaticWallet,
    };
    use crate::ports::{ConfirmationStatus, RouterError};
    use chrono::NaiveDate;

    struct Harness {
        manager: Arc<PositionManager>,
        router: Arc<ScriptedRouter>,
        market: Arc<ScriptedMarket>,
        wallet: Arc<StaticWallet>,
        persistence: Arc<MemoryPersistence>,
        state: Arc<TradingState>,
        locks: AssetLocks,
    }

    fn exit_params() -> ExitParams {
        ExitParams {
            stop_loss_pct: -5.0,
            quick_profit_pct: 50.0,
            profit_target_pct: 20.0,
            trailing_stop_pct: 0.0,
            ..ExitParams::default()
        }
    }

    fn harness() -> Harness {
        harness_with(Arc::new(MemoryPersistence::new()))
    }

    /// A fresh manager over existing storage, as after a restart
    fn harness_with(persistence: Arc<MemoryPersistence>) -> Harness {
        let state = Arc::new(TradingState::new(NaiveDate::from_ymd_opt(2024, 1, 1).unwrap()));
        let notifier = Arc::new(RecordingNotifier::new());
        let safety = Arc::new(SafetyMonitor::new(
            SafetyConfig::default(),
            state.clone(),
            notifier.clone(),
            persistence.clone(),
        ));
        let router = Arc::new(ScriptedRouter::new(SOL_MINT, 100.0));
        let market = Arc::new(ScriptedMarket::new());
        let wallet = Arc::new(StaticWallet::new(10.0));
        let (_tx, rx) = watch::channel(false);
        let config = ExecutorConfig {
            confirm_poll_interval: Duration::from_millis(5),
            confirmation_timeout: Duration::from_millis(30),
            demo: false,
            ..ExecutorConfig::default()
        };
        let executor = Arc::new(
            OrderExecutor::new(
                config,
                router.clone(),
                wallet.clone(),
                safety.clone(),
                persistence.clone(),
                notifier.clone(),
                rx,
            )
            .with_backoff(Arc::new(NoBackoff)),
        );
        let locks = AssetLocks::new();
        let manager = Arc::new(PositionManager::new(
            PositionManagerConfig {
                exit: exit_params(),
                ..PositionManagerConfig::default()
            },
            executor,
            market.clone(),
            wallet.clone(),
            safety,
            persistence.clone(),
            notifier,
            state.clone(),
            locks.clone(),
        ));
        Harness {
            manager,
            router,
            market,
            wallet,
            persistence,
            state,
            locks,
        }
    }

    fn buy_fill(asset: &str, price: f64, amount: f64) -> OrderResult {
        OrderResult {
            side: Side::Buy,
            asset_id: asset.into(),
            status: OrderStatus::Confirmed,
            requested_amount: price * amount,
            executed_price: Some(price),
            executed_amount: Some(amount),
            base_amount: Some(price * amount),
            tx_ref: Some("buy-sig".into()),
            retries: 0,
            latency_ms: 10,
            error: None,
            demo: false,
            timestamp: 0,
        }
    }

    async fn open(h: &Harness, asset: &str) {
        let _ = h.state.try_admit(10, 10).unwrap();
        h.manager
            .open_from_fill(&buy_fill(asset, 100.0, 1.0), 0)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_open_uses_executed_price() {
        let h = harness();
        open(&h, "MintA").await;

        let position = h.manager.position("MintA").await.unwrap();
        assert_eq!(position.entry_price, 100.0);
        assert_eq!(position.high_water_mark, 100.0);
        assert_eq!(h.persistence.positions().len(), 1);
    }

    #[tokio::test]
    async fn test_open_rejects_missing_fill_price() {
        let h = harness();
        let mut fill = buy_fill("MintA", 100.0, 1.0);
        fill.executed_price = None;
        assert!(h.manager.open_from_fill(&fill, 0).await.is_err());
        assert!(!h.manager.has_position("MintA").await);
    }

    #[tokio::test]
    async fn test_stop_loss_beats_profit_target_within_one_tick() {
        let h = harness();
        open(&h, "MintA").await;
        // crashed 20% then recovered to +25% inside the window
        h.market
            .push_prices("MintA", [PriceObservation::with_low(125.0, 80.0)]);

        assert_eq!(h.manager.tick(60).await, 1);

        let closed = h.manager.closed_trades().await;
        assert_eq!(closed.len(), 1);
        assert_eq!(closed[0].reason, ExitReason::StopLoss);
        assert!(!h.manager.has_position("MintA").await);
        assert_eq!(h.state.open_positions(), 0);
    }

    #[tokio::test]
    async fn test_profit_target_sells() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 121.0);
        h.router.set_price(121.0);

        h.manager.tick(600).await;

        let closed = h.manager.closed_trades().await;
        assert_eq!(closed[0].reason, ExitReason::ProfitTarget);
        assert!(h.manager.realized_pnl().await > 0.0);
    }

    #[tokio::test]
    async fn test_holds_inside_thresholds() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 103.0);

        assert_eq!(h.manager.tick(60).await, 0);
        let position = h.manager.position("MintA").await.unwrap();
        assert!(position.is_open());
        assert_eq!(position.high_water_mark, 103.0);
        assert_eq!(h.router.submit_calls(), 0);
    }

    #[tokio::test]
    async fn test_failed_close_reopens_and_sells_next_tick() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 80.0);
        h.router.push_quote(Err(RouterError::NoRoute("MintA".into())));

        h.manager.tick(60).await;
        let position = h.manager.position("MintA").await.unwrap();
        assert_eq!(position.state, PositionState::FailedClose);
        assert_eq!(position.failed_close_attempts, 1);

        h.manager.tick(120).await;
        assert!(!h.manager.has_position("MintA").await);
        assert_eq!(h.manager.closed_trades().await[0].reason, ExitReason::StopLoss);
    }

    #[tokio::test]
    async fn test_unconfirmed_exit_reconciled_by_balance() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 80.0);
        h.router.set_default_confirm(ConfirmationStatus::Pending);

        h.manager.tick(60).await;
        let position = h.manager.position("MintA").await.unwrap();
        assert!(position.is_open());
        assert!(position.awaiting_reconciliation);
        let submits = h.router.submit_calls();

        // wallet shows nothing left: the sell landed
        h.wallet.set_asset_balance("MintA", 0.0);
        h.manager.tick(120).await;

        assert!(!h.manager.has_position("MintA").await);
        assert_eq!(h.router.submit_calls(), submits);
        assert_eq!(h.manager.closed_trades().await[0].reason, ExitReason::StopLoss);
    }

    #[tokio::test]
    async fn test_unconfirmed_exit_with_holdings_resumes() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 80.0);
        h.router.set_default_confirm(ConfirmationStatus::Pending);
        h.manager.tick(60).await;

        h.wallet.set_asset_balance("MintA", 1.0);
        h.router
            .set_default_confirm(ConfirmationStatus::Confirmed { executed: None });
        h.manager.tick(120).await;

        assert!(!h.manager.has_position("MintA").await);
        assert_eq!(h.router.submit_calls(), 2);
    }

    #[tokio::test]
    async fn test_closed_position_is_not_reevaluated() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 80.0);
        h.manager.tick(60).await;
        let submits = h.router.submit_calls();

        assert!(h.manager.evaluate_position("MintA", 120).await.is_none());
        assert_eq!(h.manager.tick(180).await, 0);
        assert_eq!(h.router.submit_calls(), submits);
    }

    #[tokio::test]
    async fn test_locked_asset_is_skipped() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 80.0);

        let guard = h.locks.try_acquire("MintA").unwrap();
        assert_eq!(h.manager.tick(60).await, 0);
        drop(guard);
        assert_eq!(h.manager.tick(61).await, 1);
    }

    #[tokio::test]
    async fn test_one_price_failure_does_not_block_others() {
        let h = harness();
        open(&h, "MintA").await;
        open(&h, "MintB").await;
        h.market.set_price("MintB", 80.0);

        assert_eq!(h.manager.tick(60).await, 1);
        assert!(h.manager.has_position("MintA").await);
        assert!(!h.manager.has_position("MintB").await);
    }

    #[tokio::test]
    async fn test_close_all_flattens() {
        let h = harness();
        open(&h, "MintA").await;
        open(&h, "MintB").await;

        let results = h.manager.close_all(ExitReason::Shutdown).await;

        assert_eq!(results.len(), 2);
        assert!(h.manager.open_positions().await.is_empty());
        assert!(h
            .manager
            .closed_trades()
            .await
            .iter()
            .all(|t| t.reason == ExitReason::Shutdown));
    }

    #[tokio::test]
    async fn test_high_water_mark_survives_restart() {
        let h = harness();
        open(&h, "MintA").await;
        h.market.set_price("MintA", 115.0);
        assert_eq!(h.manager.tick(60).await, 0);
        assert_eq!(h.manager.position("MintA").await.unwrap().high_water_mark, 115.0);

        let restarted = harness_with(h.persistence.clone());
        assert_eq!(restarted.manager.restore().await, 1);

        let restored = restarted.manager.position("MintA").await.unwrap();
        assert_eq!(restored.high_water_mark, 115.0);
        assert_eq!(restored.entry_price, 100.0);
    }

    #[tokio::test]
    async fn test_restore_marks_interrupted_sells_for_reconciliation() {
        let h = harness();
        let mut closing =
            Position::open("MintA", 100.0, 1.0, 100.0, 0, None, exit_params()).unwrap();
        closing.begin_close(ExitReason::StopLoss).unwrap();
        let open = Position::open("MintB", 1.0, 5.0, 5.0, 0, None, exit_params()).unwrap();
        h.persistence.save_positions(&[closing, open]).unwrap();

        assert_eq!(h.manager.restore().await, 2);
        assert_eq!(h.state.open_positions(), 2);
        let restored = h.manager.position("MintA").await.unwrap();
        assert!(restored.is_open());
        assert!(restored.awaiting_reconciliation);
    }
}
