//! End-to-end trading flows against scripted ports: scan, buy, monitor, exit
//! and recovery, with the JSON store on a temp directory.

use std::sync::Arc;
use std::time::Duration;

use approx::assert_relative_eq;
use chrono::Utc;
use tempfile::TempDir;
use tokio::sync::watch;

use tradewind::adapters::persistence::JsonStore;
use tradewind::adapters::solana::PaperWallet;
use tradewind::application::{
    unix_now, AssetLocks, ExecutorConfig, OrderExecutor, PositionManager, PositionManagerConfig,
    SafetyConfig, SafetyMonitor, TradingLoop, TradingLoopConfig, SOL_MINT,
};
use tradewind::domain::{
    AllocationPolicy, CandidateRecord, ExitParams, ExitReason, NoBackoff, PositionState,
    RiskEvaluator, RiskThresholds, TradingState,
};
use tradewind::ports::mocks::{RecordingNotifier, ScriptedMarket, ScriptedRouter};
use tradewind::ports::{Persistence, TradeEvent, Wallet};

struct Agent {
    trading: Arc<TradingLoop>,
    positions: Arc<PositionManager>,
    router: Arc<ScriptedRouter>,
    market: Arc<ScriptedMarket>,
    wallet: Arc<PaperWallet>,
    store: Arc<JsonStore>,
    state: Arc<TradingState>,
    notifier: Arc<RecordingNotifier>,
    _shutdown: watch::Sender<bool>,
}

fn exits() -> ExitParams {
    ExitParams {
        stop_loss_pct: -8.0,
        quick_profit_pct: 5.0,
        quick_profit_window_secs: 300,
        profit_target_pct: 20.0,
        trailing_stop_pct: 0.0,
        max_hold_secs: 24 * 3600,
        profit_only: false,
        absolute_max_age_secs: 72 * 3600,
    }
}

fn agent(dir: &TempDir, loop_config: TradingLoopConfig) -> Agent {
    let store = Arc::new(JsonStore::open(dir.path()).unwrap());
    let state = Arc::new(TradingState::new(Utc::now().date_naive()));
    let notifier = Arc::new(RecordingNotifier::new());
    let safety = Arc::new(SafetyMonitor::new(
        SafetyConfig::default(),
        state.clone(),
        notifier.clone(),
        store.clone(),
    ));
    let router = Arc::new(ScriptedRouter::new(SOL_MINT, 0.001));
    let market = Arc::new(ScriptedMarket::new());
    let wallet = Arc::new(PaperWallet::new("Paper".into(), 1.0));
    let (tx, rx) = watch::channel(false);

    let executor = Arc::new(
        OrderExecutor::new(
            ExecutorConfig {
                demo: true,
                ..ExecutorConfig::default()
            },
            router.clone(),
            wallet.clone(),
            safety.clone(),
            store.clone(),
            notifier.clone(),
            rx,
        )
        .with_backoff(Arc::new(NoBackoff)),
    );
    let locks = AssetLocks::new();
    let positions = Arc::new(PositionManager::new(
        PositionManagerConfig {
            exit: exits(),
            ..PositionManagerConfig::default()
        },
        executor.clone(),
        market.clone(),
        wallet.clone(),
        safety.clone(),
        store.clone(),
        notifier.clone(),
        state.clone(),
        locks.clone(),
    ));
    let trading = Arc::new(TradingLoop::new(
        loop_config,
        RiskEvaluator::new(RiskThresholds::default()).unwrap(),
        market.clone(),
        executor,
        positions.clone(),
        safety,
        wallet.clone(),
        notifier.clone(),
        state.clone(),
        locks,
    ));

    Agent {
        trading,
        positions,
        router,
        market,
        wallet,
        store,
        state,
        notifier,
        _shutdown: tx,
    }
}

fn candidate(id: &str) -> CandidateRecord {
    CandidateRecord {
        id: Some(id.to_string()),
        symbol: Some("GUST".into()),
        name: Some("Gust".into()),
        liquidity_usd: Some(80_000.0),
        volume_24h_usd: Some(30_000.0),
        holders: Some(900),
        price_change_24h_pct: Some(8.0),
    }
}

fn fixed(amount: f64) -> TradingLoopConfig {
    TradingLoopConfig {
        allocation: AllocationPolicy::Fixed { amount },
        ..TradingLoopConfig::default()
    }
}

#[tokio::test]
async fn demo_session_buys_then_takes_profit() {
    let dir = TempDir::new().unwrap();
    let a = agent(&dir, fixed(0.1));
    a.market.set_candidates(vec![candidate("MintA")]);
    let start = unix_now();

    let report = a.trading.run_cycle(start).await;
    assert_eq!(report.buys_confirmed, 1);

    let position = a.positions.position("MintA").await.unwrap();
    assert_relative_eq!(position.entry_price, 0.001, epsilon = 1e-12);
    assert_relative_eq!(position.entry_amount, 100.0, epsilon = 1e-9);
    assert_relative_eq!(a.wallet.get_balance().await.unwrap(), 0.9, epsilon = 1e-9);
    assert_relative_eq!(a.wallet.asset_balance("MintA").await.unwrap(), 100.0, epsilon = 1e-9);

    // +25% after ten minutes: past the quick profit window, over the target
    a.market.set_price("MintA", 0.00125);
    a.router.set_price(0.00125);
    let sold = a.positions.tick(start + 600).await;

    assert_eq!(sold, 1);
    assert!(!a.positions.has_position("MintA").await);
    let closed = a.positions.closed_trades().await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].reason, ExitReason::ProfitTarget);
    assert_relative_eq!(closed[0].realized_pnl_pct, 25.0, epsilon = 1e-6);
    assert_relative_eq!(a.wallet.get_balance().await.unwrap(), 1.025, epsilon = 1e-9);
    assert_eq!(a.state.open_positions(), 0);

    let log = a.store.recent_trades(10).unwrap();
    let contexts: Vec<_> = log.iter().map(|e| e.context.as_str()).collect();
    assert_eq!(contexts, vec!["entry", "exit: profit_target"]);
    assert!(log.iter().all(|e| e.result.demo));
    assert!(a.store.load_positions().unwrap().is_empty());
}

#[tokio::test]
async fn racing_candidates_never_exceed_position_limit() {
    let dir = TempDir::new().unwrap();
    let a = agent(
        &dir,
        TradingLoopConfig {
            max_open_positions: 3,
            workers: 8,
            ..fixed(0.02)
        },
    );
    a.market
        .set_candidates((0..20).map(|i| candidate(&format!("Mint{}", i))).collect());

    let report = a.trading.run_cycle(unix_now()).await;

    assert!(a.state.open_positions() <= 3);
    assert_eq!(a.positions.open_positions().await.len(), a.state.open_positions());
    assert_eq!(report.buys_confirmed, 3);
}

#[tokio::test]
async fn kill_switch_stops_buys_but_not_exits() {
    let dir = TempDir::new().unwrap();
    let a = agent(&dir, fixed(0.1));
    a.market.set_candidates(vec![candidate("MintA")]);
    let start = unix_now();
    a.trading.run_cycle(start).await;
    assert!(a.positions.has_position("MintA").await);

    a.state.set_kill_switch(true);
    a.market.set_candidates(vec![candidate("MintB")]);
    let report = a.trading.run_cycle(start + 60).await;
    assert_eq!(report.buys_attempted, 0);
    assert!(!a.positions.has_position("MintB").await);

    // 20% crash: stop loss still fires while the switch is set
    a.market.set_price("MintA", 0.0008);
    a.router.set_price(0.0008);
    assert_eq!(a.positions.tick(start + 120).await, 1);
    let closed = a.positions.closed_trades().await;
    assert_eq!(closed[0].reason, ExitReason::StopLoss);
}

#[tokio::test]
async fn crash_recovery_restores_positions_from_disk() {
    let dir = TempDir::new().unwrap();
    {
        let a = agent(&dir, fixed(0.1));
        a.market.set_candidates(vec![candidate("MintA"), candidate("MintB")]);
        a.trading.run_cycle(unix_now()).await;
        assert_eq!(a.positions.open_positions().await.len(), 2);
    }

    let restarted = agent(&dir, fixed(0.1));
    let restored = restarted.positions.restore().await;

    assert_eq!(restored, 2);
    assert_eq!(restarted.state.open_positions(), 2);
    let position = restarted.positions.position("MintA").await.unwrap();
    assert_eq!(position.state, PositionState::Open);
    assert_relative_eq!(position.high_water_mark, position.entry_price);
}

#[tokio::test]
async fn run_flattens_on_shutdown() {
    let dir = TempDir::new().unwrap();
    let a = agent(
        &dir,
        TradingLoopConfig {
            scan_interval: Duration::from_millis(20),
            monitor_interval: Duration::from_millis(20),
            flatten_on_stop: true,
            ..fixed(0.1)
        },
    );
    a.market.set_candidates(vec![candidate("MintA")]);
    a.market.set_price("MintA", 0.001);
    let (tx, rx) = watch::channel(false);

    let handle = tokio::spawn(a.trading.clone().run(rx));
    tokio::time::sleep(Duration::from_millis(150)).await;
    tx.send(true).unwrap();
    let stats = tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .unwrap()
        .unwrap();

    assert!(stats.demo);
    assert!(stats.counters.confirmed_orders >= 2);
    assert_eq!(a.state.open_positions(), 0);
    let events = a.notifier.events();
    assert!(matches!(events.first(), Some(TradeEvent::Started { demo: true, .. })));
    assert!(matches!(events.last(), Some(TradeEvent::Stopped { .. })));
}
