//! Tradewind - autonomous Solana swap agent
//!
//! Scans for candidates, buys the ones the risk evaluator approves and
//! manages exits until Ctrl+C.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use solana_sdk::signature::Signer;
use tokio::sync::watch;
use tracing_subscriber::{fmt, EnvFilter};

use tradewind::adapters::cli::{BlacklistAction, BlacklistCmd, CliApp, Command, QuoteCmd, RunCmd, StatusCmd};
use tradewind::adapters::jupiter::{JupiterClient, JupiterConfig, JupiterRouter};
use tradewind::adapters::market_data::{DexScreenerConfig, DexScreenerSource};
use tradewind::adapters::notify::{FanoutNotifier, LogNotifier, WebhookNotifier, WebhookTarget};
use tradewind::adapters::persistence::JsonStore;
use tradewind::adapters::solana::{load_keypair, KeypairWallet, PaperWallet, SolanaClient};
use tradewind::application::{
    unix_now, AssetLocks, ExecutorConfig, OrderExecutor, PositionManager, PositionManagerConfig,
    SafetyConfig, SafetyMonitor, TradingLoop, TradingLoopConfig, PREFLIGHT_QUOTE_MINT, SOL_MINT,
};
use tradewind::config::{load_config, Config};
use tradewind::domain::{ExponentialBackoff, OrderConstraints, OrderRequest, RiskEvaluator, RiskThresholds, TradingState};
use tradewind::ports::{Notifier, Persistence, QuoteRequest, Wallet};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if it exists (secrets go here, not in the config file)
    dotenvy::dotenv().ok();

    let app = CliApp::parse();
    let config_path = match &app.command {
        Command::Run(cmd) => cmd.config.config.clone(),
        Command::Status(cmd) => cmd.config.config.clone(),
        Command::Quote(cmd) => cmd.config.config.clone(),
        Command::Blacklist(cmd) => cmd.config.config.clone(),
    };
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;
    init_logging(app.log_level().unwrap_or(&config.logging.level));

    match app.command {
        Command::Run(cmd) => run_command(cmd, config).await,
        Command::Status(cmd) => status_command(cmd, config).await,
        Command::Quote(cmd) => quote_command(cmd, config).await,
        Command::Blacklist(cmd) => blacklist_command(cmd, config).await,
    }
}

/// RUST_LOG wins over flags and the config file
fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    fmt().with_env_filter(filter).with_target(false).init();
}

fn jupiter_router(config: &Config, rpc: &Arc<SolanaClient>, api_url: Option<&str>) -> Result<JupiterRouter> {
    let mut jupiter = JupiterConfig::from(config);
    if let Some(url) = api_url {
        jupiter.api_base_url = url.to_string();
    }
    let client = JupiterClient::new(jupiter).context("Failed to create Jupiter client")?;
    Ok(JupiterRouter::new(client, rpc.clone()))
}

/// Paper wallet in demo mode (addressed like the configured keypair when one
/// exists), keypair wallet otherwise
fn build_wallet(config: &Config, demo: bool, rpc: &Arc<SolanaClient>) -> Result<Arc<dyn Wallet>> {
    let keypair_path = config.keypair_path()?;
    if demo {
        let address = load_keypair(&keypair_path)
            .map(|k| k.pubkey().to_string())
            .unwrap_or_else(|_| "paper-wallet".to_string());
        return Ok(Arc::new(PaperWallet::new(address, config.agent.paper_balance)));
    }
    if !keypair_path.exists() {
        bail!(
            "Wallet file not found: {}\n\n\
             A wallet is required for live trading. To create one, run:\n  \
             solana-keygen new --outfile {}",
            keypair_path.display(),
            keypair_path.display()
        );
    }
    let wallet = KeypairWallet::from_file(&keypair_path, rpc.clone())
        .with_context(|| format!("Failed to load wallet from {}", keypair_path.display()))?;
    Ok(Arc::new(wallet))
}

fn build_notifier(config: &Config) -> Arc<dyn Notifier> {
    let alerts = &config.alerts;
    let mut targets = Vec::new();
    if let Some(url) = &alerts.webhook_url {
        targets.push(WebhookTarget::from_url(url));
    }
    if let (Some(bot_token), Some(chat_id)) = (&alerts.telegram_bot_token, &alerts.telegram_chat_id) {
        targets.push(WebhookTarget::Telegram {
            bot_token: bot_token.clone(),
            chat_id: chat_id.clone(),
        });
    }
    if targets.is_empty() {
        return Arc::new(LogNotifier);
    }
    tracing::info!("Alerts enabled for {} target(s){}", targets.len(), if alerts.quiet { " (quiet)" } else { "" });
    let webhook = WebhookNotifier::spawn(targets, alerts.quiet, Duration::from_secs(alerts.timeout_secs));
    Arc::new(FanoutNotifier::new(vec![Arc::new(LogNotifier), Arc::new(webhook)]))
}

async fn run_command(cmd: RunCmd, mut config: Config) -> Result<()> {
    config.agent.demo = cmd.demo_mode(config.agent.demo);
    let demo = config.agent.demo;
    if demo {
        tracing::warn!("DEMO MODE - quotes are real, fills are simulated");
    } else {
        tracing::warn!("LIVE TRADING - real transactions will be signed and sent");
    }

    let rpc = Arc::new(SolanaClient::new(config.solana.rpc_url.clone()));
    let wallet = build_wallet(&config, demo, &rpc)?;
    let store: Arc<dyn Persistence> = Arc::new(
        JsonStore::open(config.data_dir()?).context("Failed to open data directory")?,
    );
    let notifier = build_notifier(&config);
    let state = Arc::new(TradingState::new(chrono::Utc::now().date_naive()));
    let locks = AssetLocks::new();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let safety = Arc::new(SafetyMonitor::new(
        SafetyConfig::from(&config),
        state.clone(),
        notifier.clone(),
        store.clone(),
    ));
    safety.load_blacklist(unix_now()).await;

    let router = Arc::new(jupiter_router(&config, &rpc, None)?);
    let sample = QuoteRequest {
        input_asset: SOL_MINT.to_string(),
        output_asset: PREFLIGHT_QUOTE_MINT.to_string(),
        amount: 0.01,
        slippage_bps: config.execution.slippage_bps,
    };
    let report = safety
        .preflight(
            wallet.as_ref(),
            router.as_ref(),
            &sample,
            Duration::from_secs(config.execution.quote_timeout_secs),
        )
        .await;
    if !report.passed() {
        let failed: Vec<String> = report.failures().map(|r| r.check.to_string()).collect();
        if demo {
            tracing::warn!("Preflight failed ({}), continuing in demo mode", failed.join(", "));
        } else {
            bail!("Preflight failed: {}", failed.join(", "));
        }
    }

    let mut executor = OrderExecutor::new(
        ExecutorConfig::from(&config),
        router,
        wallet.clone(),
        safety.clone(),
        store.clone(),
        notifier.clone(),
        shutdown_rx.clone(),
    )
    .with_backoff(Arc::new(ExponentialBackoff::from(&config)));
    if let Some(url) = config.jupiter.fallback_api_url.as_deref() {
        executor = executor.with_fallback(Arc::new(jupiter_router(&config, &rpc, Some(url))?));
    }
    let executor = Arc::new(executor);

    let market = Arc::new(
        DexScreenerSource::new(DexScreenerConfig::from(&config)).context("Failed to create market data source")?,
    );

    let positions = Arc::new(PositionManager::new(
        PositionManagerConfig::from(&config),
        executor.clone(),
        market.clone(),
        wallet.clone(),
        safety.clone(),
        store.clone(),
        notifier.clone(),
        state.clone(),
        locks.clone(),
    ));
    let restored = positions.restore().await;
    if restored > 0 {
        tracing::info!("Restored {} open position(s)", restored);
    }

    let risk = RiskEvaluator::new(RiskThresholds::from(&config)).context("Invalid risk configuration")?;
    let trading_loop = Arc::new(TradingLoop::new(
        TradingLoopConfig::from(&config),
        risk,
        market,
        executor,
        positions,
        safety,
        wallet,
        notifier,
        state,
        locks,
    ));

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::info!("Shutdown signal received");
                let _ = shutdown_tx.send(true);
            }
            Err(e) => {
                // dropping the sender would stop the loop
                tracing::error!("Cannot listen for Ctrl+C: {}", e);
                let _keep = shutdown_tx;
                std::future::pending::<()>().await;
            }
        }
    });

    let stats = trading_loop.run(shutdown_rx).await;
    println!("Session finished: {}", stats);
    Ok(())
}

async fn status_command(cmd: StatusCmd, config: Config) -> Result<()> {
    let store = JsonStore::open(config.data_dir()?).context("Failed to open data directory")?;

    match load_keypair(config.keypair_path()?) {
        Ok(keypair) => {
            let rpc = SolanaClient::new(config.solana.rpc_url.clone());
            let address = keypair.pubkey().to_string();
            let balance = rpc.get_balance(&address).await.context("Failed to get balance")?;
            println!("Wallet:  {}", address);
            println!("Balance: {:.6} SOL", balance);
        }
        Err(e) => println!("Wallet:  unavailable ({})", e),
    }
    println!("Mode:    {}", if config.agent.demo { "demo" } else { "live" });

    let positions = store.load_positions().context("Failed to read positions")?;
    println!("\nOpen positions: {}", positions.len());
    for p in &positions {
        println!(
            "  {} {:.4} @ {:.10} (last {:.10}, {:+.2}%, {})",
            p.asset_id, p.entry_amount, p.entry_price, p.last_price, p.unrealized_pnl_pct, format!("{:?}", p.state)
        );
    }

    let trades = store.recent_trades(cmd.trades).context("Failed to read trade log")?;
    println!("\nRecent trades: {}", trades.len());
    for t in &trades {
        println!("  [{}] {}", t.context, t.result.summary());
    }

    let now = unix_now();
    let blacklist = store.load_blacklist().context("Failed to read blacklist")?;
    let active: Vec<_> = blacklist.iter().filter(|e| !e.is_expired(now)).collect();
    println!("\nBlacklisted: {}", active.len());
    for e in active {
        println!("  {} - {}", e.asset_id, e.reason);
    }
    Ok(())
}

async fn quote_command(cmd: QuoteCmd, config: Config) -> Result<()> {
    let rpc = Arc::new(SolanaClient::new(config.solana.rpc_url.clone()));
    let router = Arc::new(jupiter_router(&config, &rpc, None)?);
    let state = Arc::new(TradingState::new(chrono::Utc::now().date_naive()));
    let store: Arc<dyn Persistence> = Arc::new(JsonStore::open(config.data_dir()?)?);
    let notifier: Arc<dyn Notifier> = Arc::new(LogNotifier);
    let safety = Arc::new(SafetyMonitor::new(SafetyConfig::from(&config), state, notifier.clone(), store.clone()));
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let executor = OrderExecutor::new(
        ExecutorConfig::from(&config),
        router,
        Arc::new(PaperWallet::new("quote".into(), 0.0)),
        safety,
        store,
        notifier,
        shutdown_rx,
    );

    let request = OrderRequest::buy(&cmd.asset, cmd.amount, OrderConstraints::from(&config));
    let (quote, check) = executor.preview(&request).await.context("Failed to get quote")?;

    println!("Quote: {} SOL -> {:.6} {}", quote.in_amount, quote.out_amount, cmd.asset);
    if let Some(route) = &quote.route_label {
        println!("Route: {}", route);
    }
    println!("Price impact: {:.4}%  Slippage: {} bps", quote.price_impact_pct, quote.slippage_bps);
    match check {
        Ok(check) => {
            println!("Constraints: PASS");
            for w in check.warnings {
                println!("  warning: {}", w);
            }
        }
        Err(e) => println!("Constraints: REJECT ({})", e),
    }
    Ok(())
}

async fn blacklist_command(cmd: BlacklistCmd, config: Config) -> Result<()> {
    let store: Arc<dyn Persistence> = Arc::new(JsonStore::open(config.data_dir()?)?);
    let state = Arc::new(TradingState::new(chrono::Utc::now().date_naive()));
    let safety = SafetyMonitor::new(SafetyConfig::from(&config), state, Arc::new(LogNotifier), store);
    let now = unix_now();
    safety.load_blacklist(now).await;

    match cmd.action {
        BlacklistAction::Add { asset, reason, hours } => {
            safety
                .blacklist_add_for(&asset, &reason, now, hours.map(|h| h * 3600))
                .await;
            println!("Blacklisted {}", asset);
        }
        BlacklistAction::Remove { asset } => {
            if safety.blacklist_remove(&asset).await {
                println!("Removed {}", asset);
            } else {
                println!("{} was not blacklisted", asset);
            }
        }
        BlacklistAction::List => {
            let entries = safety.blacklist_entries().await;
            if entries.is_empty() {
                println!("Blacklist is empty");
            }
            for e in entries {
                let expiry = e
                    .expires_at
                    .map(|t| format!("{}m left", t.saturating_sub(now) / 60))
                    .unwrap_or_else(|| "permanent".to_string());
                println!("{} - {} ({})", e.asset_id, e.reason, expiry);
            }
        }
    }
    Ok(())
}
