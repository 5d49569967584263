//! Configuration Loader
//!
//! Loads and validates `config.toml`. Every section is optional; missing
//! keys fall back to the defaults below. Secrets and endpoints can be
//! overridden from the environment (`.env` is honoured via dotenvy).

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

use crate::adapters::jupiter::JupiterConfig;
use crate::adapters::market_data::DexScreenerConfig;
use crate::application::{
    ExecutorConfig, PositionManagerConfig, SafetyConfig, TradingLoopConfig, SOL_MINT,
};
use crate::domain::{
    AllocationPolicy, ExitParams, ExponentialBackoff, OrderConstraints, RiskThresholds,
    DEFAULT_BLACKLIST_SECS,
};

/// Main configuration structure matching config.toml
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub agent: AgentSection,
    pub risk: RiskSection,
    pub limits: LimitsSection,
    pub sizing: AllocationPolicy,
    pub exits: ExitsSection,
    pub execution: ExecutionSection,
    pub safety: SafetySection,
    pub jupiter: JupiterSection,
    pub solana: SolanaSection,
    pub market_data: MarketDataSection,
    pub logging: LoggingSection,
    pub alerts: AlertsSection,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentSection {
    /// Simulate fills instead of signing. Live trading needs `--live` as well.
    pub demo: bool,
    /// Starting balance of the paper wallet in demo mode
    pub paper_balance: f64,
    pub scan_interval_secs: u64,
    pub monitor_interval_secs: u64,
    pub status_interval_secs: u64,
    /// Concurrent buys per scan and concurrent position checks per tick
    pub workers: usize,
    /// Trade log, blacklist and position snapshots
    pub data_dir: String,
    pub flatten_on_stop: bool,
    /// Soft rejects scoring below this are blacklisted; 0 disables
    pub auto_blacklist_below: f64,
}

impl Default for AgentSection {
    fn default() -> Self {
        Self {
            demo: true,
            paper_balance: 1.0,
            scan_interval_secs: 45,
            monitor_interval_secs: 15,
            status_interval_secs: 300,
            workers: 4,
            data_dir: "~/.tradewind".to_string(),
            flatten_on_stop: false,
            auto_blacklist_below: 0.2,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RiskSection {
    /// USD
    pub min_liquidity: f64,
    pub min_holders: u64,
    pub max_volume_ratio: f64,
    pub min_volume_ratio: f64,
    pub min_confidence: f64,
    /// Absolute 24h change in percent
    pub extreme_move_pct: f64,
    pub suspicious_patterns: Vec<String>,
    pub max_special_chars: usize,
    pub whitelist: Vec<String>,
}

impl Default for RiskSection {
    fn default() -> Self {
        let t = RiskThresholds::default();
        Self {
            min_liquidity: t.min_liquidity,
            min_holders: t.min_holders,
            max_volume_ratio: t.max_volume_ratio,
            min_volume_ratio: t.min_volume_ratio,
            min_confidence: t.min_confidence,
            extreme_move_pct: t.extreme_move_pct,
            suspicious_patterns: t.suspicious_patterns,
            max_special_chars: t.max_special_chars,
            whitelist: t.whitelist,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsSection {
    pub max_open_positions: usize,
    pub max_daily_trades: u32,
}

impl Default for LimitsSection {
    fn default() -> Self {
        Self {
            max_open_positions: 3,
            max_daily_trades: 10,
        }
    }
}

/// Exit thresholds in percent, durations in minutes/hours
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExitsSection {
    pub stop_loss_pct: f64,
    pub quick_profit_pct: f64,
    pub quick_profit_window_mins: u64,
    pub profit_target_pct: f64,
    pub trailing_stop_pct: f64,
    pub max_hold_hours: u64,
    pub profit_only: bool,
    pub absolute_max_age_hours: u64,
}

impl Default for ExitsSection {
    fn default() -> Self {
        let e = ExitParams::default();
        Self {
            stop_loss_pct: e.stop_loss_pct,
            quick_profit_pct: e.quick_profit_pct,
            quick_profit_window_mins: e.quick_profit_window_secs / 60,
            profit_target_pct: e.profit_target_pct,
            trailing_stop_pct: e.trailing_stop_pct,
            max_hold_hours: e.max_hold_secs / 3600,
            profit_only: e.profit_only,
            absolute_max_age_hours: e.absolute_max_age_secs / 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ExecutionSection {
    pub max_retries: u32,
    pub slippage_bps: u16,
    pub max_price_impact_pct: f64,
    pub quote_timeout_secs: u64,
    pub submit_timeout_secs: u64,
    pub confirm_poll_timeout_secs: u64,
    pub confirm_poll_interval_ms: u64,
    pub confirmation_timeout_secs: u64,
    /// SOL kept back for fees
    pub fee_reserve: f64,
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for ExecutionSection {
    fn default() -> Self {
        Self {
            max_retries: 3,
            slippage_bps: 50,
            max_price_impact_pct: 5.0,
            quote_timeout_secs: 10,
            submit_timeout_secs: 15,
            confirm_poll_timeout_secs: 5,
            confirm_poll_interval_ms: 1000,
            confirmation_timeout_secs: 30,
            fee_reserve: 0.01,
            backoff_initial_ms: 500,
            backoff_max_ms: 8000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SafetySection {
    pub max_api_errors: u32,
    pub error_window_secs: u64,
    /// 0 = kill switch stays set until cleared by hand
    pub kill_switch_cooldown_secs: u64,
    pub min_wallet_balance: f64,
    pub blacklist_hours: u64,
}

impl Default for SafetySection {
    fn default() -> Self {
        Self {
            max_api_errors: 10,
            error_window_secs: 300,
            kill_switch_cooldown_secs: 0,
            min_wallet_balance: 0.01,
            blacklist_hours: DEFAULT_BLACKLIST_SECS / 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JupiterSection {
    pub api_url: String,
    /// Secondary router used on retries
    pub fallback_api_url: Option<String>,
    /// Optional API key for higher rate limits (JUPITER_API_KEY)
    pub api_key: Option<String>,
    pub timeout_secs: u64,
    pub rate_limit_retries: u32,
    pub priority_fee_lamports: Option<u64>,
}

impl Default for JupiterSection {
    fn default() -> Self {
        let j = JupiterConfig::default();
        Self {
            api_url: j.api_base_url,
            fallback_api_url: None,
            api_key: None,
            timeout_secs: j.timeout.as_secs(),
            rate_limit_retries: j.rate_limit_retries,
            priority_fee_lamports: j.priority_fee_lamports,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SolanaSection {
    /// RPC endpoint (SOLANA_RPC_URL)
    pub rpc_url: String,
    /// Wallet keypair (SOLANA_KEYPAIR_PATH). NEVER commit this file!
    pub keypair_path: String,
}

impl Default for SolanaSection {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.mainnet-beta.solana.com".to_string(),
            keypair_path: "~/.config/solana/id.json".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MarketDataSection {
    pub api_url: String,
    pub queries: Vec<String>,
    pub max_candidates: usize,
    pub timeout_secs: u64,
}

impl Default for MarketDataSection {
    fn default() -> Self {
        let d = DexScreenerConfig::default();
        Self {
            api_url: d.api_base_url,
            queries: d.queries,
            max_candidates: d.max_candidates,
            timeout_secs: d.timeout.as_secs(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSection {
    /// "trace", "debug", "info", "warn", "error"
    pub level: String,
}

impl Default for LoggingSection {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AlertsSection {
    /// Discord or Slack-compatible webhook (ALERT_WEBHOOK_URL)
    pub webhook_url: Option<String>,
    /// TELEGRAM_BOT_TOKEN
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    /// Only forward kill switch, balance and failed-order alerts
    pub quiet: bool,
    pub timeout_secs: u64,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            telegram_bot_token: None,
            telegram_chat_id: None,
            quiet: false,
            timeout_secs: 10,
        }
    }
}

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Failed to parse TOML: {0}")]
    ParseError(#[from] toml::de::Error),
    #[error("Validation failed: {0}")]
    ValidationError(String),
}

fn invalid(msg: impl Into<String>) -> ConfigError {
    ConfigError::ValidationError(msg.into())
}

/// Load configuration from a TOML file, apply environment overrides and
/// validate
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let mut config: Config = toml::from_str(&content)?;
    config.apply_overrides(|key| std::env::var(key).ok());
    config.validate()?;
    Ok(config)
}

/// Expand `~` and `$VAR` in a configured path
pub fn expand_path(path: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(path)
        .map(|p| PathBuf::from(p.as_ref()))
        .map_err(|e| invalid(format!("cannot expand path {}: {}", path, e)))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

impl Config {
    /// Environment variables win over file values. Empty values are ignored.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = non_empty(lookup("SOLANA_RPC_URL")) {
            self.solana.rpc_url = url;
        }
        if let Some(path) = non_empty(lookup("SOLANA_KEYPAIR_PATH")) {
            self.solana.keypair_path = path;
        }
        if let Some(key) = non_empty(lookup("JUPITER_API_KEY")) {
            self.jupiter.api_key = Some(key);
        }
        if let Some(url) = non_empty(lookup("ALERT_WEBHOOK_URL")) {
            self.alerts.webhook_url = Some(url);
        }
        if let Some(token) = non_empty(lookup("TELEGRAM_BOT_TOKEN")) {
            self.alerts.telegram_bot_token = Some(token);
        }
    }

    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        expand_path(&self.agent.data_dir)
    }

    pub fn keypair_path(&self) -> Result<PathBuf, ConfigError> {
        expand_path(&self.solana.keypair_path)
    }

    /// Validate all configuration parameters
    pub fn validate(&self) -> Result<(), ConfigError> {
        let agent = &self.agent;
        if agent.scan_interval_secs == 0 || agent.monitor_interval_secs == 0 || agent.status_interval_secs == 0 {
            return Err(invalid("agent intervals must be > 0"));
        }
        if agent.workers == 0 {
            return Err(invalid("agent.workers must be > 0"));
        }
        if !(0.0..1.0).contains(&agent.auto_blacklist_below) {
            return Err(invalid(format!(
                "auto_blacklist_below must be 0-1, got {}",
                agent.auto_blacklist_below
            )));
        }
        if agent.demo && !(agent.paper_balance.is_finite() && agent.paper_balance >= 0.0) {
            return Err(invalid(format!("paper_balance must be >= 0, got {}", agent.paper_balance)));
        }
        if agent.data_dir.trim().is_empty() {
            return Err(invalid("data_dir cannot be empty"));
        }

        let risk = &self.risk;
        if !(0.0..=1.0).contains(&risk.min_confidence) {
            return Err(invalid(format!("min_confidence must be 0-1, got {}", risk.min_confidence)));
        }
        if risk.min_liquidity < 0.0 {
            return Err(invalid(format!("min_liquidity must be >= 0, got {}", risk.min_liquidity)));
        }
        if risk.min_volume_ratio < 0.0 || risk.max_volume_ratio <= risk.min_volume_ratio {
            return Err(invalid(format!(
                "volume ratio band is empty: min {} max {}",
                risk.min_volume_ratio, risk.max_volume_ratio
            )));
        }
        if risk.extreme_move_pct <= 0.0 {
            return Err(invalid(format!("extreme_move_pct must be > 0, got {}", risk.extreme_move_pct)));
        }

        if self.limits.max_open_positions == 0 {
            return Err(invalid("max_open_positions must be > 0"));
        }
        if self.limits.max_daily_trades == 0 {
            return Err(invalid("max_daily_trades must be > 0"));
        }

        self.sizing
            .validate()
            .map_err(|e| invalid(format!("sizing: {}", e)))?;

        let exits = &self.exits;
        if exits.stop_loss_pct >= 0.0 || exits.stop_loss_pct <= -100.0 {
            return Err(invalid(format!("stop_loss_pct must be in (-100, 0), got {}", exits.stop_loss_pct)));
        }
        if exits.profit_target_pct <= 0.0 {
            return Err(invalid(format!("profit_target_pct must be > 0, got {}", exits.profit_target_pct)));
        }
        if exits.quick_profit_pct < 0.0 {
            return Err(invalid(format!("quick_profit_pct must be >= 0, got {}", exits.quick_profit_pct)));
        }
        if !(0.0..100.0).contains(&exits.trailing_stop_pct) {
            return Err(invalid(format!("trailing_stop_pct must be 0-100, got {}", exits.trailing_stop_pct)));
        }
        if exits.max_hold_hours == 0 {
            return Err(invalid("max_hold_hours must be > 0"));
        }
        if exits.absolute_max_age_hours < exits.max_hold_hours {
            return Err(invalid(format!(
                "absolute_max_age_hours ({}) must be >= max_hold_hours ({})",
                exits.absolute_max_age_hours, exits.max_hold_hours
            )));
        }

        let exec = &self.execution;
        if exec.slippage_bps == 0 || exec.slippage_bps > 10_000 {
            return Err(invalid(format!("slippage_bps must be 1-10000, got {}", exec.slippage_bps)));
        }
        if !(exec.max_price_impact_pct > 0.0 && exec.max_price_impact_pct <= 100.0) {
            return Err(invalid(format!(
                "max_price_impact_pct must be 0-100, got {}",
                exec.max_price_impact_pct
            )));
        }
        if exec.quote_timeout_secs == 0 || exec.submit_timeout_secs == 0 || exec.confirm_poll_timeout_secs == 0 {
            return Err(invalid("execution timeouts must be > 0"));
        }
        if exec.confirm_poll_interval_ms == 0
            || exec.confirm_poll_interval_ms >= exec.confirmation_timeout_secs * 1000
        {
            return Err(invalid(format!(
                "confirm_poll_interval_ms ({}) must be > 0 and below confirmation_timeout_secs ({})",
                exec.confirm_poll_interval_ms, exec.confirmation_timeout_secs
            )));
        }
        if !(exec.fee_reserve.is_finite() && exec.fee_reserve >= 0.0) {
            return Err(invalid(format!("fee_reserve must be >= 0, got {}", exec.fee_reserve)));
        }
        if exec.backoff_multiplier < 1.0 || exec.backoff_max_ms < exec.backoff_initial_ms {
            return Err(invalid("backoff needs multiplier >= 1 and max >= initial"));
        }

        let safety = &self.safety;
        if safety.max_api_errors == 0 || safety.error_window_secs == 0 {
            return Err(invalid("max_api_errors and error_window_secs must be > 0"));
        }
        if !(safety.min_wallet_balance.is_finite() && safety.min_wallet_balance >= 0.0) {
            return Err(invalid(format!(
                "min_wallet_balance must be >= 0, got {}",
                safety.min_wallet_balance
            )));
        }

        if self.jupiter.api_url.is_empty() {
            return Err(invalid("jupiter.api_url cannot be empty"));
        }
        if self.solana.rpc_url.is_empty() {
            return Err(invalid("solana.rpc_url cannot be empty"));
        }
        if !agent.demo && self.solana.keypair_path.is_empty() {
            return Err(invalid("keypair_path is required for live trading"));
        }
        if self.market_data.api_url.is_empty() || self.market_data.max_candidates == 0 {
            return Err(invalid("market_data needs an api_url and max_candidates > 0"));
        }

        if !["trace", "debug", "info", "warn", "error"].contains(&self.logging.level.as_str()) {
            return Err(invalid(format!("unknown log level {}", self.logging.level)));
        }

        if self.alerts.telegram_bot_token.is_some() != self.alerts.telegram_chat_id.is_some() {
            return Err(invalid("telegram_bot_token and telegram_chat_id must be set together"));
        }

        Ok(())
    }
}

impl From<&Config> for OrderConstraints {
    fn from(config: &Config) -> Self {
        OrderConstraints {
            max_slippage_bps: config.execution.slippage_bps,
            max_price_impact_pct: config.execution.max_price_impact_pct,
        }
    }
}

impl From<&Config> for RiskThresholds {
    fn from(config: &Config) -> Self {
        let risk = &config.risk;
        RiskThresholds {
            min_liquidity: risk.min_liquidity,
            min_holders: risk.min_holders,
            max_volume_ratio: risk.max_volume_ratio,
            min_volume_ratio: risk.min_volume_ratio,
            min_confidence: risk.min_confidence,
            extreme_move_pct: risk.extreme_move_pct,
            suspicious_patterns: risk.suspicious_patterns.clone(),
            max_special_chars: risk.max_special_chars,
            whitelist: risk.whitelist.clone(),
        }
    }
}

impl From<&Config> for ExitParams {
    fn from(config: &Config) -> Self {
        let exits = &config.exits;
        ExitParams {
            stop_loss_pct: exits.stop_loss_pct,
            quick_profit_pct: exits.quick_profit_pct,
            quick_profit_window_secs: exits.quick_profit_window_mins * 60,
            profit_target_pct: exits.profit_target_pct,
            trailing_stop_pct: exits.trailing_stop_pct,
            max_hold_secs: exits.max_hold_hours * 3600,
            profit_only: exits.profit_only,
            absolute_max_age_secs: exits.absolute_max_age_hours * 3600,
        }
    }
}

impl From<&Config> for ExecutorConfig {
    fn from(config: &Config) -> Self {
        let exec = &config.execution;
        ExecutorConfig {
            base_asset: SOL_MINT.to_string(),
            max_retries: exec.max_retries,
            quote_timeout: Duration::from_secs(exec.quote_timeout_secs),
            submit_timeout: Duration::from_secs(exec.submit_timeout_secs),
            confirm_poll_timeout: Duration::from_secs(exec.confirm_poll_timeout_secs),
            confirm_poll_interval: Duration::from_millis(exec.confirm_poll_interval_ms),
            confirmation_timeout: Duration::from_secs(exec.confirmation_timeout_secs),
            fee_reserve: exec.fee_reserve,
            demo: config.agent.demo,
        }
    }
}

impl From<&Config> for ExponentialBackoff {
    fn from(config: &Config) -> Self {
        let exec = &config.execution;
        ExponentialBackoff {
            initial: Duration::from_millis(exec.backoff_initial_ms),
            max: Duration::from_millis(exec.backoff_max_ms),
            multiplier: exec.backoff_multiplier,
            jitter: true,
        }
    }
}

impl From<&Config> for SafetyConfig {
    fn from(config: &Config) -> Self {
        let safety = &config.safety;
        SafetyConfig {
            max_api_errors: safety.max_api_errors,
            error_window_secs: safety.error_window_secs,
            kill_switch_cooldown_secs: safety.kill_switch_cooldown_secs,
            min_wallet_balance: safety.min_wallet_balance,
            blacklist_secs: safety.blacklist_hours * 3600,
        }
    }
}

impl From<&Config> for PositionManagerConfig {
    fn from(config: &Config) -> Self {
        PositionManagerConfig {
            exit: ExitParams::from(config),
            constraints: OrderConstraints::from(config),
            workers: config.agent.workers,
        }
    }
}

impl From<&Config> for TradingLoopConfig {
    fn from(config: &Config) -> Self {
        let agent = &config.agent;
        TradingLoopConfig {
            scan_interval: Duration::from_secs(agent.scan_interval_secs),
            monitor_interval: Duration::from_secs(agent.monitor_interval_secs),
            status_interval: Duration::from_secs(agent.status_interval_secs),
            max_open_positions: config.limits.max_open_positions,
            max_daily_trades: config.limits.max_daily_trades,
            allocation: config.sizing,
            constraints: OrderConstraints::from(config),
            fee_reserve: config.execution.fee_reserve,
            workers: agent.workers,
            auto_blacklist_below: agent.auto_blacklist_below,
            flatten_on_stop: agent.flatten_on_stop,
        }
    }
}

impl From<&Config> for JupiterConfig {
    fn from(config: &Config) -> Self {
        let jupiter = &config.jupiter;
        JupiterConfig {
            api_base_url: jupiter.api_url.clone(),
            api_key: jupiter.api_key.clone(),
            timeout: Duration::from_secs(jupiter.timeout_secs),
            rate_limit_retries: jupiter.rate_limit_retries,
            priority_fee_lamports: jupiter.priority_fee_lamports,
        }
    }
}

impl From<&Config> for DexScreenerConfig {
    fn from(config: &Config) -> Self {
        let md = &config.market_data;
        DexScreenerConfig {
            api_base_url: md.api_url.clone(),
            queries: md.queries.clone(),
            max_candidates: md.max_candidates,
            timeout: Duration::from_secs(md.timeout_secs),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn create_valid_config() -> String {
        r#"
[agent]
demo = true
scan_interval_secs = 30
workers = 2
data_dir = "/tmp/tradewind"

[risk]
min_liquidity = 10000.0
min_confidence = 0.75
suspicious_patterns = ["SCAM", "RUG"]
whitelist = ["So11111111111111111111111111111111111111112"]

[limits]
max_open_positions = 2
max_daily_trades = 6

[sizing]
mode = "confidence_weighted"
min = 0.05
max = 0.1
min_confidence = 0.75

[exits]
stop_loss_pct = -5.0
profit_target_pct = 20.0
quick_profit_window_mins = 3
max_hold_hours = 12
absolute_max_age_hours = 48
profit_only = true

[execution]
max_retries = 2
slippage_bps = 100
max_price_impact_pct = 3.0

[safety]
max_api_errors = 5
kill_switch_cooldown_secs = 600

[jupiter]
api_url = "https://lite-api.jup.ag/swap/v1"

[solana]
rpc_url = "https://api.devnet.solana.com"
keypair_path = "~/.config/solana/id.json"

[logging]
level = "debug"
"#
        .to_string()
    }

    fn write(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    fn parse(content: &str) -> Config {
        toml::from_str(content).unwrap()
    }

    #[test]
    fn test_load_valid_config() {
        let file = write(&create_valid_config());
        let config = load_config(file.path()).unwrap();

        assert_eq!(config.agent.scan_interval_secs, 30);
        assert_eq!(config.agent.monitor_interval_secs, 15);
        assert_eq!(config.risk.min_confidence, 0.75);
        assert_eq!(config.limits.max_open_positions, 2);
        assert_eq!(config.execution.slippage_bps, 100);
        assert_eq!(config.logging.level, "debug");
        assert_eq!(
            config.sizing,
            AllocationPolicy::ConfidenceWeighted {
                min: 0.05,
                max: 0.1,
                min_confidence: 0.75
            }
        );
    }

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = parse("");
        config.validate().unwrap();
        assert!(config.agent.demo);
        assert_eq!(config.limits.max_daily_trades, 10);
        assert_eq!(config.safety.max_api_errors, 10);
        assert_eq!(config.exits.max_hold_hours, 24);
        assert_eq!(config.sizing, AllocationPolicy::default());
    }

    #[test]
    fn test_shipped_config_matches_defaults() {
        let config = parse(include_str!("../../config/tradewind.toml"));
        config.validate().unwrap();
        let defaults = Config::default();
        assert_eq!(config.sizing, defaults.sizing);
        assert_eq!(config.limits.max_open_positions, defaults.limits.max_open_positions);
        assert_eq!(config.risk.max_special_chars, defaults.risk.max_special_chars);
        assert_eq!(config.jupiter.api_url, defaults.jupiter.api_url);
        assert_eq!(config.market_data.api_url, defaults.market_data.api_url);
        assert_eq!(config.risk.suspicious_patterns, defaults.risk.suspicious_patterns);
        assert_eq!(config.execution.confirm_poll_interval_ms, 1000);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_config("/nonexistent/path/config.toml");
        assert!(matches!(result.unwrap_err(), ConfigError::IoError(_)));
    }

    #[test]
    fn test_bad_toml_is_parse_error() {
        let file = write("[agent\ndemo = ");
        assert!(matches!(load_config(file.path()).unwrap_err(), ConfigError::ParseError(_)));
    }

    #[test]
    fn test_rejects_inconsistent_thresholds() {
        let cases = [
            "[exits]\nstop_loss_pct = 5.0",
            "[exits]\nmax_hold_hours = 48\nabsolute_max_age_hours = 24",
            "[risk]\nmin_confidence = 1.5",
            "[risk]\nmin_volume_ratio = 6.0\nmax_volume_ratio = 5.0",
            "[limits]\nmax_open_positions = 0",
            "[sizing]\nmode = \"confidence_weighted\"\nmin = 0.2\nmax = 0.1\nmin_confidence = 0.7",
            "[sizing]\nmode = \"fixed\"\namount = 0.0",
            "[execution]\nmax_price_impact_pct = 0.0",
            "[execution]\nconfirm_poll_interval_ms = 30000\nconfirmation_timeout_secs = 30",
            "[logging]\nlevel = \"loud\"",
            "[alerts]\ntelegram_bot_token = \"123:abc\"",
        ];
        for case in cases {
            let result = parse(case).validate();
            assert!(
                matches!(result, Err(ConfigError::ValidationError(_))),
                "expected rejection for {:?}",
                case
            );
        }
    }

    #[test]
    fn test_fixed_sizing_mode() {
        let config = parse("[sizing]\nmode = \"fixed\"\namount = 0.1");
        config.validate().unwrap();
        assert_eq!(config.sizing, AllocationPolicy::Fixed { amount: 0.1 });
    }

    #[test]
    fn test_env_overrides() {
        let mut config = parse(&create_valid_config());
        let env: HashMap<&str, &str> = [
            ("SOLANA_RPC_URL", "https://rpc.example.com"),
            ("JUPITER_API_KEY", "jup-key"),
            ("ALERT_WEBHOOK_URL", "https://discord.com/api/webhooks/1/x"),
            ("SOLANA_KEYPAIR_PATH", ""),
        ]
        .into_iter()
        .collect();

        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.solana.rpc_url, "https://rpc.example.com");
        assert_eq!(config.jupiter.api_key.as_deref(), Some("jup-key"));
        assert!(config.alerts.webhook_url.is_some());
        // empty values do not clobber the file
        assert_eq!(config.solana.keypair_path, "~/.config/solana/id.json");
        assert!(config.alerts.telegram_bot_token.is_none());
    }

    #[test]
    fn test_component_configs() {
        let config = parse(&create_valid_config());

        let exit = ExitParams::from(&config);
        assert_eq!(exit.stop_loss_pct, -5.0);
        assert_eq!(exit.quick_profit_window_secs, 180);
        assert_eq!(exit.max_hold_secs, 12 * 3600);
        assert!(exit.profit_only);

        let executor = ExecutorConfig::from(&config);
        assert_eq!(executor.max_retries, 2);
        assert!(executor.demo);
        assert_eq!(executor.confirmation_timeout, Duration::from_secs(30));

        let looping = TradingLoopConfig::from(&config);
        assert_eq!(looping.scan_interval, Duration::from_secs(30));
        assert_eq!(looping.max_open_positions, 2);
        assert_eq!(looping.constraints.max_price_impact_pct, 3.0);

        let safety = SafetyConfig::from(&config);
        assert_eq!(safety.max_api_errors, 5);
        assert_eq!(safety.kill_switch_cooldown_secs, 600);
        assert_eq!(safety.blacklist_secs, 24 * 3600);

        let thresholds = RiskThresholds::from(&config);
        assert_eq!(thresholds.min_liquidity, 10_000.0);
        assert_eq!(thresholds.suspicious_patterns, vec!["SCAM", "RUG"]);

        let jupiter = JupiterConfig::from(&config);
        assert_eq!(jupiter.api_base_url, "https://lite-api.jup.ag/swap/v1");
    }

    #[test]
    fn test_expand_path() {
        assert_eq!(expand_path("/var/data").unwrap(), PathBuf::from("/var/data"));
        assert!(!expand_path("~/data").unwrap().to_string_lossy().starts_with('~'));
    }
}
