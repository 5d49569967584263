//! Application Layer - Trading services
//!
//! Wires the domain rules to the ports:
//! - `OrderExecutor`: quote, validate, sign, submit and confirm with retries
//! - `PositionManager`: exit monitoring for open positions
//! - `TradingLoop`: candidate scanning, admission and buys
//! - `SafetyMonitor`: kill switch, balance floor and blacklist

pub mod asset_locks;
pub mod order_executor;
pub mod position_manager;
pub mod safety_monitor;
pub mod trading_loop;

pub use asset_locks::{AssetGuard, AssetLocks};
pub use order_executor::{ExecutorConfig, OrderExecutor, SOL_MINT};
pub use position_manager::{PositionManager, PositionManagerConfig};
pub use safety_monitor::{
    PreflightCheck, PreflightReport, PreflightResult, SafetyConfig, SafetyMonitor, SafetyReport,
    PREFLIGHT_QUOTE_MINT,
};
pub use trading_loop::{CycleHalt, CycleReport, TradingLoop, TradingLoopConfig};

/// Current unix time in seconds
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
