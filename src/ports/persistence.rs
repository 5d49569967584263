//! Persistence port
//!
//! Append-only trade log plus small snapshots (blacklist, open positions)
//! used for crash recovery.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{BlacklistEntry, OrderResult, Position};

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

/// One line of the trade log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeLogEntry {
    #[serde(flatten)]
    pub result: OrderResult,
    /// "entry", "exit: stop_loss", ...
    pub context: String,
    pub confidence: Option<f64>,
}

#[cfg_attr(test, mockall::automock)]
pub trait Persistence: Send + Sync {
    fn append_trade_log(&self, entry: &TradeLogEntry) -> Result<(), PersistenceError>;

    /// Most recent entries, oldest first
    fn recent_trades(&self, limit: usize) -> Result<Vec<TradeLogEntry>, PersistenceError>;

    fn load_blacklist(&self) -> Result<Vec<BlacklistEntry>, PersistenceError>;

    fn save_blacklist(&self, entries: &[BlacklistEntry]) -> Result<(), PersistenceError>;

    fn load_positions(&self) -> Result<Vec<Position>, PersistenceError>;

    fn save_positions(&self, positions: &[Position]) -> Result<(), PersistenceError>;
}
