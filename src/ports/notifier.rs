//! Notifier port
//!
//! One-way operator alerts. `notify` must not block the caller; adapters that
//! talk to the network queue the event and deliver it in the background.

use crate::domain::{ClosedTrade, OrderResult, OrderStatus, SessionStats};

#[derive(Debug, Clone, PartialEq)]
pub enum TradeEvent {
    Started { demo: bool, wallet: String },
    Stopped { stats: SessionStats },
    /// Terminal result of an order
    Order { result: OrderResult, context: String },
    PositionOpened {
        asset_id: String,
        entry_price: f64,
        amount: f64,
        adopted: bool,
    },
    PositionClosed(ClosedTrade),
    KillSwitchTripped { reason: String },
    /// Re-sent every status interval while the switch stays set
    KillSwitchSustained { reason: String },
    KillSwitchCleared,
    InsufficientBalance { have: f64, need: f64 },
    BalanceBelowFloor { balance: f64, floor: f64 },
    Status(SessionStats),
}

impl TradeEvent {
    /// Events an operator should see even when quiet mode filters the rest
    pub fn is_critical(&self) -> bool {
        match self {
            TradeEvent::KillSwitchTripped { .. }
            | TradeEvent::KillSwitchSustained { .. }
            | TradeEvent::InsufficientBalance { .. }
            | TradeEvent::BalanceBelowFloor { .. } => true,
            TradeEvent::Order { result, .. } => result.status != OrderStatus::Confirmed,
            _ => false,
        }
    }
}

impl std::fmt::Display for TradeEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeEvent::Started { demo, wallet } => write!(
                f,
                "Tradewind started ({} mode), wallet {}",
                if *demo { "DEMO" } else { "LIVE" },
                wallet
            ),
            TradeEvent::Stopped { stats } => write!(f, "Tradewind stopped: {}", stats),
            TradeEvent::Order { result, context } => {
                write!(f, "[{}] {}", context, result.summary())
            }
            TradeEvent::PositionOpened {
                asset_id,
                entry_price,
                amount,
                adopted,
            } => write!(
                f,
                "Opened {} {:.4} @ {:.10}{}",
                asset_id,
                amount,
                entry_price,
                if *adopted { " (reconciled)" } else { "" }
            ),
            TradeEvent::PositionClosed(trade) => write!(
                f,
                "Closed {} ({}) {:+.2}% / {:+.6} after {}m",
                trade.asset_id,
                trade.reason,
                trade.realized_pnl_pct,
                trade.realized_pnl_base,
                trade.hold_secs() / 60
            ),
            TradeEvent::KillSwitchTripped { reason } => {
                write!(f, "KILL SWITCH TRIPPED: {} - new buys halted", reason)
            }
            TradeEvent::KillSwitchSustained { reason } => {
                write!(f, "Kill switch still active: {}", reason)
            }
            TradeEvent::KillSwitchCleared => write!(f, "Kill switch cleared, buys resume"),
            TradeEvent::InsufficientBalance { have, need } => write!(
                f,
                "Insufficient balance: have {:.6}, need {:.6} - buys paused",
                have, need
            ),
            TradeEvent::BalanceBelowFloor { balance, floor } => write!(
                f,
                "Wallet balance {:.6} below floor {:.6} - buys paused",
                balance, floor
            ),
            TradeEvent::Status(stats) => write!(f, "Status: {}", stats),
        }
    }
}

#[cfg_attr(test, mockall::automock)]
pub trait Notifier: Send + Sync {
    fn notify(&self, event: TradeEvent);
}
