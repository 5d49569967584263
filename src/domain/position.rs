use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::exit_rules::ExitReason;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PositionState {
    Open,
    /// Sell order in flight
    Closing,
    /// Sell rejected or unconfirmed; reopened on the next tick
    FailedClose,
    Closed,
}

#[derive(Debug, Error, PartialEq)]
pub enum PositionError {
    #[error("Invalid entry price: {0}")]
    InvalidEntryPrice(f64),
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition { from: PositionState, to: PositionState },
}

/// Per-position exit thresholds, all percentages in percent units (-8.0 = -8%)
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ExitParams {
    /// Negative, e.g. -8.0
    pub stop_loss_pct: f64,
    pub quick_profit_pct: f64,
    /// Quick profit only applies while age <= this window; 0 disables
    pub quick_profit_window_secs: u64,
    pub profit_target_pct: f64,
    /// Retracement from the high-water mark; 0 disables
    pub trailing_stop_pct: f64,
    pub max_hold_secs: u64,
    /// Hold losing positions past max_hold while above the stop loss
    pub profit_only: bool,
    /// Ceiling that fires even in profit-only mode
    pub absolute_max_age_secs: u64,
}

impl Default for ExitParams {
    fn default() -> Self {
        Self {
            stop_loss_pct: -8.0,
            quick_profit_pct: 5.0,
            quick_profit_window_secs: 5 * 60,
            profit_target_pct: 15.0,
            trailing_stop_pct: 5.0,
            max_hold_secs: 24 * 3600,
            profit_only: false,
            absolute_max_age_secs: 72 * 3600,
        }
    }
}

/// One price reading for a monitoring tick
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PriceObservation {
    /// Latest price
    pub last: f64,
    /// Lowest price seen in the tick window (== last when unknown)
    pub low: f64,
}

impl PriceObservation {
    pub fn at(price: f64) -> Self {
        Self { last: price, low: price }
    }

    pub fn with_low(last: f64, low: f64) -> Self {
        Self { last, low: low.min(last) }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub asset_id: String,
    /// Base currency per asset unit, taken from the confirmed fill
    pub entry_price: f64,
    /// Asset units held
    pub entry_amount: f64,
    /// Base currency spent to enter
    pub base_spent: f64,
    /// Unix seconds
    pub entry_time: u64,
    pub entry_tx: Option<String>,
    pub high_water_mark: f64,
    pub last_price: f64,
    pub unrealized_pnl_pct: f64,
    pub exit: ExitParams,
    pub state: PositionState,
    pub failed_close_attempts: u32,
    /// Set after an unconfirmed sell; balance must be checked before acting
    pub awaiting_reconciliation: bool,
    /// Reason of the sell currently in flight or last attempted
    pub pending_exit: Option<ExitReason>,
    /// Opened from a reconciled, unconfirmed buy
    #[serde(default)]
    pub adopted: bool,
}

impl Position {
    pub fn open(
        asset_id: &str,
        entry_price: f64,
        entry_amount: f64,
        base_spent: f64,
        entry_time: u64,
        entry_tx: Option<String>,
        exit: ExitParams,
    ) -> Result<Self, PositionError> {
        if !(entry_price.is_finite() && entry_price > 0.0) {
            return Err(PositionError::InvalidEntryPrice(entry_price));
        }
        if !(entry_amount.is_finite() && entry_amount > 0.0) {
            return Err(PositionError::InvalidAmount(entry_amount));
        }

        Ok(Self {
            asset_id: asset_id.to_string(),
            entry_price,
            entry_amount,
            base_spent,
            entry_time,
            entry_tx,
            high_water_mark: entry_price,
            last_price: entry_price,
            unrealized_pnl_pct: 0.0,
            exit,
            state: PositionState::Open,
            failed_close_attempts: 0,
            awaiting_reconciliation: false,
            pending_exit: None,
            adopted: false,
        })
    }

    pub fn pnl_pct_at(&self, price: f64) -> f64 {
        (price - self.entry_price) / self.entry_price * 100.0
    }

    pub fn age_secs(&self, now: u64) -> u64 {
        now.saturating_sub(self.entry_time)
    }

    pub fn is_open(&self) -> bool {
        self.state == PositionState::Open
    }

    /// Record a price reading. The high-water mark only ever moves up.
    pub fn observe(&mut self, observation: &PriceObservation) {
        if !(observation.last.is_finite() && observation.last > 0.0) {
            return;
        }
        self.last_price = observation.last;
        self.unrealized_pnl_pct = self.pnl_pct_at(observation.last);
        if observation.last > self.high_water_mark {
            self.high_water_mark = observation.last;
        }
    }

    pub fn begin_close(&mut self, reason: ExitReason) -> Result<(), PositionError> {
        self.transition(PositionState::Open, PositionState::Closing)?;
        self.pending_exit = Some(reason);
        Ok(())
    }

    pub fn fail_close(&mut self) -> Result<(), PositionError> {
        self.transition(PositionState::Closing, PositionState::FailedClose)?;
        self.failed_close_attempts += 1;
        Ok(())
    }

    /// FailedClose goes back to Open so the next tick re-evaluates it
    pub fn reopen(&mut self) -> Result<(), PositionError> {
        self.transition(PositionState::FailedClose, PositionState::Open)
    }

    pub fn mark_closed(&mut self) -> Result<(), PositionError> {
        self.transition(PositionState::Closing, PositionState::Closed)
    }

    fn transition(&mut self, from: PositionState, to: PositionState) -> Result<(), PositionError> {
        if self.state != from {
            return Err(PositionError::InvalidTransition { from: self.state, to });
        }
        self.state = to;
        Ok(())
    }
}

/// History record of a position that was sold
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClosedTrade {
    pub asset_id: String,
    pub entry_price: f64,
    pub exit_price: f64,
    pub amount: f64,
    pub base_spent: f64,
    pub base_received: f64,
    pub realized_pnl_pct: f64,
    pub realized_pnl_base: f64,
    pub reason: ExitReason,
    pub entry_time: u64,
    pub exit_time: u64,
    pub exit_tx: Option<String>,
}

impl ClosedTrade {
    pub fn from_position(
        position: &Position,
        exit_price: f64,
        base_received: f64,
        reason: ExitReason,
        exit_time: u64,
        exit_tx: Option<String>,
    ) -> Self {
        Self {
            asset_id: position.asset_id.clone(),
            entry_price: position.entry_price,
            exit_price,
            amount: position.entry_amount,
            base_spent: position.base_spent,
            base_received,
            realized_pnl_pct: position.pnl_pct_at(exit_price),
            realized_pnl_base: base_received - position.base_spent,
            reason,
            entry_time: position.entry_time,
            exit_time,
            exit_tx,
        }
    }

    pub fn hold_secs(&self) -> u64 {
        self.exit_time.saturating_sub(self.entry_time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position() -> Position {
        Position::open("MintA", 100.0, 1.0, 100.0, 1_000, None, ExitParams::default()).unwrap()
    }

    #[test]
    fn test_open_position() {
        let p = position();
        assert_eq!(p.state, PositionState::Open);
        assert_eq!(p.high_water_mark, 100.0);
        assert_eq!(p.last_price, 100.0);
        assert_eq!(p.unrealized_pnl_pct, 0.0);
    }

    #[test]
    fn test_open_invalid_price() {
        let result = Position::open("MintA", 0.0, 1.0, 0.0, 0, None, ExitParams::default());
        assert!(matches!(result, Err(PositionError::InvalidEntryPrice(_))));
    }

    #[test]
    fn test_open_invalid_amount() {
        let result = Position::open("MintA", 1.0, f64::NAN, 0.0, 0, None, ExitParams::default());
        assert!(matches!(result, Err(PositionError::InvalidAmount(_))));
    }

    #[test]
    fn test_high_water_mark_never_decreases() {
        let mut p = position();
        let prices = [101.0, 99.0, 130.0, 80.0, 129.0, 131.0, 1.0, 0.0, f64::NAN];
        let mut previous = p.high_water_mark;
        for price in prices {
            p.observe(&PriceObservation::at(price));
            assert!(p.high_water_mark >= previous);
            previous = p.high_water_mark;
        }
        assert_eq!(p.high_water_mark, 131.0);
        assert_eq!(p.last_price, 1.0);
    }

    #[test]
    fn test_close_lifecycle() {
        let mut p = position();
        p.begin_close(ExitReason::ProfitTarget).unwrap();
        assert_eq!(p.state, PositionState::Closing);
        assert_eq!(p.pending_exit, Some(ExitReason::ProfitTarget));
        p.mark_closed().unwrap();
        assert_eq!(p.state, PositionState::Closed);
        assert!(p.begin_close(ExitReason::StopLoss).is_err());
    }

    #[test]
    fn test_failed_close_reopens() {
        let mut p = position();
        p.begin_close(ExitReason::StopLoss).unwrap();
        p.fail_close().unwrap();
        assert_eq!(p.state, PositionState::FailedClose);
        assert_eq!(p.failed_close_attempts, 1);
        p.reopen().unwrap();
        assert!(p.is_open());
    }

    #[test]
    fn test_invalid_transition() {
        let mut p = position();
        assert_eq!(
            p.mark_closed(),
            Err(PositionError::InvalidTransition {
                from: PositionState::Open,
                to: PositionState::Closed
            })
        );
    }

    #[test]
    fn test_closed_trade() {
        let p = position();
        let closed = ClosedTrade::from_position(&p, 121.0, 121.0, ExitReason::ProfitTarget, 4_600, None);
        assert!((closed.realized_pnl_pct - 21.0).abs() < 1e-9);
        assert!((closed.realized_pnl_base - 21.0).abs() < 1e-9);
        assert_eq!(closed.hold_secs(), 3_600);
    }
}
