//! Trading State
//!
//! Shared counters consulted before every buy: open-position slots, the
//! daily trade count and the kill switch. All updates are atomic so
//! concurrent admissions can never overshoot a limit.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, AtomicU64, AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AdmissionDenied {
    #[error("Kill switch active")]
    KillSwitch,

    #[error("Max open positions reached ({0})")]
    MaxOpenPositions(usize),

    #[error("Max daily trades reached ({0})")]
    MaxDailyTrades(u32),
}

/// Slots held by one admitted buy, stamped with the trading day it was
/// counted against
#[must_use]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Reservation {
    day: i32,
}

/// Point-in-time copy of the counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TradingCounters {
    pub open_positions: usize,
    pub daily_trades: u32,
    pub kill_switch: bool,
    pub confirmed_orders: u64,
    pub failed_orders: u64,
    pub unconfirmed_orders: u64,
}

/// Session summary reported at each status interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStats {
    pub counters: TradingCounters,
    pub closed_trades: usize,
    pub winning_trades: usize,
    /// Base currency
    pub realized_pnl: f64,
    pub base_balance: Option<f64>,
    pub uptime_secs: u64,
    pub demo: bool,
}

impl std::fmt::Display for SessionStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let c = &self.counters;
        write!(
            f,
            "{}open={} trades_today={} confirmed={} failed={} unconfirmed={} closed={} (wins {}) realized_pnl={:+.6}",
            if self.demo { "[DEMO] " } else { "" },
            c.open_positions,
            c.daily_trades,
            c.confirmed_orders,
            c.failed_orders,
            c.unconfirmed_orders,
            self.closed_trades,
            self.winning_trades,
            self.realized_pnl,
        )?;
        if let Some(balance) = self.base_balance {
            write!(f, " balance={:.6}", balance)?;
        }
        if c.kill_switch {
            write!(f, " KILL SWITCH ACTIVE")?;
        }
        write!(f, " uptime={}m", self.uptime_secs / 60)
    }
}

#[derive(Debug)]
pub struct TradingState {
    /// Live positions plus reserved slots for in-flight buys
    open_positions: AtomicUsize,
    daily_trades: AtomicU32,
    /// Days since CE of the current trading day
    day: AtomicI32,
    kill_switch: AtomicBool,
    confirmed_orders: AtomicU64,
    failed_orders: AtomicU64,
    unconfirmed_orders: AtomicU64,
}

impl TradingState {
    pub fn new(today: NaiveDate) -> Self {
        Self {
            open_positions: AtomicUsize::new(0),
            daily_trades: AtomicU32::new(0),
            day: AtomicI32::new(today.num_days_from_ce()),
            kill_switch: AtomicBool::new(false),
            confirmed_orders: AtomicU64::new(0),
            failed_orders: AtomicU64::new(0),
            unconfirmed_orders: AtomicU64::new(0),
        }
    }

    /// Reserve one open-position slot and one daily-trade slot.
    ///
    /// Either both are reserved or neither is.
    pub fn try_admit(&self, max_open: usize, max_daily: u32) -> Result<Reservation, AdmissionDenied> {
        if self.kill_switch_active() {
            return Err(AdmissionDenied::KillSwitch);
        }

        self.open_positions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < max_open {
                    Some(n + 1)
                } else {
                    None
                }
            })
            .map_err(|_| AdmissionDenied::MaxOpenPositions(max_open))?;

        let daily = self
            .daily_trades
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| {
                if n < max_daily {
                    Some(n + 1)
                } else {
                    None
                }
            });

        if daily.is_err() {
            self.release_open_slot();
            return Err(AdmissionDenied::MaxDailyTrades(max_daily));
        }
        Ok(Reservation {
            day: self.day.load(Ordering::Acquire),
        })
    }

    /// Undo a reservation for a buy that did not happen.
    ///
    /// The daily slot is only handed back while its day is still current;
    /// after a rollover the new day's count is left alone.
    pub fn release_admission(&self, reservation: Reservation) {
        self.release_open_slot();
        if reservation.day != self.day.load(Ordering::Acquire) {
            return;
        }
        let _ = self
            .daily_trades
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }

    /// A position was closed; its slot becomes free
    pub fn position_closed(&self) {
        self.release_open_slot();
    }

    /// Count positions restored from disk at startup
    pub fn restore_open_positions(&self, count: usize) {
        self.open_positions.store(count, Ordering::Release);
    }

    pub fn open_positions(&self) -> usize {
        self.open_positions.load(Ordering::Acquire)
    }

    pub fn daily_trades(&self) -> u32 {
        self.daily_trades.load(Ordering::Acquire)
    }

    /// Reset the daily counter when the date changes. Returns true on rollover.
    pub fn roll_day(&self, today: NaiveDate) -> bool {
        let today = today.num_days_from_ce();
        let previous = self.day.swap(today, Ordering::AcqRel);
        if previous != today {
            self.daily_trades.store(0, Ordering::Release);
            tracing::info!("New trading day, daily trade counter reset");
            return true;
        }
        false
    }

    pub fn set_kill_switch(&self, active: bool) {
        self.kill_switch.store(active, Ordering::Release);
    }

    pub fn kill_switch_active(&self) -> bool {
        self.kill_switch.load(Ordering::Acquire)
    }

    pub fn record_confirmed(&self) {
        self.confirmed_orders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_failed(&self) {
        self.failed_orders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_unconfirmed(&self) {
        self.unconfirmed_orders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn counters(&self) -> TradingCounters {
        TradingCounters {
            open_positions: self.open_positions(),
            daily_trades: self.daily_trades(),
            kill_switch: self.kill_switch_active(),
            confirmed_orders: self.confirmed_orders.load(Ordering::Relaxed),
            failed_orders: self.failed_orders.load(Ordering::Relaxed),
            unconfirmed_orders: self.unconfirmed_orders.load(Ordering::Relaxed),
        }
    }

    fn release_open_slot(&self) {
        let _ = self
            .open_positions
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1));
    }
}
