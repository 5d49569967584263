//! Error Window
//!
//! Sliding window of API errors. Trips once `max_errors` errors land inside
//! `window_secs`; stays tripped until reset manually or, when a cooldown is
//! configured, until the cooldown elapses.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};

/// Default maximum API errors inside the window
pub const DEFAULT_MAX_API_ERRORS: u32 = 10;

/// Default window length (5 minutes)
pub const DEFAULT_ERROR_WINDOW_SECS: u64 = 300;

/// Where an error was observed
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    Quote,
    Submit,
    Confirm,
    MarketData,
    Wallet,
}

impl std::fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ErrorSource::Quote => "quote",
            ErrorSource::Submit => "submit",
            ErrorSource::Confirm => "confirm",
            ErrorSource::MarketData => "market_data",
            ErrorSource::Wallet => "wallet",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorRecord {
    pub timestamp: u64,
    pub source: ErrorSource,
}

/// Snapshot for monitoring
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorWindowState {
    pub tripped: bool,
    pub trip_reason: Option<String>,
    pub errors_in_window: usize,
    pub by_source: BTreeMap<ErrorSource, usize>,
    pub cooldown_remaining_secs: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ErrorWindow {
    max_errors: u32,
    window_secs: u64,
    /// 0 = manual reset only
    cooldown_secs: u64,

    errors: VecDeque<ErrorRecord>,
    tripped_at: Option<u64>,
    trip_reason: Option<String>,
}

impl Default for ErrorWindow {
    fn default() -> Self {
        Self::with_config(DEFAULT_MAX_API_ERRORS, DEFAULT_ERROR_WINDOW_SECS, 0)
    }
}

impl ErrorWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(max_errors: u32, window_secs: u64, cooldown_secs: u64) -> Self {
        Self {
            max_errors: max_errors.max(1),
            window_secs,
            cooldown_secs,
            errors: VecDeque::new(),
            tripped_at: None,
            trip_reason: None,
        }
    }

    /// Record an error. Returns the trip reason when this error trips the window.
    pub fn record(&mut self, source: ErrorSource, now: u64) -> Option<String> {
        self.errors.push_back(ErrorRecord { timestamp: now, source });
        self.prune(now);

        if self.tripped_at.is_some() {
            return None;
        }

        let count = self.errors.len();
        if count >= self.max_errors as usize {
            let reason = format!(
                "{} API errors in the last {}s (max {})",
                count, self.window_secs, self.max_errors
            );
            tracing::error!("KILL SWITCH TRIPPED: {}", reason);
            self.tripped_at = Some(now);
            self.trip_reason = Some(reason.clone());
            return Some(reason);
        }

        tracing::debug!("API error from {} ({} in window)", source, count);
        None
    }

    pub fn is_tripped(&self) -> bool {
        self.tripped_at.is_some()
    }

    pub fn trip_reason(&self) -> Option<&str> {
        self.trip_reason.as_deref()
    }

    /// Errors currently inside the window
    pub fn count(&mut self, now: u64) -> usize {
        self.prune(now);
        self.errors.len()
    }

    pub fn counts_by_source(&mut self, now: u64) -> BTreeMap<ErrorSource, usize> {
        self.prune(now);
        let mut counts = BTreeMap::new();
        for record in &self.errors {
            *counts.entry(record.source).or_insert(0) += 1;
        }
        counts
    }

    /// Clear errors and the trip
    pub fn reset(&mut self) {
        self.errors.clear();
        self.tripped_at = None;
        self.trip_reason = None;
        tracing::info!("Error window reset");
    }

    /// Clear the trip once the cooldown has elapsed. No-op without a cooldown.
    pub fn try_auto_reset(&mut self, now: u64) -> bool {
        match self.tripped_at {
            Some(tripped_at) if self.cooldown_secs > 0 => {
                if now >= tripped_at.saturating_add(self.cooldown_secs) {
                    tracing::info!("Kill switch cooldown complete, auto-resetting");
                    self.reset();
                    return true;
                }
                false
            }
            _ => false,
        }
    }

    pub fn state(&mut self, now: u64) -> ErrorWindowState {
        let cooldown_remaining_secs = match self.tripped_at {
            Some(t) if self.cooldown_secs > 0 => {
                Some(t.saturating_add(self.cooldown_secs).saturating_sub(now))
            }
            _ => None,
        };
        let by_source = self.counts_by_source(now);

        ErrorWindowState {
            tripped: self.is_tripped(),
            trip_reason: self.trip_reason.clone(),
            errors_in_window: self.errors.len(),
            by_source,
            cooldown_remaining_secs,
        }
    }

    fn prune(&mut self, now: u64) {
        let cutoff = now.saturating_sub(self.window_secs);
        while self.errors.front().map_or(false, |r| r.timestamp < cutoff) {
            self.errors.pop_front();
        }
    }
}
