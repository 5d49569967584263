//! Risk Evaluator
//!
//! Scores a [`Candidate`] and decides whether it may be bought. Evaluation is
//! a pure function of the candidate, the thresholds, a blacklist snapshot and
//! the supplied clock value, so identical inputs always give identical output.
//!
//! Scoring starts from a neutral 0.5, adds tiered bonuses for liquidity,
//! volume, holder count and healthy momentum, then deducts for every soft
//! flag. Hard flags (blacklisted, liquidity under the floor) reject outright.

use regex::{RegexSet, RegexSetBuilder};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use thiserror::Error;

use super::blacklist::Blacklist;
use super::candidate::Candidate;

/// Absolute liquidity floor in USD
pub const DEFAULT_MIN_LIQUIDITY: f64 = 5_000.0;
pub const DEFAULT_MIN_HOLDERS: u64 = 50;
/// Volume/liquidity above this looks like wash trading
pub const DEFAULT_MAX_VOLUME_RATIO: f64 = 5.0;
/// Volume/liquidity below this means nobody is trading the pool
pub const DEFAULT_MIN_VOLUME_RATIO: f64 = 0.1;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;
pub const DEFAULT_EXTREME_MOVE_PCT: f64 = 50.0;
pub const DEFAULT_MAX_SPECIAL_CHARS: usize = 5;

/// Scam keywords and link-like names
pub const DEFAULT_SUSPICIOUS_PATTERNS: &[&str] = &[
    "SCAM", "RUG", "HONEYPOT", "TEST", "FAKE", "HACK", "EXPLOIT", "AIRDROP", "CLAIM", r"WWW\.", "HTTP",
    r"\.COM", r"\.NET",
];

const BASE_SCORE: f64 = 0.5;

#[derive(Error, Debug)]
pub enum RiskConfigError {
    #[error("Invalid suspicious pattern: {0}")]
    InvalidPattern(#[from] regex::Error),

    #[error("Invalid threshold: {0}")]
    InvalidThreshold(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RiskFlag {
    LowLiquidity,
    LowHolderCount,
    SuspiciousVolumeRatio,
    Blacklisted,
    PatternMatch,
    LowVolume,
    ExtremePriceMove,
}

impl RiskFlag {
    /// Hard flags reject regardless of score
    pub fn is_hard(&self) -> bool {
        matches!(self, RiskFlag::Blacklisted | RiskFlag::LowLiquidity)
    }

    /// Confidence deducted when this soft flag is raised
    fn penalty(&self) -> f64 {
        match self {
            RiskFlag::LowHolderCount => 0.15,
            RiskFlag::SuspiciousVolumeRatio => 0.20,
            RiskFlag::LowVolume => 0.10,
            RiskFlag::PatternMatch => 0.25,
            RiskFlag::ExtremePriceMove => 0.20,
            RiskFlag::LowLiquidity | RiskFlag::Blacklisted => 0.0,
        }
    }
}

/// Result of evaluating one candidate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RiskAssessment {
    pub asset_id: String,
    pub approve: bool,
    /// 0.0 - 1.0
    pub confidence: f64,
    pub flags: Vec<RiskFlag>,
}

impl RiskAssessment {
    pub fn has_flag(&self, flag: RiskFlag) -> bool {
        self.flags.contains(&flag)
    }

    pub fn is_hard_reject(&self) -> bool {
        self.flags.iter().any(RiskFlag::is_hard)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskThresholds {
    pub min_liquidity: f64,
    pub min_holders: u64,
    pub max_volume_ratio: f64,
    pub min_volume_ratio: f64,
    pub min_confidence: f64,
    pub extreme_move_pct: f64,
    /// Case-insensitive regexes matched against symbol and name
    pub suspicious_patterns: Vec<String>,
    /// Symbol and name together may carry at most this many punctuation
    /// or symbol characters (whitespace excluded)
    pub max_special_chars: usize,
    /// Assets exempt from pattern screening
    pub whitelist: Vec<String>,
}

impl Default for RiskThresholds {
    fn default() -> Self {
        Self {
            min_liquidity: DEFAULT_MIN_LIQUIDITY,
            min_holders: DEFAULT_MIN_HOLDERS,
            max_volume_ratio: DEFAULT_MAX_VOLUME_RATIO,
            min_volume_ratio: DEFAULT_MIN_VOLUME_RATIO,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            extreme_move_pct: DEFAULT_EXTREME_MOVE_PCT,
            suspicious_patterns: DEFAULT_SUSPICIOUS_PATTERNS.iter().map(|s| s.to_string()).collect(),
            max_special_chars: DEFAULT_MAX_SPECIAL_CHARS,
            whitelist: Vec::new(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct RiskEvaluator {
    thresholds: RiskThresholds,
    patterns: Option<RegexSet>,
    whitelist: HashSet<String>,
}

impl RiskEvaluator {
    pub fn new(thresholds: RiskThresholds) -> Result<Self, RiskConfigError> {
        if !(0.0..=1.0).contains(&thresholds.min_confidence) {
            return Err(RiskConfigError::InvalidThreshold(format!(
                "min_confidence must be 0-1, got {}",
                thresholds.min_confidence
            )));
        }
        if thresholds.min_liquidity < 0.0 {
            return Err(RiskConfigError::InvalidThreshold(format!(
                "min_liquidity must be >= 0, got {}",
                thresholds.min_liquidity
            )));
        }

        let patterns = if thresholds.suspicious_patterns.is_empty() {
            None
        } else {
            Some(
                RegexSetBuilder::new(&thresholds.suspicious_patterns)
                    .case_insensitive(true)
                    .build()?,
            )
        };
        let whitelist = thresholds.whitelist.iter().cloned().collect();

        Ok(Self {
            thresholds,
            patterns,
            whitelist,
        })
    }

    pub fn thresholds(&self) -> &RiskThresholds {
        &self.thresholds
    }

    /// Score a candidate. Never fails: rejection is a normal outcome.
    pub fn evaluate(&self, candidate: &Candidate, blacklist: &Blacklist, now: u64) -> RiskAssessment {
        let t = &self.thresholds;
        let mut flags = Vec::new();

        if blacklist.contains(&candidate.id, now) {
            flags.push(RiskFlag::Blacklisted);
        }
        if candidate.liquidity < t.min_liquidity {
            flags.push(RiskFlag::LowLiquidity);
        }
        if let Some(holders) = candidate.holder_count {
            if holders < t.min_holders {
                flags.push(RiskFlag::LowHolderCount);
            }
        }

        let ratio = candidate.volume_liquidity_ratio();
        if ratio > t.max_volume_ratio {
            flags.push(RiskFlag::SuspiciousVolumeRatio);
        } else if ratio < t.min_volume_ratio {
            flags.push(RiskFlag::LowVolume);
        }

        if candidate.price_change_pct.abs() > t.extreme_move_pct {
            flags.push(RiskFlag::ExtremePriceMove);
        }

        if !self.whitelist.contains(&candidate.id) && self.matches_pattern(candidate) {
            flags.push(RiskFlag::PatternMatch);
        }

        let confidence = self.score(candidate, &flags);
        let hard = flags.iter().any(RiskFlag::is_hard);
        let approve = !hard && confidence >= t.min_confidence;

        RiskAssessment {
            asset_id: candidate.id.clone(),
            approve,
            confidence,
            flags,
        }
    }

    fn matches_pattern(&self, candidate: &Candidate) -> bool {
        let listed = match &self.patterns {
            Some(set) => set.is_match(&candidate.symbol) || set.is_match(&candidate.name),
            None => false,
        };
        listed || special_chars(candidate) > self.thresholds.max_special_chars
    }

    fn score(&self, candidate: &Candidate, flags: &[RiskFlag]) -> f64 {
        let mut score = BASE_SCORE;

        score += match candidate.liquidity {
            l if l > 50_000.0 => 0.20,
            l if l > 25_000.0 => 0.15,
            l if l > 10_000.0 => 0.10,
            _ => 0.0,
        };

        score += match candidate.volume_24h {
            v if v > 20_000.0 => 0.15,
            v if v > 10_000.0 => 0.10,
            v if v > 5_000.0 => 0.05,
            _ => 0.0,
        };

        score += match candidate.holder_count {
            Some(h) if h > 500 => 0.10,
            Some(h) if h > 200 => 0.05,
            _ => 0.0,
        };

        if (2.0..=15.0).contains(&candidate.price_change_pct) {
            score += 0.05;
        }

        let penalty: f64 = flags.iter().map(RiskFlag::penalty).sum();
        (score - penalty).clamp(0.0, 1.0)
    }
}

fn special_chars(candidate: &Candidate) -> usize {
    candidate
        .symbol
        .chars()
        .chain(candidate.name.chars())
        .filter(|c| !c.is_alphanumeric() && !c.is_whitespace())
        .count()
}
