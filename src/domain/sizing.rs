//! Position sizing for approved candidates.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AllocationPolicy {
    /// Same base amount for every buy
    Fixed { amount: f64 },
    /// `min` at `min_confidence`, rising linearly to `max` at confidence 1.0
    ConfidenceWeighted {
        min: f64,
        max: f64,
        min_confidence: f64,
    },
}

impl Default for AllocationPolicy {
    fn default() -> Self {
        AllocationPolicy::ConfidenceWeighted {
            min: 0.1,
            max: 0.15,
            min_confidence: 0.7,
        }
    }
}

impl AllocationPolicy {
    /// Smallest order the policy is willing to place
    pub fn minimum(&self) -> f64 {
        match *self {
            AllocationPolicy::Fixed { amount } => amount,
            AllocationPolicy::ConfidenceWeighted { min, .. } => min,
        }
    }

    /// Uncapped size for a confidence score
    pub fn target(&self, confidence: f64) -> f64 {
        match *self {
            AllocationPolicy::Fixed { amount } => amount,
            AllocationPolicy::ConfidenceWeighted {
                min,
                max,
                min_confidence,
            } => {
                if min_confidence >= 1.0 {
                    return max;
                }
                let t = ((confidence - min_confidence) / (1.0 - min_confidence)).clamp(0.0, 1.0);
                min + (max - min) * t
            }
        }
    }

    /// Order size given the spendable balance (balance minus fee reserve).
    ///
    /// Returns `None` when the capped size falls below the policy minimum.
    pub fn size(&self, confidence: f64, spendable: f64) -> Option<f64> {
        let size = self.target(confidence).min(spendable);
        if size.is_finite() && size > 0.0 && size >= self.minimum() {
            Some(size)
        } else {
            None
        }
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            AllocationPolicy::Fixed { amount } => {
                if !(amount.is_finite() && amount > 0.0) {
                    return Err(format!("fixed amount must be > 0, got {}", amount));
                }
            }
            AllocationPolicy::ConfidenceWeighted {
                min,
                max,
                min_confidence,
            } => {
                if !(min.is_finite() && max.is_finite() && min > 0.0 && max >= min) {
                    return Err(format!("need 0 < min <= max, got min={} max={}", min, max));
                }
                if !(0.0..=1.0).contains(&min_confidence) {
                    return Err(format!("min_confidence must be in [0, 1], got {}", min_confidence));
                }
            }
        }
        Ok(())
    }
}
