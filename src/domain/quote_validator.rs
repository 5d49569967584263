//! Quote Validator
//!
//! Checks router quotes against the slippage and price impact limits of an
//! order. A quote that fails here is never submitted and never retried.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::error::TradeError;
use super::order::{OrderConstraints, Side};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum QuoteError {
    #[error("Price impact {0:.2}% exceeds maximum {1:.2}%")]
    PriceImpactTooHigh(f64, f64),

    #[error("Slippage {0} bps exceeds maximum {1} bps")]
    SlippageTooHigh(u16, u16),

    #[error("Zero, negative or non-finite amounts in quote")]
    InvalidAmounts,

    #[error("Invalid quote: {0}")]
    InvalidQuote(String),
}

impl From<QuoteError> for TradeError {
    fn from(err: QuoteError) -> Self {
        TradeError::ValidationError(err.to_string())
    }
}

/// Router quote in UI units (not raw token units)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub input_asset: String,
    pub output_asset: String,
    pub in_amount: f64,
    pub out_amount: f64,
    /// Percent (1.5 = 1.5%)
    pub price_impact_pct: f64,
    /// Slippage the route is quoted with
    pub slippage_bps: u16,
    /// Human-readable route summary
    pub route_label: Option<String>,
    /// Opaque router payload needed to build the transaction
    #[serde(default)]
    pub route: serde_json::Value,
}

impl Quote {
    /// Base currency per asset unit for the given side.
    ///
    /// BUY spends base (input) for asset (output); SELL the reverse.
    pub fn price_for(&self, side: Side) -> Option<f64> {
        let (base, asset) = match side {
            Side::Buy => (self.in_amount, self.out_amount),
            Side::Sell => (self.out_amount, self.in_amount),
        };
        if asset > 0.0 && base.is_finite() && asset.is_finite() {
            Some(base / asset)
        } else {
            None
        }
    }
}

/// Outcome of a successful validation
#[derive(Debug, Clone, PartialEq)]
pub struct QuoteCheck {
    pub price_impact_pct: f64,
    pub slippage_bps: u16,
    /// Non-fatal issues, e.g. impact close to the limit
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuoteValidator {
    pub max_price_impact_pct: f64,
    pub max_slippage_bps: u16,
}

impl Default for QuoteValidator {
    fn default() -> Self {
        Self::from(&OrderConstraints::default())
    }
}

impl From<&OrderConstraints> for QuoteValidator {
    fn from(constraints: &OrderConstraints) -> Self {
        Self {
            max_price_impact_pct: constraints.max_price_impact_pct,
            max_slippage_bps: constraints.max_slippage_bps,
        }
    }
}

impl QuoteValidator {
    pub fn validate_quote(&self, quote: &Quote) -> Result<QuoteCheck, QuoteError> {
        if !(quote.in_amount.is_finite() && quote.out_amount.is_finite())
            || quote.in_amount <= 0.0
            || quote.out_amount <= 0.0
        {
            return Err(QuoteError::InvalidAmounts);
        }

        if !quote.price_impact_pct.is_finite() {
            return Err(QuoteError::InvalidQuote(format!(
                "price impact {}",
                quote.price_impact_pct
            )));
        }

        // Routers report impact with either sign
        let impact = quote.price_impact_pct.abs();
        if impact > self.max_price_impact_pct {
            return Err(QuoteError::PriceImpactTooHigh(impact, self.max_price_impact_pct));
        }

        if quote.slippage_bps > self.max_slippage_bps {
            return Err(QuoteError::SlippageTooHigh(
                quote.slippage_bps,
                self.max_slippage_bps,
            ));
        }

        let mut warnings = Vec::new();
        if impact > self.max_price_impact_pct * 0.75 {
            warnings.push(format!(
                "Price impact {:.2}% approaching limit {:.2}%",
                impact, self.max_price_impact_pct
            ));
        }

        Ok(QuoteCheck {
            price_impact_pct: impact,
            slippage_bps: quote.slippage_bps,
            warnings,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_quote() -> Quote {
        Quote {
            input_asset: "So11111111111111111111111111111111111111112".to_string(),
            output_asset: "MintAAA".to_string(),
            in_amount: 0.1,
            out_amount: 10_000.0,
            price_impact_pct: 0.5,
            slippage_bps: 50,
            route_label: Some("Raydium".to_string()),
            route: serde_json::Value::Null,
        }
    }

    #[test]
    fn test_valid_quote() {
        let validator = QuoteValidator::default();
        let check = validator.validate_quote(&create_test_quote()).unwrap();
        assert!(check.warnings.is_empty());
    }

    #[test]
    fn test_price_impact_too_high() {
        let validator = QuoteValidator::from(&OrderConstraints {
            max_slippage_bps: 50,
            max_price_impact_pct: 5.0,
        });
        let mut quote = create_test_quote();
        quote.price_impact_pct = 6.0;

        let result = validator.validate_quote(&quote);
        assert_eq!(result, Err(QuoteError::PriceImpactTooHigh(6.0, 5.0)));
    }

    #[test]
    fn test_negative_impact_uses_magnitude() {
        let validator = QuoteValidator::default();
        let mut quote = create_test_quote();
        quote.price_impact_pct = -7.0;
        assert!(matches!(
            validator.validate_quote(&quote),
            Err(QuoteError::PriceImpactTooHigh(_, _))
        ));
    }

    #[test]
    fn test_slippage_too_high() {
        let validator = QuoteValidator::default();
        let mut quote = create_test_quote();
        quote.slippage_bps = 300;
        assert_eq!(
            validator.validate_quote(&quote),
            Err(QuoteError::SlippageTooHigh(300, 50))
        );
    }

    #[test]
    fn test_invalid_amounts() {
        let validator = QuoteValidator::default();
        let mut quote = create_test_quote();
        quote.out_amount = 0.0;
        assert_eq!(validator.validate_quote(&quote), Err(QuoteError::InvalidAmounts));

        quote.out_amount = f64::NAN;
        assert_eq!(validator.validate_quote(&quote), Err(QuoteError::InvalidAmounts));
    }

    #[test]
    fn test_near_limit_warning() {
        let validator = QuoteValidator::default();
        let mut quote = create_test_quote();
        quote.price_impact_pct = 4.5;
        let check = validator.validate_quote(&quote).unwrap();
        assert_eq!(check.warnings.len(), 1);
    }

    #[test]
    fn test_price_for_side() {
        let quote = create_test_quote();
        assert!((quote.price_for(Side::Buy).unwrap() - 0.000_01).abs() < 1e-15);

        let sell = Quote {
            in_amount: 10_000.0,
            out_amount: 0.12,
            ..create_test_quote()
        };
        assert!((sell.price_for(Side::Sell).unwrap() - 0.000_012).abs() < 1e-15);
    }

    #[test]
    fn test_maps_to_validation_error() {
        let err: TradeError = QuoteError::PriceImpactTooHigh(6.0, 5.0).into();
        assert!(matches!(err, TradeError::ValidationError(_)));
        assert!(!err.is_retryable());
    }
}
