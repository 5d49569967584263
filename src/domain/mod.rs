//! Domain Layer - Core trading logic for Tradewind
//!
//! Pure types and decision logic with no I/O. All external interactions
//! happen through the ports layer.
//!
//! - `risk`: candidate scoring and approval
//! - `exit_rules`: priority-ordered exit checks for open positions
//! - `quote_validator`: slippage / price impact limits on router quotes
//! - `trading_state`: admission counters and the kill switch flag
//! - `error_window`: sliding API error window behind the kill switch

pub mod backoff;
pub mod blacklist;
pub mod candidate;
pub mod error;
pub mod error_window;
pub mod exit_rules;
pub mod order;
pub mod position;
pub mod quote_validator;
pub mod risk;
pub mod sizing;
pub mod trading_state;

pub use backoff::{BackoffPolicy, ExponentialBackoff, NoBackoff};
pub use blacklist::{Blacklist, BlacklistEntry, DEFAULT_BLACKLIST_SECS};
pub use candidate::{Candidate, CandidateError, CandidateRecord};
pub use error::TradeError;
pub use error_window::{ErrorSource, ErrorWindow, ErrorWindowState};
pub use exit_rules::{observe_and_evaluate, ExitReason, ExitRule, Verdict};
pub use order::{OrderConstraints, OrderRequest, OrderResult, OrderStatus, Side};
pub use position::{ClosedTrade, ExitParams, Position, PositionError, PositionState, PriceObservation};
pub use quote_validator::{Quote, QuoteCheck, QuoteError, QuoteValidator};
pub use risk::{RiskAssessment, RiskConfigError, RiskEvaluator, RiskFlag, RiskThresholds};
pub use sizing::AllocationPolicy;
pub use trading_state::{AdmissionDenied, Reservation, SessionStats, TradingCounters, TradingState};
