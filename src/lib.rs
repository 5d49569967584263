//! Tradewind - autonomous Solana swap agent
//!
//! Scores candidate assets, buys approved ones through a swap router and
//! manages exits with priority-ordered rules, behind a kill switch.
//!
//! # Modules
//!
//! - `domain`: Pure trading rules (risk scoring, exit rules, quote checks, counters)
//! - `ports`: Trait abstractions (market data, router, wallet, notifier, persistence)
//! - `application`: Order executor, position manager, trading loop, safety monitor
//! - `adapters`: External implementations (Jupiter, Solana, DexScreener, webhooks, JSON store, CLI)
//! - `config`: Configuration loading and validation

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
