//! Adapters Layer - External System Implementations
//!
//! This module contains implementations of the port traits:
//! - Jupiter: swap router over the Jupiter API
//! - Solana: RPC client, keypair wallet and the demo paper wallet
//! - Market Data: DexScreener discovery and prices
//! - Notify: log and webhook alerts
//! - Persistence: JSON trade log and snapshots
//! - CLI: command-line arguments

pub mod cli;
pub mod jupiter;
pub mod market_data;
pub mod notify;
pub mod persistence;
pub mod solana;

pub use cli::CliApp;
pub use jupiter::{JupiterClient, JupiterRouter};
pub use market_data::DexScreenerSource;
pub use notify::{FanoutNotifier, LogNotifier, WebhookNotifier};
pub use persistence::JsonStore;
pub use solana::{KeypairWallet, PaperWallet, SolanaClient};
