//! Ports Layer - Trait definitions for external collaborators
//!
//! Following hexagonal architecture, these traits abstract:
//! - Candidate discovery and price lookups
//! - The swap router (quote, build, submit, confirm)
//! - The wallet (signing and balances)
//! - Operator notifications and persistence
//!
//! All are held as `Arc<dyn Trait>` by the application layer.

pub mod execution;
pub mod market_data;
pub mod mocks;
pub mod notifier;
pub mod persistence;
pub mod wallet;

pub use execution::{
    ConfirmationStatus, ExecutedAmounts, QuoteExecuteService, QuoteRequest, RouterError,
    SignedTransaction, UnsignedTransaction,
};
pub use market_data::{MarketDataError, MarketDataSource};
pub use notifier::{Notifier, TradeEvent};
pub use persistence::{Persistence, PersistenceError, TradeLogEntry};
pub use wallet::{SimulatedFill, Wallet, WalletError};

#[cfg(test)]
pub use execution::MockQuoteExecuteService;
#[cfg(test)]
pub use market_data::MockMarketDataSource;
#[cfg(test)]
pub use notifier::MockNotifier;
#[cfg(test)]
pub use persistence::MockPersistence;
#[cfg(test)]
pub use wallet::MockWallet;
