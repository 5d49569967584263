//! Persistence Adapters

mod json_store;

pub use json_store::{JsonStore, BLACKLIST_FILE, POSITIONS_FILE, TRADE_LOG_FILE};
