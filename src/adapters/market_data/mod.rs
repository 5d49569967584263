//! Market Data Adapters
//!
//! - `DexScreenerSource`: pair search for discovery, SOL-quoted prices for
//!   monitoring
//! - `ScriptedMarket` (in `ports::mocks`) stands in for it in tests

mod dexscreener;

pub use dexscreener::{parse_candidates, parse_price, DexScreenerConfig, DexScreenerSource};
