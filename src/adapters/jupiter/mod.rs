//! Jupiter Adapter
//!
//! Swap routing through the Jupiter aggregator: quotes, transaction
//! building, and submission/confirmation over Solana RPC.

mod client;
mod quote;
mod router;
mod swap;

pub use client::{JupiterClient, JupiterConfig};
pub use quote::{JupiterQuoteRequest, QuoteResponse};
pub use router::{quote_from_response, to_raw, to_ui, JupiterRouter};
pub use swap::{SwapRequest, SwapResponse};
