//! Price feed module
//!
//! Polls the perpetual-futures venue and the DEX aggregator and keeps the
//! latest quote per (symbol, venue)

mod dexscreener;
mod mexc;
mod store;
mod types;

pub use dexscreener::{DexScreenerConfig, DexScreenerSource, DEXSCREENER_API_URL};
pub use mexc::{MexcSource, MEXC_CONTRACT_API_URL};
pub use store::{FeedStatus, PriceFeed};
pub use types::{FeedError, PriceQuote, Venue};

use crate::symbol::Symbol;
use async_trait::async_trait;

/// Trait for price source implementations
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Venue this source quotes
    fn venue(&self) -> Venue;
    /// Fetch the current price for one symbol
    async fn poll(&self, symbol: &Symbol) -> Result<PriceQuote, FeedError>;
}
