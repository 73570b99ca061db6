//! Price feed types

use crate::symbol::Symbol;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// One of the two venues being compared
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Venue {
    /// Venue A: centralized-exchange perpetual futures
    Cex,
    /// Venue B: DEX aggregator
    Dex,
}

impl Venue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Venue::Cex => "cex",
            Venue::Dex => "dex",
        }
    }
}

impl fmt::Display for Venue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Price feed errors
#[derive(Debug, Error)]
pub enum FeedError {
    /// No quote has ever been received for this symbol
    #[error("no {venue} quote available for {symbol}")]
    Unavailable { symbol: Symbol, venue: Venue },
    /// Underlying HTTP transport failed
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    /// Venue answered with a non-success status
    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
    /// Venue answered but had no usable price for the symbol
    #[error("no price for {0}")]
    NoPrice(Symbol),
    /// Price was zero or negative
    #[error("invalid price {0}")]
    InvalidPrice(Decimal),
    /// Poll did not finish in time
    #[error("poll timed out")]
    Timeout,
}

/// Latest observed price for a symbol on one venue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceQuote {
    pub symbol: Symbol,
    pub venue: Venue,
    /// Always positive
    pub price: Decimal,
    pub observed_at: DateTime<Utc>,
}

impl PriceQuote {
    /// Build a quote, rejecting non-positive prices
    pub fn new(
        symbol: Symbol,
        venue: Venue,
        price: Decimal,
        observed_at: DateTime<Utc>,
    ) -> Result<Self, FeedError> {
        if price <= Decimal::ZERO {
            return Err(FeedError::InvalidPrice(price));
        }
        Ok(Self {
            symbol,
            venue,
            price,
            observed_at,
        })
    }

    /// Age relative to `now`. Quotes stamped in the future have zero age.
    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        (now - self.observed_at).max(Duration::zero())
    }
}
