//! Signal types

use crate::feed::Venue;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Which leg is bought and which is sold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Venue A is cheaper: long the perpetual, short the DEX leg
    LongAShortB,
    /// Venue B is cheaper: long the DEX leg, short the perpetual
    LongBShortA,
}

impl Direction {
    /// Direction implied by a net spread; None for exactly zero
    pub fn from_spread(net_spread_percent: Decimal) -> Option<Self> {
        if net_spread_percent > Decimal::ZERO {
            Some(Direction::LongAShortB)
        } else if net_spread_percent < Decimal::ZERO {
            Some(Direction::LongBShortA)
        } else {
            None
        }
    }

    /// +1 when profiting from a falling spread, -1 when profiting from a rising one
    pub fn sign(&self) -> Decimal {
        match self {
            Direction::LongAShortB => Decimal::ONE,
            Direction::LongBShortA => Decimal::NEGATIVE_ONE,
        }
    }
}

/// Why a spread cannot be traded on
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvalidReason {
    /// A quote is older than the configured maximum age
    StaleQuote { venue: Venue, age_ms: i64 },
    /// The two quotes are for different symbols
    SymbolMismatch,
}

/// Net spread between the two venues for one symbol, recomputed every tick
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Spread {
    pub symbol: Symbol,
    /// Venue A (perpetual) price
    pub price_a: Decimal,
    /// Venue B (DEX) price
    pub price_b: Decimal,
    /// `(price_b - price_a) / price_a * 100`
    pub raw_spread_percent: Decimal,
    /// Raw spread with both venues' fees taken out of its magnitude
    pub net_spread_percent: Decimal,
    pub computed_at: DateTime<Utc>,
    pub valid: bool,
    pub invalid_reason: Option<InvalidReason>,
}

impl Spread {
    /// Candidate trade direction; None for an invalid or zero spread
    pub fn direction(&self) -> Option<Direction> {
        if !self.valid {
            return None;
        }
        Direction::from_spread(self.net_spread_percent)
    }

    pub fn magnitude(&self) -> Decimal {
        self.net_spread_percent.abs()
    }
}
