//! Net spread calculation with staleness guard
//!
//! raw = (price_b - price_a) / price_a * 100
//! net = raw with (fee_a + fee_b) * 100 removed from its magnitude

use super::types::{InvalidReason, Spread};
use crate::feed::PriceQuote;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;

/// Configuration for spread calculation
#[derive(Debug, Clone)]
pub struct SpreadConfig {
    /// Venue A fee as a fraction (0.0002 = 0.02%)
    pub fee_rate_a: Decimal,
    /// Venue B fee as a fraction
    pub fee_rate_b: Decimal,
    /// Quotes older than this are rejected
    pub max_price_age: Duration,
}

/// Computes the capturable spread between venue A and venue B
#[derive(Debug, Clone)]
pub struct SpreadCalculator {
    config: SpreadConfig,
}

impl SpreadCalculator {
    pub fn new(config: SpreadConfig) -> Self {
        Self { config }
    }

    /// Combined fees in percent
    pub fn fee_percent(&self) -> Decimal {
        (self.config.fee_rate_a + self.config.fee_rate_b) * Decimal::ONE_HUNDRED
    }

    pub fn config(&self) -> &SpreadConfig {
        &self.config
    }

    /// Compute the spread for one symbol at evaluation time `now`.
    ///
    /// Returns `valid = false` if either quote is older than the maximum
    /// age, whatever the prices are.
    pub fn compute(&self, quote_a: &PriceQuote, quote_b: &PriceQuote, now: DateTime<Utc>) -> Spread {
        let raw = (quote_b.price - quote_a.price) / quote_a.price * Decimal::ONE_HUNDRED;
        let net = net_of_fees(raw, self.fee_percent());

        let invalid_reason = if quote_a.symbol != quote_b.symbol {
            Some(InvalidReason::SymbolMismatch)
        } else {
            [quote_a, quote_b]
                .into_iter()
                .find(|q| q.age(now) > self.config.max_price_age)
                .map(|q| InvalidReason::StaleQuote {
                    venue: q.venue,
                    age_ms: q.age(now).num_milliseconds(),
                })
        };

        if let Some(ref reason) = invalid_reason {
            tracing::debug!(symbol = %quote_a.symbol, ?reason, "Spread rejected");
        }

        Spread {
            symbol: quote_a.symbol.clone(),
            price_a: quote_a.price,
            price_b: quote_b.price,
            raw_spread_percent: raw,
            net_spread_percent: net,
            computed_at: now,
            valid: invalid_reason.is_none(),
            invalid_reason,
        }
    }
}

/// Shrink the raw spread's magnitude by the fees; clamps to zero when fees
/// exceed the raw difference.
fn net_of_fees(raw: Decimal, fee_percent: Decimal) -> Decimal {
    if raw > fee_percent {
        raw - fee_percent
    } else if raw < -fee_percent {
        raw + fee_percent
    } else {
        Decimal::ZERO
    }
}
