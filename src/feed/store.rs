//! Per-venue price store with failure accounting

use super::{FeedError, PriceQuote, PriceSource, Venue};
use crate::symbol::Symbol;
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;

/// Point-in-time view of a feed's health
#[derive(Debug, Clone, Serialize)]
pub struct FeedStatus {
    pub venue: Venue,
    pub healthy: bool,
    pub last_success_at: Option<DateTime<Utc>>,
    pub consecutive_failures: u32,
    pub total_failures: u64,
    pub symbols_quoted: usize,
}

/// Latest quote per symbol for one venue.
///
/// Successful polls overwrite the slot for their symbol. Failed polls leave
/// the previous quote in place so callers can apply their own staleness
/// policy, and bump the failure counters used to decide when the
/// connection should be recycled.
pub struct PriceFeed {
    venue: Venue,
    source: Arc<dyn PriceSource>,
    quotes: HashMap<Symbol, PriceQuote>,
    last_success_at: Option<DateTime<Utc>>,
    consecutive_failures: u32,
    total_failures: u64,
    reconnect_attempts: u32,
    poll_interval: Duration,
}

impl PriceFeed {
    /// Create a feed around a price source
    pub fn new(source: Arc<dyn PriceSource>, reconnect_attempts: u32, poll_interval: Duration) -> Self {
        Self {
            venue: source.venue(),
            source,
            quotes: HashMap::new(),
            last_success_at: None,
            consecutive_failures: 0,
            total_failures: 0,
            reconnect_attempts,
            poll_interval,
        }
    }

    pub fn venue(&self) -> Venue {
        self.venue
    }

    /// Handle to the underlying source, for concurrent polling
    pub fn source(&self) -> Arc<dyn PriceSource> {
        Arc::clone(&self.source)
    }

    /// Most recent quote for a symbol, stale or not
    pub fn latest(&self, symbol: &Symbol) -> Result<&PriceQuote, FeedError> {
        self.quotes.get(symbol).ok_or_else(|| FeedError::Unavailable {
            symbol: symbol.clone(),
            venue: self.venue,
        })
    }

    /// Apply the outcome of one poll
    pub fn record(&mut self, symbol: &Symbol, result: Result<PriceQuote, FeedError>, now: DateTime<Utc>) {
        match result {
            Ok(quote) => self.record_success(quote, now),
            Err(e) => self.record_failure(symbol, &e),
        }
    }

    /// Store a fresh quote and reset the consecutive failure count
    pub fn record_success(&mut self, quote: PriceQuote, now: DateTime<Utc>) {
        if quote.venue != self.venue {
            tracing::warn!(
                expected = %self.venue,
                got = %quote.venue,
                symbol = %quote.symbol,
                "Dropping quote from the wrong venue"
            );
            return;
        }
        self.consecutive_failures = 0;
        self.last_success_at = Some(now);
        self.quotes.insert(quote.symbol.clone(), quote);
    }

    /// Count a failed poll; the previous quote is retained
    pub fn record_failure(&mut self, symbol: &Symbol, error: &FeedError) {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.total_failures += 1;
        tracing::debug!(
            venue = %self.venue,
            symbol = %symbol,
            error = %error,
            consecutive_failures = self.consecutive_failures,
            "Price poll failed"
        );
    }

    /// Window within which a successful poll must have happened.
    /// Scales with the number of tolerated reconnect attempts.
    pub fn health_window(&self) -> Duration {
        let polls = i32::try_from(self.reconnect_attempts)
            .unwrap_or(i32::MAX)
            .saturating_add(1);
        self.poll_interval.checked_mul(polls).unwrap_or(Duration::MAX)
    }

    /// True iff a poll succeeded within the health window
    pub fn is_healthy(&self, now: DateTime<Utc>) -> bool {
        match self.last_success_at {
            Some(at) => now - at <= self.health_window(),
            None => false,
        }
    }

    /// True once failures exceed the tolerated reconnect attempts
    pub fn needs_reconnect(&self) -> bool {
        self.consecutive_failures > self.reconnect_attempts
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn total_failures(&self) -> u64 {
        self.total_failures
    }

    pub fn last_success_at(&self) -> Option<DateTime<Utc>> {
        self.last_success_at
    }

    pub fn status(&self, now: DateTime<Utc>) -> FeedStatus {
        FeedStatus {
            venue: self.venue,
            healthy: self.is_healthy(now),
            last_success_at: self.last_success_at,
            consecutive_failures: self.consecutive_failures,
            total_failures: self.total_failures,
            symbols_quoted: self.quotes.len(),
        }
    }
}
