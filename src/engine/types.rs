//! Loop settings and per-tick reports

use crate::config::Config;
use crate::feed::{FeedStatus, Venue};
use crate::risk::{ClosedPosition, CloseRetry, ForcedClose};
use crate::signal::{Decision, Spread};
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::time::Duration;

/// Scheduling and execution settings for the arbitrage loop
#[derive(Debug, Clone)]
pub struct LoopSettings {
    pub symbols: Vec<Symbol>,
    pub tick_interval: Duration,
    pub health_interval: Duration,
    /// Upper bound on a single price poll
    pub poll_timeout: Duration,
    pub max_concurrent_polls: usize,
    /// How long to wait for an execution confirmation
    pub confirm_timeout: Duration,
    pub snapshot_dir: PathBuf,
}

impl LoopSettings {
    pub fn from_config(config: &Config) -> Self {
        let tick_interval = Duration::from_secs(config.monitoring.price_update_interval_secs);
        Self {
            symbols: config.trading.symbols.clone(),
            tick_interval,
            health_interval: Duration::from_secs(config.monitoring.health_check_interval_secs),
            poll_timeout: tick_interval,
            max_concurrent_polls: config.monitoring.max_concurrent_polls,
            confirm_timeout: Duration::from_secs(config.execution.confirm_timeout_secs),
            snapshot_dir: config.execution.snapshot_dir.clone(),
        }
    }
}

/// What happened during one tick
#[derive(Debug, Clone)]
pub struct TickReport {
    pub at: DateTime<Utc>,
    /// Spreads computed this tick, valid or not
    pub spreads: Vec<Spread>,
    /// Symbols skipped because a venue never quoted them
    pub skipped: Vec<Symbol>,
    /// Forced exits from the risk sweep
    pub forced: Vec<ForcedClose>,
    /// Closes re-submitted after a failure or timeout
    pub retries: Vec<CloseRetry>,
    pub decisions: Vec<(Symbol, Decision)>,
    /// Positions finalized from execution outcomes drained this tick
    pub closed: Vec<ClosedPosition>,
    /// Execution requests handed to the engine
    pub dispatched: usize,
}

impl TickReport {
    pub(crate) fn new(at: DateTime<Utc>) -> Self {
        Self {
            at,
            spreads: vec![],
            skipped: vec![],
            forced: vec![],
            retries: vec![],
            decisions: vec![],
            closed: vec![],
            dispatched: 0,
        }
    }

    /// Decision taken for a symbol this tick
    pub fn decision(&self, symbol: &Symbol) -> Option<&Decision> {
        self.decisions.iter().find(|(s, _)| s == symbol).map(|(_, d)| d)
    }

    pub fn spread(&self, symbol: &Symbol) -> Option<&Spread> {
        self.spreads.iter().find(|s| &s.symbol == symbol)
    }
}

/// Result of a health check
#[derive(Debug, Clone)]
pub struct HealthReport {
    pub feeds: Vec<FeedStatus>,
    /// Feeds that went from healthy to degraded on this check
    pub degraded: Vec<Venue>,
    /// Feeds that went from degraded to healthy on this check
    pub recovered: Vec<Venue>,
}

impl HealthReport {
    pub fn all_healthy(&self) -> bool {
        self.feeds.iter().all(|f| f.healthy)
    }
}
