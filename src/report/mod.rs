//! Reporting sink
//!
//! The engine emits structured events; sinks decide what to do with them.

mod snapshot;

pub use snapshot::{SessionSnapshot, SNAPSHOT_PREFIX};

use crate::execution::ExecutionError;
use crate::feed::{FeedStatus, Venue};
use crate::risk::{CloseReason, Position, PositionId, RiskError};
use crate::signal::Direction;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use tokio::sync::mpsc;

/// Events emitted by the arbitrage loop
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    OpportunityDetected {
        symbol: Symbol,
        direction: Direction,
        net_spread_percent: Decimal,
        at: DateTime<Utc>,
    },
    PositionOpened {
        position_id: PositionId,
        symbol: Symbol,
        direction: Direction,
        entry_spread_percent: Decimal,
        size: Decimal,
        leverage: u32,
        at: DateTime<Utc>,
    },
    /// Close intent recorded; the position is CLOSING
    CloseRequested {
        position_id: PositionId,
        symbol: Symbol,
        reason: CloseReason,
        attempt: u32,
        at: DateTime<Utc>,
    },
    PositionClosed {
        position_id: PositionId,
        symbol: Symbol,
        reason: CloseReason,
        realized_pnl_percent: Decimal,
        realized_pnl: Decimal,
        held_secs: i64,
        at: DateTime<Utc>,
    },
    FeedDegraded {
        venue: Venue,
        status: FeedStatus,
    },
    FeedRecovered {
        venue: Venue,
        status: FeedStatus,
    },
    AdmissionRefused {
        symbol: Symbol,
        reason: String,
        at: DateTime<Utc>,
    },
    /// No confirmation in time; the request will be retried
    ExecutionTimeout {
        position_id: PositionId,
        symbol: Symbol,
        closing: bool,
        at: DateTime<Utc>,
    },
    ExecutionFailed {
        position_id: PositionId,
        symbol: Symbol,
        closing: bool,
        error: String,
        at: DateTime<Utc>,
    },
    /// Live positions handed off at shutdown
    OpenPositionsAtShutdown {
        positions: Vec<Position>,
        at: DateTime<Utc>,
    },
}

impl EngineEvent {
    /// Event name as used in logs and serialized output
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::OpportunityDetected { .. } => "opportunity_detected",
            EngineEvent::PositionOpened { .. } => "position_opened",
            EngineEvent::CloseRequested { .. } => "close_requested",
            EngineEvent::PositionClosed { .. } => "position_closed",
            EngineEvent::FeedDegraded { .. } => "feed_degraded",
            EngineEvent::FeedRecovered { .. } => "feed_recovered",
            EngineEvent::AdmissionRefused { .. } => "admission_refused",
            EngineEvent::ExecutionTimeout { .. } => "execution_timeout",
            EngineEvent::ExecutionFailed { .. } => "execution_failed",
            EngineEvent::OpenPositionsAtShutdown { .. } => "open_positions_at_shutdown",
        }
    }

    pub(crate) fn refused(symbol: &Symbol, err: &RiskError, at: DateTime<Utc>) -> Self {
        EngineEvent::AdmissionRefused {
            symbol: symbol.clone(),
            reason: err.to_string(),
            at,
        }
    }

    pub(crate) fn execution_error(
        position_id: PositionId,
        symbol: &Symbol,
        closing: bool,
        err: &ExecutionError,
        at: DateTime<Utc>,
    ) -> Self {
        match err {
            ExecutionError::Timeout(_) => EngineEvent::ExecutionTimeout {
                position_id,
                symbol: symbol.clone(),
                closing,
                at,
            },
            other => EngineEvent::ExecutionFailed {
                position_id,
                symbol: symbol.clone(),
                closing,
                error: other.to_string(),
                at,
            },
        }
    }
}

/// Consumer of engine events
pub trait ReportSink: Send + Sync {
    fn emit(&self, event: EngineEvent);
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ReportSink for TracingSink {
    fn emit(&self, event: EngineEvent) {
        match &event {
            EngineEvent::FeedDegraded { venue, status } => {
                tracing::warn!(
                    venue = %venue,
                    consecutive_failures = status.consecutive_failures,
                    "Feed degraded"
                );
            }
            EngineEvent::FeedRecovered { venue, .. } => {
                tracing::info!(venue = %venue, "Feed recovered");
            }
            EngineEvent::ExecutionTimeout { position_id, symbol, closing, .. } => {
                tracing::warn!(
                    position_id = %position_id,
                    symbol = %symbol,
                    closing,
                    "Execution confirmation timed out, reconciliation required"
                );
            }
            EngineEvent::ExecutionFailed { position_id, symbol, error, .. } => {
                tracing::warn!(position_id = %position_id, symbol = %symbol, error = %error, "Execution failed");
            }
            EngineEvent::OpenPositionsAtShutdown { positions, .. } => {
                for position in positions {
                    tracing::warn!(
                        position_id = %position.id,
                        symbol = %position.symbol,
                        status = ?position.status,
                        entry_spread = %position.entry_spread_percent,
                        "Position still live at shutdown"
                    );
                }
            }
            other => match serde_json::to_string(other) {
                Ok(json) => tracing::info!(event = other.name(), payload = %json, "Engine event"),
                Err(_) => tracing::info!(event = other.name(), "Engine event"),
            },
        }
    }
}

/// Forwards events over an unbounded channel
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl ReportSink for ChannelSink {
    fn emit(&self, event: EngineEvent) {
        // receiver gone means nobody is listening any more
        let _ = self.tx.send(event);
    }
}
