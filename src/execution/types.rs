//! Execution types

use crate::risk::PositionId;
use crate::signal::Direction;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Execution errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExecutionError {
    /// Exchange refused the order
    #[error("order rejected: {0}")]
    Rejected(String),
    /// No confirmation within the allowed time
    #[error("no confirmation after {0}s")]
    Timeout(u64),
    /// Could not reach the exchange
    #[error("transport error: {0}")]
    Transport(String),
}

/// Order opening both legs of a position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenOrder {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub direction: Direction,
    /// Notional in quote currency
    pub size: Decimal,
    pub leverage: u32,
}

/// Work queued by the position manager for the execution engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExecutionRequest {
    Open(OpenOrder),
    Close {
        position_id: PositionId,
        symbol: Symbol,
    },
}

impl ExecutionRequest {
    pub fn position_id(&self) -> PositionId {
        match self {
            ExecutionRequest::Open(order) => order.position_id,
            ExecutionRequest::Close { position_id, .. } => *position_id,
        }
    }

    pub fn symbol(&self) -> &Symbol {
        match self {
            ExecutionRequest::Open(order) => &order.symbol,
            ExecutionRequest::Close { symbol, .. } => symbol,
        }
    }

    pub fn is_close(&self) -> bool {
        matches!(self, ExecutionRequest::Close { .. })
    }
}

/// Exchange-side acknowledgement
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Confirmation {
    pub position_id: PositionId,
    /// Exchange order reference
    pub order_ref: String,
    pub confirmed_at: DateTime<Utc>,
}

/// Result of dispatching one request
#[derive(Debug, Clone)]
pub struct ExecutionOutcome {
    pub request: ExecutionRequest,
    pub result: Result<Confirmation, ExecutionError>,
}
