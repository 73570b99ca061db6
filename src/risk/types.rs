//! Risk management types

use super::{HaltReason, PositionId};
use crate::symbol::Symbol;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Admission and lifecycle refusals
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RiskError {
    /// Maximum concurrent positions reached
    #[error("maximum positions reached ({open}/{max})")]
    LimitReached { open: usize, max: usize },
    /// Symbol already has a live position
    #[error("position already open for {0}")]
    AlreadyOpen(Symbol),
    /// Symbol has no open position to close
    #[error("no open position for {0}")]
    NotOpen(Symbol),
    /// Position is retired or already closing
    #[error("position {0} is not open")]
    PositionNotOpen(PositionId),
    /// Entry requested on an invalid spread
    #[error("spread for {0} is not valid")]
    InvalidSpread(Symbol),
    /// Trading has been halted by a loss limit
    #[error("trading halted: {0:?}")]
    TradingHalted(HaltReason),
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CloseReason {
    /// Spread narrowed to the exit threshold
    TargetReached,
    /// Held for the maximum allowed time
    MaxTime,
    /// Unrealized loss hit the stop, or no fresh price for too long
    StopLoss,
    /// Unrealized profit hit the take-profit level
    TakeProfit,
    /// The exchange rejected the opening order
    ExecutionFailed,
}

impl CloseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::TargetReached => "target_reached",
            CloseReason::MaxTime => "max_time",
            CloseReason::StopLoss => "stop_loss",
            CloseReason::TakeProfit => "take_profit",
            CloseReason::ExecutionFailed => "execution_failed",
        }
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
