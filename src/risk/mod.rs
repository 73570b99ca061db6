//! Risk management module
//!
//! Position admission, lifecycle, forced exits and loss limits

mod limits;
mod position;
mod stats;
mod types;

pub use limits::{HaltReason, LossMonitor, RiskLimits};
pub use position::{
    ClosedPosition, CloseRetry, ForcedClose, Position, PositionId, PositionManager, PositionStatus,
};
pub use stats::SessionStats;
pub use types::{CloseReason, RiskError};
