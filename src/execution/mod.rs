//! Execution engine module
//!
//! Order submission for both legs of a position (paper mode built in)

mod paper;
mod types;

pub use paper::{PaperEngine, PaperOrder, PaperOrderKind};
pub use types::{Confirmation, ExecutionError, ExecutionOutcome, ExecutionRequest, OpenOrder};

use crate::risk::PositionId;
use async_trait::async_trait;

/// Trait for execution engine implementations
#[async_trait]
pub trait ExecutionEngine: Send + Sync {
    /// Open both legs of a position
    async fn submit_open(&self, order: &OpenOrder) -> Result<Confirmation, ExecutionError>;
    /// Close both legs of a position
    async fn submit_close(&self, position_id: PositionId) -> Result<Confirmation, ExecutionError>;
}
