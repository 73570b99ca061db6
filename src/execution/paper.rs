//! Paper trading execution engine

use super::{Confirmation, ExecutionEngine, ExecutionError, OpenOrder};
use crate::risk::PositionId;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaperOrderKind {
    Open,
    Close,
}

/// A simulated order as recorded by the paper engine
#[derive(Debug, Clone, Serialize)]
pub struct PaperOrder {
    pub order_ref: String,
    pub kind: PaperOrderKind,
    pub position_id: PositionId,
    pub notional: Decimal,
    /// Fees charged on both legs
    pub fees: Decimal,
    pub timestamp: DateTime<Utc>,
}

/// Paper trading execution engine with immediate confirmations
pub struct PaperEngine {
    /// Combined fee rate of both venues
    fee_rate: Decimal,
    orders: Arc<RwLock<Vec<PaperOrder>>>,
}

impl PaperEngine {
    /// Create a new paper trading engine
    pub fn new(fee_rate: Decimal) -> Self {
        Self {
            fee_rate,
            orders: Arc::new(RwLock::new(vec![])),
        }
    }

    /// Every order submitted so far
    pub async fn orders(&self) -> Vec<PaperOrder> {
        self.orders.read().await.clone()
    }

    async fn record(&self, kind: PaperOrderKind, position_id: PositionId, notional: Decimal) -> Confirmation {
        let order_ref = format!("paper-{}", Uuid::new_v4());
        let timestamp = Utc::now();
        let order = PaperOrder {
            order_ref: order_ref.clone(),
            kind,
            position_id,
            notional,
            fees: notional * self.fee_rate,
            timestamp,
        };
        self.orders.write().await.push(order);

        Confirmation {
            position_id,
            order_ref,
            confirmed_at: timestamp,
        }
    }

    async fn notional_of(&self, position_id: PositionId) -> Option<Decimal> {
        self.orders
            .read()
            .await
            .iter()
            .find(|o| o.kind == PaperOrderKind::Open && o.position_id == position_id)
            .map(|o| o.notional)
    }
}

#[async_trait]
impl ExecutionEngine for PaperEngine {
    async fn submit_open(&self, order: &OpenOrder) -> Result<Confirmation, ExecutionError> {
        let confirmation = self.record(PaperOrderKind::Open, order.position_id, order.size).await;
        tracing::info!(
            position_id = %order.position_id,
            symbol = %order.symbol,
            direction = ?order.direction,
            size = %order.size,
            order_ref = %confirmation.order_ref,
            "Paper open filled"
        );
        Ok(confirmation)
    }

    async fn submit_close(&self, position_id: PositionId) -> Result<Confirmation, ExecutionError> {
        let notional = self
            .notional_of(position_id)
            .await
            .ok_or_else(|| ExecutionError::Rejected(format!("unknown position {position_id}")))?;
        let confirmation = self.record(PaperOrderKind::Close, position_id, notional).await;
        tracing::info!(
            position_id = %position_id,
            order_ref = %confirmation.order_ref,
            "Paper close filled"
        );
        Ok(confirmation)
    }
}
