//! Session trade statistics

use super::CloseReason;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Running totals for the current session
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionStats {
    pub positions_opened: u64,
    pub positions_closed: u64,
    pub winning_trades: u64,
    pub realized_pnl: Decimal,
    pub closes_by_reason: BTreeMap<CloseReason, u64>,
}

impl SessionStats {
    pub fn record_open(&mut self) {
        self.positions_opened += 1;
    }

    pub fn record_close(&mut self, reason: CloseReason, pnl: Decimal) {
        self.positions_closed += 1;
        if pnl > Decimal::ZERO {
            self.winning_trades += 1;
        }
        self.realized_pnl += pnl;
        *self.closes_by_reason.entry(reason).or_insert(0) += 1;
    }

    /// Winning share of closed trades in percent
    pub fn win_rate(&self) -> Decimal {
        if self.positions_closed == 0 {
            return Decimal::ZERO;
        }
        Decimal::from(self.winning_trades) * Decimal::ONE_HUNDRED / Decimal::from(self.positions_closed)
    }
}
