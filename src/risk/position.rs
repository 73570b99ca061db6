//! Position lifecycle and the per-tick risk sweep
//!
//! `PositionManager` is the only place positions are created, mutated and
//! retired. It is synchronous: exchange work is queued as
//! `ExecutionRequest`s and drained by the caller.

use super::{CloseReason, LossMonitor, RiskError, RiskLimits, SessionStats};
use crate::execution::{ExecutionRequest, OpenOrder};
use crate::signal::{Direction, Spread};
use crate::symbol::Symbol;
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

/// Position identifier
pub type PositionId = Uuid;

/// Lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Open,
    /// Close requested, waiting for exchange confirmation
    Closing,
    Closed,
}

/// A fixed-size leveraged spread position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: PositionId,
    pub symbol: Symbol,
    pub direction: Direction,
    /// Net spread at entry
    pub entry_spread_percent: Decimal,
    pub entry_time: DateTime<Utc>,
    /// Notional in quote currency
    pub size: Decimal,
    pub leverage: u32,
    pub status: PositionStatus,
    pub close_reason: Option<CloseReason>,
    /// Latest valid net spread
    pub current_spread_percent: Decimal,
    /// When `current_spread_percent` was computed
    pub marked_at: DateTime<Utc>,
    /// Unrealized PnL as percent of margin
    pub unrealized_pnl_percent: Decimal,
    pub close_requested_at: Option<DateTime<Utc>>,
    pub close_attempts: u32,
    /// A close request is in flight
    #[serde(skip)]
    awaiting_confirmation: bool,
}

impl Position {
    /// Spread points captured since entry; positive is profit
    pub fn capture_percent(&self, spread_percent: Decimal) -> Decimal {
        self.direction.sign() * (self.entry_spread_percent - spread_percent)
    }

    /// PnL as percent of margin at a given spread
    pub fn pnl_percent_at(&self, spread_percent: Decimal) -> Decimal {
        self.capture_percent(spread_percent) * Decimal::from(self.leverage)
    }

    /// Unrealized PnL in quote currency at the last mark
    pub fn unrealized_pnl(&self) -> Decimal {
        self.size * self.capture_percent(self.current_spread_percent) / Decimal::ONE_HUNDRED
    }

    pub fn held_for(&self, now: DateTime<Utc>) -> Duration {
        now - self.entry_time
    }

    pub fn is_open(&self) -> bool {
        self.status == PositionStatus::Open
    }

    /// Mark is recent enough to trust for profit/loss decisions
    fn has_fresh_mark(&self, now: DateTime<Utc>, max_age: Duration) -> bool {
        now - self.marked_at <= max_age
    }
}

/// A finished position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub position: Position,
    pub closed_at: DateTime<Utc>,
    pub realized_pnl_percent: Decimal,
    pub realized_pnl: Decimal,
    pub held_secs: i64,
}

/// A close triggered by the risk sweep
#[derive(Debug, Clone, PartialEq)]
pub struct ForcedClose {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub reason: CloseReason,
    pub pnl_percent: Decimal,
    /// No fresh spread was available when the decision was made
    pub stale: bool,
}

/// A CLOSING position whose close was re-submitted
#[derive(Debug, Clone, PartialEq)]
pub struct CloseRetry {
    pub position_id: PositionId,
    pub symbol: Symbol,
    pub attempts: u32,
}

/// Owns every live position and enforces the risk limits
pub struct PositionManager {
    limits: RiskLimits,
    position_size: Decimal,
    leverage: u32,
    close_retry_after: Duration,
    live: HashMap<PositionId, Position>,
    by_symbol: HashMap<Symbol, PositionId>,
    closed: Vec<ClosedPosition>,
    outbox: Vec<ExecutionRequest>,
    loss_monitor: LossMonitor,
    stats: SessionStats,
}

impl PositionManager {
    pub fn new(limits: RiskLimits, position_size: Decimal, leverage: u32, close_retry_after: Duration) -> Self {
        let loss_monitor = LossMonitor::new(limits.max_daily_loss, limits.max_weekly_loss);
        Self {
            limits,
            position_size,
            leverage,
            close_retry_after,
            live: HashMap::new(),
            by_symbol: HashMap::new(),
            closed: vec![],
            outbox: vec![],
            loss_monitor,
            stats: SessionStats::default(),
        }
    }

    /// Admit a new position.
    ///
    /// Refuses when the OPEN count is at the limit, when the symbol already
    /// has a live (OPEN or CLOSING) position, or when a loss limit halted
    /// trading.
    pub fn open(
        &mut self,
        symbol: &Symbol,
        direction: Direction,
        spread: &Spread,
        now: DateTime<Utc>,
    ) -> Result<PositionId, RiskError> {
        if let Some(reason) = self.loss_monitor.should_halt(now) {
            return Err(RiskError::TradingHalted(reason));
        }
        let open = self.open_count();
        if open >= self.limits.max_positions {
            return Err(RiskError::LimitReached {
                open,
                max: self.limits.max_positions,
            });
        }
        if self.by_symbol.contains_key(symbol) {
            return Err(RiskError::AlreadyOpen(symbol.clone()));
        }
        if !spread.valid || &spread.symbol != symbol {
            return Err(RiskError::InvalidSpread(symbol.clone()));
        }

        let position = Position {
            id: Uuid::new_v4(),
            symbol: symbol.clone(),
            direction,
            entry_spread_percent: spread.net_spread_percent,
            entry_time: now,
            size: self.position_size,
            leverage: self.leverage,
            status: PositionStatus::Open,
            close_reason: None,
            current_spread_percent: spread.net_spread_percent,
            marked_at: spread.computed_at,
            unrealized_pnl_percent: Decimal::ZERO,
            close_requested_at: None,
            close_attempts: 0,
            awaiting_confirmation: false,
        };
        let id = position.id;

        tracing::info!(
            position_id = %id,
            symbol = %symbol,
            direction = ?direction,
            entry_spread = %spread.net_spread_percent,
            size = %self.position_size,
            leverage = self.leverage,
            "Position opened"
        );

        self.outbox.push(ExecutionRequest::Open(OpenOrder {
            position_id: id,
            symbol: symbol.clone(),
            direction,
            size: self.position_size,
            leverage: self.leverage,
        }));
        self.by_symbol.insert(symbol.clone(), id);
        self.live.insert(id, position);
        self.stats.record_open();
        Ok(id)
    }

    /// Request a close: OPEN -> CLOSING. The position is retired once the
    /// exchange confirms via [`confirm_close`](Self::confirm_close).
    pub fn close(&mut self, symbol: &Symbol, reason: CloseReason, now: DateTime<Utc>) -> Result<PositionId, RiskError> {
        let id = *self
            .by_symbol
            .get(symbol)
            .ok_or_else(|| RiskError::NotOpen(symbol.clone()))?;
        self.close_by_id(id, reason, now)
            .map_err(|_| RiskError::NotOpen(symbol.clone()))
    }

    /// Request a close for one specific position. Fails when that position
    /// is no longer OPEN, even if its symbol now holds another one.
    pub fn close_by_id(&mut self, id: PositionId, reason: CloseReason, now: DateTime<Utc>) -> Result<PositionId, RiskError> {
        let position = self
            .live
            .get_mut(&id)
            .filter(|p| p.is_open())
            .ok_or(RiskError::PositionNotOpen(id))?;

        position.status = PositionStatus::Closing;
        position.close_reason = Some(reason);
        position.close_requested_at = Some(now);
        position.close_attempts = 1;
        position.awaiting_confirmation = true;

        tracing::info!(
            position_id = %id,
            symbol = %position.symbol,
            reason = %reason,
            pnl_pct = %position.unrealized_pnl_percent,
            "Close requested"
        );

        let symbol = position.symbol.clone();
        self.outbox.push(ExecutionRequest::Close { position_id: id, symbol });
        Ok(id)
    }

    /// Exchange confirmed the close: CLOSING -> CLOSED
    pub fn confirm_close(&mut self, id: PositionId, now: DateTime<Utc>) -> Option<ClosedPosition> {
        let position = self.live.get(&id)?;
        if position.status != PositionStatus::Closing {
            tracing::warn!(position_id = %id, "Close confirmation for a position that is not closing");
            return None;
        }
        let reason = position.close_reason.unwrap_or(CloseReason::TargetReached);
        let realized_pnl_percent = position.unrealized_pnl_percent;
        let realized_pnl = position.unrealized_pnl();
        self.retire(id, reason, realized_pnl_percent, realized_pnl, now)
    }

    /// A close attempt failed or timed out; the position stays CLOSING and
    /// becomes eligible for retry in [`reconcile`](Self::reconcile)
    pub fn close_failed(&mut self, id: PositionId) {
        if let Some(position) = self.live.get_mut(&id) {
            position.awaiting_confirmation = false;
        }
    }

    /// The exchange rejected the opening order: drop the position. A close
    /// requested in the meantime has nothing left to flatten.
    pub fn abort_open(&mut self, id: PositionId, now: DateTime<Utc>) -> Option<ClosedPosition> {
        self.retire(id, CloseReason::ExecutionFailed, Decimal::ZERO, Decimal::ZERO, now)
    }

    fn retire(
        &mut self,
        id: PositionId,
        reason: CloseReason,
        realized_pnl_percent: Decimal,
        realized_pnl: Decimal,
        now: DateTime<Utc>,
    ) -> Option<ClosedPosition> {
        let mut position = self.live.remove(&id)?;
        self.by_symbol.remove(&position.symbol);
        position.status = PositionStatus::Closed;
        position.close_reason = Some(reason);
        position.awaiting_confirmation = false;

        let held_secs = position.held_for(now).num_seconds();
        self.loss_monitor.record(realized_pnl, now);
        self.stats.record_close(reason, realized_pnl);

        tracing::info!(
            position_id = %id,
            symbol = %position.symbol,
            reason = %reason,
            realized_pnl = %realized_pnl,
            held_secs,
            "Position closed"
        );

        let closed = ClosedPosition {
            position,
            closed_at: now,
            realized_pnl_percent,
            realized_pnl,
            held_secs,
        };
        self.closed.push(closed.clone());
        Some(closed)
    }

    /// Update a live position with a freshly computed spread.
    /// Invalid spreads are ignored so the last good mark survives.
    pub fn mark(&mut self, spread: &Spread) {
        if !spread.valid {
            return;
        }
        let Some(position) = self.by_symbol.get(&spread.symbol).and_then(|id| self.live.get_mut(id)) else {
            return;
        };
        position.current_spread_percent = spread.net_spread_percent;
        position.marked_at = spread.computed_at;
        position.unrealized_pnl_percent = position.pnl_percent_at(spread.net_spread_percent);
    }

    /// Forced-exit decision for one position, in fixed priority order:
    /// max hold time, then stop-loss, then take-profit. Without a fresh mark
    /// profit cannot be confirmed, so only the time limit and the fail-safe
    /// stop apply.
    fn forced_exit_reason(&self, position: &Position, now: DateTime<Utc>) -> Option<(CloseReason, bool)> {
        if position.held_for(now) >= self.limits.max_position_time {
            let stale = !position.has_fresh_mark(now, self.limits.max_price_age);
            return Some((CloseReason::MaxTime, stale));
        }

        if position.has_fresh_mark(now, self.limits.max_price_age) {
            if -position.unrealized_pnl_percent >= self.limits.stop_loss_percent {
                return Some((CloseReason::StopLoss, false));
            }
            if position.unrealized_pnl_percent >= self.limits.take_profit_percent {
                return Some((CloseReason::TakeProfit, false));
            }
            return None;
        }

        if now - position.marked_at >= self.limits.stale_exit_after {
            return Some((CloseReason::StopLoss, true));
        }
        None
    }

    /// Evaluate every OPEN position against the risk limits and request
    /// closes for those that hit one. At most one reason per position.
    pub fn sweep(&mut self, now: DateTime<Utc>) -> Vec<ForcedClose> {
        let mut due: Vec<(DateTime<Utc>, Symbol, CloseReason, bool, Decimal)> = self
            .live
            .values()
            .filter(|p| p.is_open())
            .filter_map(|p| {
                self.forced_exit_reason(p, now)
                    .map(|(reason, stale)| (p.entry_time, p.symbol.clone(), reason, stale, p.unrealized_pnl_percent))
            })
            .collect();
        due.sort_by(|a, b| a.0.cmp(&b.0).then_with(|| a.1.cmp(&b.1)));

        let mut forced = Vec::with_capacity(due.len());
        for (_, symbol, reason, stale, pnl_percent) in due {
            if stale {
                tracing::warn!(symbol = %symbol, reason = %reason, "Forcing exit without a fresh spread");
            }
            if let Ok(position_id) = self.close(&symbol, reason, now) {
                forced.push(ForcedClose {
                    position_id,
                    symbol,
                    reason,
                    pnl_percent,
                    stale,
                });
            }
        }
        forced
    }

    /// Re-submit closes that failed or timed out once the retry delay has
    /// passed since the previous attempt
    pub fn reconcile(&mut self, now: DateTime<Utc>) -> Vec<CloseRetry> {
        let mut retries = vec![];
        for position in self.live.values_mut() {
            if position.status != PositionStatus::Closing || position.awaiting_confirmation {
                continue;
            }
            let requested_at = position.close_requested_at.unwrap_or(position.entry_time);
            if now - requested_at < self.close_retry_after {
                continue;
            }
            position.close_attempts += 1;
            position.close_requested_at = Some(now);
            position.awaiting_confirmation = true;
            self.outbox.push(ExecutionRequest::Close {
                position_id: position.id,
                symbol: position.symbol.clone(),
            });
            retries.push(CloseRetry {
                position_id: position.id,
                symbol: position.symbol.clone(),
                attempts: position.close_attempts,
            });
        }
        retries
    }

    /// Take all queued execution requests
    pub fn drain_requests(&mut self) -> Vec<ExecutionRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Number of OPEN positions (CLOSING ones no longer count)
    pub fn open_count(&self) -> usize {
        self.live.values().filter(|p| p.is_open()).count()
    }

    pub fn has_position(&self, symbol: &Symbol) -> bool {
        self.by_symbol.contains_key(symbol)
    }

    /// Live (OPEN or CLOSING) position for a symbol
    pub fn position(&self, symbol: &Symbol) -> Option<&Position> {
        self.by_symbol.get(symbol).and_then(|id| self.live.get(id))
    }

    /// Live position by id; `None` once it has been retired
    pub fn position_by_id(&self, id: PositionId) -> Option<&Position> {
        self.live.get(&id)
    }

    /// Every OPEN or CLOSING position, oldest first
    pub fn live_positions(&self) -> Vec<Position> {
        let mut positions: Vec<Position> = self.live.values().cloned().collect();
        positions.sort_by_key(|p| p.entry_time);
        positions
    }

    pub fn closed_positions(&self) -> &[ClosedPosition] {
        &self.closed
    }

    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    pub fn limits(&self) -> &RiskLimits {
        &self.limits
    }
}
