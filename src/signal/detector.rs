//! Per-symbol entry/exit state machine

use super::Spread;
use crate::risk::{CloseReason, PositionId, PositionManager, RiskError};
use crate::signal::Direction;
use crate::symbol::Symbol;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::HashMap;

/// Detector state for one symbol
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpportunityState {
    /// No position; waiting for the spread to widen past the entry threshold
    Idle,
    /// Position held; waiting for the spread to narrow to the exit threshold
    InPosition,
}

/// Entry and exit thresholds
#[derive(Debug, Clone)]
pub struct DetectorConfig {
    /// Open when |net spread| reaches this
    pub min_spread_percent: Decimal,
    /// Close when |net spread| falls to this
    pub target_spread_percent: Decimal,
}

/// Outcome of evaluating one spread
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// In position, exit threshold not reached
    Hold,
    /// Idle, no tradeable opportunity
    Wait,
    /// Position admitted
    Enter {
        position_id: PositionId,
        direction: Direction,
    },
    /// Close requested
    Exit { position_id: PositionId },
    /// Opportunity found but the position manager refused it
    Refused(RiskError),
}

/// Hysteresis detector over every configured symbol.
///
/// Threshold ordering is validated with the configuration; the detector
/// trusts it.
pub struct OpportunityDetector {
    config: DetectorConfig,
    states: HashMap<Symbol, OpportunityState>,
}

impl OpportunityDetector {
    pub fn new(config: DetectorConfig, symbols: &[Symbol]) -> Self {
        let states = symbols
            .iter()
            .map(|s| (s.clone(), OpportunityState::Idle))
            .collect();
        Self { config, states }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// State for a configured symbol
    pub fn state(&self, symbol: &Symbol) -> Option<OpportunityState> {
        self.states.get(symbol).copied()
    }

    /// Whether the spread clears the entry threshold
    pub fn is_opportunity(&self, spread: &Spread) -> bool {
        spread.valid && spread.magnitude() >= self.config.min_spread_percent
    }

    /// Evaluate a fresh spread and drive the position manager
    pub fn evaluate(&mut self, spread: &Spread, positions: &mut PositionManager, now: DateTime<Utc>) -> Decision {
        let Some(state) = self.states.get(&spread.symbol).copied() else {
            tracing::debug!(symbol = %spread.symbol, "Spread for unconfigured symbol ignored");
            return Decision::Wait;
        };

        match state {
            OpportunityState::Idle => self.evaluate_entry(spread, positions, now),
            OpportunityState::InPosition => self.evaluate_exit(spread, positions, now),
        }
    }

    fn evaluate_entry(&mut self, spread: &Spread, positions: &mut PositionManager, now: DateTime<Utc>) -> Decision {
        if !self.is_opportunity(spread) {
            return Decision::Wait;
        }
        let Some(direction) = spread.direction() else {
            return Decision::Wait;
        };

        tracing::info!(
            symbol = %spread.symbol,
            net_spread = %spread.net_spread_percent,
            raw_spread = %spread.raw_spread_percent,
            direction = ?direction,
            "Opportunity detected"
        );

        // Admission and the state change happen together; a refusal leaves
        // the symbol idle and the opportunity is dropped.
        match positions.open(&spread.symbol, direction, spread, now) {
            Ok(position_id) => {
                self.set_state(&spread.symbol, OpportunityState::InPosition);
                Decision::Enter {
                    position_id,
                    direction,
                }
            }
            Err(err) => {
                tracing::debug!(symbol = %spread.symbol, error = %err, "Entry refused");
                Decision::Refused(err)
            }
        }
    }

    fn evaluate_exit(&mut self, spread: &Spread, positions: &mut PositionManager, now: DateTime<Utc>) -> Decision {
        if !spread.valid || spread.magnitude() > self.config.target_spread_percent {
            return Decision::Hold;
        }

        match positions.close(&spread.symbol, CloseReason::TargetReached, now) {
            Ok(position_id) => {
                self.set_state(&spread.symbol, OpportunityState::Idle);
                Decision::Exit { position_id }
            }
            Err(err) => {
                // Position is already gone or closing; resynchronise
                tracing::debug!(symbol = %spread.symbol, error = %err, "Exit not needed");
                self.set_state(&spread.symbol, OpportunityState::Idle);
                Decision::Wait
            }
        }
    }

    /// A position was closed outside the detector (risk sweep, failed open)
    pub fn on_position_closed(&mut self, symbol: &Symbol) {
        self.set_state(symbol, OpportunityState::Idle);
    }

    fn set_state(&mut self, symbol: &Symbol, state: OpportunityState) {
        if let Some(slot) = self.states.get_mut(symbol) {
            *slot = state;
        }
    }
}
