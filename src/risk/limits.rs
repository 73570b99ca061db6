//! Position limits and loss controls

use crate::config::Config;
use chrono::{DateTime, Datelike, Duration, IsoWeek, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Limits enforced by the position manager
#[derive(Debug, Clone)]
pub struct RiskLimits {
    /// Maximum concurrent OPEN positions
    pub max_positions: usize,
    /// Forced exit once a position is this old
    pub max_position_time: Duration,
    /// Unrealized loss (percent of margin) that forces an exit
    pub stop_loss_percent: Decimal,
    /// Unrealized profit (percent of margin) that forces an exit
    pub take_profit_percent: Decimal,
    /// A mark older than this is not trusted for PnL
    pub max_price_age: Duration,
    /// Fail-safe stop once a position has had no fresh mark this long
    pub stale_exit_after: Duration,
    /// Realized-loss limit per UTC day
    pub max_daily_loss: Option<Decimal>,
    /// Realized-loss limit per ISO week
    pub max_weekly_loss: Option<Decimal>,
}

impl RiskLimits {
    pub fn from_config(config: &Config) -> Self {
        Self {
            max_positions: config.risk.max_positions,
            max_position_time: crate::config::seconds(config.risk.max_position_time_secs),
            stop_loss_percent: config.risk.stop_loss_percent,
            take_profit_percent: config.risk.take_profit_percent,
            max_price_age: crate::config::seconds(config.monitoring.max_price_age_secs),
            stale_exit_after: crate::config::seconds(config.risk.stale_exit_after_secs),
            max_daily_loss: config.risk.max_daily_loss,
            max_weekly_loss: config.risk.max_weekly_loss,
        }
    }
}

impl Default for RiskLimits {
    fn default() -> Self {
        Self {
            max_positions: 10,
            max_position_time: Duration::hours(1),
            stop_loss_percent: dec!(2),
            take_profit_percent: dec!(4),
            max_price_age: Duration::seconds(2),
            stale_exit_after: Duration::seconds(30),
            max_daily_loss: None,
            max_weekly_loss: None,
        }
    }
}

/// Reason for trading halt
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HaltReason {
    /// Realized loss for the day reached the limit
    MaxDailyLossReached(Decimal),
    /// Realized loss for the week reached the limit
    MaxWeeklyLossReached(Decimal),
}

/// Tracks realized PnL per day and week. Inert unless a limit is configured.
#[derive(Debug, Clone)]
pub struct LossMonitor {
    max_daily_loss: Option<Decimal>,
    max_weekly_loss: Option<Decimal>,
    day: Option<NaiveDate>,
    daily_pnl: Decimal,
    week: Option<IsoWeek>,
    weekly_pnl: Decimal,
}

impl LossMonitor {
    pub fn new(max_daily_loss: Option<Decimal>, max_weekly_loss: Option<Decimal>) -> Self {
        Self {
            max_daily_loss,
            max_weekly_loss,
            day: None,
            daily_pnl: Decimal::ZERO,
            week: None,
            weekly_pnl: Decimal::ZERO,
        }
    }

    /// Add a realized result
    pub fn record(&mut self, pnl: Decimal, at: DateTime<Utc>) {
        let day = at.date_naive();
        if self.day != Some(day) {
            self.day = Some(day);
            self.daily_pnl = Decimal::ZERO;
        }
        let week = at.iso_week();
        if self.week != Some(week) {
            self.week = Some(week);
            self.weekly_pnl = Decimal::ZERO;
        }
        self.daily_pnl += pnl;
        self.weekly_pnl += pnl;
    }

    /// Realized PnL for the day containing `now`
    pub fn daily_pnl(&self, now: DateTime<Utc>) -> Decimal {
        if self.day == Some(now.date_naive()) {
            self.daily_pnl
        } else {
            Decimal::ZERO
        }
    }

    /// Realized PnL for the ISO week containing `now`
    pub fn weekly_pnl(&self, now: DateTime<Utc>) -> Decimal {
        if self.week == Some(now.iso_week()) {
            self.weekly_pnl
        } else {
            Decimal::ZERO
        }
    }

    /// Check if new entries should be refused
    pub fn should_halt(&self, now: DateTime<Utc>) -> Option<HaltReason> {
        if let Some(limit) = self.max_daily_loss {
            let loss = -self.daily_pnl(now);
            if loss >= limit {
                return Some(HaltReason::MaxDailyLossReached(loss));
            }
        }
        if let Some(limit) = self.max_weekly_loss {
            let loss = -self.weekly_pnl(now);
            if loss >= limit {
                return Some(HaltReason::MaxWeeklyLossReached(loss));
            }
        }
        None
    }
}
