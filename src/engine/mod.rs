//! Arbitrage loop
//!
//! Periodic orchestration of polling, spread evaluation, risk sweep and
//! execution dispatch

mod arbitrage;
mod types;

pub use arbitrage::ArbitrageLoop;
pub use types::{HealthReport, LoopSettings, TickReport};
