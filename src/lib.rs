//! spread-arb: cross-venue arbitrage between a perpetual-futures exchange
//! and a DEX aggregator
//!
//! This library provides the core components for:
//! - Price feeds from MEXC futures and DexScreener
//! - Net spread calculation with a staleness guard
//! - Hysteresis entry/exit detection per symbol
//! - Position lifecycle and risk sweep (stop-loss, take-profit, max hold)
//! - Paper execution engine
//! - The periodic arbitrage loop and its reporting sink
//! - Structured logging and Prometheus metrics

pub mod cli;
pub mod config;
pub mod engine;
pub mod execution;
pub mod feed;
pub mod report;
pub mod risk;
pub mod signal;
pub mod symbol;
pub mod telemetry;
