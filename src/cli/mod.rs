//! CLI interface for spread-arb
//!
//! Provides subcommands for:
//! - `run`: Start the arbitrage loop (paper execution)
//! - `check`: Validate configuration
//! - `config`: Show effective configuration
//! - `quote`: Poll both venues once for a symbol

mod quote;
mod run;

pub use quote::QuoteArgs;
pub use run::RunArgs;

use crate::config::Config;
use crate::feed::{DexScreenerConfig, DexScreenerSource, MexcSource, PriceSource, MEXC_CONTRACT_API_URL};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "spread-arb")]
#[command(about = "Cross-venue perpetual vs DEX spread arbitrage engine")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, default_value = "config.toml")]
    pub config: PathBuf,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the arbitrage loop
    Run(RunArgs),
    /// Validate configuration and exit
    Check,
    /// Show effective configuration
    Config,
    /// Poll both venues once and print the spread
    Quote(QuoteArgs),
}

/// Build the perpetual (A) and DEX (B) price sources
pub fn build_sources(config: &Config) -> anyhow::Result<(Arc<dyn PriceSource>, Arc<dyn PriceSource>)> {
    let timeout = Duration::from_secs(config.monitoring.price_update_interval_secs.max(5));

    let cex_url = config
        .venues
        .cex
        .base_url
        .clone()
        .unwrap_or_else(|| MEXC_CONTRACT_API_URL.to_string());
    let cex = MexcSource::with_base_url(cex_url, timeout)?;

    let mut dex_config = DexScreenerConfig {
        timeout,
        ..DexScreenerConfig::default()
    };
    if let Some(url) = &config.venues.dex.base_url {
        dex_config.base_url = url.clone();
    }
    let dex = DexScreenerSource::with_config(dex_config)?;

    Ok((Arc::new(cex), Arc::new(dex)))
}

/// Print the thresholds the engine will run with
pub fn print_check(config: &Config) {
    println!("Configuration OK");
    println!(
        "  Entry/exit: {}% / {}%",
        config.trading.min_spread_percent, config.trading.target_spread_percent
    );
    println!(
        "  Position: {} x{} (max {} open)",
        config.trading.position_size, config.trading.leverage, config.risk.max_positions
    );
    println!(
        "  Risk: stop {}%, take profit {}%, max hold {}s",
        config.risk.stop_loss_percent, config.risk.take_profit_percent, config.risk.max_position_time_secs
    );
    println!(
        "  Fees: {} {}, {} {}",
        config.venues.cex.name, config.venues.cex.fee_rate, config.venues.dex.name, config.venues.dex.fee_rate
    );
    let symbols: Vec<&str> = config.trading.symbols.iter().map(|s| s.as_str()).collect();
    println!("  Symbols: {}", symbols.join(", "));
}
