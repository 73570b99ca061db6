//! Quote command implementation

use super::build_sources;
use crate::config::Config;
use crate::signal::{SpreadCalculator, SpreadConfig};
use crate::symbol::Symbol;
use chrono::Utc;
use clap::Args;

#[derive(Args, Debug)]
pub struct QuoteArgs {
    /// Symbol to quote, e.g. DIS/USDT
    pub symbol: Symbol,
}

impl QuoteArgs {
    pub async fn execute(&self, config: &Config) -> anyhow::Result<()> {
        let (source_a, source_b) = build_sources(config)?;
        let (quote_a, quote_b) = tokio::join!(source_a.poll(&self.symbol), source_b.poll(&self.symbol));

        let quote_a = quote_a.map_err(|e| anyhow::anyhow!("{} quote failed: {}", config.venues.cex.name, e))?;
        let quote_b = quote_b.map_err(|e| anyhow::anyhow!("{} quote failed: {}", config.venues.dex.name, e))?;

        let calculator = SpreadCalculator::new(SpreadConfig {
            fee_rate_a: config.venues.cex.fee_rate,
            fee_rate_b: config.venues.dex.fee_rate,
            max_price_age: crate::config::seconds(config.monitoring.max_price_age_secs),
        });
        let spread = calculator.compute(&quote_a, &quote_b, Utc::now());

        println!("{}", self.symbol);
        println!("  {}: {} @ {}", config.venues.cex.name, quote_a.price, quote_a.observed_at);
        println!("  {}: {} @ {}", config.venues.dex.name, quote_b.price, quote_b.observed_at);
        println!("  Raw spread: {}%", spread.raw_spread_percent.round_dp(4));
        println!("  Net spread: {}%", spread.net_spread_percent.round_dp(4));
        match spread.direction() {
            Some(direction) if spread.magnitude() >= config.trading.min_spread_percent => {
                println!("  Opportunity: {:?}", direction);
            }
            _ if !spread.valid => println!("  Invalid: {:?}", spread.invalid_reason),
            _ => println!("  No opportunity"),
        }
        Ok(())
    }
}
