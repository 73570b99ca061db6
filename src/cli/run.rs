//! Run command implementation

use super::build_sources;
use crate::config::Config;
use crate::engine::ArbitrageLoop;
use crate::execution::PaperEngine;
use crate::report::TracingSink;
use crate::symbol::Symbol;
use clap::Args;
use std::future::Future;
use std::io;
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Only trade these symbols (comma separated, overrides the config)
    #[arg(long, value_delimiter = ',')]
    pub symbols: Option<Vec<Symbol>>,
}

impl RunArgs {
    pub async fn execute(&self, mut config: Config) -> anyhow::Result<()> {
        if let Some(symbols) = &self.symbols {
            config.trading.symbols = symbols.clone();
            config.validate()?;
        }

        let (source_a, source_b) = build_sources(&config)?;
        let executor = Arc::new(PaperEngine::new(config.venues.cex.fee_rate + config.venues.dex.fee_rate));
        let mut engine = ArbitrageLoop::new(&config, source_a, source_b, executor, Arc::new(TracingSink));

        let shutdown_rx = shutdown_on(tokio::signal::ctrl_c());
        let snapshot = engine.run(shutdown_rx).await?;

        println!("Session summary:");
        println!("  Ticks: {}", snapshot.ticks);
        println!("  Opportunities: {}", snapshot.opportunities_detected);
        println!(
            "  Positions: {} opened, {} closed, {} still live",
            snapshot.stats.positions_opened,
            snapshot.stats.positions_closed,
            snapshot.live_positions.len()
        );
        println!(
            "  Realized PnL: {} (win rate {}%)",
            snapshot.stats.realized_pnl.round_dp(4),
            snapshot.stats.win_rate().round_dp(1)
        );
        Ok(())
    }
}

/// Flip the returned receiver to true once `signal` resolves. If the signal
/// cannot be listened for, the sender is held forever so trading continues.
fn shutdown_on<F>(signal: F) -> watch::Receiver<bool>
where
    F: Future<Output = io::Result<()>> + Send + 'static,
{
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = signal.await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C; stop the process to exit");
            std::future::pending::<()>().await;
        }
        tracing::info!("Shutdown requested");
        let _ = shutdown_tx.send(true);
    });
    shutdown_rx
}
