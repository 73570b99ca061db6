use anyhow::Context;
use clap::Parser;
use spread_arb::cli::{print_check, Cli, Commands};
use spread_arb::config::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Invalid configuration is fatal
    let config = Config::load(&cli.config)
        .with_context(|| format!("Could not load config from {}", cli.config.display()))?;

    spread_arb::telemetry::init_telemetry(&config.telemetry)?;

    match cli.command {
        Commands::Run(args) => {
            tracing::info!(symbols = config.trading.symbols.len(), "Starting arbitrage loop");
            args.execute(config).await?;
        }
        Commands::Check => print_check(&config),
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
        }
        Commands::Quote(args) => args.execute(&config).await?,
    }

    Ok(())
}
