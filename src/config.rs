//! Configuration types for spread-arb

use crate::symbol::Symbol;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use thiserror::Error;

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Could not read the config file
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// Malformed TOML or a field of the wrong type
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    /// Entry threshold must be strictly greater than exit threshold
    #[error("min_spread_percent ({entry}) must be greater than target_spread_percent ({exit})")]
    ThresholdOrdering { entry: Decimal, exit: Decimal },
    /// A numeric field that must be positive is zero or negative
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    /// Fee rate outside [0, 1)
    #[error("fee_rate for {venue} must be in [0, 1), got {value}")]
    FeeRateOutOfRange { venue: String, value: Decimal },
    /// No symbols configured
    #[error("at least one symbol must be configured")]
    NoSymbols,
    /// The same symbol listed twice
    #[error("symbol listed more than once: {0}")]
    DuplicateSymbol(Symbol),
    /// A numeric field above its supported maximum
    #[error("{field} must be at most {max}, got {value}")]
    TooLarge { field: &'static str, value: u64, max: u64 },
}

/// Longest interval or timeout accepted from configuration (one year)
pub const MAX_DURATION_SECS: u64 = 366 * 24 * 60 * 60;

/// Most reconnect attempts a feed may tolerate before reporting degraded
pub const MAX_RECONNECT_ATTEMPTS: u32 = 10_000;

/// Whole seconds from configuration as a signed duration. Validation keeps
/// every configured value far below the saturation point.
pub fn seconds(secs: u64) -> chrono::Duration {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .unwrap_or(chrono::Duration::MAX)
}

/// Root configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub trading: TradingConfig,
    pub risk: RiskConfig,
    pub venues: VenuesConfig,
    pub monitoring: MonitoringConfig,
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

/// Entry/exit thresholds and position shape
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Net spread (percent) at which a position is opened
    pub min_spread_percent: Decimal,
    /// Net spread (percent) at which a position is closed
    pub target_spread_percent: Decimal,
    /// Fixed notional per position in quote currency
    #[serde(alias = "max_position_size", alias = "fixed_position_size")]
    pub position_size: Decimal,
    pub leverage: u32,
    /// Symbols to monitor, in evaluation order
    pub symbols: Vec<Symbol>,
}

/// Risk limits enforced by the position manager
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    pub max_positions: usize,
    pub max_position_time_secs: u64,
    pub stop_loss_percent: Decimal,
    pub take_profit_percent: Decimal,

    /// Force a stop-loss exit once a position has gone this long without a
    /// fresh spread
    #[serde(default = "default_stale_exit_after_secs")]
    pub stale_exit_after_secs: u64,

    /// Optional realized-loss limit per UTC day (disabled when absent)
    #[serde(default)]
    pub max_daily_loss: Option<Decimal>,

    /// Optional realized-loss limit per ISO week (disabled when absent)
    #[serde(default)]
    pub max_weekly_loss: Option<Decimal>,
}

fn default_stale_exit_after_secs() -> u64 {
    30
}

/// Both trading venues
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenuesConfig {
    /// Venue A: centralized-exchange perpetual futures
    pub cex: VenueConfig,
    /// Venue B: DEX aggregator
    pub dex: VenueConfig,
}

/// A single venue
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueConfig {
    pub name: String,
    /// Flat fee as a fraction (0.0002 = 0.02%)
    pub fee_rate: Decimal,
    /// Override for the venue's API base URL
    #[serde(default)]
    pub base_url: Option<String>,
}

/// Polling cadence and freshness
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub price_update_interval_secs: u64,
    pub health_check_interval_secs: u64,
    pub max_price_age_secs: u64,
    pub reconnect_attempts: u32,

    /// Upper bound on in-flight price polls per tick
    #[serde(default = "default_max_concurrent_polls")]
    pub max_concurrent_polls: usize,
}

fn default_max_concurrent_polls() -> usize {
    8
}

/// Execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    /// How long to wait for an exchange confirmation before retrying
    #[serde(default = "default_confirm_timeout_secs")]
    pub confirm_timeout_secs: u64,

    /// Where session snapshots are written at shutdown
    #[serde(default = "default_snapshot_dir")]
    pub snapshot_dir: PathBuf,
}

fn default_confirm_timeout_secs() -> u64 {
    10
}
fn default_snapshot_dir() -> PathBuf {
    PathBuf::from("./data/sessions")
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            confirm_timeout_secs: default_confirm_timeout_secs(),
            snapshot_dir: default_snapshot_dir(),
        }
    }
}

/// Telemetry configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    /// Prometheus exporter port; no exporter when absent
    #[serde(default)]
    pub metrics_port: Option<u16>,
}

/// Log output format
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// Human-readable format
    #[default]
    Pretty,
    /// JSON format for log aggregation
    Json,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_format: LogFormat::Pretty,
            metrics_port: None,
        }
    }
}

impl Config {
    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check every startup invariant. The engine refuses to run on error.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let trading = &self.trading;
        if trading.target_spread_percent <= Decimal::ZERO {
            return Err(ConfigError::NonPositive("target_spread_percent"));
        }
        if trading.min_spread_percent <= trading.target_spread_percent {
            return Err(ConfigError::ThresholdOrdering {
                entry: trading.min_spread_percent,
                exit: trading.target_spread_percent,
            });
        }
        if trading.position_size <= Decimal::ZERO {
            return Err(ConfigError::NonPositive("position_size"));
        }
        if trading.leverage == 0 {
            return Err(ConfigError::NonPositive("leverage"));
        }
        if trading.symbols.is_empty() {
            return Err(ConfigError::NoSymbols);
        }
        let mut seen = HashSet::new();
        for symbol in &trading.symbols {
            if !seen.insert(symbol) {
                return Err(ConfigError::DuplicateSymbol(symbol.clone()));
            }
        }

        let risk = &self.risk;
        if risk.max_positions == 0 {
            return Err(ConfigError::NonPositive("max_positions"));
        }
        if risk.max_position_time_secs == 0 {
            return Err(ConfigError::NonPositive("max_position_time_secs"));
        }
        if risk.stop_loss_percent <= Decimal::ZERO {
            return Err(ConfigError::NonPositive("stop_loss_percent"));
        }
        if risk.take_profit_percent <= Decimal::ZERO {
            return Err(ConfigError::NonPositive("take_profit_percent"));
        }
        if risk.stale_exit_after_secs == 0 {
            return Err(ConfigError::NonPositive("stale_exit_after_secs"));
        }
        if matches!(risk.max_daily_loss, Some(limit) if limit <= Decimal::ZERO) {
            return Err(ConfigError::NonPositive("max_daily_loss"));
        }
        if matches!(risk.max_weekly_loss, Some(limit) if limit <= Decimal::ZERO) {
            return Err(ConfigError::NonPositive("max_weekly_loss"));
        }

        for venue in [&self.venues.cex, &self.venues.dex] {
            if venue.fee_rate < Decimal::ZERO || venue.fee_rate >= Decimal::ONE {
                return Err(ConfigError::FeeRateOutOfRange {
                    venue: venue.name.clone(),
                    value: venue.fee_rate,
                });
            }
        }

        let monitoring = &self.monitoring;
        if monitoring.price_update_interval_secs == 0 {
            return Err(ConfigError::NonPositive("price_update_interval_secs"));
        }
        if monitoring.health_check_interval_secs == 0 {
            return Err(ConfigError::NonPositive("health_check_interval_secs"));
        }
        if monitoring.max_price_age_secs == 0 {
            return Err(ConfigError::NonPositive("max_price_age_secs"));
        }
        if monitoring.max_concurrent_polls == 0 {
            return Err(ConfigError::NonPositive("max_concurrent_polls"));
        }
        if self.execution.confirm_timeout_secs == 0 {
            return Err(ConfigError::NonPositive("confirm_timeout_secs"));
        }

        for (field, value) in [
            ("max_position_time_secs", risk.max_position_time_secs),
            ("stale_exit_after_secs", risk.stale_exit_after_secs),
            ("price_update_interval_secs", monitoring.price_update_interval_secs),
            ("health_check_interval_secs", monitoring.health_check_interval_secs),
            ("max_price_age_secs", monitoring.max_price_age_secs),
            ("confirm_timeout_secs", self.execution.confirm_timeout_secs),
        ] {
            if value > MAX_DURATION_SECS {
                return Err(ConfigError::TooLarge {
                    field,
                    value,
                    max: MAX_DURATION_SECS,
                });
            }
        }
        if monitoring.reconnect_attempts > MAX_RECONNECT_ATTEMPTS {
            return Err(ConfigError::TooLarge {
                field: "reconnect_attempts",
                value: u64::from(monitoring.reconnect_attempts),
                max: u64::from(MAX_RECONNECT_ATTEMPTS),
            });
        }

        Ok(())
    }
}
