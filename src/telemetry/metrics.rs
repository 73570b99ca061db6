//! Prometheus metrics

use crate::feed::Venue;
use crate::risk::CloseReason;
use ::metrics::{counter, gauge, histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::time::Duration;

/// Counter metric types
#[derive(Debug, Clone, Copy)]
pub enum CounterMetric {
    /// Loop ticks
    Ticks,
    /// Spreads past the entry threshold
    Opportunities,
    /// Positions admitted
    PositionsOpened,
    /// Entries refused by the position manager
    AdmissionRefused,
    /// Execution requests that failed or timed out
    ExecutionFailures,
}

/// Gauge metric types
#[derive(Debug, Clone, Copy)]
pub enum GaugeMetric {
    /// OPEN position count
    OpenPositions,
    /// CLOSING position count
    ClosingPositions,
    /// Realized P&L for the session
    RealizedPnl,
    /// Unrealized P&L across live positions
    UnrealizedPnl,
}

/// Latency metric types
#[derive(Debug, Clone, Copy)]
pub enum LatencyMetric {
    /// Full loop tick
    Tick,
    /// Price poll fan-out
    PricePoll,
}

/// Start the Prometheus exporter on `0.0.0.0:port`
pub fn install_exporter(port: u16) -> anyhow::Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .map_err(|e| anyhow::anyhow!("Failed to start metrics exporter: {}", e))?;
    tracing::info!(port, "Prometheus exporter listening");
    Ok(())
}

/// Increment a counter by one
pub fn increment(metric: CounterMetric) {
    let name = match metric {
        CounterMetric::Ticks => "spreadarb_ticks_total",
        CounterMetric::Opportunities => "spreadarb_opportunities_total",
        CounterMetric::PositionsOpened => "spreadarb_positions_opened_total",
        CounterMetric::AdmissionRefused => "spreadarb_admission_refused_total",
        CounterMetric::ExecutionFailures => "spreadarb_execution_failures_total",
    };
    counter!(name).increment(1);
}

/// Count a closed position by reason
pub fn record_close(reason: CloseReason) {
    counter!("spreadarb_positions_closed_total", "reason" => reason.as_str()).increment(1);
}

/// Count a failed poll for a venue
pub fn record_feed_failure(venue: Venue) {
    counter!("spreadarb_feed_failures_total", "venue" => venue.as_str()).increment(1);
}

/// Set feed health (1 healthy, 0 degraded)
pub fn set_feed_health(venue: Venue, healthy: bool) {
    gauge!("spreadarb_feed_healthy", "venue" => venue.as_str()).set(if healthy { 1.0 } else { 0.0 });
}

/// Set a gauge value
pub fn set_gauge(metric: GaugeMetric, value: f64) {
    let name = match metric {
        GaugeMetric::OpenPositions => "spreadarb_open_positions",
        GaugeMetric::ClosingPositions => "spreadarb_closing_positions",
        GaugeMetric::RealizedPnl => "spreadarb_realized_pnl_usd",
        GaugeMetric::UnrealizedPnl => "spreadarb_unrealized_pnl_usd",
    };
    gauge!(name).set(value);
}

/// Record a latency measurement in milliseconds
pub fn record_latency(metric: LatencyMetric, duration: Duration) {
    let name = match metric {
        LatencyMetric::Tick => "spreadarb_tick_duration_ms",
        LatencyMetric::PricePoll => "spreadarb_price_poll_duration_ms",
    };
    histogram!(name).record(duration.as_secs_f64() * 1000.0);
}
