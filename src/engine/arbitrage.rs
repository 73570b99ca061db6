//! The arbitrage loop

use super::{HealthReport, LoopSettings, TickReport};
use crate::config::Config;
use crate::execution::{ExecutionEngine, ExecutionError, ExecutionOutcome, ExecutionRequest};
use crate::feed::{FeedError, PriceFeed, PriceQuote, PriceSource, Venue};
use crate::report::{EngineEvent, ReportSink, SessionSnapshot};
use crate::risk::{CloseReason, ClosedPosition, PositionManager, PositionStatus, RiskLimits};
use crate::signal::{Decision, DetectorConfig, OpportunityDetector, Spread, SpreadCalculator, SpreadConfig};
use crate::symbol::Symbol;
use crate::telemetry::{self, CounterMetric, GaugeMetric, LatencyMetric};
use anyhow::Context;
use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::MissedTickBehavior;

/// Drives both feeds, the detector and the position manager once per tick.
///
/// Decision logic runs on the loop's own task; only price polls and
/// execution requests leave it.
pub struct ArbitrageLoop {
    settings: LoopSettings,
    feed_a: PriceFeed,
    feed_b: PriceFeed,
    calculator: SpreadCalculator,
    detector: OpportunityDetector,
    positions: PositionManager,
    executor: Arc<dyn ExecutionEngine>,
    sink: Arc<dyn ReportSink>,
    outcome_tx: mpsc::UnboundedSender<ExecutionOutcome>,
    outcome_rx: mpsc::UnboundedReceiver<ExecutionOutcome>,
    in_flight: usize,
    /// Last reported health of feed A and feed B
    reported_health: [Option<bool>; 2],
    started_at: DateTime<Utc>,
    ticks: u64,
    opportunities: u64,
    refusals: u64,
}

impl ArbitrageLoop {
    /// Build the loop from validated configuration. `source_a` quotes the
    /// perpetual venue, `source_b` the DEX aggregator.
    pub fn new(
        config: &Config,
        source_a: Arc<dyn PriceSource>,
        source_b: Arc<dyn PriceSource>,
        executor: Arc<dyn ExecutionEngine>,
        sink: Arc<dyn ReportSink>,
    ) -> Self {
        let settings = LoopSettings::from_config(config);
        let poll_interval = crate::config::seconds(config.monitoring.price_update_interval_secs);
        let reconnect_attempts = config.monitoring.reconnect_attempts;
        let limits = RiskLimits::from_config(config);

        let calculator = SpreadCalculator::new(SpreadConfig {
            fee_rate_a: config.venues.cex.fee_rate,
            fee_rate_b: config.venues.dex.fee_rate,
            max_price_age: limits.max_price_age,
        });
        let detector = OpportunityDetector::new(
            DetectorConfig {
                min_spread_percent: config.trading.min_spread_percent,
                target_spread_percent: config.trading.target_spread_percent,
            },
            &settings.symbols,
        );
        let positions = PositionManager::new(
            limits,
            config.trading.position_size,
            config.trading.leverage,
            crate::config::seconds(config.execution.confirm_timeout_secs),
        );
        let (outcome_tx, outcome_rx) = mpsc::unbounded_channel();

        Self {
            settings,
            feed_a: PriceFeed::new(source_a, reconnect_attempts, poll_interval),
            feed_b: PriceFeed::new(source_b, reconnect_attempts, poll_interval),
            calculator,
            detector,
            positions,
            executor,
            sink,
            outcome_tx,
            outcome_rx,
            in_flight: 0,
            reported_health: [None, None],
            started_at: Utc::now(),
            ticks: 0,
            opportunities: 0,
            refusals: 0,
        }
    }

    pub fn settings(&self) -> &LoopSettings {
        &self.settings
    }

    pub fn positions(&self) -> &PositionManager {
        &self.positions
    }

    pub fn detector(&self) -> &OpportunityDetector {
        &self.detector
    }

    pub fn feed(&self, venue: Venue) -> &PriceFeed {
        if self.feed_a.venue() == venue {
            &self.feed_a
        } else {
            &self.feed_b
        }
    }

    /// Execution requests dispatched but not yet resolved
    pub fn in_flight(&self) -> usize {
        self.in_flight
    }

    /// Run one full evaluation cycle at time `now`
    pub async fn tick(&mut self, now: DateTime<Utc>) -> TickReport {
        let started = Instant::now();
        let mut report = TickReport::new(now);
        self.ticks += 1;
        telemetry::increment(CounterMetric::Ticks);

        self.drain_outcomes(now, &mut report);
        self.poll_prices(now).await;
        self.compute_spreads(now, &mut report);

        for spread in &report.spreads {
            self.positions.mark(spread);
        }

        // Forced exits always settle before this tick's entries
        report.forced = self.positions.sweep(now);
        for forced in &report.forced {
            self.detector.on_position_closed(&forced.symbol);
            self.sink.emit(EngineEvent::CloseRequested {
                position_id: forced.position_id,
                symbol: forced.symbol.clone(),
                reason: forced.reason,
                attempt: 1,
                at: now,
            });
        }

        report.retries = self.positions.reconcile(now);
        for retry in &report.retries {
            let reason = self
                .positions
                .position_by_id(retry.position_id)
                .and_then(|p| p.close_reason)
                .unwrap_or(CloseReason::TargetReached);
            self.sink.emit(EngineEvent::CloseRequested {
                position_id: retry.position_id,
                symbol: retry.symbol.clone(),
                reason,
                attempt: retry.attempts,
                at: now,
            });
        }

        for spread in &report.spreads {
            let decision = self.detector.evaluate(spread, &mut self.positions, now);
            self.report_decision(spread, &decision, now);
            report.decisions.push((spread.symbol.clone(), decision));
        }

        report.dispatched = self.dispatch();
        self.update_gauges();
        telemetry::record_latency(LatencyMetric::Tick, started.elapsed());

        tracing::debug!(
            tick = self.ticks,
            spreads = report.spreads.len(),
            skipped = report.skipped.len(),
            forced = report.forced.len(),
            dispatched = report.dispatched,
            "Tick complete"
        );
        report
    }

    /// Poll every (symbol, venue) pair with bounded parallelism; each result
    /// lands only in its own feed slot
    async fn poll_prices(&mut self, now: DateTime<Utc>) {
        let started = Instant::now();
        let poll_timeout = self.settings.poll_timeout;
        let jobs: Vec<(usize, Symbol, Arc<dyn PriceSource>)> = self
            .settings
            .symbols
            .iter()
            .flat_map(|s| [(0, s.clone(), self.feed_a.source()), (1, s.clone(), self.feed_b.source())])
            .collect();

        let results: Vec<(usize, Symbol, Result<PriceQuote, FeedError>)> = stream::iter(jobs)
            .map(|(slot, symbol, source)| async move {
                let result = match tokio::time::timeout(poll_timeout, source.poll(&symbol)).await {
                    Ok(result) => result,
                    Err(_) => Err(FeedError::Timeout),
                };
                (slot, symbol, result)
            })
            .buffer_unordered(self.settings.max_concurrent_polls)
            .collect()
            .await;

        for (slot, symbol, result) in results {
            let feed = if slot == 0 { &mut self.feed_a } else { &mut self.feed_b };
            if result.is_err() {
                telemetry::record_feed_failure(feed.venue());
            }
            feed.record(&symbol, result, now);
        }
        telemetry::record_latency(LatencyMetric::PricePoll, started.elapsed());
    }

    /// One spread per symbol quoted by both venues. A symbol never quoted by
    /// one venue is skipped without affecting the others.
    fn compute_spreads(&self, now: DateTime<Utc>, report: &mut TickReport) {
        for symbol in &self.settings.symbols {
            let quotes = self
                .feed_a
                .latest(symbol)
                .and_then(|a| self.feed_b.latest(symbol).map(|b| (a, b)));
            match quotes {
                Ok((a, b)) => report.spreads.push(self.calculator.compute(a, b, now)),
                Err(e) => {
                    tracing::debug!(symbol = %symbol, error = %e, "Symbol skipped");
                    report.skipped.push(symbol.clone());
                }
            }
        }
    }

    fn report_decision(&mut self, spread: &Spread, decision: &Decision, now: DateTime<Utc>) {
        match decision {
            Decision::Enter { direction, .. } => {
                self.opportunities += 1;
                telemetry::increment(CounterMetric::Opportunities);
                telemetry::increment(CounterMetric::PositionsOpened);
                self.sink.emit(EngineEvent::OpportunityDetected {
                    symbol: spread.symbol.clone(),
                    direction: *direction,
                    net_spread_percent: spread.net_spread_percent,
                    at: now,
                });
                if let Some(position) = self.positions.position(&spread.symbol) {
                    self.sink.emit(EngineEvent::PositionOpened {
                        position_id: position.id,
                        symbol: position.symbol.clone(),
                        direction: position.direction,
                        entry_spread_percent: position.entry_spread_percent,
                        size: position.size,
                        leverage: position.leverage,
                        at: now,
                    });
                }
            }
            Decision::Refused(err) => {
                self.opportunities += 1;
                self.refusals += 1;
                telemetry::increment(CounterMetric::Opportunities);
                telemetry::increment(CounterMetric::AdmissionRefused);
                if let Some(direction) = spread.direction() {
                    self.sink.emit(EngineEvent::OpportunityDetected {
                        symbol: spread.symbol.clone(),
                        direction,
                        net_spread_percent: spread.net_spread_percent,
                        at: now,
                    });
                }
                self.sink.emit(EngineEvent::refused(&spread.symbol, err, now));
            }
            Decision::Exit { position_id } => {
                self.sink.emit(EngineEvent::CloseRequested {
                    position_id: *position_id,
                    symbol: spread.symbol.clone(),
                    reason: CloseReason::TargetReached,
                    attempt: 1,
                    at: now,
                });
            }
            Decision::Hold | Decision::Wait => {}
        }
    }

    /// Hand queued requests to the execution engine. Each runs on its own
    /// task under the confirmation timeout and reports back over the
    /// outcome channel.
    fn dispatch(&mut self) -> usize {
        let requests = self.positions.drain_requests();
        let count = requests.len();
        for request in requests {
            let executor = Arc::clone(&self.executor);
            let tx = self.outcome_tx.clone();
            let confirm_timeout = self.settings.confirm_timeout;
            self.in_flight += 1;

            tokio::spawn(async move {
                let submit = async {
                    match &request {
                        ExecutionRequest::Open(order) => executor.submit_open(order).await,
                        ExecutionRequest::Close { position_id, .. } => executor.submit_close(*position_id).await,
                    }
                };
                let result = match tokio::time::timeout(confirm_timeout, submit).await {
                    Ok(result) => result,
                    Err(_) => Err(ExecutionError::Timeout(confirm_timeout.as_secs())),
                };
                // loop already gone at shutdown
                let _ = tx.send(ExecutionOutcome { request, result });
            });
        }
        count
    }

    fn drain_outcomes(&mut self, now: DateTime<Utc>, report: &mut TickReport) {
        while let Ok(outcome) = self.outcome_rx.try_recv() {
            if let Some(closed) = self.apply_outcome(outcome, now) {
                report.closed.push(closed);
            }
        }
    }

    fn apply_outcome(&mut self, outcome: ExecutionOutcome, now: DateTime<Utc>) -> Option<ClosedPosition> {
        self.in_flight = self.in_flight.saturating_sub(1);
        let ExecutionOutcome { request, result } = outcome;
        let position_id = request.position_id();
        let symbol = request.symbol().clone();

        match (request.is_close(), result) {
            (false, Ok(confirmation)) => {
                tracing::debug!(
                    position_id = %position_id,
                    order_ref = %confirmation.order_ref,
                    "Open confirmed"
                );
                None
            }
            (false, Err(err)) => {
                telemetry::increment(CounterMetric::ExecutionFailures);
                if self.positions.position_by_id(position_id).is_none() {
                    // Retired while the open was in flight; the symbol may
                    // already hold a newer position
                    tracing::warn!(
                        position_id = %position_id,
                        symbol = %symbol,
                        error = %err,
                        "Dropping open failure for a retired position"
                    );
                    return None;
                }
                self.sink
                    .emit(EngineEvent::execution_error(position_id, &symbol, false, &err, now));
                self.detector.on_position_closed(&symbol);

                if matches!(err, ExecutionError::Timeout(_)) {
                    // Exchange state unknown: flatten through the close path
                    if self.positions.close_by_id(position_id, CloseReason::ExecutionFailed, now).is_ok() {
                        self.sink.emit(EngineEvent::CloseRequested {
                            position_id,
                            symbol,
                            reason: CloseReason::ExecutionFailed,
                            attempt: 1,
                            at: now,
                        });
                    }
                    return None;
                }
                let closed = self.positions.abort_open(position_id, now)?;
                self.report_closed(&closed);
                Some(closed)
            }
            (true, Ok(_)) => {
                let closed = self.positions.confirm_close(position_id, now)?;
                self.report_closed(&closed);
                Some(closed)
            }
            (true, Err(err)) => {
                telemetry::increment(CounterMetric::ExecutionFailures);
                self.positions.close_failed(position_id);
                self.sink
                    .emit(EngineEvent::execution_error(position_id, &symbol, true, &err, now));
                None
            }
        }
    }

    fn report_closed(&self, closed: &ClosedPosition) {
        let reason = closed.position.close_reason.unwrap_or(CloseReason::TargetReached);
        telemetry::record_close(reason);
        self.sink.emit(EngineEvent::PositionClosed {
            position_id: closed.position.id,
            symbol: closed.position.symbol.clone(),
            reason,
            realized_pnl_percent: closed.realized_pnl_percent,
            realized_pnl: closed.realized_pnl,
            held_secs: closed.held_secs,
            at: closed.closed_at,
        });
    }

    /// Wait up to `timeout` for in-flight execution requests, applying each
    /// outcome as it arrives. Requests queued by those outcomes are
    /// dispatched too.
    pub async fn settle(&mut self, now: DateTime<Utc>, timeout: Duration) -> Vec<ClosedPosition> {
        let deadline = tokio::time::Instant::now() + timeout;
        let mut closed = vec![];
        loop {
            self.dispatch();
            if self.in_flight == 0 {
                break;
            }
            match tokio::time::timeout_at(deadline, self.outcome_rx.recv()).await {
                Ok(Some(outcome)) => {
                    if let Some(c) = self.apply_outcome(outcome, now) {
                        closed.push(c);
                    }
                }
                Ok(None) | Err(_) => break,
            }
        }
        closed
    }

    /// Read feed health and report transitions. Never blocks trading.
    pub fn check_health(&mut self, now: DateTime<Utc>) -> HealthReport {
        let feeds = [self.feed_a.status(now), self.feed_b.status(now)];
        let needs_reconnect = [self.feed_a.needs_reconnect(), self.feed_b.needs_reconnect()];
        let mut report = HealthReport {
            feeds: vec![],
            degraded: vec![],
            recovered: vec![],
        };

        for (slot, status) in feeds.into_iter().enumerate() {
            telemetry::set_feed_health(status.venue, status.healthy);
            if needs_reconnect[slot] {
                tracing::warn!(
                    venue = %status.venue,
                    consecutive_failures = status.consecutive_failures,
                    "Feed exceeded reconnect attempts"
                );
            }

            let was_healthy = self.reported_health[slot].unwrap_or(true);
            if was_healthy && !status.healthy {
                report.degraded.push(status.venue);
                self.sink.emit(EngineEvent::FeedDegraded {
                    venue: status.venue,
                    status: status.clone(),
                });
            } else if !was_healthy && status.healthy {
                report.recovered.push(status.venue);
                self.sink.emit(EngineEvent::FeedRecovered {
                    venue: status.venue,
                    status: status.clone(),
                });
            }
            self.reported_health[slot] = Some(status.healthy);
            report.feeds.push(status);
        }

        tracing::info!(
            healthy = report.all_healthy(),
            open_positions = self.positions.open_count(),
            realized_pnl = %self.positions.stats().realized_pnl,
            "Health check"
        );
        report
    }

    fn update_gauges(&self) {
        let live = self.positions.live_positions();
        let closing = live.iter().filter(|p| p.status == PositionStatus::Closing).count();
        let unrealized: Decimal = live.iter().map(|p| p.unrealized_pnl()).sum();

        telemetry::set_gauge(GaugeMetric::OpenPositions, self.positions.open_count() as f64);
        telemetry::set_gauge(GaugeMetric::ClosingPositions, closing as f64);
        telemetry::set_gauge(GaugeMetric::UnrealizedPnl, unrealized.to_f64().unwrap_or_default());
        telemetry::set_gauge(
            GaugeMetric::RealizedPnl,
            self.positions.stats().realized_pnl.to_f64().unwrap_or_default(),
        );
    }

    /// Current session state
    pub fn snapshot(&self, now: DateTime<Utc>) -> SessionSnapshot {
        SessionSnapshot {
            started_at: self.started_at,
            ended_at: now,
            ticks: self.ticks,
            opportunities_detected: self.opportunities,
            admission_refusals: self.refusals,
            stats: self.positions.stats().clone(),
            live_positions: self.positions.live_positions(),
            closed_positions: self.positions.closed_positions().to_vec(),
            feeds: vec![self.feed_a.status(now), self.feed_b.status(now)],
        }
    }

    /// Settle outstanding execution work, hand off every live position and
    /// write the session snapshot. Positions are never closed here.
    pub async fn shutdown(&mut self) -> anyhow::Result<SessionSnapshot> {
        self.settle(Utc::now(), self.settings.confirm_timeout).await;
        if self.in_flight > 0 {
            tracing::warn!(in_flight = self.in_flight, "Abandoning unconfirmed execution requests");
        }

        let now = Utc::now();
        self.sink.emit(EngineEvent::OpenPositionsAtShutdown {
            positions: self.positions.live_positions(),
            at: now,
        });

        let snapshot = self.snapshot(now);
        snapshot
            .write_to(&self.settings.snapshot_dir)
            .context("Failed to write session snapshot")?;
        Ok(snapshot)
    }

    /// Tick until `shutdown` flips to true (or its sender is dropped), then
    /// shut down cleanly
    pub async fn run(&mut self, mut shutdown: watch::Receiver<bool>) -> anyhow::Result<SessionSnapshot> {
        tracing::info!(
            symbols = self.settings.symbols.len(),
            tick_ms = self.settings.tick_interval.as_millis() as u64,
            health_secs = self.settings.health_interval.as_secs(),
            "Arbitrage loop started"
        );
        self.started_at = Utc::now();

        let mut ticker = tokio::time::interval(self.settings.tick_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut health = tokio::time::interval_at(
            tokio::time::Instant::now() + self.settings.health_interval,
            self.settings.health_interval,
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.tick(Utc::now()).await;
                }
                _ = health.tick() => {
                    self.check_health(Utc::now());
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!(ticks = self.ticks, "Arbitrage loop stopping");
        self.shutdown().await
    }
}
