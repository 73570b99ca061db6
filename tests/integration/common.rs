//! Shared fixtures: scripted price sources and execution engines

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use spread_arb::config::Config;
use spread_arb::engine::ArbitrageLoop;
use spread_arb::execution::{Confirmation, ExecutionEngine, ExecutionError, OpenOrder};
use spread_arb::feed::{FeedError, PriceQuote, PriceSource, Venue};
use spread_arb::report::{ChannelSink, EngineEvent};
use spread_arb::risk::PositionId;
use spread_arb::symbol::Symbol;
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

pub fn sym(s: &str) -> Symbol {
    Symbol::parse(s).unwrap()
}

pub fn config(symbols: &[&str], max_positions: usize, snapshot_dir: &Path) -> Config {
    let symbols: Vec<String> = symbols.iter().map(|s| format!("\"{s}\"")).collect();
    let toml = format!(
        r#"
        [trading]
        min_spread_percent = 7.5
        target_spread_percent = 1.5
        max_position_size = 50
        leverage = 10
        symbols = [{}]

        [risk]
        max_positions = {}
        max_position_time_secs = 3600
        stop_loss_percent = 2.0
        take_profit_percent = 4.0

        [venues.cex]
        name = "mexc"
        fee_rate = 0.0002

        [venues.dex]
        name = "dexscreener"
        fee_rate = 0.003

        [monitoring]
        price_update_interval_secs = 1
        health_check_interval_secs = 30
        max_price_age_secs = 2
        reconnect_attempts = 5

        [execution]
        confirm_timeout_secs = 10
        snapshot_dir = "{}"
        "#,
        symbols.join(", "),
        max_positions,
        snapshot_dir.display()
    );
    Config::from_toml(&toml).unwrap()
}

/// Stop-loss and take-profit far out of reach, so only the detector and the
/// time limit close positions
pub fn without_pnl_exits(mut config: Config) -> Config {
    config.risk.stop_loss_percent = Decimal::from(1000);
    config.risk.take_profit_percent = Decimal::from(1000);
    config
}

/// Serves whatever quote the test last set per symbol
pub struct ScriptedSource {
    venue: Venue,
    quotes: Mutex<HashMap<Symbol, (Decimal, DateTime<Utc>)>>,
}

impl ScriptedSource {
    pub fn new(venue: Venue) -> Arc<Self> {
        Arc::new(Self {
            venue,
            quotes: Mutex::new(HashMap::new()),
        })
    }

    pub fn set(&self, symbol: &Symbol, price: Decimal, observed_at: DateTime<Utc>) {
        self.quotes.lock().unwrap().insert(symbol.clone(), (price, observed_at));
    }

    /// Make polls for this symbol fail
    pub fn fail(&self, symbol: &Symbol) {
        self.quotes.lock().unwrap().remove(symbol);
    }
}

#[async_trait]
impl PriceSource for ScriptedSource {
    fn venue(&self) -> Venue {
        self.venue
    }

    async fn poll(&self, symbol: &Symbol) -> Result<PriceQuote, FeedError> {
        let quote = self.quotes.lock().unwrap().get(symbol).copied();
        match quote {
            Some((price, at)) => PriceQuote::new(symbol.clone(), self.venue, price, at),
            None => Err(FeedError::NoPrice(symbol.clone())),
        }
    }
}

/// Confirms everything except the first `fail_opens` opens and the first
/// `fail_closes` closes. Stalled calls sleep for `stall` before confirming.
#[derive(Default)]
pub struct ScriptedEngine {
    fail_opens: AtomicUsize,
    fail_closes: AtomicUsize,
    stall_opens: AtomicUsize,
    stall_closes: AtomicUsize,
    stall: Duration,
    pub opens: AtomicUsize,
    pub closes: AtomicUsize,
}

impl ScriptedEngine {
    pub fn failing(fail_opens: usize, fail_closes: usize) -> Arc<Self> {
        Arc::new(Self {
            fail_opens: AtomicUsize::new(fail_opens),
            fail_closes: AtomicUsize::new(fail_closes),
            ..Default::default()
        })
    }

    /// Hang the first `opens` opens and `closes` closes for `stall`
    pub fn stalling(opens: usize, closes: usize, stall: Duration) -> Arc<Self> {
        Arc::new(Self {
            stall_opens: AtomicUsize::new(opens),
            stall_closes: AtomicUsize::new(closes),
            stall,
            ..Default::default()
        })
    }

    fn take_failure(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn confirm(position_id: PositionId) -> Confirmation {
        Confirmation {
            position_id,
            order_ref: format!("test-{position_id}"),
            confirmed_at: Utc::now(),
        }
    }
}

#[async_trait]
impl ExecutionEngine for ScriptedEngine {
    async fn submit_open(&self, order: &OpenOrder) -> Result<Confirmation, ExecutionError> {
        if Self::take_failure(&self.fail_opens) {
            return Err(ExecutionError::Rejected("insufficient margin".into()));
        }
        if Self::take_failure(&self.stall_opens) {
            tokio::time::sleep(self.stall).await;
        }
        self.opens.fetch_add(1, Ordering::SeqCst);
        Ok(Self::confirm(order.position_id))
    }

    async fn submit_close(&self, position_id: PositionId) -> Result<Confirmation, ExecutionError> {
        if Self::take_failure(&self.fail_closes) {
            return Err(ExecutionError::Transport("connection reset".into()));
        }
        if Self::take_failure(&self.stall_closes) {
            tokio::time::sleep(self.stall).await;
        }
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(Self::confirm(position_id))
    }
}

pub struct Harness {
    pub engine: ArbitrageLoop,
    pub a: Arc<ScriptedSource>,
    pub b: Arc<ScriptedSource>,
    pub executor: Arc<ScriptedEngine>,
    pub events: mpsc::UnboundedReceiver<EngineEvent>,
}

impl Harness {
    pub fn new(config: &Config, executor: Arc<ScriptedEngine>) -> Self {
        let a = ScriptedSource::new(Venue::Cex);
        let b = ScriptedSource::new(Venue::Dex);
        let (sink, events) = ChannelSink::new();
        let engine = ArbitrageLoop::new(
            config,
            a.clone(),
            b.clone(),
            executor.clone(),
            Arc::new(sink),
        );
        Self {
            engine,
            a,
            b,
            executor,
            events,
        }
    }

    /// Quote both venues for a symbol at `at`
    pub fn quote(&self, symbol: &Symbol, price_a: Decimal, price_b: Decimal, at: DateTime<Utc>) {
        self.a.set(symbol, price_a, at);
        self.b.set(symbol, price_b, at);
    }

    pub fn drain_events(&mut self) -> Vec<EngineEvent> {
        let mut events = vec![];
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }
}
