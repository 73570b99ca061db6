//! End-to-end scenarios through the arbitrage loop

use crate::common::{config, sym, without_pnl_exits, Harness, ScriptedEngine};
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use spread_arb::config::Config;
use spread_arb::report::EngineEvent;
use spread_arb::risk::{CloseReason, PositionStatus, RiskError};
use spread_arb::signal::{Decision, Direction, OpportunityState};
use std::time::Duration as StdDuration;
use tempfile::TempDir;

const SETTLE: StdDuration = StdDuration::from_secs(2);

#[test]
fn test_config_example_loads() {
    let config = Config::from_toml(include_str!("../../config.toml.example")).unwrap();
    assert_eq!(config.trading.min_spread_percent, dec!(7.5));
    assert_eq!(config.trading.target_spread_percent, dec!(1.5));
    assert_eq!(config.trading.position_size, dec!(50));
    assert_eq!(config.risk.max_positions, 10);
    assert_eq!(config.trading.symbols, vec![sym("DIS/USDT"), sym("UPTOP/USDT")]);
}

#[tokio::test]
async fn test_scenario_a_enter_on_wide_spread() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    let report = h.engine.tick(t0).await;

    let spread = report.spread(&dis).unwrap();
    assert!(spread.valid);
    assert_eq!(spread.raw_spread_percent, dec!(9));
    assert_eq!(spread.net_spread_percent, dec!(8.68));
    assert!(matches!(
        report.decision(&dis),
        Some(Decision::Enter {
            direction: Direction::LongAShortB,
            ..
        })
    ));
    assert_eq!(h.engine.detector().state(&dis), Some(OpportunityState::InPosition));

    let position = h.engine.positions().position(&dis).unwrap();
    assert_eq!(position.size, dec!(50));
    assert_eq!(position.leverage, 10);
    assert_eq!(position.entry_spread_percent, dec!(8.68));

    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::OpportunityDetected { .. })));
    assert!(events.iter().any(|e| matches!(e, EngineEvent::PositionOpened { .. })));
}

#[tokio::test]
async fn test_scenario_b_exit_at_target() {
    let tmp = TempDir::new().unwrap();
    let config = without_pnl_exits(config(&["DIS/USDT"], 10, tmp.path()));
    let mut h = Harness::new(&config, ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;

    let t1 = t0 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.010), t1);
    let report = h.engine.tick(t1).await;

    assert_eq!(report.spread(&dis).unwrap().net_spread_percent, dec!(0.68));
    assert!(matches!(report.decision(&dis), Some(Decision::Exit { .. })));
    assert_eq!(h.engine.detector().state(&dis), Some(OpportunityState::Idle));
    assert_eq!(
        h.engine.positions().position(&dis).unwrap().status,
        PositionStatus::Closing
    );

    let closed = h.engine.settle(t1, SETTLE).await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].position.close_reason, Some(CloseReason::TargetReached));
    // 8.0 points captured on 50 notional
    assert_eq!(closed[0].realized_pnl, dec!(4));
    assert!(!h.engine.positions().has_position(&dis));

    let events = h.drain_events();
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::PositionClosed {
            reason: CloseReason::TargetReached,
            ..
        }
    )));
}

#[tokio::test]
async fn test_take_profit_preempts_target_exit() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;

    // 8 points captured at 10x is far past the 4% take-profit; the sweep
    // runs before the detector so its reason wins
    let t1 = t0 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.010), t1);
    let report = h.engine.tick(t1).await;

    assert_eq!(report.forced.len(), 1);
    assert_eq!(report.forced[0].reason, CloseReason::TakeProfit);
    assert_eq!(report.forced[0].pnl_percent, dec!(80));
    assert_eq!(report.decision(&dis), Some(&Decision::Wait));
    assert_eq!(h.engine.detector().state(&dis), Some(OpportunityState::Idle));
}

#[tokio::test]
async fn test_scenario_c_forced_max_time() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;
    h.engine.settle(t0, SETTLE).await;

    // Spread still wide: only the time limit applies
    let later = t0 + Duration::seconds(3601);
    h.quote(&dis, dec!(1.000), dec!(1.090), later);
    let report = h.engine.tick(later).await;

    assert_eq!(report.forced.len(), 1);
    assert_eq!(report.forced[0].reason, CloseReason::MaxTime);
    // CLOSING still blocks a same-tick re-entry
    assert!(matches!(
        report.decision(&dis),
        Some(Decision::Refused(RiskError::AlreadyOpen(_)))
    ));

    let closed = h.engine.settle(later, SETTLE).await;
    assert_eq!(closed[0].position.close_reason, Some(CloseReason::MaxTime));
    assert_eq!(closed[0].held_secs, 3601);
}

#[tokio::test]
async fn test_scenario_c_max_time_without_fresh_prices() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;

    // Venue B goes dark; its last quote is kept but stale
    h.b.fail(&dis);
    let later = t0 + Duration::seconds(3601);
    h.a.set(&dis, dec!(1.000), later);
    let report = h.engine.tick(later).await;

    assert!(!report.spread(&dis).unwrap().valid);
    assert_eq!(report.forced.len(), 1);
    assert_eq!(report.forced[0].reason, CloseReason::MaxTime);
}

#[tokio::test]
async fn test_scenario_d_max_positions() {
    let tmp = TempDir::new().unwrap();
    let names: Vec<String> = (0..11).map(|i| format!("T{i}/USDT")).collect();
    let refs: Vec<&str> = names.iter().map(String::as_str).collect();
    let mut h = Harness::new(&config(&refs, 10, tmp.path()), ScriptedEngine::failing(0, 0));
    let t0 = Utc::now();

    for name in &names {
        h.quote(&sym(name), dec!(1.000), dec!(1.090), t0);
    }
    let report = h.engine.tick(t0).await;

    let eleventh = sym("T10/USDT");
    assert_eq!(
        report.decision(&eleventh),
        Some(&Decision::Refused(RiskError::LimitReached { open: 10, max: 10 }))
    );
    assert_eq!(h.engine.detector().state(&eleventh), Some(OpportunityState::Idle));
    assert_eq!(h.engine.positions().open_count(), 10);
    assert!(!h.engine.positions().has_position(&eleventh));

    let refused = h
        .drain_events()
        .into_iter()
        .filter(|e| matches!(e, EngineEvent::AdmissionRefused { .. }))
        .count();
    assert_eq!(refused, 1);
}

#[tokio::test]
async fn test_scenario_e_stale_quote_blocks_entry() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.a.set(&dis, dec!(1.000), t0);
    h.b.set(&dis, dec!(1.200), t0 - Duration::seconds(5));
    let report = h.engine.tick(t0).await;

    let spread = report.spread(&dis).unwrap();
    assert!(!spread.valid);
    assert_eq!(report.decision(&dis), Some(&Decision::Wait));
    assert!(!h.engine.positions().has_position(&dis));
    assert_eq!(report.dispatched, 0);
}

#[tokio::test]
async fn test_hysteresis_holds_between_thresholds() {
    let tmp = TempDir::new().unwrap();
    let config = without_pnl_exits(config(&["DIS/USDT"], 10, tmp.path()));
    let mut h = Harness::new(&config, ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let mut now = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), now);
    h.engine.tick(now).await;

    // Spread drifts between exit and entry thresholds, including back above
    // the entry level; never re-enters, never exits
    for price_b in [dec!(1.085), dec!(1.095), dec!(1.080), dec!(1.083)] {
        now += Duration::seconds(1);
        h.quote(&dis, dec!(1.000), price_b, now);
        let report = h.engine.tick(now).await;
        assert_eq!(report.decision(&dis), Some(&Decision::Hold));
    }
    assert_eq!(h.engine.positions().stats().positions_opened, 1);
}

#[tokio::test]
async fn test_round_trip_frees_slot() {
    let tmp = TempDir::new().unwrap();
    let config = without_pnl_exits(config(&["A/USDT", "B/USDT"], 1, tmp.path()));
    let mut h = Harness::new(&config, ScriptedEngine::failing(0, 0));
    let a = sym("A/USDT");
    let b = sym("B/USDT");
    let t0 = Utc::now();

    h.quote(&a, dec!(1.000), dec!(1.090), t0);
    h.quote(&b, dec!(1.000), dec!(1.010), t0);
    h.engine.tick(t0).await;
    assert_eq!(h.engine.positions().open_count(), 1);

    // A narrows and closes; B widens and takes the freed slot
    let t1 = t0 + Duration::seconds(1);
    h.quote(&a, dec!(1.000), dec!(1.010), t1);
    h.quote(&b, dec!(1.000), dec!(1.090), t1);
    let report = h.engine.tick(t1).await;

    assert!(matches!(report.decision(&a), Some(Decision::Exit { .. })));
    assert!(matches!(report.decision(&b), Some(Decision::Enter { .. })));
    assert_eq!(h.engine.detector().state(&a), Some(OpportunityState::Idle));
    assert_eq!(h.engine.positions().open_count(), 1);
}

#[tokio::test]
async fn test_shutdown_hands_off_live_positions() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(0, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;

    let snapshot = h.engine.shutdown().await.unwrap();
    assert_eq!(snapshot.live_positions.len(), 1);
    assert_eq!(snapshot.live_positions[0].status, PositionStatus::Open);
    assert_eq!(snapshot.ticks, 1);

    let shutdown_event = h
        .drain_events()
        .into_iter()
        .find(|e| matches!(e, EngineEvent::OpenPositionsAtShutdown { .. }));
    assert!(matches!(
        shutdown_event,
        Some(EngineEvent::OpenPositionsAtShutdown { ref positions, .. }) if positions.len() == 1
    ));

    let files: Vec<_> = std::fs::read_dir(tmp.path()).unwrap().collect();
    assert_eq!(files.len(), 1);
    // Still open: shutdown never closes positions
    assert!(h.engine.positions().position(&dis).unwrap().is_open());
}
