//! Execution failures, retries and reconciliation

use crate::common::{config, sym, without_pnl_exits, Harness, ScriptedEngine};
use spread_arb::config::Config;
use std::path::Path;
use chrono::{Duration, Utc};
use rust_decimal_macros::dec;
use spread_arb::report::EngineEvent;
use spread_arb::risk::{CloseReason, PositionStatus};
use spread_arb::signal::OpportunityState;
use std::sync::atomic::Ordering;
use std::time::Duration as StdDuration;
use tempfile::TempDir;

const SETTLE: StdDuration = StdDuration::from_secs(2);
const STALL: StdDuration = StdDuration::from_secs(5);

/// One symbol, no PnL exits, one second to confirm any order
fn quick_timeout_config(dir: &Path) -> Config {
    let mut config = without_pnl_exits(config(&["DIS/USDT"], 10, dir));
    config.execution.confirm_timeout_secs = 1;
    config
}

#[tokio::test]
async fn test_rejected_open_frees_symbol() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(1, 0));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;
    let closed = h.engine.settle(t0, SETTLE).await;

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].position.close_reason, Some(CloseReason::ExecutionFailed));
    assert!(!h.engine.positions().has_position(&dis));
    assert_eq!(h.engine.detector().state(&dis), Some(OpportunityState::Idle));

    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::ExecutionFailed { closing: false, .. })));

    // Next tick the opportunity is still there and is taken again
    let t1 = t0 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.090), t1);
    h.engine.tick(t1).await;
    h.engine.settle(t1, SETTLE).await;
    assert!(h.engine.positions().position(&dis).unwrap().is_open());
    assert_eq!(h.executor.opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_failed_close_is_retried() {
    let tmp = TempDir::new().unwrap();
    let config = without_pnl_exits(config(&["DIS/USDT"], 10, tmp.path()));
    let mut h = Harness::new(&config, ScriptedEngine::failing(0, 1));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;
    h.engine.settle(t0, SETTLE).await;

    let t1 = t0 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.010), t1);
    h.engine.tick(t1).await;
    let closed = h.engine.settle(t1, SETTLE).await;
    assert!(closed.is_empty());

    let position = h.engine.positions().position(&dis).unwrap();
    assert_eq!(position.status, PositionStatus::Closing);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::ExecutionFailed { closing: true, .. })));

    // Not yet due for a retry
    let t2 = t1 + Duration::seconds(5);
    h.quote(&dis, dec!(1.000), dec!(1.010), t2);
    assert!(h.engine.tick(t2).await.retries.is_empty());

    // Confirm timeout (10s) after the first attempt
    let t3 = t1 + Duration::seconds(10);
    h.quote(&dis, dec!(1.000), dec!(1.010), t3);
    let report = h.engine.tick(t3).await;
    assert_eq!(report.retries.len(), 1);
    assert_eq!(report.retries[0].attempts, 2);

    let closed = h.engine.settle(t3, SETTLE).await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].position.close_reason, Some(CloseReason::TargetReached));
    assert_eq!(closed[0].position.close_attempts, 2);
    assert_eq!(h.executor.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_closing_position_not_swept_again() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&config(&["DIS/USDT"], 10, tmp.path()), ScriptedEngine::failing(0, 5));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;

    let later = t0 + Duration::seconds(3601);
    h.quote(&dis, dec!(1.000), dec!(1.090), later);
    assert_eq!(h.engine.tick(later).await.forced.len(), 1);
    h.engine.settle(later, SETTLE).await;

    let again = later + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.090), again);
    let report = h.engine.tick(again).await;
    assert!(report.forced.is_empty());
    assert_eq!(
        h.engine.positions().position(&dis).unwrap().close_reason,
        Some(CloseReason::MaxTime)
    );
}

#[tokio::test]
async fn test_timed_out_close_stays_closing_and_retries() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&quick_timeout_config(tmp.path()), ScriptedEngine::stalling(0, 1, STALL));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;
    h.engine.settle(t0, SETTLE).await;

    let t1 = t0 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.010), t1);
    h.engine.tick(t1).await;
    let closed = h.engine.settle(t1, SETTLE).await;
    assert!(closed.is_empty());
    assert_eq!(h.engine.in_flight(), 0);

    let position = h.engine.positions().position(&dis).unwrap();
    assert_eq!(position.status, PositionStatus::Closing);
    assert_eq!(position.close_attempts, 1);
    assert!(h
        .drain_events()
        .iter()
        .any(|e| matches!(e, EngineEvent::ExecutionTimeout { closing: true, .. })));

    let t2 = t1 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.010), t2);
    let report = h.engine.tick(t2).await;
    assert_eq!(report.retries.len(), 1);
    assert_eq!(report.retries[0].attempts, 2);
    assert!(h.drain_events().iter().any(|e| matches!(
        e,
        EngineEvent::CloseRequested {
            reason: CloseReason::TargetReached,
            attempt: 2,
            ..
        }
    )));

    let closed = h.engine.settle(t2, SETTLE).await;
    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].position.close_reason, Some(CloseReason::TargetReached));
    assert_eq!(closed[0].position.close_attempts, 2);
    assert_eq!(h.executor.closes.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_timed_out_open_is_flattened() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&quick_timeout_config(tmp.path()), ScriptedEngine::stalling(1, 0, STALL));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;
    let closed = h.engine.settle(t0, SETTLE).await;

    assert_eq!(closed.len(), 1);
    assert_eq!(closed[0].position.close_reason, Some(CloseReason::ExecutionFailed));
    assert_eq!(closed[0].realized_pnl, dec!(0));
    assert!(!h.engine.positions().has_position(&dis));
    assert_eq!(h.engine.detector().state(&dis), Some(OpportunityState::Idle));
    assert_eq!(h.executor.opens.load(Ordering::SeqCst), 0);
    assert_eq!(h.executor.closes.load(Ordering::SeqCst), 1);

    let events = h.drain_events();
    assert!(events
        .iter()
        .any(|e| matches!(e, EngineEvent::ExecutionTimeout { closing: false, .. })));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::CloseRequested {
            reason: CloseReason::ExecutionFailed,
            ..
        }
    )));
    assert!(events.iter().any(|e| matches!(
        e,
        EngineEvent::PositionClosed {
            reason: CloseReason::ExecutionFailed,
            ..
        }
    )));
}

#[tokio::test]
async fn test_late_open_timeout_leaves_successor_alone() {
    let tmp = TempDir::new().unwrap();
    let mut h = Harness::new(&quick_timeout_config(tmp.path()), ScriptedEngine::stalling(1, 0, STALL));
    let dis = sym("DIS/USDT");
    let t0 = Utc::now();

    // First open hangs on the exchange
    h.quote(&dis, dec!(1.000), dec!(1.090), t0);
    h.engine.tick(t0).await;
    let first = h.engine.positions().position(&dis).unwrap().id;

    // Target reached and confirmed while the open is still pending
    let t1 = t0 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.010), t1);
    h.engine.tick(t1).await;
    tokio::time::sleep(StdDuration::from_millis(200)).await;

    // Spread widens again: the close is applied, then a new position opens
    let t2 = t1 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.090), t2);
    let report = h.engine.tick(t2).await;
    assert_eq!(report.closed.len(), 1);
    assert_eq!(report.closed[0].position.id, first);
    let second = h.engine.positions().position(&dis).unwrap().id;
    assert_ne!(first, second);
    h.drain_events();

    // The first open's timeout lands after the second position exists
    tokio::time::sleep(StdDuration::from_millis(1200)).await;
    let t3 = t2 + Duration::seconds(1);
    h.quote(&dis, dec!(1.000), dec!(1.090), t3);
    h.engine.tick(t3).await;

    let position = h.engine.positions().position(&dis).unwrap();
    assert_eq!(position.id, second);
    assert_eq!(position.status, PositionStatus::Open);
    assert_eq!(position.close_reason, None);
    assert_eq!(h.engine.detector().state(&dis), Some(OpportunityState::InPosition));
    assert_eq!(h.engine.in_flight(), 0);

    let events = h.drain_events();
    assert!(!events.iter().any(|e| matches!(
        e,
        EngineEvent::ExecutionTimeout { .. }
            | EngineEvent::CloseRequested {
                reason: CloseReason::ExecutionFailed,
                ..
            }
    )));
}
