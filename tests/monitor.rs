use std::thread;

use assert_matches::assert_matches;
use tranche_dock::monitor::{
    FailureMonitor, HaltReason, MonitorPolicy, MonitorState, UnitOutcome,
};

fn record_pattern(monitor: &FailureMonitor, pattern: &[UnitOutcome], repeat: usize) -> MonitorState {
    let mut state = MonitorState::Running;
    for _ in 0..repeat {
        for outcome in pattern {
            state = monitor.record(*outcome);
        }
    }
    state
}

#[test]
fn ten_consecutive_failures_halt() {
    let monitor = FailureMonitor::new(MonitorPolicy::default());
    for _ in 0..9 {
        assert_eq!(monitor.record(UnitOutcome::Failure), MonitorState::Running);
    }
    assert_eq!(monitor.record(UnitOutcome::Failure), MonitorState::Halted);
    assert_matches!(
        monitor.halt_reason(),
        Some(HaltReason::ConsecutiveFailures { count: 10, limit: 10 })
    );
}

#[test]
fn rate_rule_waits_for_minimum_sample() {
    use UnitOutcome::{Failure, Success};
    let monitor = FailureMonitor::new(MonitorPolicy::default());

    // 11 failures in the first 44 units: 25% but below the sample minimum
    let state = record_pattern(&monitor, &[Success, Success, Success, Failure], 11);
    assert_eq!(state, MonitorState::Running);

    for _ in 0..5 {
        assert_eq!(monitor.record(Success), MonitorState::Running);
    }
    // 50th unit: 11/50 = 22% > 20%
    assert_eq!(monitor.record(Success), MonitorState::Halted);
    assert_matches!(
        monitor.halt_reason(),
        Some(HaltReason::FailureRate { failed: 11, total: 50, .. })
    );
}

#[test]
fn rate_exactly_at_limit_keeps_running() {
    use UnitOutcome::{Failure, Success};
    let monitor = FailureMonitor::new(MonitorPolicy::default());
    let state = record_pattern(&monitor, &[Success, Success, Success, Success, Failure], 10);
    assert_eq!(state, MonitorState::Running);
    assert_eq!(monitor.counters().total_processed, 50);
    assert!(monitor.halt_reason().is_none());
}

#[test]
fn debug_mode_halts_after_five() {
    let monitor = FailureMonitor::new(MonitorPolicy {
        debug: true,
        ..MonitorPolicy::default()
    });
    for _ in 0..4 {
        monitor.record(UnitOutcome::Failure);
    }
    assert!(!monitor.is_halted());
    monitor.record(UnitOutcome::Failure);
    assert!(monitor.is_halted());
    assert_matches!(
        monitor.halt_reason(),
        Some(HaltReason::DebugConsecutiveFailures { count: 5 })
    );
}

#[test]
fn halt_is_a_latch() {
    let monitor = FailureMonitor::new(MonitorPolicy::default());
    for _ in 0..10 {
        monitor.record(UnitOutcome::Failure);
    }
    for _ in 0..100 {
        assert_eq!(monitor.record(UnitOutcome::Success), MonitorState::Halted);
    }
    assert_eq!(monitor.state(), MonitorState::Halted);
    assert_matches!(
        monitor.halt_reason(),
        Some(HaltReason::ConsecutiveFailures { .. })
    );
}

#[test]
fn concurrent_records_are_all_counted() {
    let monitor = FailureMonitor::new(MonitorPolicy {
        max_consecutive_failures: u64::MAX,
        max_failure_rate: 1.0,
        ..MonitorPolicy::default()
    });
    thread::scope(|scope| {
        for worker in 0..8 {
            let monitor = &monitor;
            scope.spawn(move || {
                for i in 0..250 {
                    let outcome = if (worker + i) % 3 == 0 {
                        UnitOutcome::Failure
                    } else {
                        UnitOutcome::Success
                    };
                    monitor.record(outcome);
                }
            });
        }
    });
    let counters = monitor.counters();
    assert_eq!(counters.total_processed, 2000);
    assert_eq!(counters.completed + counters.failed, 2000);
    assert!(!monitor.is_halted());
}
