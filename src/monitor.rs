use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;
use tracing::warn;

pub const DEBUG_CONSECUTIVE_LIMIT: u64 = 5;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MonitorPolicy {
    pub max_consecutive_failures: u64,
    pub min_sample_size: u64,
    pub max_failure_rate: f64,
    pub debug: bool,
}

impl Default for MonitorPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 10,
            min_sample_size: 50,
            max_failure_rate: 0.20,
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ProgressCounters {
    pub completed: u64,
    pub failed: u64,
    pub consecutive_failures: u64,
    pub total_processed: u64,
}

impl ProgressCounters {
    pub fn failure_rate(&self) -> f64 {
        if self.total_processed == 0 {
            return 0.0;
        }
        self.failed as f64 / self.total_processed as f64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitOutcome {
    Success,
    Failure,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    Running,
    Halted,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HaltReason {
    ConsecutiveFailures { count: u64, limit: u64 },
    FailureRate { failed: u64, total: u64, limit: f64 },
    DebugConsecutiveFailures { count: u64 },
}

impl fmt::Display for HaltReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HaltReason::ConsecutiveFailures { count, limit } => {
                write!(f, "{count} consecutive failures (limit {limit})")
            }
            HaltReason::FailureRate {
                failed,
                total,
                limit,
            } => write!(
                f,
                "failure rate {:.1}% ({failed}/{total}) exceeds {:.1}%",
                *failed as f64 / *total as f64 * 100.0,
                limit * 100.0
            ),
            HaltReason::DebugConsecutiveFailures { count } => {
                write!(f, "{count} consecutive failures in debug mode")
            }
        }
    }
}

#[derive(Debug, Default)]
struct MonitorInner {
    counters: ProgressCounters,
    halt: Option<HaltReason>,
}

/// Run-wide failure accounting. [`FailureMonitor::record`] updates the counters and
/// evaluates the halt policy in one critical section; once halted it stays halted.
#[derive(Debug)]
pub struct FailureMonitor {
    policy: MonitorPolicy,
    inner: Mutex<MonitorInner>,
    halted: AtomicBool,
}

impl FailureMonitor {
    pub fn new(policy: MonitorPolicy) -> Self {
        Self {
            policy,
            inner: Mutex::new(MonitorInner::default()),
            halted: AtomicBool::new(false),
        }
    }

    pub fn record(&self, outcome: UnitOutcome) -> MonitorState {
        let mut inner = self.lock();
        let counters = &mut inner.counters;
        counters.total_processed += 1;
        match outcome {
            UnitOutcome::Success => {
                counters.completed += 1;
                counters.consecutive_failures = 0;
            }
            UnitOutcome::Failure => {
                counters.failed += 1;
                counters.consecutive_failures += 1;
            }
        }

        if inner.halt.is_none() {
            if let Some(reason) = self.evaluate(&inner.counters) {
                warn!("halting run: {reason}");
                inner.halt = Some(reason);
                self.halted.store(true, Ordering::SeqCst);
            }
        }

        if inner.halt.is_some() {
            MonitorState::Halted
        } else {
            MonitorState::Running
        }
    }

    pub fn is_halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    pub fn state(&self) -> MonitorState {
        if self.is_halted() {
            MonitorState::Halted
        } else {
            MonitorState::Running
        }
    }

    pub fn halt_reason(&self) -> Option<HaltReason> {
        self.lock().halt
    }

    pub fn counters(&self) -> ProgressCounters {
        self.lock().counters
    }

    fn evaluate(&self, counters: &ProgressCounters) -> Option<HaltReason> {
        if self.policy.debug && counters.consecutive_failures >= DEBUG_CONSECUTIVE_LIMIT {
            return Some(HaltReason::DebugConsecutiveFailures {
                count: counters.consecutive_failures,
            });
        }
        if counters.consecutive_failures >= self.policy.max_consecutive_failures {
            return Some(HaltReason::ConsecutiveFailures {
                count: counters.consecutive_failures,
                limit: self.policy.max_consecutive_failures,
            });
        }
        if counters.total_processed >= self.policy.min_sample_size
            && counters.failure_rate() > self.policy.max_failure_rate
        {
            return Some(HaltReason::FailureRate {
                failed: counters.failed,
                total: counters.total_processed,
                limit: self.policy.max_failure_rate,
            });
        }
        None
    }

    fn lock(&self) -> MutexGuard<'_, MonitorInner> {
        self.inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn success_resets_streak() {
        let monitor = FailureMonitor::new(MonitorPolicy::default());
        for _ in 0..9 {
            monitor.record(UnitOutcome::Failure);
        }
        monitor.record(UnitOutcome::Success);
        let counters = monitor.counters();
        assert_eq!(counters.consecutive_failures, 0);
        assert_eq!(counters.completed + counters.failed, counters.total_processed);
        assert_eq!(monitor.state(), MonitorState::Running);
    }

    #[test]
    fn halt_reason_display() {
        let reason = HaltReason::FailureRate {
            failed: 11,
            total: 50,
            limit: 0.2,
        };
        assert_eq!(reason.to_string(), "failure rate 22.0% (11/50) exceeds 20.0%");
    }
}
