//! Per-target circuit breaker registry.
//!
//! # States
//! - Closed: calls flow normally
//! - Open: calls short-circuit without network I/O
//! - HalfOpen: one probe call is in flight after the cooldown
//!
//! # State Transitions
//! ```text
//! Closed   → Open:     consecutive failures reach the threshold
//! Open     → HalfOpen: recovery duration elapsed, next caller probes
//! HalfOpen → Closed:   probe succeeded, counter reset
//! HalfOpen → Open:     probe failed, cooldown restarts
//! ```
//!
//! A probe that never reports an outcome (its caller's future was dropped)
//! releases the HalfOpen slot after another recovery window, so the breaker
//! cannot stay stuck rejecting every call.
//!
//! One state per target service name, shared by all concurrent callers.
//! Every transition happens under a single lock acquisition, so no caller
//! ever observes a torn state.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerStatus {
    Closed,
    Open,
    HalfOpen,
}

#[derive(Debug)]
struct BreakerState {
    status: BreakerStatus,
    consecutive_failures: u32,
    last_failure: Option<Instant>,
    probe_started: Option<Instant>,
}

impl BreakerState {
    fn new() -> Self {
        Self {
            status: BreakerStatus::Closed,
            consecutive_failures: 0,
            last_failure: None,
            probe_started: None,
        }
    }
}

/// Registry of circuit breakers, keyed by target service name.
///
/// Lives for the process lifetime; targets are created lazily on first call.
pub struct BreakerRegistry {
    failure_threshold: u32,
    recovery: Duration,
    targets: Mutex<HashMap<String, BreakerState>>,
}

impl BreakerRegistry {
    pub fn new(failure_threshold: u32, recovery: Duration) -> Self {
        Self {
            failure_threshold,
            recovery,
            targets: Mutex::new(HashMap::new()),
        }
    }

    /// Gate a call to `target`.
    ///
    /// Returns `ServiceUnavailable` without any network I/O while the
    /// breaker is open and cooling down, or while another caller's probe is
    /// already in flight. When the cooldown has elapsed the breaker moves to
    /// `HalfOpen` and exactly this caller is admitted as the probe.
    pub fn check(&self, target: &str) -> Result<()> {
        let mut targets = self.targets.lock().unwrap();
        let state = targets
            .entry(target.to_string())
            .or_insert_with(BreakerState::new);

        match state.status {
            BreakerStatus::Closed => Ok(()),
            BreakerStatus::HalfOpen => {
                // A probe whose caller went away (the handler future was
                // dropped before it could record an outcome) must not hold
                // the slot forever; after a full recovery window the slot is
                // reclaimed by the next caller.
                let stale = state
                    .probe_started
                    .map(|at| at.elapsed() >= self.recovery)
                    .unwrap_or(true);
                if stale {
                    state.probe_started = Some(Instant::now());
                    tracing::warn!(target = %target, "probe never reported, re-probing");
                    Ok(())
                } else {
                    Err(Error::ServiceUnavailable(format!(
                        "circuit breaker for '{}' is probing, call rejected",
                        target
                    )))
                }
            }
            BreakerStatus::Open => {
                let elapsed = state
                    .last_failure
                    .map(|at| at.elapsed())
                    .unwrap_or(self.recovery);
                if elapsed >= self.recovery {
                    state.status = BreakerStatus::HalfOpen;
                    state.probe_started = Some(Instant::now());
                    tracing::info!(target = %target, "circuit breaker half-open, probing");
                    Ok(())
                } else {
                    Err(Error::ServiceUnavailable(format!(
                        "circuit breaker for '{}' is open",
                        target
                    )))
                }
            }
        }
    }

    /// Record a successful call outcome: counter reset, breaker closed.
    pub fn record_success(&self, target: &str) {
        let mut targets = self.targets.lock().unwrap();
        let state = targets
            .entry(target.to_string())
            .or_insert_with(BreakerState::new);

        if state.status != BreakerStatus::Closed {
            tracing::info!(target = %target, "circuit breaker closed");
        }
        state.status = BreakerStatus::Closed;
        state.consecutive_failures = 0;
        state.last_failure = None;
        state.probe_started = None;
    }

    /// Record a failed call outcome, tripping the breaker at the threshold.
    pub fn record_failure(&self, target: &str) {
        let mut targets = self.targets.lock().unwrap();
        let state = targets
            .entry(target.to_string())
            .or_insert_with(BreakerState::new);

        state.consecutive_failures += 1;
        if state.consecutive_failures >= self.failure_threshold {
            if state.status != BreakerStatus::Open {
                tracing::warn!(
                    target = %target,
                    failures = state.consecutive_failures,
                    "circuit breaker opened"
                );
            }
            state.status = BreakerStatus::Open;
            state.last_failure = Some(Instant::now());
            state.probe_started = None;
        }
    }

    /// Current status for `target` (Closed if never called).
    pub fn status(&self, target: &str) -> BreakerStatus {
        let targets = self.targets.lock().unwrap();
        targets
            .get(target)
            .map(|s| s.status)
            .unwrap_or(BreakerStatus::Closed)
    }
}
