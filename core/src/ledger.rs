//! Call accounting for a single circuit breaker
//!
//! `CallLedger` owns everything the breaker counts:
//! - the consecutive-failure streak that trips the circuit
//! - a bounded log of recent call events
//! - lifetime counters exposed as `CircuitStats`

use crate::{Event, EventKind, circuit::CircuitState};
use serde::Serialize;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Default number of events kept in the log
pub const DEFAULT_MAX_EVENTS: usize = 1000;

/// Snapshot of a breaker's lifetime counters
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CircuitStats {
    /// Calls that reached the dependency and succeeded
    pub successes: u64,
    /// Calls that reached the dependency and failed
    pub failures: u64,
    /// Calls short-circuited without reaching the dependency
    pub rejections: u64,
    pub times_opened: u64,
    pub times_half_opened: u64,
    pub times_closed: u64,
}

#[derive(Debug, Default)]
struct LedgerState {
    events: Vec<Event>,
    consecutive_failures: usize,
    stats: CircuitStats,
}

/// Thread-safe event ledger with a bounded log
#[derive(Debug)]
pub struct CallLedger {
    state: RwLock<LedgerState>,
    /// Maximum events to keep in the log
    max_events: usize,
}

impl CallLedger {
    /// Create a ledger keeping the default number of events
    pub fn new() -> Self {
        Self::with_max_events(DEFAULT_MAX_EVENTS)
    }

    /// Create a ledger with a custom log capacity
    pub fn with_max_events(max_events: usize) -> Self {
        Self {
            state: RwLock::new(LedgerState::default()),
            max_events,
        }
    }

    /// Record a successful call; breaks any failure streak
    pub fn record_success(&self, at: Duration, duration: Duration) {
        let mut state = self.write();
        state.consecutive_failures = 0;
        state.stats.successes += 1;
        self.push_event(&mut state, EventKind::Success, at, duration);
    }

    /// Record a failed call and return the new streak length
    pub fn record_failure(&self, at: Duration, duration: Duration) -> usize {
        let mut state = self.write();
        state.consecutive_failures += 1;
        state.stats.failures += 1;
        self.push_event(&mut state, EventKind::Failure, at, duration);
        state.consecutive_failures
    }

    /// Record the outcome of a call admitted under an earlier state
    ///
    /// Counted in the log and stats, but leaves the failure streak alone.
    pub fn record_stale(&self, succeeded: bool, at: Duration, duration: Duration) {
        let mut state = self.write();
        let kind = if succeeded {
            state.stats.successes += 1;
            EventKind::Success
        } else {
            state.stats.failures += 1;
            EventKind::Failure
        };
        self.push_event(&mut state, kind, at, duration);
    }

    /// Record a call rejected by the breaker
    pub fn record_rejection(&self, at: Duration) {
        let mut state = self.write();
        state.stats.rejections += 1;
        self.push_event(&mut state, EventKind::Rejected, at, Duration::ZERO);
    }

    /// Count a state the breaker just entered
    pub fn record_transition(&self, entered: CircuitState) {
        let mut state = self.write();
        match entered {
            CircuitState::Open => state.stats.times_opened += 1,
            CircuitState::HalfOpen => state.stats.times_half_opened += 1,
            CircuitState::Closed => state.stats.times_closed += 1,
        }
    }

    /// Current consecutive-failure streak
    pub fn consecutive_failures(&self) -> usize {
        self.read().consecutive_failures
    }

    /// Zero the failure streak, keeping the log and counters
    pub fn reset_streak(&self) {
        self.write().consecutive_failures = 0;
    }

    pub fn stats(&self) -> CircuitStats {
        self.read().stats.clone()
    }

    /// Most recent events, oldest first (at most `limit`)
    pub fn event_log(&self, limit: usize) -> Vec<Event> {
        let state = self.read();
        let start = state.events.len().saturating_sub(limit);
        state.events[start..].to_vec()
    }

    /// Drop the log, the streak and every counter
    pub fn clear(&self) {
        *self.write() = LedgerState::default();
    }

    fn push_event(
        &self,
        state: &mut LedgerState,
        kind: EventKind,
        timestamp: Duration,
        duration: Duration,
    ) {
        state.events.push(Event {
            kind,
            timestamp,
            duration,
        });

        if state.events.len() > self.max_events {
            // Trim 10% at once so a full log doesn't shift on every call
            let remove_count = (self.max_events / 10).max(1);
            state.events.drain(0..remove_count);
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, LedgerState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, LedgerState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for CallLedger {
    fn default() -> Self {
        Self::new()
    }
}
