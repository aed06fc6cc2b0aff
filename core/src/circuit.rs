//! Circuit breaker implementation using state machines
//!
//! The breaker state lives behind a mutex that is taken twice per call: once
//! to admit (or reject) the call and once to settle its outcome. The lock is
//! never held while the dependency runs.

use crate::{
    callbacks::Callbacks, clock::Clock, config::Config, dependency::Dependency,
    errors::CircuitError, ledger::CallLedger,
};
use serde::Serialize;
use state_machines::state_machine;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Externally visible circuit state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CircuitState {
    /// Calls pass through to the dependency
    Closed,
    /// Calls are rejected without reaching the dependency
    Open,
    /// A trial call is testing whether the dependency recovered
    HalfOpen,
}

impl CircuitState {
    pub fn as_str(&self) -> &'static str {
        match self {
            CircuitState::Closed => "Closed",
            CircuitState::Open => "Open",
            CircuitState::HalfOpen => "HalfOpen",
        }
    }

    fn from_name(name: &str) -> Self {
        match name {
            "Open" => CircuitState::Open,
            "HalfOpen" => CircuitState::HalfOpen,
            _ => CircuitState::Closed,
        }
    }
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Context provided to fallback closures when a call is rejected
#[derive(Debug, Clone)]
pub struct FallbackContext {
    /// Circuit name
    pub circuit_name: String,
    /// State that caused the rejection
    pub state: CircuitState,
    /// Time left until a trial call will be admitted (zero in HalfOpen)
    pub retry_after: Duration,
}

/// Circuit breaker context - shared data across all states
#[derive(Clone)]
pub struct CircuitContext {
    pub name: String,
    pub config: Config,
    pub clock: Arc<dyn Clock>,
    pub ledger: Arc<CallLedger>,
}

impl Default for CircuitContext {
    fn default() -> Self {
        Self {
            name: String::new(),
            config: Config::default(),
            clock: Arc::new(crate::MonotonicClock::new()),
            ledger: Arc::new(CallLedger::new()),
        }
    }
}

impl fmt::Debug for CircuitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitContext")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("ledger", &"<CallLedger>")
            .finish()
    }
}

/// Data specific to the Open state
#[derive(Debug, Clone, Default)]
pub struct OpenData {
    pub opened_at: Duration,
    /// Earliest clock reading at which a trial call is admitted
    pub next_attempt_at: Duration,
}

/// Data specific to the HalfOpen state
#[derive(Debug, Clone, Default)]
pub struct HalfOpenData {
    pub consecutive_successes: usize,
    pub trial_in_flight: bool,
}

// Define the circuit breaker state machine with dynamic mode
state_machine! {
    name: Circuit,
    context: CircuitContext,
    dynamic: true,  // Enable dynamic mode for runtime state transitions

    initial: Closed,
    states: [
        Closed,
        Open(OpenData),
        HalfOpen(HalfOpenData),
    ],
    events {
        trip {
            guards: [should_open],
            transition: { from: [Closed, HalfOpen], to: Open }
        }
        attempt_reset {
            guards: [timeout_elapsed],
            transition: { from: Open, to: HalfOpen }
        }
        close {
            guards: [should_close],
            transition: { from: HalfOpen, to: Closed }
        }
    }
}

impl Circuit<Closed> {
    /// Check if the consecutive-failure streak reached the threshold
    fn should_open(&self, ctx: &CircuitContext) -> bool {
        ctx.ledger.consecutive_failures() >= ctx.config.failure_threshold
    }
}

impl Circuit<HalfOpen> {
    /// A failed trial always reopens the circuit
    fn should_open(&self, _ctx: &CircuitContext) -> bool {
        true
    }

    /// Check if enough trial successes to close circuit
    fn should_close(&self, ctx: &CircuitContext) -> bool {
        self.state_data_half_open()
            .map(|data| data.consecutive_successes >= ctx.config.success_threshold)
            .unwrap_or(false)
    }
}

impl Circuit<Open> {
    /// Check if the open timeout has elapsed for Open -> HalfOpen transition
    fn timeout_elapsed(&self, ctx: &CircuitContext) -> bool {
        self.state_data_open()
            .map(|data| ctx.clock.now() >= data.next_attempt_at)
            .unwrap_or(true)
    }
}

/// Why the breaker refused a call
#[derive(Debug, Clone, Copy)]
enum Rejection {
    Open { retry_after: Duration },
    TrialInFlight,
}

/// Ticket for an admitted call
#[derive(Debug, Clone, Copy)]
struct Admission {
    /// Admitted as the HalfOpen trial
    trial: bool,
    /// `Inner::epoch` at admission; outcomes from an older epoch are stale
    epoch: u64,
}

struct Inner {
    machine: DynamicCircuit,
    /// Bumped on every state change and on `reset`
    epoch: u64,
}

/// Circuit breaker guarding a single dependency
pub struct CircuitBreaker<D> {
    dependency: D,
    inner: Mutex<Inner>,
    context: CircuitContext,
    callbacks: Callbacks,
}

impl<D> CircuitBreaker<D> {
    /// Create a circuit breaker with custom context and callbacks (used by builder)
    pub(crate) fn with_context_and_callbacks(
        dependency: D,
        context: CircuitContext,
        callbacks: Callbacks,
    ) -> Self {
        info!(
            circuit = %context.name,
            failure_threshold = context.config.failure_threshold,
            success_threshold = context.config.success_threshold,
            open_timeout_ms = context.config.open_timeout_ms,
            "Creating circuit breaker"
        );

        let machine = DynamicCircuit::new(context.clone());

        Self {
            dependency,
            inner: Mutex::new(Inner { machine, epoch: 0 }),
            context,
            callbacks,
        }
    }

    /// Circuit name
    pub fn name(&self) -> &str {
        &self.context.name
    }

    pub fn config(&self) -> &Config {
        &self.context.config
    }

    /// The protected dependency
    pub fn dependency(&self) -> &D {
        &self.dependency
    }

    /// Current state
    pub fn state(&self) -> CircuitState {
        CircuitState::from_name(self.state_name())
    }

    /// Get current state name
    pub fn state_name(&self) -> &'static str {
        self.lock().machine.current_state()
    }

    /// Check if circuit is open
    pub fn is_open(&self) -> bool {
        self.state() == CircuitState::Open
    }

    /// Check if circuit is closed
    pub fn is_closed(&self) -> bool {
        self.state() == CircuitState::Closed
    }

    pub fn is_half_open(&self) -> bool {
        self.state() == CircuitState::HalfOpen
    }

    /// Consecutive failures since the last reset
    pub fn failure_count(&self) -> usize {
        self.context.ledger.consecutive_failures()
    }

    /// Consecutive trial successes; always 0 outside HalfOpen
    pub fn success_count(&self) -> usize {
        self.lock()
            .machine
            .half_open_data()
            .map(|data| data.consecutive_successes)
            .unwrap_or(0)
    }

    /// Time left until a trial call will be admitted, if the circuit is open
    pub fn retry_after(&self) -> Option<Duration> {
        let inner = self.lock();
        inner
            .machine
            .open_data()
            .map(|data| data.next_attempt_at.saturating_sub(self.context.clock.now()))
    }

    /// Lifetime counters
    pub fn stats(&self) -> crate::CircuitStats {
        self.context.ledger.stats()
    }

    /// Most recent call events, oldest first
    pub fn event_log(&self, limit: usize) -> Vec<crate::Event> {
        self.context.ledger.event_log(limit)
    }

    /// Clear all events and reset circuit to Closed state
    pub fn reset(&self) {
        let mut inner = self.lock();
        self.context.ledger.clear();
        inner.machine = DynamicCircuit::new(self.context.clone());
        inner.epoch = inner.epoch.wrapping_add(1);
        info!(circuit = %self.context.name, "Circuit breaker reset");
    }

    /// Decide whether a call may reach the dependency
    fn admit(&self) -> Result<Admission, Rejection> {
        let mut inner = self.lock();
        let mut half_opened = false;

        // Check for timeout-based Open -> HalfOpen transition
        if inner.machine.current_state() == "Open"
            && inner.machine.handle(CircuitEvent::AttemptReset).is_ok()
        {
            inner.epoch = inner.epoch.wrapping_add(1);
            self.context.ledger.record_transition(CircuitState::HalfOpen);
            info!(circuit = %self.context.name, "Circuit breaker transitioning to half-open");
            half_opened = true;
        }

        let epoch = inner.epoch;
        let decision = match inner.machine.current_state() {
            "Open" => {
                let retry_after = inner
                    .machine
                    .open_data()
                    .map(|data| data.next_attempt_at.saturating_sub(self.context.clock.now()))
                    .unwrap_or(Duration::ZERO);
                Err(Rejection::Open { retry_after })
            }
            "HalfOpen" => match inner.machine.half_open_data_mut() {
                Some(data) if data.trial_in_flight => Err(Rejection::TrialInFlight),
                Some(data) => {
                    data.trial_in_flight = true;
                    Ok(Admission { trial: true, epoch })
                }
                None => Err(Rejection::TrialInFlight),
            },
            _ => Ok(Admission {
                trial: false,
                epoch,
            }),
        };

        if let Err(rejection) = &decision {
            self.context.ledger.record_rejection(self.context.clock.now());
            debug!(
                circuit = %self.context.name,
                reason = ?rejection,
                "Circuit breaker rejecting call"
            );
        }
        drop(inner);

        if half_opened {
            self.callbacks.trigger_half_open(&self.context.name);
        }
        if decision.is_err() {
            self.callbacks.trigger_reject(&self.context.name);
        }
        decision
    }

    /// Apply the outcome of an admitted call
    fn settle(&self, admission: Admission, succeeded: bool, duration: Duration) {
        let mut inner = self.lock();
        let now = self.context.clock.now();
        let state = inner.machine.current_state();
        let mut entered = None;

        if admission.epoch != inner.epoch {
            // Admitted under an earlier state or before a reset; recorded but not acted on
            self.context.ledger.record_stale(succeeded, now, duration);
            debug!(
                circuit = %self.context.name,
                state,
                succeeded,
                "Ignoring stale call outcome"
            );
            return;
        }

        if succeeded {
            self.context.ledger.record_success(now, duration);

            if state == "HalfOpen" && admission.trial {
                let successes = match inner.machine.half_open_data_mut() {
                    Some(data) => {
                        data.trial_in_flight = false;
                        data.consecutive_successes += 1;
                        data.consecutive_successes
                    }
                    None => 0,
                };
                debug!(
                    circuit = %self.context.name,
                    consecutive_successes = successes,
                    threshold = self.context.config.success_threshold,
                    "Half-open trial succeeded"
                );

                // Try to close the circuit
                if inner.machine.handle(CircuitEvent::Close).is_ok() {
                    self.context.ledger.reset_streak();
                    self.context.ledger.record_transition(CircuitState::Closed);
                    info!(
                        circuit = %self.context.name,
                        consecutive_successes = successes,
                        "Circuit breaker closing"
                    );
                    inner.epoch = inner.epoch.wrapping_add(1);
                    entered = Some(CircuitState::Closed);
                }
            }
        } else {
            let failures = self.context.ledger.record_failure(now, duration);

            match state {
                "Closed" => {
                    debug!(
                        circuit = %self.context.name,
                        consecutive_failures = failures,
                        threshold = self.context.config.failure_threshold,
                        "Call failed in closed state"
                    );
                    if inner.machine.handle(CircuitEvent::Trip).is_ok() {
                        self.mark_open(&mut inner, now, failures);
                        entered = Some(CircuitState::Open);
                    }
                }
                "HalfOpen" if admission.trial => {
                    warn!(
                        circuit = %self.context.name,
                        "Half-open trial failed, reopening circuit"
                    );
                    if inner.machine.handle(CircuitEvent::Trip).is_ok() {
                        self.mark_open(&mut inner, now, failures);
                        entered = Some(CircuitState::Open);
                    }
                }
                _ => {
                    debug!(
                        circuit = %self.context.name,
                        state,
                        "Failure outside an admitting state"
                    );
                }
            }
        }
        drop(inner);

        match entered {
            Some(CircuitState::Open) => self.callbacks.trigger_open(&self.context.name),
            Some(CircuitState::Closed) => self.callbacks.trigger_close(&self.context.name),
            _ => {}
        }
    }

    /// Apply Open-state bookkeeping (timestamps + transition count)
    fn mark_open(&self, inner: &mut Inner, now: Duration, failures: usize) {
        let timeout = self.open_timeout();
        if let Some(data) = inner.machine.open_data_mut() {
            data.opened_at = now;
            data.next_attempt_at = now + timeout;
        }
        inner.epoch = inner.epoch.wrapping_add(1);
        self.context.ledger.record_transition(CircuitState::Open);
        info!(
            circuit = %self.context.name,
            consecutive_failures = failures,
            open_timeout = ?timeout,
            "Circuit breaker opening"
        );
    }

    /// Open timeout for this open period, with jitter applied once
    fn open_timeout(&self) -> Duration {
        let config = &self.context.config;

        // Apply jitter using chrono-machines if jitter_factor > 0
        if config.jitter_factor > 0.0 {
            let policy = chrono_machines::Policy {
                max_attempts: 1,
                base_delay_ms: config.open_timeout_ms,
                multiplier: 1.0,
                max_delay_ms: config.open_timeout_ms,
            };
            Duration::from_millis(policy.calculate_delay(1, config.jitter_factor))
        } else {
            config.open_timeout()
        }
    }

    /// Release the trial slot of a call that never settled
    ///
    /// A trial from an earlier half-open window owns no slot in the current one.
    fn abandon_trial(&self, admission: Admission) {
        let mut inner = self.lock();
        if inner.epoch != admission.epoch {
            debug!(circuit = %self.context.name, "Stale half-open trial dropped");
            return;
        }
        if let Some(data) = inner.machine.half_open_data_mut() {
            data.trial_in_flight = false;
        }
        debug!(circuit = %self.context.name, "Half-open trial abandoned");
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn rejection_error<E>(&self, rejection: Rejection) -> CircuitError<E> {
        match rejection {
            Rejection::Open { retry_after } => CircuitError::Open {
                circuit: self.context.name.clone(),
                retry_after,
            },
            Rejection::TrialInFlight => CircuitError::HalfOpenLimitReached {
                circuit: self.context.name.clone(),
            },
        }
    }
}

// The dependency type is supplied later by `CircuitBuilder::build`
impl CircuitBreaker<()> {
    /// Create a new circuit breaker builder
    pub fn builder(name: impl Into<String>) -> crate::builder::CircuitBuilder {
        crate::builder::CircuitBuilder::new(name)
    }
}

impl<D: Dependency> CircuitBreaker<D> {
    /// Invoke the dependency with circuit breaker protection
    ///
    /// Returns the dependency's value on success. A rejected call never
    /// reaches the dependency; a failed call returns the dependency's own
    /// error in [`CircuitError::Execution`].
    pub async fn execute(&self) -> Result<D::Output, CircuitError<D::Error>> {
        match self.admit() {
            Ok(admission) => self.run(admission).await,
            Err(rejection) => Err(self.rejection_error(rejection)),
        }
    }

    /// Like [`execute`](Self::execute), but answer rejected calls with `fallback`
    ///
    /// The fallback only runs when the breaker refuses the call. Dependency
    /// failures are returned as usual; a fallback error is reported as
    /// [`CircuitError::Fallback`], which still counts as a rejection.
    pub async fn execute_with_fallback<F>(
        &self,
        fallback: F,
    ) -> Result<D::Output, CircuitError<D::Error>>
    where
        F: FnOnce(&FallbackContext) -> Result<D::Output, D::Error>,
    {
        match self.admit() {
            Ok(admission) => self.run(admission).await,
            Err(rejection) => {
                let ctx = match rejection {
                    Rejection::Open { retry_after } => FallbackContext {
                        circuit_name: self.context.name.clone(),
                        state: CircuitState::Open,
                        retry_after,
                    },
                    Rejection::TrialInFlight => FallbackContext {
                        circuit_name: self.context.name.clone(),
                        state: CircuitState::HalfOpen,
                        retry_after: Duration::ZERO,
                    },
                };
                fallback(&ctx).map_err(CircuitError::Fallback)
            }
        }
    }

    async fn run(&self, admission: Admission) -> Result<D::Output, CircuitError<D::Error>> {
        let mut slot = TrialSlot {
            breaker: self,
            admission,
            armed: admission.trial,
        };
        let start = self.context.clock.now();
        let result = self.dependency.call().await;
        let duration = self.context.clock.now().saturating_sub(start);
        slot.armed = false;

        match result {
            Ok(value) => {
                self.settle(admission, true, duration);
                Ok(value)
            }
            Err(e) => {
                self.settle(admission, false, duration);
                Err(CircuitError::Execution(e))
            }
        }
    }
}

/// Frees the half-open trial slot if the caller drops `execute` mid-call
struct TrialSlot<'a, D> {
    breaker: &'a CircuitBreaker<D>,
    admission: Admission,
    armed: bool,
}

impl<D> Drop for TrialSlot<'_, D> {
    fn drop(&mut self) {
        if self.armed {
            self.breaker.abandon_trial(self.admission);
        }
    }
}

impl<D> fmt::Debug for CircuitBreaker<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.context.name)
            .field("state", &self.state_name())
            .field("config", &self.context.config)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}
