//! Builder API for ergonomic circuit breaker configuration

use crate::{
    MonotonicClock,
    callbacks::Callbacks,
    circuit::{CircuitBreaker, CircuitContext},
    clock::Clock,
    config::Config,
    errors::ConfigError,
    ledger::CallLedger,
};
use std::sync::Arc;
use std::time::Duration;

/// Builder for creating circuit breakers with fluent API
pub struct CircuitBuilder {
    name: String,
    config: Config,
    clock: Option<Arc<dyn Clock>>,
    callbacks: Callbacks,
}

impl CircuitBuilder {
    /// Create a new builder for a circuit with the given name
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            config: Config::default(),
            clock: None,
            callbacks: Callbacks::new(),
        }
    }

    /// Replace the whole configuration (e.g. one loaded from a file)
    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    /// Set the number of consecutive failures that opens the circuit
    pub fn failure_threshold(mut self, threshold: usize) -> Self {
        self.config.failure_threshold = threshold;
        self
    }

    /// Set the success threshold (trial successes needed to close from half-open)
    pub fn success_threshold(mut self, threshold: usize) -> Self {
        self.config.success_threshold = threshold;
        self
    }

    /// Set how long the circuit stays open before admitting a trial call
    pub fn open_timeout(mut self, timeout: Duration) -> Self {
        self.config.open_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Set the open timeout in milliseconds
    pub fn open_timeout_ms(mut self, millis: u64) -> Self {
        self.config.open_timeout_ms = millis;
        self
    }

    /// Set the jitter factor (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    pub fn jitter_factor(mut self, factor: f64) -> Self {
        self.config.jitter_factor = factor;
        self
    }

    /// Set the capacity of the event log
    pub fn max_events(mut self, max_events: usize) -> Self {
        self.config.max_events = max_events;
        self
    }

    /// Set a custom clock (defaults to `MonotonicClock`)
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Set callback for when circuit opens
    pub fn on_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_open = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit closes
    pub fn on_close<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_close = Some(Arc::new(f));
        self
    }

    /// Set callback for when circuit enters half-open
    pub fn on_half_open<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_half_open = Some(Arc::new(f));
        self
    }

    /// Set callback for every call rejected by the breaker
    pub fn on_reject<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        self.callbacks.on_reject = Some(Arc::new(f));
        self
    }

    /// Build the circuit breaker around `dependency`
    ///
    /// Fails if the configuration is invalid (zero thresholds, jitter outside
    /// 0.0..=1.0, empty event log).
    pub fn build<D>(self, dependency: D) -> Result<CircuitBreaker<D>, ConfigError> {
        self.config.validate()?;

        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let ledger = Arc::new(CallLedger::with_max_events(self.config.max_events));

        let context = CircuitContext {
            name: self.name,
            config: self.config,
            clock,
            ledger,
        };

        Ok(CircuitBreaker::with_context_and_callbacks(
            dependency,
            context,
            self.callbacks,
        ))
    }
}

impl std::fmt::Debug for CircuitBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBuilder")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("clock", &self.clock)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dependency_fn;

    fn ok_dependency() -> crate::DependencyFn<impl Fn() -> std::future::Ready<Result<(), String>>> {
        dependency_fn(|| std::future::ready(Ok(())))
    }

    #[test]
    fn test_builder_defaults() {
        let circuit = CircuitBuilder::new("test")
            .build(ok_dependency())
            .expect("defaults are valid");

        assert_eq!(circuit.state_name(), "Closed");
        assert!(circuit.is_closed());
        assert_eq!(circuit.name(), "test");
        assert_eq!(circuit.config(), &Config::default());
    }

    #[test]
    fn test_builder_custom_config() {
        let circuit = CircuitBuilder::new("test")
            .failure_threshold(10)
            .success_threshold(3)
            .open_timeout(Duration::from_secs(60))
            .max_events(50)
            .build(ok_dependency())
            .expect("valid config");

        let config = circuit.config();
        assert_eq!(config.failure_threshold, 10);
        assert_eq!(config.success_threshold, 3);
        assert_eq!(config.open_timeout_ms, 60_000);
        assert_eq!(config.max_events, 50);
    }

    #[test]
    fn test_builder_accepts_loaded_config() {
        let loaded = Config {
            failure_threshold: 4,
            open_timeout_ms: 250,
            ..Default::default()
        };

        let circuit = CircuitBuilder::new("test")
            .config(loaded.clone())
            .build(ok_dependency())
            .expect("valid config");

        assert_eq!(circuit.config(), &loaded);
    }

    #[test]
    fn test_builder_rejects_invalid_config() {
        let result = CircuitBuilder::new("test")
            .failure_threshold(0)
            .build(ok_dependency());
        assert_eq!(result.err(), Some(ConfigError::ZeroFailureThreshold));

        let result = CircuitBuilder::new("test")
            .jitter_factor(-0.1)
            .build(ok_dependency());
        assert!(matches!(result, Err(ConfigError::JitterOutOfRange(_))));
    }

    #[tokio::test]
    async fn test_builder_with_callbacks() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let opened = Arc::new(AtomicBool::new(false));
        let opened_clone = opened.clone();

        let circuit = CircuitBuilder::new("test")
            .failure_threshold(2)
            .on_open(move |_name| {
                opened_clone.store(true, Ordering::SeqCst);
            })
            .build(dependency_fn(|| async { Err::<(), _>("error") }))
            .expect("valid config");

        let _ = circuit.execute().await;
        let _ = circuit.execute().await;

        assert!(opened.load(Ordering::SeqCst));
    }
}
