//! Circuit breaker configuration

use crate::{errors::ConfigError, ledger::DEFAULT_MAX_EVENTS};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Circuit breaker configuration
///
/// Immutable once the breaker is built. Deserializes with per-field defaults,
/// so a config file only needs the values it overrides.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Consecutive failures required to open the circuit
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: usize,

    /// Consecutive trial successes in HalfOpen required to close the circuit
    #[serde(default = "default_success_threshold")]
    pub success_threshold: usize,

    /// Minimum time to stay Open before a trial call is admitted
    #[serde(default = "default_open_timeout_ms")]
    pub open_timeout_ms: u64,

    /// Jitter factor for the open timeout (0.0 = no jitter, 1.0 = full jitter)
    /// Uses chrono-machines formula: timeout * (1 - jitter + rand * jitter)
    #[serde(default)]
    pub jitter_factor: f64,

    /// Capacity of the breaker's event log
    #[serde(default = "default_max_events")]
    pub max_events: usize,
}

fn default_failure_threshold() -> usize {
    2
}

fn default_success_threshold() -> usize {
    1
}

fn default_open_timeout_ms() -> u64 {
    3000
}

fn default_max_events() -> usize {
    DEFAULT_MAX_EVENTS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            success_threshold: default_success_threshold(),
            open_timeout_ms: default_open_timeout_ms(),
            jitter_factor: 0.0,
            max_events: default_max_events(),
        }
    }
}

impl Config {
    /// Open timeout as a `Duration`
    pub fn open_timeout(&self) -> Duration {
        Duration::from_millis(self.open_timeout_ms)
    }

    /// Check the invariants the breaker relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::ZeroFailureThreshold);
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::ZeroSuccessThreshold);
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(ConfigError::JitterOutOfRange(self.jitter_factor));
        }
        if self.max_events == 0 {
            return Err(ConfigError::ZeroMaxEvents);
        }
        Ok(())
    }
}
