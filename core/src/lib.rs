//! circuit-gate - Async client-side circuit breaker
//!
//! This crate guards a single remote dependency with a circuit breaker:
//! - State machine for the breaker lifecycle (Closed → Open → HalfOpen)
//! - Consecutive-failure accounting (one success resets the streak)
//! - Fail-fast rejection while open, with a single trial call once the
//!   open timeout has elapsed
//! - Pluggable monotonic clock for deterministic tests
//!
//! # Example
//!
//! ```rust
//! use circuit_gate::{CircuitBreaker, CircuitError, dependency_fn};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let breaker = CircuitBreaker::builder("inventory_api")
//!     .failure_threshold(2)
//!     .success_threshold(1)
//!     .open_timeout(Duration::from_secs(5))
//!     .on_open(|name| println!("Circuit {} opened!", name))
//!     .build(dependency_fn(|| async { Err::<String, _>("connection refused") }))
//!     .expect("valid configuration");
//!
//! // Two consecutive failures trip the breaker
//! let _ = breaker.execute().await;
//! let _ = breaker.execute().await;
//! assert!(breaker.is_open());
//!
//! // While open, calls are rejected without reaching the dependency
//! match breaker.execute().await {
//!     Err(CircuitError::Open { retry_after, .. }) => println!("retry in {:?}", retry_after),
//!     other => panic!("unexpected: {:?}", other),
//! }
//! # }
//! ```

pub mod builder;
pub mod callbacks;
pub mod circuit;
pub mod clock;
pub mod config;
pub mod dependency;
pub mod errors;
pub mod ledger;

pub use builder::CircuitBuilder;
pub use circuit::{CircuitBreaker, CircuitState, FallbackContext};
pub use clock::{Clock, ManualClock, MonotonicClock};
pub use config::Config;
pub use dependency::{Dependency, DependencyFn, dependency_fn};
pub use errors::{CircuitError, ConfigError};
pub use ledger::{CallLedger, CircuitStats};

use std::time::Duration;

/// Event type recorded by the circuit breaker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Success,
    Failure,
    /// Call short-circuited by the breaker, dependency not invoked
    Rejected,
}

/// A single event recorded by the circuit breaker
#[derive(Debug, Clone)]
pub struct Event {
    pub kind: EventKind,
    /// Clock reading when the event was recorded
    pub timestamp: Duration,
    /// Time spent in the dependency (zero for rejections)
    pub duration: Duration,
}
