//! Error types for circuit breaker operations

use std::time::Duration;
use thiserror::Error;

/// Errors returned by `CircuitBreaker::execute`
///
/// `Open` and `HalfOpenLimitReached` originate in the breaker and mean the
/// dependency was never invoked. `Fallback` is the error of a fallback that
/// answered such a rejection. `Execution` carries the dependency's own error
/// untouched.
#[derive(Debug, Error)]
pub enum CircuitError<E> {
    /// Circuit is open, calls are being rejected
    #[error("Circuit '{circuit}' is open (retry in {retry_after:?})")]
    Open {
        circuit: String,
        /// Time left until a trial call will be admitted
        retry_after: Duration,
    },
    /// The half-open trial slot is taken by another caller
    #[error("Circuit '{circuit}' half-open trial already in flight")]
    HalfOpenLimitReached { circuit: String },
    /// The wrapped operation failed
    #[error("Circuit execution failed: {0}")]
    Execution(#[source] E),
    /// The call was rejected and the fallback answering it failed
    #[error("Circuit fallback failed: {0}")]
    Fallback(#[source] E),
}

impl<E> CircuitError<E> {
    /// True when the breaker refused the call without invoking the dependency
    ///
    /// This includes `Fallback`: the fallback only runs for rejected calls.
    pub fn is_rejection(&self) -> bool {
        !matches!(self, CircuitError::Execution(_))
    }

    pub fn is_open(&self) -> bool {
        matches!(self, CircuitError::Open { .. })
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, CircuitError::Fallback(_))
    }

    /// Borrow the dependency's error, if the call was attempted
    pub fn execution(&self) -> Option<&E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }

    /// Recover the dependency's error, if the call was attempted
    pub fn into_execution(self) -> Option<E> {
        match self {
            CircuitError::Execution(e) => Some(e),
            _ => None,
        }
    }
}

/// Invalid circuit breaker configuration
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("failure_threshold must be at least 1")]
    ZeroFailureThreshold,
    #[error("success_threshold must be at least 1")]
    ZeroSuccessThreshold,
    #[error("jitter_factor must be within 0.0..=1.0, got {0}")]
    JitterOutOfRange(f64),
    #[error("max_events must be at least 1")]
    ZeroMaxEvents,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[derive(Debug, Error)]
    #[error("upstream returned {0}")]
    struct UpstreamError(u16);

    #[test]
    fn test_rejections_are_distinguishable() {
        let open: CircuitError<UpstreamError> = CircuitError::Open {
            circuit: "api".to_string(),
            retry_after: Duration::from_millis(4000),
        };
        let busy: CircuitError<UpstreamError> = CircuitError::HalfOpenLimitReached {
            circuit: "api".to_string(),
        };
        let failed = CircuitError::Execution(UpstreamError(500));

        assert!(open.is_rejection());
        assert!(open.is_open());
        assert!(busy.is_rejection());
        assert!(!busy.is_open());
        assert!(!failed.is_rejection());
    }

    #[test]
    fn test_fallback_error_counts_as_rejection() {
        let err = CircuitError::Fallback(UpstreamError(404));

        assert!(err.is_rejection());
        assert!(err.is_fallback());
        assert!(!err.is_open());
        assert!(err.execution().is_none());
        assert_eq!(err.source().map(|e| e.to_string()).as_deref(), Some("upstream returned 404"));
        assert_eq!(err.to_string(), "Circuit fallback failed: upstream returned 404");
    }

    #[test]
    fn test_execution_error_is_source() {
        let err = CircuitError::Execution(UpstreamError(503));

        let source = err.source().expect("execution error should expose source");
        assert_eq!(source.to_string(), "upstream returned 503");
        assert_eq!(err.to_string(), "Circuit execution failed: upstream returned 503");
    }

    #[test]
    fn test_into_execution_returns_original() {
        let err = CircuitError::Execution(UpstreamError(502));
        assert_eq!(err.execution().map(|e| e.0), Some(502));
        assert_eq!(err.into_execution().map(|e| e.0), Some(502));

        let open: CircuitError<UpstreamError> = CircuitError::Open {
            circuit: "api".to_string(),
            retry_after: Duration::ZERO,
        };
        assert!(open.into_execution().is_none());
    }

    #[test]
    fn test_open_display_names_circuit() {
        let err: CircuitError<UpstreamError> = CircuitError::Open {
            circuit: "payments".to_string(),
            retry_after: Duration::from_secs(2),
        };
        assert_eq!(err.to_string(), "Circuit 'payments' is open (retry in 2s)");
    }
}
