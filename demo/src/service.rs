//! Simulated flaky upstream service

use async_trait::async_trait;
use circuit_gate::Dependency;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::debug;

/// Failure reported by the simulated service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("status code {code}: {body}")]
    Status { code: u16, body: String },
}

/// Successful response body
#[derive(Debug, Clone, Serialize)]
pub struct Payload {
    pub data: String,
    pub timestamp: u64,
}

/// Service that answers after a fixed latency and fails at random
#[derive(Debug)]
pub struct FlakyService {
    failure_rate: f64,
    latency: Duration,
    requests: AtomicU64,
}

impl FlakyService {
    pub fn new(failure_rate: f64, latency: Duration) -> Self {
        Self {
            failure_rate: if failure_rate.is_nan() {
                0.0
            } else {
                failure_rate.clamp(0.0, 1.0)
            },
            latency,
            requests: AtomicU64::new(0),
        }
    }

    /// Requests that actually reached the service
    pub fn requests(&self) -> u64 {
        self.requests.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Dependency for FlakyService {
    type Output = Payload;
    type Error = ServiceError;

    async fn call(&self) -> Result<Payload, ServiceError> {
        let request = self.requests.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(request, "Service received request");

        tokio::time::sleep(self.latency).await;

        let failed = rand::thread_rng().gen_bool(self.failure_rate);
        if failed {
            debug!(request, "Service responding 500");
            return Err(ServiceError::Status {
                code: 500,
                body: "internal server error".to_string(),
            });
        }

        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| u64::try_from(d.as_millis()).unwrap_or(u64::MAX))
            .unwrap_or_default();
        debug!(request, "Service responding 200");
        Ok(Payload {
            data: "success from the service".to_string(),
            timestamp,
        })
    }
}
