//! Drives a circuit breaker against a simulated flaky service
//!
//! Issues one call per period through the breaker and logs each outcome
//! together with the breaker state, then prints the breaker's counters.

mod service;

use anyhow::Context;
use circuit_gate::{CircuitBreaker, CircuitError, Config};
use clap::Parser;
use service::FlakyService;
use std::time::Duration;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "circuit-gate-demo", about = "Circuit breaker against a flaky service")]
struct Args {
    /// Consecutive failures that open the circuit
    #[arg(long, env = "CB_FAILURE_THRESHOLD", default_value_t = 2)]
    failure_threshold: usize,

    /// Trial successes that close the circuit
    #[arg(long, env = "CB_SUCCESS_THRESHOLD", default_value_t = 1)]
    success_threshold: usize,

    /// Time the circuit stays open before a trial call
    #[arg(long, env = "CB_OPEN_TIMEOUT_MS", default_value_t = 5000)]
    open_timeout_ms: u64,

    /// Probability that the simulated service fails a request
    #[arg(long, env = "SERVICE_FAILURE_RATE", default_value_t = 0.5)]
    failure_rate: f64,

    /// Simulated service latency
    #[arg(long, env = "SERVICE_LATENCY_MS", default_value_t = 300)]
    latency_ms: u64,

    /// Interval between calls
    #[arg(long, env = "DEMO_PERIOD_MS", default_value_t = 1000)]
    period_ms: u64,

    /// Number of calls before the demo stops
    #[arg(long, env = "DEMO_MAX_CALLS", default_value_t = 30)]
    max_calls: u32,
}

impl Args {
    fn breaker_config(&self) -> Config {
        Config {
            failure_threshold: self.failure_threshold,
            success_threshold: self.success_threshold,
            open_timeout_ms: self.open_timeout_ms,
            ..Default::default()
        }
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "circuit_gate=info,circuit_gate_demo=info".into()),
        )
        .with_target(false)
        .compact()
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = args.breaker_config();
    let breaker = CircuitBreaker::builder("flaky_service")
        .config(config)
        .on_open(|name| warn!(circuit = name, "Circuit opened"))
        .on_half_open(|name| info!(circuit = name, "Circuit half-open, probing service"))
        .on_close(|name| info!(circuit = name, "Circuit closed"))
        .build(FlakyService::new(
            args.failure_rate,
            Duration::from_millis(args.latency_ms),
        ))
        .context("invalid circuit breaker configuration")?;

    info!(
        failure_threshold = args.failure_threshold,
        success_threshold = args.success_threshold,
        open_timeout_ms = args.open_timeout_ms,
        "Client started with circuit breaker"
    );

    let mut ticker = tokio::time::interval(Duration::from_millis(args.period_ms.max(1)));
    for count in 1..=args.max_calls {
        ticker.tick().await;

        match breaker.execute().await {
            Ok(payload) => {
                let body = serde_json::to_string(&payload)?;
                info!("[{}] ok {} (state: {})", count, body, breaker.state());
            }
            Err(err @ CircuitError::Execution(_)) => {
                info!("[{}] failed: {} (state: {})", count, err, breaker.state());
            }
            Err(err) => {
                info!("[{}] blocked: {} (state: {})", count, err, breaker.state());
            }
        }
    }

    let stats = breaker.stats();
    info!(
        successes = stats.successes,
        failures = stats.failures,
        rejections = stats.rejections,
        times_opened = stats.times_opened,
        service_requests = breaker.dependency().requests(),
        "Demo completed"
    );
    Ok(())
}
