//! Basic circuit breaker usage example

use circuit_gate::{CircuitBreaker, dependency_fn};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

#[tokio::main(flavor = "current_thread")]
async fn main() {
    println!("=== Circuit Breaker Basic Example ===\n");

    let healthy = Arc::new(AtomicBool::new(true));
    let service = healthy.clone();

    let circuit = CircuitBreaker::builder("payment_api")
        .failure_threshold(3)
        .success_threshold(2)
        .open_timeout(Duration::from_millis(200))
        .on_open(|name| println!("Circuit '{}' opened!", name))
        .on_close(|name| println!("Circuit '{}' closed!", name))
        .on_half_open(|name| println!("Circuit '{}' half-open, testing...", name))
        .build(dependency_fn(move || {
            let up = service.load(Ordering::SeqCst);
            async move {
                if up {
                    Ok("payment accepted")
                } else {
                    Err("payment gateway unavailable")
                }
            }
        }))
        .expect("valid configuration");

    println!("Initial state: {}\n", circuit.state());

    println!("--- Successful calls ---");
    for _ in 0..2 {
        match circuit.execute().await {
            Ok(result) => println!("ok: {}", result),
            Err(e) => println!("error: {}", e),
        }
    }
    println!("State: {}\n", circuit.state());

    println!("--- Triggering failures ---");
    healthy.store(false, Ordering::SeqCst);
    for _ in 0..3 {
        if let Err(e) = circuit.execute().await {
            println!("error: {}", e);
        }
    }
    println!("State: {} (circuit opened)\n", circuit.state());

    println!("--- Attempting call while open ---");
    if let Err(e) = circuit.execute().await {
        println!("rejected: {}", e);
    }
    println!();

    println!("--- Waiting for open timeout, dependency recovered ---");
    healthy.store(true, Ordering::SeqCst);
    tokio::time::sleep(Duration::from_millis(250)).await;
    for _ in 0..2 {
        match circuit.execute().await {
            Ok(result) => println!("ok: {} (state: {})", result, circuit.state()),
            Err(e) => println!("error: {}", e),
        }
    }

    println!("\nStats: {:?}", circuit.stats());
}
