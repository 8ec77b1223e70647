//! Basic example: a per-user rate limiter, then a circuit breaker.
//!
//! Run with: `cargo run --example basic`

use std::thread;
use std::time::Duration;
use tracing::Level;
use traffic_governor::{
    AlgorithmConfig, BreakerConfig, CallOutcome, FallbackStrategy, GovernorRegistry, LimitScope,
    LimiterConfig,
};

fn main() {
    // Breaker transitions are logged through tracing
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let registry = GovernorRegistry::new();

    println!("=== Rate Limiting ===\n");
    println!("Policy: token bucket, burst of 3, refilling 1 per second, per user\n");

    registry.create_config(
        LimiterConfig::new("api", AlgorithmConfig::token_bucket(3, 1.0).unwrap())
            .unwrap()
            .with_scope(LimitScope::User),
    );

    for i in 1..=5 {
        let result = registry.evaluate("api", "alice").unwrap();
        println!(
            "alice call {}: {:?} (remaining {}, retry after {}ms)",
            i, result.decision, result.remaining, result.retry_after_ms
        );
    }

    // Each user has its own bucket
    let bob = registry.evaluate("api", "bob").unwrap();
    println!("bob call 1: {:?} (remaining {})\n", bob.decision, bob.remaining);

    println!("=== Circuit Breaking ===\n");
    println!("Policy: open at 50% failures over 4 calls, wait 200ms, 1 trial call\n");

    registry.create_config(
        BreakerConfig::builder("inventory")
            .failure_rate_threshold(50.0)
            .minimum_calls(4)
            .count_window(4)
            .wait_duration(Duration::from_millis(200))
            .permitted_calls_in_half_open(1)
            .fallback(FallbackStrategy::ReturnDefault)
            .fallback_value(0u32)
            .build()
            .unwrap(),
    );

    for i in 1..=6 {
        let outcome: CallOutcome<u32, String> = registry
            .execute("inventory", || {
                if i % 2 == 0 {
                    Err(format!("inventory service timed out on call {}", i))
                } else {
                    Ok(42)
                }
            })
            .unwrap();
        println!("call {}: {:?}", i, outcome);
    }

    let metrics = registry.metrics("inventory").unwrap();
    println!(
        "\nstate {:?}, failure rate {:?}%, rejected {}",
        metrics.state, metrics.failure_rate, metrics.denied
    );

    println!("\nWaiting for the breaker to admit a trial call...");
    thread::sleep(Duration::from_millis(250));

    let outcome: CallOutcome<u32, String> = registry.execute("inventory", || Ok(42)).unwrap();
    println!("trial call: {:?}", outcome);
    println!("state {:?}", registry.metrics("inventory").unwrap().state);

    println!("\n=== Example Complete ===");
}
