//! Example demonstrating how limiter memory stays bounded.
//!
//! Run with: `cargo run --example eviction`

use std::thread;
use std::time::Duration;
use traffic_governor::{AlgorithmConfig, GovernorRegistry, LimitScope, LimiterConfig};

fn per_ip(max_entries: Option<usize>) -> GovernorRegistry {
    let builder = GovernorRegistry::builder();
    let builder = match max_entries {
        Some(max) => builder.with_max_entries(max),
        None => builder.unlimited_entries(),
    };
    let registry = builder
        .with_idle_ttl(Duration::from_millis(100))
        .build()
        .unwrap();
    registry.create_config(
        LimiterConfig::new(
            "per-ip",
            AlgorithmConfig::sliding_window_log(10, Duration::from_secs(60)).unwrap(),
        )
        .unwrap()
        .with_scope(LimitScope::Ip),
    );
    registry
}

fn main() {
    println!("=== Eviction Example ===\n");

    // Example 1: LRU eviction at the entry cap
    println!("1. LRU eviction:");
    println!("   - Tracks up to 5 identifiers");
    println!("   - Evicts the least recently used when the cap is reached\n");

    let registry = per_ip(Some(5));
    for i in 0..7 {
        registry.evaluate("per-ip", &format!("10.0.0.{}", i)).unwrap();
    }

    let entries = registry.entry_count("per-ip").unwrap();
    let evicted = registry.metrics("per-ip").unwrap().evicted;
    println!("   Identifiers tracked: {} (max 5)", entries);
    println!("   Identifiers evicted: {}\n", evicted);

    assert_eq!(entries, 5, "Should track exactly 5 identifiers at the cap");
    assert_eq!(evicted, 2, "Should have evicted 2 identifiers");

    // Example 2: idle TTL sweep
    println!("2. Idle sweep:");
    println!("   - No cap");
    println!("   - Entries idle for 100ms are dropped by sweep_expired\n");

    let registry = per_ip(None);
    for i in 0..50 {
        registry.evaluate("per-ip", &format!("10.0.1.{}", i)).unwrap();
    }
    thread::sleep(Duration::from_millis(150));
    registry.evaluate("per-ip", "10.0.1.7").unwrap();

    let dropped = registry.sweep_expired();
    let entries = registry.entry_count("per-ip").unwrap();
    println!("   Dropped: {}", dropped);
    println!("   Still tracked: {}\n", entries);

    assert_eq!(dropped, 49, "Only the recently used identifier survives");
    assert_eq!(entries, 1);

    println!("=== Example Complete ===");
}
