//! Integration tests for the background idle sweeper.

#![cfg(feature = "async")]

use std::sync::Arc;
use std::time::{Duration, Instant};
use traffic_governor::infrastructure::mocks::MockClock;
use traffic_governor::{
    AlgorithmConfig, GovernorRegistry, IdleSweeper, LimitScope, LimiterConfig, SweeperConfig,
};

fn per_ip_registry(clock: &MockClock) -> GovernorRegistry {
    let registry = GovernorRegistry::builder()
        .with_clock(Arc::new(clock.clone()))
        .unlimited_entries()
        .build()
        .unwrap();
    registry.create_config(
        LimiterConfig::new("per-ip", AlgorithmConfig::token_bucket(10, 1.0).unwrap())
            .unwrap()
            .with_scope(LimitScope::Ip),
    );
    registry
}

#[tokio::test(start_paused = true)]
async fn test_sweeper_drops_only_idle_entries() {
    let clock = MockClock::new(Instant::now());
    let registry = per_ip_registry(&clock);
    for i in 0..50 {
        registry.evaluate("per-ip", &format!("10.0.0.{}", i)).unwrap();
    }

    let handle = IdleSweeper::new(
        registry.clone(),
        SweeperConfig::new(Duration::from_secs(5), Duration::from_secs(60)).unwrap(),
    )
    .start(false);

    clock.advance(Duration::from_secs(45));
    registry.evaluate("per-ip", "10.0.0.1").unwrap();
    clock.advance(Duration::from_secs(30));

    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(registry.entry_count("per-ip").unwrap(), 1);

    handle.shutdown().await.expect("shutdown failed");
}

#[tokio::test(start_paused = true)]
async fn test_dropped_handle_keeps_sweeping() {
    let clock = MockClock::new(Instant::now());
    let registry = per_ip_registry(&clock);

    let handle = IdleSweeper::new(
        registry.clone(),
        SweeperConfig::new(Duration::from_secs(1), Duration::from_secs(10)).unwrap(),
    )
    .start(false);
    drop(handle);

    registry.evaluate("per-ip", "10.0.0.1").unwrap();
    clock.advance(Duration::from_secs(11));
    tokio::time::sleep(Duration::from_millis(1_500)).await;

    assert_eq!(registry.entry_count("per-ip").unwrap(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_shutdown_stops_sweeping() {
    let clock = MockClock::new(Instant::now());
    let registry = per_ip_registry(&clock);

    let handle = IdleSweeper::new(
        registry.clone(),
        SweeperConfig::new(Duration::from_secs(1), Duration::from_secs(10)).unwrap(),
    )
    .start(false);
    assert!(handle.is_running());
    handle.shutdown().await.expect("shutdown failed");

    registry.evaluate("per-ip", "10.0.0.1").unwrap();
    clock.advance(Duration::from_secs(11));
    tokio::time::sleep(Duration::from_secs(5)).await;

    assert_eq!(registry.entry_count("per-ip").unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_many_sweepers_shut_down_cleanly() {
    let clock = MockClock::new(Instant::now());
    let registry = per_ip_registry(&clock);

    let handles: Vec<_> = (1..=5)
        .map(|secs| {
            IdleSweeper::new(
                registry.clone(),
                SweeperConfig::new(Duration::from_secs(secs), Duration::from_secs(30)).unwrap(),
            )
            .start(true)
        })
        .collect();

    tokio::time::sleep(Duration::from_secs(3)).await;
    for handle in handles {
        handle.shutdown().await.expect("shutdown failed");
    }
}
