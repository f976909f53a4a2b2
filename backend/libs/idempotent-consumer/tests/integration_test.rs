//! Integration tests for idempotent consumer library
//!
//! These tests verify:
//! 1. Delivery markers round-trip through Redis and expire
//! 2. Attempt counters increment atomically under concurrency
//! 3. The process-local ledger behaves the same under concurrency
//!
//! Prerequisites for the Redis tests:
//! - Redis running locally or via Docker
//! - Environment variable: REDIS_URL
//!
//! Run tests:
//! ```bash
//! docker run --name redis-test -p 6379:6379 -d redis:7
//! export REDIS_URL="redis://127.0.0.1:6379"
//! cargo test --package idempotent-consumer --test integration_test -- --include-ignored
//! ```

use futures_util::future::join_all;
use idempotent_consumer::{fingerprint, AttemptCounter, DeliveryLedger, MemoryLedger, RedisLedger};
use std::env;
use std::time::Duration;

fn get_redis_url() -> String {
    env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

async fn create_test_ledger(retention: Duration) -> RedisLedger {
    RedisLedger::connect(&get_redis_url(), retention)
        .await
        .expect("Failed to connect to test Redis")
}

fn unique(prefix: &str) -> String {
    format!(
        "test-{}-{}",
        prefix,
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .expect("clock before epoch")
            .as_nanos()
    )
}

#[ignore = "Requires Redis"]
#[tokio::test]
async fn test_redis_marker_round_trip() {
    let ledger = create_test_ledger(Duration::from_secs(60)).await;
    let scope = unique("post");

    assert!(!ledger.is_delivered(&scope, "follower1").await.unwrap());

    ledger.mark_delivered(&scope, "follower1").await.unwrap();
    ledger.mark_delivered(&scope, "follower1").await.unwrap();

    assert!(ledger.is_delivered(&scope, "follower1").await.unwrap());
    assert!(!ledger.is_delivered(&scope, "follower2").await.unwrap());
}

#[ignore = "Requires Redis"]
#[tokio::test]
async fn test_redis_marker_expires() {
    let ledger = create_test_ledger(Duration::from_secs(1)).await;
    let scope = unique("post-expiring");

    ledger.mark_delivered(&scope, "follower1").await.unwrap();
    tokio::time::sleep(Duration::from_millis(2100)).await;

    assert!(!ledger.is_delivered(&scope, "follower1").await.unwrap());
}

#[ignore = "Requires Redis"]
#[tokio::test]
async fn test_redis_concurrent_attempts_are_counted_once_each() {
    let ledger = create_test_ledger(Duration::from_secs(60)).await;
    let key = fingerprint(unique("body").as_bytes());

    let results = join_all((0..10).map(|_| {
        let ledger = ledger.clone();
        let key = key.clone();
        async move { ledger.record_attempt(&key).await.unwrap() }
    }))
    .await;

    let mut sorted = results.clone();
    sorted.sort_unstable();
    assert_eq!(sorted, (1..=10).collect::<Vec<u32>>());

    ledger.clear_attempts(&key).await.unwrap();
    assert_eq!(ledger.record_attempt(&key).await.unwrap(), 1);
    ledger.clear_attempts(&key).await.unwrap();
}

#[tokio::test]
async fn test_memory_concurrent_attempts_are_counted_once_each() {
    let ledger = MemoryLedger::new(Duration::from_secs(60));
    let key = fingerprint(b"concurrent");

    let mut results = join_all((0..10).map(|_| {
        let ledger = ledger.clone();
        let key = key.clone();
        async move { ledger.record_attempt(&key).await.unwrap() }
    }))
    .await;

    results.sort_unstable();
    assert_eq!(results, (1..=10).collect::<Vec<u32>>());
}

#[tokio::test]
async fn test_memory_concurrent_marks_share_state() {
    let ledger = MemoryLedger::new(Duration::from_secs(60));

    join_all((0..20).map(|i| {
        let ledger = ledger.clone();
        async move {
            ledger
                .mark_delivered("post-shared", &format!("follower{}", i % 5))
                .await
                .unwrap()
        }
    }))
    .await;

    assert_eq!(ledger.delivered_count().await, 5);
    for i in 0..5 {
        assert!(ledger
            .is_delivered("post-shared", &format!("follower{}", i))
            .await
            .unwrap());
    }
}
