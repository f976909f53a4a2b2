//! Feed store against a live Redis.
//!
//! Run with: REDIS_URL=redis://127.0.0.1:6379 cargo test -p feed-worker -- --ignored

use feed_worker::feed_store::{feed_key, FeedStore, RedisFeedStore};
use std::time::{SystemTime, UNIX_EPOCH};

fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1:6379".to_string())
}

fn unique_key(prefix: &str) -> String {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_nanos();
    feed_key(&format!("{prefix}-{nanos}"))
}

#[tokio::test]
#[ignore = "Requires Redis"]
async fn test_push_trim_range_round_trip() {
    let store = RedisFeedStore::new(&redis_url()).await.unwrap();
    let key = unique_key("it-reader");

    for i in 0..5 {
        let len = store.push_front(&key, &format!("post{i}")).await.unwrap();
        assert_eq!(len, i + 1);
    }
    store.trim(&key, 0, 2).await.unwrap();

    let feed = store.range(&key, 0, -1).await.unwrap();
    assert_eq!(feed, vec!["post4", "post3", "post2"]);

    // Leave nothing behind.
    store.trim(&key, 1, 0).await.unwrap();
    assert!(store.range(&key, 0, -1).await.unwrap().is_empty());
}

#[tokio::test]
#[ignore = "Requires Redis"]
async fn test_ping() {
    let store = RedisFeedStore::new(&redis_url()).await.unwrap();
    store.ping().await.unwrap();
}
