//! Per-user feed lists in Redis
//!
//! Each recipient owns one list, newest post id at the head:
//! - feed:{user_id} → [post_id, ...] capped at FEED_MAX_LENGTH
//!
//! Insertion is two independent round trips, LPUSH then LTRIM. Nothing spans
//! them, so a crash in between leaves the list over length until the next
//! trim on the same key. That drift is tolerated: every later insertion
//! trims again.

use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::sync::Arc;
use tracing::{debug, warn};

/// Maximum number of post ids kept per feed.
pub const FEED_MAX_LENGTH: usize = 1000;

pub fn feed_key(user_id: &str) -> String {
    format!("feed:{}", user_id)
}

#[async_trait]
pub trait FeedStore: Send + Sync {
    /// Prepend `value` to the list at `key`, creating it if absent. Returns the
    /// new length.
    async fn push_front(&self, key: &str, value: &str) -> Result<usize, StoreError>;

    /// Keep only the elements between `start` and `stop` (inclusive, Redis
    /// index semantics).
    async fn trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError>;

    /// Elements between `start` and `stop` (inclusive), head first.
    async fn range(&self, key: &str, start: isize, stop: isize)
        -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError>;
}

/// Feed store backed by a shared Redis connection manager
#[derive(Clone)]
pub struct RedisFeedStore {
    client: Arc<ConnectionManager>,
}

impl RedisFeedStore {
    pub async fn new(redis_url: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;

        Ok(Self {
            client: Arc::new(manager),
        })
    }

    /// Shared connection manager, reused by the delivery ledger.
    pub fn connection_manager(&self) -> ConnectionManager {
        self.client.as_ref().clone()
    }
}

#[async_trait]
impl FeedStore for RedisFeedStore {
    async fn push_front(&self, key: &str, value: &str) -> Result<usize, StoreError> {
        let len: usize = redis::cmd("LPUSH")
            .arg(key)
            .arg(value)
            .query_async(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!("Redis LPUSH failed for {}: {}", key, e);
                e
            })?;

        debug!("Pushed {} onto {} (len={})", value, key, len);
        Ok(len)
    }

    async fn trim(&self, key: &str, start: isize, stop: isize) -> Result<(), StoreError> {
        redis::cmd("LTRIM")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async::<_, ()>(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!("Redis LTRIM failed for {}: {}", key, e);
                e
            })?;

        Ok(())
    }

    async fn range(
        &self,
        key: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let values: Vec<String> = redis::cmd("LRANGE")
            .arg(key)
            .arg(start)
            .arg(stop)
            .query_async(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!("Redis LRANGE failed for {}: {}", key, e);
                e
            })?;

        Ok(values)
    }

    async fn ping(&self) -> Result<(), StoreError> {
        redis::cmd("PING")
            .query_async::<_, String>(&mut self.client.as_ref().clone())
            .await
            .map_err(|e| {
                warn!("Redis PING failed: {}", e);
                StoreError::Unavailable(e.to_string())
            })?;
        Ok(())
    }
}
