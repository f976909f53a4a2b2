use crate::{
    attempts_key, delivered_key, validate_key, AttemptCounter, DeliveryLedger, LedgerResult,
};
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use std::time::Duration;
use tracing::{debug, warn};

/// Redis-backed ledger shared by every worker instance.
///
/// Markers and counters expire after `retention`; a redelivery that arrives
/// later than that is treated as new.
#[derive(Clone)]
pub struct RedisLedger {
    manager: ConnectionManager,
    retention: Duration,
}

impl RedisLedger {
    pub fn new(manager: ConnectionManager, retention: Duration) -> Self {
        Self { manager, retention }
    }

    /// Connect to `redis_url` and build a ledger on a fresh connection manager.
    pub async fn connect(redis_url: &str, retention: Duration) -> LedgerResult<Self> {
        let client = redis::Client::open(redis_url)?;
        let manager = ConnectionManager::new(client).await?;
        Ok(Self::new(manager, retention))
    }

    fn ttl_secs(&self) -> u64 {
        self.retention.as_secs().max(1)
    }
}

#[async_trait]
impl DeliveryLedger for RedisLedger {
    async fn is_delivered(&self, scope: &str, member: &str) -> LedgerResult<bool> {
        validate_key("scope", scope)?;
        validate_key("member", member)?;

        let key = delivered_key(scope);
        let exists: bool = redis::cmd("SISMEMBER")
            .arg(&key)
            .arg(member)
            .query_async(&mut self.manager.clone())
            .await
            .map_err(|e| {
                warn!("Redis SISMEMBER failed for {}: {}", key, e);
                e
            })?;

        if exists {
            debug!(scope = %scope, member = %member, "Delivery marker present");
        }

        Ok(exists)
    }

    async fn mark_delivered(&self, scope: &str, member: &str) -> LedgerResult<()> {
        validate_key("scope", scope)?;
        validate_key("member", member)?;

        let key = delivered_key(scope);
        redis::pipe()
            .atomic()
            .cmd("SADD")
            .arg(&key)
            .arg(member)
            .ignore()
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs())
            .ignore()
            .query_async::<_, ()>(&mut self.manager.clone())
            .await
            .map_err(|e| {
                warn!("Redis SADD/EXPIRE failed for {}: {}", key, e);
                e
            })?;

        Ok(())
    }
}

#[async_trait]
impl AttemptCounter for RedisLedger {
    async fn record_attempt(&self, fingerprint: &str) -> LedgerResult<u32> {
        validate_key("fingerprint", fingerprint)?;

        let key = attempts_key(fingerprint);
        let (attempts,): (u32,) = redis::pipe()
            .atomic()
            .cmd("INCR")
            .arg(&key)
            .cmd("EXPIRE")
            .arg(&key)
            .arg(self.ttl_secs())
            .ignore()
            .query_async(&mut self.manager.clone())
            .await
            .map_err(|e| {
                warn!("Redis INCR failed for {}: {}", key, e);
                e
            })?;

        debug!(fingerprint = %fingerprint, attempts, "Recorded delivery attempt");
        Ok(attempts)
    }

    async fn clear_attempts(&self, fingerprint: &str) -> LedgerResult<()> {
        validate_key("fingerprint", fingerprint)?;

        let key = attempts_key(fingerprint);
        redis::cmd("DEL")
            .arg(&key)
            .query_async::<_, ()>(&mut self.manager.clone())
            .await?;

        Ok(())
    }
}
