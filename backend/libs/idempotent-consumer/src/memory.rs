use crate::{validate_key, AttemptCounter, DeliveryLedger, LedgerResult};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

/// Process-local ledger.
///
/// Same semantics as [`crate::RedisLedger`] but state lives in this process
/// only, so it deduplicates redeliveries to the same instance. Suitable for
/// single-instance deployments and tests.
#[derive(Clone)]
pub struct MemoryLedger {
    retention: Duration,
    state: Arc<Mutex<State>>,
}

#[derive(Default)]
struct State {
    delivered: HashMap<(String, String), Instant>,
    attempts: HashMap<String, (u32, Instant)>,
}

impl MemoryLedger {
    pub fn new(retention: Duration) -> Self {
        Self {
            retention,
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    /// Number of live delivery markers (expired ones are not counted).
    pub async fn delivered_count(&self) -> usize {
        let now = Instant::now();
        let state = self.state.lock().await;
        state
            .delivered
            .values()
            .filter(|expires| **expires > now)
            .count()
    }
}

#[async_trait]
impl DeliveryLedger for MemoryLedger {
    async fn is_delivered(&self, scope: &str, member: &str) -> LedgerResult<bool> {
        validate_key("scope", scope)?;
        validate_key("member", member)?;

        let now = Instant::now();
        let mut state = self.state.lock().await;
        state.delivered.retain(|_, expires| *expires > now);

        Ok(state
            .delivered
            .contains_key(&(scope.to_string(), member.to_string())))
    }

    async fn mark_delivered(&self, scope: &str, member: &str) -> LedgerResult<()> {
        validate_key("scope", scope)?;
        validate_key("member", member)?;

        let expires = Instant::now() + self.retention;
        let mut state = self.state.lock().await;
        state
            .delivered
            .insert((scope.to_string(), member.to_string()), expires);
        Ok(())
    }
}

#[async_trait]
impl AttemptCounter for MemoryLedger {
    async fn record_attempt(&self, fingerprint: &str) -> LedgerResult<u32> {
        validate_key("fingerprint", fingerprint)?;

        let now = Instant::now();
        let expires = now + self.retention;
        let mut state = self.state.lock().await;
        let entry = state
            .attempts
            .entry(fingerprint.to_string())
            .or_insert((0, expires));

        if entry.1 <= now {
            *entry = (0, expires);
        }
        entry.0 += 1;
        entry.1 = expires;

        Ok(entry.0)
    }

    async fn clear_attempts(&self, fingerprint: &str) -> LedgerResult<()> {
        validate_key("fingerprint", fingerprint)?;

        self.state.lock().await.attempts.remove(fingerprint);
        Ok(())
    }
}
