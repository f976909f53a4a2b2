//! # Idempotent Consumer Library
//!
//! Delivery bookkeeping for at-least-once message consumers, stored in Redis
//! so that every worker instance sees the same state.
//!
//! ## Problem
//!
//! A broker that redelivers on negative acknowledgement restarts the whole
//! unit of work:
//! - **Partial fan-out**: recipients written before the failure get the same
//!   entry again on retry
//! - **Poison messages**: a message that can never succeed is requeued forever
//!
//! ## Solution
//!
//! Two small primitives, both TTL-bounded so Redis memory stays flat:
//!
//! - [`DeliveryLedger`]: remembers that `member` was already served for
//!   `scope` (for example a follower for a post). Backed by one SET per
//!   scope: `fanout:delivered:{scope}`.
//! - [`AttemptCounter`]: counts how many times a message body has been
//!   attempted. Backed by one counter per message:
//!   `fanout:attempts:{fingerprint}`.
//!
//! ```text
//! Broker → Consumer → AttemptCounter ──(limit reached)──→ dead-letter queue
//!              ↓
//!          Handler → DeliveryLedger (skip / mark) → shared store
//! ```
//!
//! ## Usage Example
//!
//! ```ignore
//! use idempotent_consumer::{fingerprint, AttemptCounter, DeliveryLedger, RedisLedger};
//! use std::time::Duration;
//!
//! # async fn example(manager: redis::aio::ConnectionManager, body: &[u8]) -> idempotent_consumer::LedgerResult<()> {
//! let ledger = RedisLedger::new(manager, Duration::from_secs(86_400));
//!
//! if !ledger.is_delivered("post-1", "follower-9").await? {
//!     // write to follower-9's inbox
//!     ledger.mark_delivered("post-1", "follower-9").await?;
//! }
//!
//! let attempts = ledger.record_attempt(&fingerprint(body)).await?;
//! # let _ = attempts;
//! # Ok(())
//! # }
//! ```
//!
//! ## Consistency
//!
//! Marking happens after the protected write, so a crash between the two
//! still produces a duplicate. The ledger narrows the duplicate window to
//! that gap; it does not give exactly-once delivery.

use async_trait::async_trait;
use sha2::{Digest, Sha256};

mod error;
mod memory;
mod redis_ledger;

pub use error::{LedgerError, LedgerResult};
pub use memory::MemoryLedger;
pub use redis_ledger::RedisLedger;

/// Maximum accepted length for a scope, member or fingerprint
pub const MAX_KEY_LEN: usize = 255;

/// Per-(scope, member) delivery markers.
#[async_trait]
pub trait DeliveryLedger: Send + Sync {
    /// `Ok(true)` if `member` was already marked for `scope` and the marker
    /// has not expired.
    async fn is_delivered(&self, scope: &str, member: &str) -> LedgerResult<bool>;

    /// Record that `member` was served for `scope`. Idempotent.
    async fn mark_delivered(&self, scope: &str, member: &str) -> LedgerResult<()>;
}

/// Per-message attempt counting, used to stop infinite redelivery.
#[async_trait]
pub trait AttemptCounter: Send + Sync {
    /// Increment and return the attempt count for `fingerprint` (first call
    /// returns 1).
    async fn record_attempt(&self, fingerprint: &str) -> LedgerResult<u32>;

    /// Forget the attempt count for `fingerprint`.
    async fn clear_attempts(&self, fingerprint: &str) -> LedgerResult<()>;
}

/// Hex-encoded SHA-256 of a raw message body.
///
/// Identifies a message across redeliveries without trusting anything inside
/// it, so it also works for bodies that fail to decode.
pub fn fingerprint(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}

pub(crate) fn validate_key(kind: &str, key: &str) -> LedgerResult<()> {
    if key.is_empty() {
        return Err(LedgerError::InvalidKey(format!("{} cannot be empty", kind)));
    }

    if key.len() > MAX_KEY_LEN {
        return Err(LedgerError::InvalidKey(format!(
            "{} too long: {} characters (max {})",
            kind,
            key.len(),
            MAX_KEY_LEN
        )));
    }

    Ok(())
}

pub(crate) fn delivered_key(scope: &str) -> String {
    format!("fanout:delivered:{}", scope)
}

pub(crate) fn attempts_key(fingerprint: &str) -> String {
    format!("fanout:attempts:{}", fingerprint)
}
