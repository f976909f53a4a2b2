//! Fan-out on write: copy a new post id into every follower's feed.
//!
//! One call to [`FanOutHandler::handle`] is one delivery attempt:
//!
//! ```text
//! Received → Decoded → FollowersResolved → Writing(i) → Ack | Nack
//! ```
//!
//! Failure policy:
//! - undecodable body → Nack(requeue)
//! - permanent lookup failure → zero recipients, Ack
//! - transient lookup failure → zero recipients + Ack under `Drop`,
//!   Nack(requeue) under `Requeue`
//! - push failure for follower k → stop, Nack(requeue); k+1.. never attempted
//! - trim failure → logged, next follower
//!
//! A requeued event restarts at follower zero. Without delivery markers the
//! followers written before the failure receive the post twice; with markers
//! they are skipped for as long as the markers live.

use crate::config::ResolverFailurePolicy;
use crate::consumers::EventHandler;
use crate::feed_store::{feed_key, FeedStore, FEED_MAX_LENGTH};
use crate::grpc::FollowerResolver;
use crate::metrics;
use crate::models::{FailureCause, FanOutReport, Follower, Outcome, PostEvent};
use async_trait::async_trait;
use idempotent_consumer::DeliveryLedger;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone)]
pub struct FanOutSettings {
    pub feed_max_length: usize,
    pub resolver_failure_policy: ResolverFailurePolicy,
}

impl Default for FanOutSettings {
    fn default() -> Self {
        Self {
            feed_max_length: FEED_MAX_LENGTH,
            resolver_failure_policy: ResolverFailurePolicy::Drop,
        }
    }
}

/// Stateless per attempt; one instance is shared by every in-flight delivery.
#[derive(Clone)]
pub struct FanOutHandler {
    resolver: Arc<dyn FollowerResolver>,
    store: Arc<dyn FeedStore>,
    ledger: Option<Arc<dyn DeliveryLedger>>,
    settings: FanOutSettings,
}

enum Resolution {
    Followers(Vec<Follower>),
    Requeue,
}

impl FanOutHandler {
    pub fn new(
        resolver: Arc<dyn FollowerResolver>,
        store: Arc<dyn FeedStore>,
        settings: FanOutSettings,
    ) -> Self {
        Self {
            resolver,
            store,
            ledger: None,
            settings,
        }
    }

    /// Skip followers already marked for a post, and mark them after writing.
    pub fn with_delivery_ledger(mut self, ledger: Arc<dyn DeliveryLedger>) -> Self {
        self.ledger = Some(ledger);
        self
    }

    pub async fn handle(&self, body: &[u8]) -> Outcome {
        let started = Instant::now();
        let outcome = self.handle_inner(body).await;

        metrics::record_outcome(outcome.label());
        metrics::record_fanout_duration(started.elapsed());
        outcome
    }

    async fn handle_inner(&self, body: &[u8]) -> Outcome {
        let event = match PostEvent::decode(body) {
            Ok(event) => event,
            Err(e) => {
                error!(error = %e, body_len = body.len(), "Failed to decode post event");
                return Outcome::requeue(FailureCause::MalformedEvent);
            }
        };

        let followers = match self.resolve_followers(&event).await {
            Resolution::Followers(followers) => followers,
            Resolution::Requeue => return Outcome::requeue(FailureCause::ResolverUnavailable),
        };
        metrics::record_followers(followers.len());

        match self.write_feeds(&event, &followers).await {
            Ok(report) => {
                info!(
                    post_id = %event.post_id,
                    author_id = %event.author_id,
                    followers = report.followers,
                    delivered = report.delivered,
                    already_delivered = report.already_delivered,
                    trim_failures = report.trim_failures,
                    "Fan-out completed"
                );
                Outcome::Ack
            }
            Err(outcome) => outcome,
        }
    }

    async fn resolve_followers(&self, event: &PostEvent) -> Resolution {
        match self.resolver.resolve(&event.author_id).await {
            Ok(followers) => {
                metrics::record_resolver_request("success");
                Resolution::Followers(followers)
            }
            Err(e) if e.is_transient() => {
                metrics::record_resolver_request("transient_error");
                match self.settings.resolver_failure_policy {
                    ResolverFailurePolicy::Drop => {
                        error!(
                            post_id = %event.post_id,
                            author_id = %event.author_id,
                            error = %e,
                            "Follower lookup failed; post will not reach any feed"
                        );
                        Resolution::Followers(Vec::new())
                    }
                    ResolverFailurePolicy::Requeue => {
                        warn!(
                            post_id = %event.post_id,
                            author_id = %event.author_id,
                            error = %e,
                            "Follower lookup failed; requeueing event"
                        );
                        Resolution::Requeue
                    }
                }
            }
            Err(e) => {
                metrics::record_resolver_request("permanent_error");
                error!(
                    post_id = %event.post_id,
                    author_id = %event.author_id,
                    error = %e,
                    "Follower lookup rejected; post will not reach any feed"
                );
                Resolution::Followers(Vec::new())
            }
        }
    }

    /// Sequential writes, one follower at a time. Returns the Nack outcome on
    /// the first failed push.
    async fn write_feeds(
        &self,
        event: &PostEvent,
        followers: &[Follower],
    ) -> Result<FanOutReport, Outcome> {
        let mut report = FanOutReport {
            followers: followers.len(),
            ..FanOutReport::default()
        };
        let trim_stop = self.settings.feed_max_length as isize - 1;

        for (index, follower) in followers.iter().enumerate() {
            let follower_id = follower.follower_id.as_str();

            if self.already_delivered(event, follower_id).await {
                metrics::record_feed_write("duplicate_skipped");
                report.already_delivered += 1;
                continue;
            }

            let key = feed_key(follower_id);
            if let Err(e) = self.store.push_front(&key, &event.post_id).await {
                metrics::record_feed_write("push_failed");
                error!(
                    post_id = %event.post_id,
                    follower_id = %follower_id,
                    follower_index = index,
                    followers = followers.len(),
                    error = %e,
                    "Failed to push post to feed; requeueing event"
                );
                return Err(Outcome::requeue(FailureCause::FeedWriteFailed));
            }

            if let Err(e) = self.store.trim(&key, 0, trim_stop).await {
                metrics::record_feed_write("trim_failed");
                report.trim_failures += 1;
                warn!(
                    follower_id = %follower_id,
                    error = %e,
                    "Failed to trim feed; next insertion will trim it"
                );
            }

            self.mark_delivered(event, follower_id).await;
            metrics::record_feed_write("delivered");
            report.delivered += 1;

            debug!(
                post_id = %event.post_id,
                follower_id = %follower_id,
                "Post pushed to feed"
            );
        }

        Ok(report)
    }

    async fn already_delivered(&self, event: &PostEvent, follower_id: &str) -> bool {
        let Some(ledger) = &self.ledger else {
            return false;
        };

        match ledger.is_delivered(&event.post_id, follower_id).await {
            Ok(delivered) => delivered,
            Err(e) => {
                warn!(
                    post_id = %event.post_id,
                    follower_id = %follower_id,
                    error = %e,
                    "Delivery marker lookup failed; writing anyway"
                );
                false
            }
        }
    }

    async fn mark_delivered(&self, event: &PostEvent, follower_id: &str) {
        if let Some(ledger) = &self.ledger {
            if let Err(e) = ledger.mark_delivered(&event.post_id, follower_id).await {
                warn!(
                    post_id = %event.post_id,
                    follower_id = %follower_id,
                    error = %e,
                    "Failed to record delivery marker"
                );
            }
        }
    }
}

#[async_trait]
impl EventHandler for FanOutHandler {
    async fn handle(&self, body: &[u8]) -> Outcome {
        FanOutHandler::handle(self, body).await
    }
}
