//! Post Events Consumer
//!
//! Pulls deliveries off the post queue and runs each one as an independent
//! task through the [`EventHandler`], at most `max_concurrent_deliveries` at a
//! time. The loop itself only dispatches; settling (ack / nack /
//! dead-letter) happens in the task once the handler has decided.
//!
//! A delivery the handler wants requeued counts as one failed attempt. Once a
//! message body has failed `max_delivery_attempts` times it is published to
//! the dead-letter queue and acknowledged, which ends the redelivery loop for
//! poison messages.

use super::{DeadLetterSink, DeliveryHandle, EventHandler};
use crate::error::BrokerError;
use crate::metrics;
use crate::models::{FailureCause, Outcome};
use futures::{Stream, StreamExt};
use idempotent_consumer::{fingerprint, AttemptCounter};
use prometheus::IntGauge;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::{debug, error, info, info_span, warn, Instrument};

#[derive(Debug, Clone)]
pub struct ConsumerSettings {
    pub max_concurrent_deliveries: usize,
    pub max_delivery_attempts: u32,
}

impl Default for ConsumerSettings {
    fn default() -> Self {
        Self {
            max_concurrent_deliveries: 64,
            max_delivery_attempts: 5,
        }
    }
}

pub struct EventConsumer {
    handler: Arc<dyn EventHandler>,
    settler: Settler,
    permits: Arc<Semaphore>,
    max_concurrent: usize,
}

#[derive(Clone)]
struct Settler {
    attempts: Arc<dyn AttemptCounter>,
    dead_letter: Arc<dyn DeadLetterSink>,
    max_attempts: u32,
}

impl EventConsumer {
    pub fn new(
        handler: Arc<dyn EventHandler>,
        attempts: Arc<dyn AttemptCounter>,
        dead_letter: Arc<dyn DeadLetterSink>,
        settings: ConsumerSettings,
    ) -> Self {
        let max_concurrent = settings.max_concurrent_deliveries.max(1);

        Self {
            handler,
            settler: Settler {
                attempts,
                dead_letter,
                max_attempts: settings.max_delivery_attempts.max(1),
            },
            permits: Arc::new(Semaphore::new(max_concurrent)),
            max_concurrent,
        }
    }

    /// Run until `shutdown` resolves (returns `Ok`) or the delivery stream
    /// fails or ends (returns `Err`, fatal for the process). In-flight
    /// deliveries are always drained before returning.
    pub async fn run<S, D, F>(&self, mut deliveries: S, shutdown: F) -> Result<(), BrokerError>
    where
        S: Stream<Item = Result<D, BrokerError>> + Unpin,
        D: DeliveryHandle,
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        info!(
            max_concurrent = self.max_concurrent,
            max_attempts = self.settler.max_attempts,
            "Post events consumer started"
        );

        let result = loop {
            let permit = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                permit = self.permits.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break Ok(()),
                },
            };

            let next = tokio::select! {
                _ = &mut shutdown => break Ok(()),
                next = deliveries.next() => next,
            };

            match next {
                Some(Ok(delivery)) => self.dispatch(delivery, permit),
                Some(Err(e)) => {
                    error!(error = %e, "Delivery stream failed");
                    break Err(e);
                }
                None => {
                    error!("Delivery stream closed by broker");
                    break Err(BrokerError::StreamClosed);
                }
            }
        };

        self.drain().await;
        info!("Post events consumer stopped");
        result
    }

    fn dispatch<D: DeliveryHandle>(&self, delivery: D, permit: OwnedSemaphorePermit) {
        let handler = Arc::clone(&self.handler);
        let settler = self.settler.clone();
        let span = info_span!(
            "delivery",
            delivery_tag = delivery.delivery_tag(),
            redelivered = delivery.redelivered()
        );

        let guard = InflightGuard::new(metrics::inflight_deliveries(), permit);

        tokio::spawn(
            async move {
                let outcome = handler.handle(delivery.body()).await;
                settler.settle(&delivery, outcome).await;
                drop(guard);
            }
            .instrument(span),
        );
    }

    /// Wait until every permit is back, i.e. no handler is running.
    async fn drain(&self) {
        let in_flight = self.max_concurrent - self.permits.available_permits();
        if in_flight > 0 {
            info!(in_flight, "Waiting for in-flight deliveries");
        }
        if let Ok(all) = self.permits.acquire_many(self.max_concurrent as u32).await {
            drop(all);
        }
    }
}

/// Holds a concurrency permit and counts it in the in-flight gauge. Both are
/// released on drop, including when the task unwinds.
struct InflightGuard {
    gauge: IntGauge,
    _permit: OwnedSemaphorePermit,
}

impl InflightGuard {
    fn new(gauge: IntGauge, permit: OwnedSemaphorePermit) -> Self {
        gauge.inc();
        Self {
            gauge,
            _permit: permit,
        }
    }
}

impl Drop for InflightGuard {
    fn drop(&mut self) {
        self.gauge.dec();
    }
}

impl Settler {
    async fn settle<D: DeliveryHandle>(&self, delivery: &D, outcome: Outcome) {
        match outcome {
            Outcome::Ack => {
                ack(delivery).await;
                if delivery.redelivered() {
                    self.forget(delivery.body()).await;
                }
            }
            Outcome::Nack {
                requeue: false,
                cause,
            } => {
                debug!(cause = %cause, "Discarding delivery");
                nack(delivery, false).await;
            }
            Outcome::Nack {
                requeue: true,
                cause,
            } => self.requeue_or_dead_letter(delivery, cause).await,
        }
    }

    async fn requeue_or_dead_letter<D: DeliveryHandle>(&self, delivery: &D, cause: FailureCause) {
        let body = delivery.body();
        let attempts = match self.attempts.record_attempt(&fingerprint(body)).await {
            Ok(attempts) => attempts,
            Err(e) => {
                warn!(error = %e, cause = %cause, "Attempt counter unavailable; requeueing");
                nack(delivery, true).await;
                return;
            }
        };

        if attempts < self.max_attempts {
            warn!(
                cause = %cause,
                attempts,
                max_attempts = self.max_attempts,
                "Requeueing delivery"
            );
            nack(delivery, true).await;
            return;
        }

        match self
            .dead_letter
            .publish(body, attempts, cause.as_str())
            .await
        {
            Ok(()) => {
                metrics::record_dead_lettered(cause.as_str());
                error!(
                    cause = %cause,
                    attempts,
                    "Delivery attempts exhausted; moved to dead-letter queue"
                );
                ack(delivery).await;
                self.forget(body).await;
            }
            Err(e) => {
                error!(error = %e, cause = %cause, "Dead-letter publish failed; requeueing");
                nack(delivery, true).await;
            }
        }
    }

    async fn forget(&self, body: &[u8]) {
        if let Err(e) = self.attempts.clear_attempts(&fingerprint(body)).await {
            debug!(error = %e, "Failed to clear attempt counter");
        }
    }
}

async fn ack<D: DeliveryHandle>(delivery: &D) {
    if let Err(e) = delivery.ack().await {
        error!(error = %e, "Failed to ack delivery");
    }
}

async fn nack<D: DeliveryHandle>(delivery: &D, requeue: bool) {
    if let Err(e) = delivery.nack(requeue).await {
        error!(error = %e, requeue, "Failed to nack delivery");
    }
}
