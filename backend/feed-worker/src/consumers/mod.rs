pub mod amqp;
pub mod post_consumer;

pub use amqp::{AmqpDeadLetterSink, AmqpDelivery, AmqpSubscription};
pub use post_consumer::{ConsumerSettings, EventConsumer};

use crate::error::BrokerError;
use crate::models::Outcome;
use async_trait::async_trait;

/// Business logic invoked once per delivery.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    async fn handle(&self, body: &[u8]) -> Outcome;
}

/// One message handed over by the broker, settled exactly once.
#[async_trait]
pub trait DeliveryHandle: Send + Sync + 'static {
    fn body(&self) -> &[u8];

    fn delivery_tag(&self) -> u64;

    fn redelivered(&self) -> bool;

    async fn ack(&self) -> Result<(), BrokerError>;

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError>;
}

/// Destination for messages that exhausted their delivery attempts.
#[async_trait]
pub trait DeadLetterSink: Send + Sync + 'static {
    async fn publish(&self, body: &[u8], attempts: u32, cause: &str) -> Result<(), BrokerError>;
}
