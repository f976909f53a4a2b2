//! RabbitMQ plumbing for the post events consumer.
//!
//! The post queue is declared non-durable, matching the publisher side. The
//! dead-letter queue is durable: it holds the only copy of a poison message.

use super::{DeadLetterSink, DeliveryHandle};
use crate::config::BrokerConfig;
use crate::error::BrokerError;
use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use lapin::message::Delivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicPublishOptions, BasicQosOptions,
    ConfirmSelectOptions, QueueDeclareOptions,
};
use lapin::types::{AMQPValue, FieldTable};
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties};
use tracing::info;

const CONSUMER_TAG: &str = "feed-worker";
const ATTEMPTS_HEADER: &str = "x-fanout-attempts";
const CAUSE_HEADER: &str = "x-fanout-cause";
const PERSISTENT: u8 = 2;

/// An open channel consuming the post queue.
pub struct AmqpSubscription {
    // Held so the connection outlives the channel.
    _connection: Connection,
    channel: Channel,
    queue: String,
    dead_letter_queue: String,
}

impl AmqpSubscription {
    pub async fn connect(config: &BrokerConfig) -> Result<Self, BrokerError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default()).await?;
        let channel = connection.create_channel().await?;

        let prefetch = u16::try_from(config.max_concurrent_deliveries).unwrap_or(u16::MAX);
        channel
            .basic_qos(prefetch, BasicQosOptions::default())
            .await?;
        // Dead-letter publishes wait for the broker's confirm.
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await?;

        channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions::default(),
                FieldTable::default(),
            )
            .await?;

        channel
            .queue_declare(
                &config.dead_letter_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await?;

        info!(
            queue = %config.queue,
            dead_letter_queue = %config.dead_letter_queue,
            prefetch,
            "Connected to RabbitMQ"
        );

        Ok(Self {
            _connection: connection,
            channel,
            queue: config.queue.clone(),
            dead_letter_queue: config.dead_letter_queue.clone(),
        })
    }

    /// Start consuming. Manual acknowledgement: every delivery must be
    /// settled through its [`AmqpDelivery`] handle.
    pub async fn deliveries(
        &self,
    ) -> Result<BoxStream<'static, Result<AmqpDelivery, BrokerError>>, BrokerError> {
        let consumer = self
            .channel
            .basic_consume(
                &self.queue,
                CONSUMER_TAG,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        Ok(consumer
            .map(|delivery| delivery.map(AmqpDelivery).map_err(BrokerError::from))
            .boxed())
    }

    pub fn dead_letter_sink(&self) -> AmqpDeadLetterSink {
        AmqpDeadLetterSink {
            channel: self.channel.clone(),
            queue: self.dead_letter_queue.clone(),
        }
    }

    pub async fn close(&self) -> Result<(), BrokerError> {
        self.channel.close(200, "shutdown").await?;
        Ok(())
    }
}

pub struct AmqpDelivery(Delivery);

#[async_trait]
impl DeliveryHandle for AmqpDelivery {
    fn body(&self) -> &[u8] {
        &self.0.data
    }

    fn delivery_tag(&self) -> u64 {
        self.0.delivery_tag
    }

    fn redelivered(&self) -> bool {
        self.0.redelivered
    }

    async fn ack(&self) -> Result<(), BrokerError> {
        self.0.acker.ack(BasicAckOptions::default()).await?;
        Ok(())
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        self.0
            .acker
            .nack(BasicNackOptions {
                requeue,
                ..BasicNackOptions::default()
            })
            .await?;
        Ok(())
    }
}

/// Publishes exhausted messages to the dead-letter queue through the
/// default exchange.
#[derive(Clone)]
pub struct AmqpDeadLetterSink {
    channel: Channel,
    queue: String,
}

#[async_trait]
impl DeadLetterSink for AmqpDeadLetterSink {
    async fn publish(&self, body: &[u8], attempts: u32, cause: &str) -> Result<(), BrokerError> {
        let properties = BasicProperties::default()
            .with_headers(dead_letter_headers(attempts, cause))
            .with_delivery_mode(PERSISTENT);

        let confirmation = self
            .channel
            .basic_publish(
                "",
                &self.queue,
                BasicPublishOptions::default(),
                body,
                properties,
            )
            .await?
            .await?;

        if confirmation.is_nack() {
            return Err(BrokerError::NotConfirmed(self.queue.clone()));
        }
        Ok(())
    }
}

fn dead_letter_headers(attempts: u32, cause: &str) -> FieldTable {
    let mut headers = FieldTable::default();
    headers.insert(ATTEMPTS_HEADER.into(), AMQPValue::LongUInt(attempts));
    headers.insert(
        CAUSE_HEADER.into(),
        AMQPValue::LongString(cause.to_string().into()),
    );
    headers
}
