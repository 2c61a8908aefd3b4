//! Submission side of the order-created topic.

use async_nats::jetstream;
use async_nats::jetstream::stream::{Config as StreamConfig, RetentionPolicy, StorageType};
use async_trait::async_trait;
use thiserror::Error;

use crate::events::OrderCreatedEvent;

/// Subject the orders service publishes to and the invoices service consumes.
pub const ORDER_CREATED_SUBJECT: &str = "order-created";

/// JetStream stream retaining order events.
pub const ORDER_EVENTS_STREAM: &str = "ORDERS";

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("event serialization failed: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("broker did not accept the message: {0}")]
    NotAccepted(String),
}

/// Hands an order-created fact to the broker for durable delivery.
///
/// A successful return means the broker accepted the message and will
/// deliver it to every subscriber of the topic at least once.
/// Implementations perform no retries; the caller decides whether to
/// retry or escalate.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, event: &OrderCreatedEvent) -> Result<(), PublishError>;
}

/// Stream definition both services agree on.
pub(crate) fn order_stream_config() -> StreamConfig {
    StreamConfig {
        name: ORDER_EVENTS_STREAM.to_string(),
        subjects: vec![ORDER_CREATED_SUBJECT.to_string()],
        retention: RetentionPolicy::Limits,
        storage: StorageType::File,
        ..Default::default()
    }
}

pub struct JetStreamPublisher {
    jetstream: jetstream::Context,
}

impl JetStreamPublisher {
    /// Connects to the durable order events stream, creating it when this
    /// service comes up before any broker state exists.
    pub async fn new(client: async_nats::Client) -> Result<Self, PublishError> {
        let jetstream = jetstream::new(client);
        jetstream
            .get_or_create_stream(order_stream_config())
            .await
            .map_err(|e| PublishError::NotAccepted(e.to_string()))?;
        Ok(Self { jetstream })
    }
}

#[async_trait]
impl EventPublisher for JetStreamPublisher {
    async fn publish(&self, event: &OrderCreatedEvent) -> Result<(), PublishError> {
        let payload = serde_json::to_vec(event)?;

        // The order id doubles as the broker-side dedup key, so the
        // handler's own retries cannot enqueue the event twice.
        let mut headers = async_nats::HeaderMap::new();
        headers.insert("Nats-Msg-Id", event.order_id.to_string().as_str());

        // First await submits, second awaits the broker ack; only then is
        // the message durably accepted.
        self.jetstream
            .publish_with_headers(ORDER_CREATED_SUBJECT.to_string(), headers, payload.into())
            .await
            .map_err(|e| PublishError::NotAccepted(e.to_string()))?
            .await
            .map_err(|e| PublishError::NotAccepted(e.to_string()))?;

        tracing::debug!(order_id = %event.order_id, subject = ORDER_CREATED_SUBJECT, "event accepted by broker");

        Ok(())
    }
}
