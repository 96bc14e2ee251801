//! Message bus for request/reply over a persistent stream.
//!
//! This module contains:
//! - `MessageBus` trait: stream declaration, publishing, durable subscriptions
//! - `MessageHandler` trait: per-message callback returning an ack decision
//! - Implementations: NATS JetStream, in-process channel

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use futures::future::BoxFuture;
use tracing::info;

use crate::config::{MessagingConfig, MessagingType};

// Implementation modules
pub mod channel;
#[cfg(feature = "nats")]
pub mod nats;

// Re-exports
pub use channel::{ChannelMessageBus, DeliveryRecord, PublishedMessage};
#[cfg(feature = "nats")]
pub use nats::NatsMessageBus;

/// Header carrying the correlation id of a request.
pub const CORRELATION_HEADER: &str = "req_id";

// ============================================================================
// Traits
// ============================================================================

/// Result type for bus operations.
pub type Result<T> = std::result::Result<T, BusError>;

/// Errors that can occur during bus operations.
#[derive(Debug, thiserror::Error)]
pub enum BusError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Stream '{name}' declaration failed: {message}")]
    Stream { name: String, message: String },

    #[error("Publish failed: {0}")]
    Publish(String),

    #[error("Subscribe failed: {0}")]
    Subscribe(String),

    #[error("Acknowledgment failed: {0}")]
    Ack(String),
}

/// What to tell the broker once a message has been processed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Processing finished; never redeliver.
    Ack,
    /// Processing failed; redeliver if the consumer's budget allows.
    Nak,
    /// Give up on the message without redelivery.
    Term,
}

/// A message delivered to a durable consumer.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub subject: String,
    pub headers: HashMap<String, String>,
    pub payload: Bytes,
    /// Delivery attempt, starting at 1.
    pub delivery_count: u64,
}

impl InboundMessage {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    /// Correlation id from the `req_id` header, if present and non-empty.
    pub fn correlation_id(&self) -> Option<&str> {
        self.header(CORRELATION_HEADER).filter(|id| !id.is_empty())
    }

    pub fn is_redelivery(&self) -> bool {
        self.delivery_count > 1
    }
}

/// Handler for processing messages from a durable consumer.
pub trait MessageHandler: Send + Sync {
    /// Process a message and decide its acknowledgment.
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, Disposition>;
}

/// A persistent stream and the subjects it captures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamSpec {
    pub name: String,
    pub subjects: Vec<String>,
}

impl StreamSpec {
    pub fn new(name: impl Into<String>, subjects: Vec<String>) -> Self {
        Self {
            name: name.into(),
            subjects,
        }
    }
}

/// A durable consumer group bound to one subject of a stream.
///
/// Every process subscribing with the same `durable` name competes for the
/// group's messages instead of receiving its own copy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSpec {
    pub stream: String,
    pub durable: String,
    pub filter_subject: String,
    /// Maximum delivery attempts per message.
    pub max_deliver: u64,
}

/// Interface to the broker.
///
/// Implementations:
/// - `NatsMessageBus`: NATS JetStream
/// - `ChannelMessageBus`: in-process emulation for standalone runs and tests
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Declare a stream, succeeding if an identical one already exists.
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<()>;

    /// Publish a payload with headers into the stream owning `subject`.
    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: &HashMap<String, String>,
        payload: Bytes,
    ) -> Result<()>;

    /// Publish a payload without headers.
    async fn publish(&self, subject: &str, payload: Bytes) -> Result<()> {
        self.publish_with_headers(subject, &HashMap::new(), payload)
            .await
    }

    /// Bind `handler` to a durable consumer and start consuming.
    async fn subscribe(
        &self,
        consumer: &ConsumerSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()>;
}

/// Build the headers of a request carrying `correlation_id`.
pub fn request_headers(correlation_id: &str) -> HashMap<String, String> {
    HashMap::from([(CORRELATION_HEADER.to_string(), correlation_id.to_string())])
}

// ============================================================================
// Factory
// ============================================================================

/// Initialize the message bus based on configuration.
///
/// Requires the corresponding feature to be enabled:
/// - NATS: `--features nats` (included in default)
/// - Channel: always available
pub async fn init_message_bus(config: &MessagingConfig) -> Result<Arc<dyn MessageBus>> {
    match config.messaging_type {
        MessagingType::Nats => {
            #[cfg(feature = "nats")]
            {
                let bus = NatsMessageBus::connect(&config.nats).await?;
                info!(messaging_type = "nats", "Message bus initialized");
                Ok(Arc::new(bus))
            }

            #[cfg(not(feature = "nats"))]
            {
                Err(BusError::Connection(
                    "NATS support requires the 'nats' feature. Rebuild with --features nats"
                        .to_string(),
                ))
            }
        }
        MessagingType::Channel => {
            info!(messaging_type = "channel", "Message bus initialized");
            Ok(Arc::new(ChannelMessageBus::new()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn message(headers: HashMap<String, String>) -> InboundMessage {
        InboundMessage {
            subject: "scheme".to_string(),
            headers,
            payload: Bytes::new(),
            delivery_count: 1,
        }
    }

    #[test]
    fn test_correlation_id_from_header() {
        let msg = message(request_headers("abc"));
        assert_eq!(msg.correlation_id(), Some("abc"));
        assert!(!msg.is_redelivery());
    }

    #[test]
    fn test_correlation_id_missing_or_empty() {
        assert_eq!(message(HashMap::new()).correlation_id(), None);
        assert_eq!(message(request_headers("")).correlation_id(), None);
    }

    #[tokio::test]
    async fn test_init_channel_bus() {
        let config = MessagingConfig {
            messaging_type: MessagingType::Channel,
            ..Default::default()
        };
        let bus = init_message_bus(&config).await.unwrap();
        bus.ensure_stream(&StreamSpec::new("s", vec!["x.>".to_string()]))
            .await
            .unwrap();
        bus.publish("x.y", Bytes::from_static(b"{}")).await.unwrap();
    }
}
