//! Dead Letter Queue (DLQ) infrastructure.
//!
//! Messages whose handler keeps failing are moved here once their delivery
//! budget is spent, so the broker stops redelivering them while the input
//! stays available for manual review and replay.
//!
//! ## Subject Naming
//!
//! Dead letters are published on `dlq.{original subject}`, e.g. a create
//! request that exhausted its deliveries on `data.prisons.create` lands on
//! `dlq.data.prisons.create`. The `form_dead_letter_stream` captures `dlq.>`.
//!
//! ## Message Format
//!
//! JSON object with the original subject, correlation id, delivery count,
//! failure reason, handler name, timestamp and the original body.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::bus::{self, InboundMessage, MessageBus};
use crate::metrics;
use crate::subject;

/// Errors that can occur during DLQ operations.
#[derive(Debug, thiserror::Error)]
pub enum DlqError {
    #[error("Failed to serialize dead letter: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Failed to publish to DLQ: {0}")]
    PublishFailed(String),
}

impl From<bus::BusError> for DlqError {
    fn from(err: bus::BusError) -> Self {
        DlqError::PublishFailed(err.to_string())
    }
}

/// Dead letter queue entry for a message that exhausted its deliveries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeadLetter {
    /// Subject the message was originally received on.
    pub subject: String,
    pub correlation_id: Option<String>,
    /// Delivery attempt on which the message was given up.
    pub delivery_count: u64,
    /// Human-readable reason for rejection.
    pub reason: String,
    /// Handler that failed.
    pub handler: String,
    /// RFC 3339 timestamp.
    pub occurred_at: String,
    /// Original body; invalid UTF-8 is replaced.
    pub payload: String,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, String>,
}

impl DeadLetter {
    /// Create a dead letter from a message whose handler failed.
    pub fn from_message(message: &InboundMessage, handler: &str, reason: impl Into<String>) -> Self {
        Self {
            subject: message.subject.clone(),
            correlation_id: message.correlation_id().map(str::to_string),
            delivery_count: message.delivery_count,
            reason: reason.into(),
            handler: handler.to_string(),
            occurred_at: Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
            payload: String::from_utf8_lossy(&message.payload).into_owned(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata to the dead letter.
    pub fn with_metadata(mut self, key: &str, value: &str) -> Self {
        self.metadata.insert(key.to_string(), value.to_string());
        self
    }

    /// Subject this dead letter is published on.
    pub fn topic(&self) -> String {
        subject::dead_letter(&self.subject)
    }

    pub fn encode(&self) -> Result<Bytes, DlqError> {
        Ok(Bytes::from(serde_json::to_vec(self)?))
    }
}

/// Trait for publishing messages to a dead letter queue.
#[async_trait]
pub trait DeadLetterPublisher: Send + Sync {
    /// Publish a dead letter to the queue.
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError>;
}

/// Publishes dead letters onto the message bus, keeping the correlation header.
pub struct BusDeadLetterPublisher {
    bus: Arc<dyn MessageBus>,
}

impl BusDeadLetterPublisher {
    pub fn new(bus: Arc<dyn MessageBus>) -> Self {
        Self { bus }
    }
}

#[async_trait]
impl DeadLetterPublisher for BusDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        let topic = dead_letter.topic();
        let headers = dead_letter
            .correlation_id
            .as_deref()
            .map(bus::request_headers)
            .unwrap_or_default();
        let payload = dead_letter.encode()?;

        self.bus
            .publish_with_headers(&topic, &headers, payload)
            .await?;

        metrics::record_dead_letter(&dead_letter.subject);
        warn!(
            topic = %topic,
            reason = %dead_letter.reason,
            handler = %dead_letter.handler,
            delivery_count = dead_letter.delivery_count,
            "Message moved to DLQ"
        );
        Ok(())
    }
}

/// In-memory DLQ publisher using a channel.
///
/// Used for testing.
pub struct ChannelDeadLetterPublisher {
    sender: mpsc::UnboundedSender<DeadLetter>,
}

impl ChannelDeadLetterPublisher {
    /// Create a new channel-based DLQ publisher.
    ///
    /// Returns the publisher and a receiver for consuming dead letters.
    pub fn new() -> (Self, mpsc::UnboundedReceiver<DeadLetter>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl DeadLetterPublisher for ChannelDeadLetterPublisher {
    async fn publish(&self, dead_letter: DeadLetter) -> Result<(), DlqError> {
        info!(
            topic = %dead_letter.topic(),
            reason = %dead_letter.reason,
            "Publishing to channel DLQ"
        );
        self.sender
            .send(dead_letter)
            .map_err(|e| DlqError::PublishFailed(e.to_string()))
    }
}
