//! In-memory channel-based message bus for standalone mode.
//!
//! Emulates the broker semantics the dispatcher relies on within a single
//! process: streams own subjects, durable groups replay the stream backlog,
//! members of a group compete for messages, and negatively acknowledged
//! messages are redelivered until the group's `max_deliver` is reached.
//! Ideal for local development and testing without external dependencies.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{mpsc, Mutex, RwLock};
use tracing::{debug, info, warn};

use super::{
    BusError, ConsumerSpec, Disposition, InboundMessage, MessageBus, MessageHandler, Result,
    StreamSpec,
};
use crate::subject;

/// A message accepted by a stream.
#[derive(Debug, Clone)]
pub struct PublishedMessage {
    /// Stream-wide sequence, starting at 1.
    pub sequence: u64,
    pub subject: String,
    pub headers: HashMap<String, String>,
    pub payload: Bytes,
}

/// Outcome of one delivery attempt to a consumer group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryRecord {
    pub durable: String,
    pub subject: String,
    pub delivery_count: u64,
    pub disposition: Disposition,
}

type Members = Arc<RwLock<Vec<Arc<dyn MessageHandler>>>>;

struct ConsumerGroup {
    spec: ConsumerSpec,
    members: Members,
    sender: mpsc::UnboundedSender<PublishedMessage>,
}

#[derive(Default)]
struct ChannelState {
    streams: Vec<StreamSpec>,
    log: Vec<PublishedMessage>,
    groups: HashMap<String, ConsumerGroup>,
    watchers: Vec<(String, mpsc::UnboundedSender<PublishedMessage>)>,
}

impl ChannelState {
    fn stream_for(&self, subject: &str) -> Option<&StreamSpec> {
        self.streams
            .iter()
            .find(|s| s.subjects.iter().any(|p| subject::matches(subject, p)))
    }
}

/// In-process message bus.
///
/// Cloning yields a handle onto the same bus, so tests can keep one to
/// inspect traffic while the router owns another.
#[derive(Clone, Default)]
pub struct ChannelMessageBus {
    state: Arc<Mutex<ChannelState>>,
    deliveries: Arc<Mutex<Vec<DeliveryRecord>>>,
}

impl ChannelMessageBus {
    /// Create a new channel message bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// All messages accepted so far, in publish order.
    pub async fn published(&self) -> Vec<PublishedMessage> {
        self.state.lock().await.log.clone()
    }

    /// Messages accepted on exactly `subject`.
    pub async fn published_on(&self, subject: &str) -> Vec<PublishedMessage> {
        self.state
            .lock()
            .await
            .log
            .iter()
            .filter(|m| m.subject == subject)
            .cloned()
            .collect()
    }

    /// Delivery attempts recorded so far.
    pub async fn deliveries(&self) -> Vec<DeliveryRecord> {
        self.deliveries.lock().await.clone()
    }

    /// Observe every future message matching `pattern`, like a plain
    /// (non-durable) subscription a requester opens for its reply subject.
    pub async fn watch(&self, pattern: &str) -> mpsc::UnboundedReceiver<PublishedMessage> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.state
            .lock()
            .await
            .watchers
            .push((pattern.to_string(), tx));
        rx
    }

    async fn run_group(
        mut receiver: mpsc::UnboundedReceiver<PublishedMessage>,
        members: Members,
        spec: ConsumerSpec,
        deliveries: Arc<Mutex<Vec<DeliveryRecord>>>,
    ) {
        let next_member = Arc::new(AtomicUsize::new(0));

        while let Some(message) = receiver.recv().await {
            tokio::spawn(Self::deliver(
                message,
                members.clone(),
                next_member.clone(),
                spec.clone(),
                deliveries.clone(),
            ));
        }

        info!(durable = %spec.durable, "Channel closed, stopping consumer group");
    }

    /// Deliver one message to the group, retrying on `Nak`.
    async fn deliver(
        message: PublishedMessage,
        members: Members,
        next_member: Arc<AtomicUsize>,
        spec: ConsumerSpec,
        deliveries: Arc<Mutex<Vec<DeliveryRecord>>>,
    ) {
        let max_deliver = spec.max_deliver.max(1);

        for attempt in 1..=max_deliver {
            let handler = {
                let members = members.read().await;
                if members.is_empty() {
                    return;
                }
                let index = next_member.fetch_add(1, Ordering::SeqCst) % members.len();
                Arc::clone(&members[index])
            };

            let inbound = InboundMessage {
                subject: message.subject.clone(),
                headers: message.headers.clone(),
                payload: message.payload.clone(),
                delivery_count: attempt,
            };

            let disposition = handler.handle(inbound).await;

            deliveries.lock().await.push(DeliveryRecord {
                durable: spec.durable.clone(),
                subject: message.subject.clone(),
                delivery_count: attempt,
                disposition,
            });

            if disposition != Disposition::Nak {
                return;
            }

            debug!(
                durable = %spec.durable,
                subject = %message.subject,
                attempt,
                "Message negatively acknowledged, redelivering"
            );
        }

        warn!(
            durable = %spec.durable,
            subject = %message.subject,
            max_deliver,
            "Maximum deliveries reached, message left unacknowledged"
        );
    }
}

#[async_trait]
impl MessageBus for ChannelMessageBus {
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<()> {
        let mut state = self.state.lock().await;

        if let Some(existing) = state.streams.iter().find(|s| s.name == spec.name) {
            if existing.subjects == spec.subjects {
                return Ok(());
            }
            return Err(BusError::Stream {
                name: spec.name.clone(),
                message: "stream name already in use with different subjects".to_string(),
            });
        }

        let overlapping = state.streams.iter().find(|s| {
            s.subjects
                .iter()
                .any(|existing| spec.subjects.contains(existing))
        });
        if let Some(other) = overlapping {
            return Err(BusError::Stream {
                name: spec.name.clone(),
                message: format!("subjects overlap with stream '{}'", other.name),
            });
        }

        state.streams.push(spec.clone());
        info!(stream = %spec.name, subjects = ?spec.subjects, "Stream declared");
        Ok(())
    }

    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: &HashMap<String, String>,
        payload: Bytes,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        if state.stream_for(subject).is_none() {
            return Err(BusError::Publish(format!(
                "no stream matches subject '{}'",
                subject
            )));
        }

        let message = PublishedMessage {
            sequence: state.log.len() as u64 + 1,
            subject: subject.to_string(),
            headers: headers.clone(),
            payload,
        };
        state.log.push(message.clone());

        for group in state.groups.values() {
            if subject::matches(subject, &group.spec.filter_subject) {
                let _ = group.sender.send(message.clone());
            }
        }

        state.watchers.retain(|(pattern, tx)| {
            !subject::matches(subject, pattern) || tx.send(message.clone()).is_ok()
        });

        debug!(subject = %subject, sequence = message.sequence, "Published message to channel");
        Ok(())
    }

    async fn subscribe(
        &self,
        consumer: &ConsumerSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;

        if !state.streams.iter().any(|s| s.name == consumer.stream) {
            return Err(BusError::Subscribe(format!(
                "stream '{}' not found",
                consumer.stream
            )));
        }

        if let Some(group) = state.groups.get(&consumer.durable) {
            if group.spec.filter_subject != consumer.filter_subject {
                return Err(BusError::Subscribe(format!(
                    "durable '{}' is already bound to '{}'",
                    consumer.durable, group.spec.filter_subject
                )));
            }
            let count = {
                let mut members = group.members.write().await;
                members.push(handler);
                members.len()
            };
            info!(durable = %consumer.durable, members = count, "Joined consumer group");
            return Ok(());
        }

        let (sender, receiver) = mpsc::unbounded_channel();
        for message in state
            .log
            .iter()
            .filter(|m| subject::matches(&m.subject, &consumer.filter_subject))
        {
            let _ = sender.send(message.clone());
        }

        let members: Members = Arc::new(RwLock::new(vec![handler]));
        tokio::spawn(Self::run_group(
            receiver,
            members.clone(),
            consumer.clone(),
            self.deliveries.clone(),
        ));

        state.groups.insert(
            consumer.durable.clone(),
            ConsumerGroup {
                spec: consumer.clone(),
                members,
                sender,
            },
        );

        info!(
            durable = %consumer.durable,
            filter_subject = %consumer.filter_subject,
            "Channel consumer started"
        );
        Ok(())
    }
}
