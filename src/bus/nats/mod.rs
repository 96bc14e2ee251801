//! NATS JetStream message bus implementation.
//!
//! - Each `StreamSpec` maps to a JetStream stream with file storage
//! - Consumers are durable pull consumers with `AckPolicy::Explicit`
//! - Publisher waits for the JetStream publish ack
//! - Every received message is processed on its own task, so slow storage
//!   calls never hold up other requests

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_nats::jetstream::{
    self,
    consumer::{pull, AckPolicy, DeliverPolicy},
    stream::{Config as StreamConfig, RetentionPolicy, StorageType},
    AckKind, Context,
};
use async_nats::HeaderMap;
use async_trait::async_trait;
use backon::{BackoffBuilder, ExponentialBuilder};
use bytes::Bytes;
use futures::StreamExt;
use tracing::{debug, error, info, Instrument};

use super::{
    BusError, ConsumerSpec, Disposition, InboundMessage, MessageBus, MessageHandler, Result,
    StreamSpec, CORRELATION_HEADER,
};
use crate::config::NatsConfig;
use crate::utils::bootstrap::connect_with_retry;

/// NATS JetStream message bus.
pub struct NatsMessageBus {
    jetstream: Context,
    ack_wait: Duration,
}

impl NatsMessageBus {
    /// Wrap an already connected client.
    pub fn new(client: async_nats::Client, ack_wait: Duration) -> Self {
        Self {
            jetstream: jetstream::new(client),
            ack_wait,
        }
    }

    /// Connect to the configured servers, retrying with backoff.
    pub async fn connect(config: &NatsConfig) -> Result<Self> {
        let servers = config.servers.join(",");

        let client = connect_with_retry("nats", &servers, || async_nats::connect(servers.as_str()))
            .await
            .map_err(|e| BusError::Connection(format!("Failed to connect to NATS: {}", e)))?;

        info!(servers = %servers, "Connected to NATS");
        Ok(Self::new(client, config.ack_wait()))
    }

    /// Consumer loop with automatic reconnection and exponential backoff with jitter.
    async fn consume_with_reconnect(
        consumer: jetstream::consumer::Consumer<pull::Config>,
        durable: String,
        handler: Arc<dyn MessageHandler>,
    ) {
        let backoff_builder = ExponentialBuilder::default()
            .with_min_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_secs(30))
            .with_jitter();

        let mut backoff_iter = backoff_builder.build();

        loop {
            match consumer.messages().await {
                Ok(mut messages) => {
                    info!(durable = %durable, "Consumer connected, processing messages");
                    backoff_iter = backoff_builder.build();

                    while let Some(next) = messages.next().await {
                        match next {
                            Ok(message) => {
                                let handler = Arc::clone(&handler);
                                let span = tracing::info_span!(
                                    "bus.consume",
                                    durable = %durable,
                                    subject = %message.subject
                                );
                                tokio::spawn(
                                    Self::process_message(message, handler).instrument(span),
                                );
                            }
                            Err(e) => {
                                error!(durable = %durable, error = %e, "Consumer delivery error, will reconnect");
                                break;
                            }
                        }
                    }

                    info!(durable = %durable, "Consumer stream ended, reconnecting...");
                }
                Err(e) => {
                    error!(
                        durable = %durable,
                        error = %e,
                        "Failed to open message stream, retrying after backoff"
                    );
                }
            }

            let delay = backoff_iter.next().unwrap_or(Duration::from_secs(30));
            tokio::time::sleep(delay).await;
        }
    }

    /// Run the handler for one message and apply its disposition.
    async fn process_message(message: jetstream::Message, handler: Arc<dyn MessageHandler>) {
        let delivery_count = message
            .info()
            .map(|info| info.delivered.max(1) as u64)
            .unwrap_or(1);

        let mut headers = HashMap::new();
        if let Some(value) = message
            .headers
            .as_ref()
            .and_then(|h| h.get(CORRELATION_HEADER))
        {
            headers.insert(CORRELATION_HEADER.to_string(), value.as_str().to_string());
        }

        let inbound = InboundMessage {
            subject: message.subject.to_string(),
            headers,
            payload: message.payload.clone(),
            delivery_count,
        };

        let disposition = handler.handle(inbound).await;

        let result = match disposition {
            Disposition::Ack => message.ack().await,
            Disposition::Nak => message.ack_with(AckKind::Nak(None)).await,
            Disposition::Term => message.ack_with(AckKind::Term).await,
        };

        match result {
            Ok(()) => debug!(?disposition, "Message settled"),
            Err(e) => error!(?disposition, error = %e, "Failed to acknowledge message"),
        }
    }
}

#[async_trait]
impl MessageBus for NatsMessageBus {
    async fn ensure_stream(&self, spec: &StreamSpec) -> Result<()> {
        self.jetstream
            .get_or_create_stream(StreamConfig {
                name: spec.name.clone(),
                subjects: spec.subjects.clone(),
                retention: RetentionPolicy::Limits,
                storage: StorageType::File,
                ..Default::default()
            })
            .await
            .map_err(|e| BusError::Stream {
                name: spec.name.clone(),
                message: e.to_string(),
            })?;

        info!(stream = %spec.name, subjects = ?spec.subjects, "Stream declared");
        Ok(())
    }

    #[tracing::instrument(name = "bus.publish", skip_all, fields(subject = %subject))]
    async fn publish_with_headers(
        &self,
        subject: &str,
        headers: &HashMap<String, String>,
        payload: Bytes,
    ) -> Result<()> {
        let mut header_map = HeaderMap::new();
        for (name, value) in headers {
            header_map.insert(name.as_str(), value.as_str());
        }

        let ack = self
            .jetstream
            .publish_with_headers(subject.to_string(), header_map, payload)
            .await
            .map_err(|e| BusError::Publish(format!("Failed to publish: {}", e)))?;

        ack.await
            .map_err(|e| BusError::Publish(format!("Publish confirmation failed: {}", e)))?;

        debug!("Published message");
        Ok(())
    }

    async fn subscribe(
        &self,
        consumer: &ConsumerSpec,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<()> {
        let stream = self
            .jetstream
            .get_stream(&consumer.stream)
            .await
            .map_err(|e| {
                BusError::Subscribe(format!("Stream '{}' not found: {}", consumer.stream, e))
            })?;

        let pull_consumer = stream
            .get_or_create_consumer(
                &consumer.durable,
                pull::Config {
                    durable_name: Some(consumer.durable.clone()),
                    filter_subject: consumer.filter_subject.clone(),
                    deliver_policy: DeliverPolicy::All,
                    ack_policy: AckPolicy::Explicit,
                    ack_wait: self.ack_wait,
                    max_deliver: consumer.max_deliver.max(1) as i64,
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| {
                BusError::Subscribe(format!(
                    "Failed to create consumer '{}': {}",
                    consumer.durable, e
                ))
            })?;

        info!(
            durable = %consumer.durable,
            filter_subject = %consumer.filter_subject,
            "Durable consumer bound"
        );

        tokio::spawn(Self::consume_with_reconnect(
            pull_consumer,
            consumer.durable.clone(),
            handler,
        ));

        Ok(())
    }
}
