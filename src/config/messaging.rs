//! Messaging and broker configuration types.

use std::time::Duration;

use serde::Deserialize;

/// Messaging type discriminator.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessagingType {
    /// NATS JetStream.
    #[default]
    Nats,
    /// In-process channel bus (no external broker).
    Channel,
}

/// Messaging configuration (discriminated union).
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct MessagingConfig {
    /// Messaging type discriminator.
    #[serde(rename = "type")]
    pub messaging_type: MessagingType,
    /// NATS-specific configuration.
    pub nats: NatsConfig,
}

/// NATS-specific configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// Server URLs.
    pub servers: Vec<String>,
    /// Delivery attempts per message before it is dead-lettered.
    pub max_deliver: u64,
    /// Seconds the broker waits for an ack before redelivering.
    pub ack_wait_secs: u64,
}

impl NatsConfig {
    pub fn ack_wait(&self) -> Duration {
        Duration::from_secs(self.ack_wait_secs)
    }
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            max_deliver: 5,
            ack_wait_secs: 30,
        }
    }
}
