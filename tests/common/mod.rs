//! Shared utilities for service-level tests.
//!
//! Runs the full router against the in-process bus and an in-memory store,
//! and plays the requester side: publish with a `req_id` header, then wait
//! on the reply subject the way a plain subscription would.

#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::mpsc;
use tracing::subscriber::DefaultGuard;
use tracing_subscriber::layer::SubscriberExt;

use formbus::bus::{
    request_headers, ChannelMessageBus, DeliveryRecord, MessageBus, PublishedMessage,
};
use formbus::config::FormConfig;
use formbus::dispatch::RedeliveryPolicy;
use formbus::entities::{form_for, CreatePrison, Prison};
use formbus::envelope::Request;
use formbus::metrics::MeasurementLog;
use formbus::router::MessageRouter;
use formbus::storage::{EntityStore, MemoryStore};

/// How long to wait for a reply that must arrive.
pub const REPLY_TIMEOUT: Duration = Duration::from_secs(5);

/// How long to wait before concluding that no reply is coming.
pub const SILENCE_WINDOW: Duration = Duration::from_millis(300);

pub const FORM: &str = "prisons";

/// A creation payload with the given Russian name.
pub fn sample(name_ru: &str) -> CreatePrison {
    CreatePrison {
        name_ru: name_ru.to_string(),
        name_ua: "Б".to_string(),
        subject: "X".to_string(),
        object_type: "Y".to_string(),
        lat: 1.0,
        lon: 2.0,
        address: "addr".to_string(),
        management: "m".to_string(),
        employees_count: 3,
        prisoners_count: 4,
        staff: "s".to_string(),
        contacts: "c".to_string(),
    }
}

pub fn create_body(payload: &CreatePrison) -> Bytes {
    Request::new(payload).encode().expect("encode request")
}

/// Fresh correlation id, safe to use as a subject token.
pub fn correlation_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

/// Collect measurements recorded on this thread until the guard drops.
///
/// Service tests run on a current-thread runtime, so every handler task
/// records into the returned log.
pub fn capture_metrics() -> (MeasurementLog, DefaultGuard) {
    let log = MeasurementLog::default();
    let guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));
    (log, guard)
}

/// Wait until `log` holds `count` increments of `metric` with `attributes`.
pub async fn wait_for_metric(
    log: &MeasurementLog,
    metric: &str,
    attributes: &[(&str, &str)],
    count: usize,
) {
    tokio::time::timeout(REPLY_TIMEOUT, async {
        while log.count(metric, attributes) < count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("{} never reached {} increments", metric, count));
}

/// One in-process deployment: a bus, a store, and routers bound to them.
pub struct Harness {
    pub bus: ChannelMessageBus,
    pub store: Arc<MemoryStore<Prison>>,
}

impl Harness {
    /// Start one router over a fresh in-memory store.
    pub async fn start(max_deliver: u64) -> Self {
        let store = Arc::new(MemoryStore::<Prison>::new());
        let routed: Arc<dyn EntityStore<Prison>> = store.clone();
        Self::start_with(routed, store, max_deliver).await
    }

    /// Start one router over `routed`, keeping `store` for assertions.
    pub async fn start_with(
        routed: Arc<dyn EntityStore<Prison>>,
        store: Arc<MemoryStore<Prison>>,
        max_deliver: u64,
    ) -> Self {
        let harness = Self {
            bus: ChannelMessageBus::new(),
            store,
        };
        harness.add_router(routed, max_deliver).await;
        harness
    }

    /// Bind another router instance to the same durable groups.
    pub async fn add_router(&self, store: Arc<dyn EntityStore<Prison>>, max_deliver: u64) {
        let router = MessageRouter::new(
            Arc::new(self.bus.clone()),
            Arc::new(form_for::<Prison>(&FormConfig::default())),
            store,
            RedeliveryPolicy::new(max_deliver),
        );
        router.setup_routes().await.expect("route setup");
    }

    /// Publish a request, with a `req_id` header when `correlation_id` is given.
    pub async fn send(&self, subject: &str, correlation_id: Option<&str>, body: Bytes) {
        let headers = correlation_id.map(request_headers).unwrap_or_default();
        self.bus
            .publish_with_headers(subject, &headers, body)
            .await
            .expect("publish request");
    }

    /// Publish a request and wait for the first message on `reply_subject`.
    pub async fn request(
        &self,
        subject: &str,
        correlation_id: &str,
        body: Bytes,
        reply_subject: &str,
    ) -> Bytes {
        let mut replies = self.bus.watch(reply_subject).await;
        self.send(subject, Some(correlation_id), body).await;
        next_reply(&mut replies).await
    }

    /// Request the full list and return the raw reply body.
    pub async fn list(&self) -> Bytes {
        let corr = correlation_id();
        self.request(
            &format!("data.{}", FORM),
            &corr,
            Bytes::new(),
            &format!("data.{}", corr),
        )
        .await
    }

    /// Wait until the store holds exactly `count` entities.
    pub async fn wait_for_count(&self, count: usize) {
        let store = Arc::clone(&self.store);
        tokio::time::timeout(REPLY_TIMEOUT, async move {
            while store.len().await != count {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("store never reached {} entities", count));
    }

    /// Wait until `durable` has recorded `count` delivery attempts and return them.
    pub async fn wait_for_deliveries(&self, durable: &str, count: usize) -> Vec<DeliveryRecord> {
        tokio::time::timeout(REPLY_TIMEOUT, async {
            loop {
                let records: Vec<DeliveryRecord> = self
                    .bus
                    .deliveries()
                    .await
                    .into_iter()
                    .filter(|d| d.durable == durable)
                    .collect();
                if records.len() >= count {
                    return records;
                }
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap_or_else(|_| panic!("{} never recorded {} deliveries", durable, count))
    }
}

/// Next message on a watched subject, failing the test on timeout.
pub async fn next_reply(replies: &mut mpsc::UnboundedReceiver<PublishedMessage>) -> Bytes {
    tokio::time::timeout(REPLY_TIMEOUT, replies.recv())
        .await
        .expect("timed out waiting for reply")
        .expect("reply channel closed")
        .payload
}

/// Assert that nothing arrives on a watched subject within the silence window.
pub async fn expect_silence(replies: &mut mpsc::UnboundedReceiver<PublishedMessage>) {
    if let Ok(Some(message)) = tokio::time::timeout(SILENCE_WINDOW, replies.recv()).await {
        panic!(
            "unexpected message on {}: {}",
            message.subject,
            String::from_utf8_lossy(&message.payload)
        );
    }
}
