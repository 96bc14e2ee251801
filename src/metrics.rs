//! Dispatch metrics.
//!
//! Counters are OpenTelemetry instruments, feature-gated behind `otel` and
//! lazily initialized against the global meter provider. Naming follows OTel
//! semantic conventions (dot-separated).
//!
//! Attributes are limited to the request subject a message was routed on and,
//! for error replies, the status code. Request subjects are the bound filter
//! subjects, so the attribute sets stay fixed however many correlation ids
//! pass through. Reply subjects never appear as attributes.
//!
//! Every recording is also emitted as a trace event on [`TARGET`], so counts
//! stay visible in logs when no meter provider is installed. [`MeasurementLog`]
//! collects those events.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::field::{Field, Visit};
use tracing::{trace, Event, Subscriber};
use tracing_subscriber::layer::{Context, Layer};

/// Tracing target of measurement events.
pub const TARGET: &str = "formbus::metrics";

/// Messages handed to a dispatcher.
pub const DISPATCH_TOTAL: &str = "formbus.dispatch.total";

/// Deliveries with a delivery count above one.
pub const REDELIVERY_TOTAL: &str = "formbus.redelivery.total";

/// Error replies published (422 and 500).
pub const ERROR_REPLY_TOTAL: &str = "formbus.error_reply.total";

/// Messages moved to the dead-letter subject.
pub const DLQ_PUBLISH_TOTAL: &str = "formbus.dlq.publish.total";

pub const SUBJECT_ATTR: &str = "subject";
pub const STATUS_CODE_ATTR: &str = "status_code";

#[cfg(feature = "otel")]
mod instruments {
    use std::sync::LazyLock;

    use opentelemetry::metrics::{Counter, Meter};
    use opentelemetry::{global, KeyValue};

    use super::*;

    static METER: LazyLock<Meter> = LazyLock::new(|| global::meter("formbus"));

    // ========================================================================
    // Dispatch
    // ========================================================================

    pub static DISPATCH_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
        METER
            .u64_counter(DISPATCH_TOTAL)
            .with_description("Total messages dispatched to handlers")
            .build()
    });

    pub static REDELIVERY_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
        METER
            .u64_counter(REDELIVERY_TOTAL)
            .with_description("Total redelivered messages")
            .build()
    });

    pub static ERROR_REPLY_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
        METER
            .u64_counter(ERROR_REPLY_TOTAL)
            .with_description("Total error replies published")
            .build()
    });

    // ========================================================================
    // Dead Letter Queue
    // ========================================================================

    pub static DLQ_PUBLISH_COUNTER: LazyLock<Counter<u64>> = LazyLock::new(|| {
        METER
            .u64_counter(DLQ_PUBLISH_TOTAL)
            .with_description("Total DLQ publish operations")
            .build()
    });

    // ========================================================================
    // Attribute helpers
    // ========================================================================

    pub fn subject_attr(subject: &str) -> KeyValue {
        KeyValue::new(SUBJECT_ATTR, subject.to_string())
    }

    pub fn status_code_attr(status_code: u16) -> KeyValue {
        KeyValue::new(STATUS_CODE_ATTR, i64::from(status_code))
    }
}

#[cfg(feature = "otel")]
pub use instruments::*;

/// Count a message handed to a dispatcher bound to `subject`.
pub fn record_dispatch(subject: &str) {
    trace!(target: TARGET, metric = DISPATCH_TOTAL, subject, "Recorded");
    #[cfg(feature = "otel")]
    DISPATCH_COUNTER.add(1, &[subject_attr(subject)]);
}

/// Count a redelivery of a message received on `subject`.
pub fn record_redelivery(subject: &str) {
    trace!(target: TARGET, metric = REDELIVERY_TOTAL, subject, "Recorded");
    #[cfg(feature = "otel")]
    REDELIVERY_COUNTER.add(1, &[subject_attr(subject)]);
}

/// Count an error reply to a request received on `request_subject`.
pub fn record_error_reply(request_subject: &str, status_code: u16) {
    trace!(
        target: TARGET,
        metric = ERROR_REPLY_TOTAL,
        subject = request_subject,
        status_code,
        "Recorded"
    );
    #[cfg(feature = "otel")]
    ERROR_REPLY_COUNTER.add(
        1,
        &[subject_attr(request_subject), status_code_attr(status_code)],
    );
}

/// Count a dead letter for a message received on `subject`.
pub fn record_dead_letter(subject: &str) {
    trace!(target: TARGET, metric = DLQ_PUBLISH_TOTAL, subject, "Recorded");
    #[cfg(feature = "otel")]
    DLQ_PUBLISH_COUNTER.add(1, &[subject_attr(subject)]);
}

// ============================================================================
// Measurement log
// ============================================================================

/// One recorded increment: the metric name and its attributes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Measurement {
    pub metric: String,
    pub attributes: BTreeMap<String, String>,
}

/// Tracing layer keeping every measurement emitted on [`TARGET`].
///
/// ```ignore
/// let log = MeasurementLog::default();
/// let _guard = tracing::subscriber::set_default(tracing_subscriber::registry().with(log.clone()));
/// ```
#[derive(Debug, Clone, Default)]
pub struct MeasurementLog {
    entries: Arc<Mutex<Vec<Measurement>>>,
}

impl MeasurementLog {
    pub fn measurements(&self) -> Vec<Measurement> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Increments of `metric` whose attributes include every pair in `attributes`.
    pub fn count(&self, metric: &str, attributes: &[(&str, &str)]) -> usize {
        self.measurements()
            .iter()
            .filter(|m| m.metric == metric)
            .filter(|m| {
                attributes
                    .iter()
                    .all(|(key, value)| m.attributes.get(*key).map(String::as_str) == Some(*value))
            })
            .count()
    }

    /// Distinct attribute sets recorded for `metric`.
    pub fn attribute_sets(&self, metric: &str) -> BTreeSet<BTreeMap<String, String>> {
        self.measurements()
            .into_iter()
            .filter(|m| m.metric == metric)
            .map(|m| m.attributes)
            .collect()
    }
}

impl<S: Subscriber> Layer<S> for MeasurementLog {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if event.metadata().target() != TARGET {
            return;
        }

        let mut visitor = MeasurementVisitor::default();
        event.record(&mut visitor);

        if let (Some(metric), Ok(mut entries)) = (visitor.metric, self.entries.lock()) {
            entries.push(Measurement {
                metric,
                attributes: visitor.attributes,
            });
        }
    }
}

#[derive(Default)]
struct MeasurementVisitor {
    metric: Option<String>,
    attributes: BTreeMap<String, String>,
}

impl MeasurementVisitor {
    fn insert(&mut self, field: &Field, value: String) {
        match field.name() {
            "metric" => self.metric = Some(value),
            "message" => {}
            name => {
                self.attributes.insert(name.to_string(), value);
            }
        }
    }
}

impl Visit for MeasurementVisitor {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.insert(field, value.to_string());
    }

    fn record_u64(&mut self, field: &Field, value: u64) {
        self.insert(field, value.to_string());
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.insert(field, value.to_string());
    }

    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.insert(field, format!("{:?}", value));
    }
}
