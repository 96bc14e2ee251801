//! Stream declaration and subject bindings for one form.
//!
//! ```text
//! subject                 durable                         handler
//! scheme.<form>           form_data_<form>_s_scheme       get_scheme_by_name
//! scheme                  form_data_<form>_scheme         get_scheme
//! data.<form>             form_data_<form>_all            list_entities
//! data.<form>.create      form_data_<form>_create         create_entity
//! ```
//!
//! Setup is all-or-nothing: the first failed declaration aborts it and the
//! process is expected to exit rather than serve a partial table.

use std::sync::Arc;

use tracing::{error, info};

use crate::bus::{BusError, ConsumerSpec, MessageBus, MessageHandler, StreamSpec};
use crate::dispatch::{Dispatcher, RedeliveryPolicy, RequestHandler};
use crate::dlq::{BusDeadLetterPublisher, DeadLetterPublisher};
use crate::entities::FormEntity;
use crate::envelope::EnvelopeError;
use crate::handlers::{encode_scheme, CreateEntity, GetScheme, ListEntities};
use crate::schema::Form;
use crate::storage::EntityStore;
use crate::subject;

/// Errors raised while setting up routes.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("Failed to declare stream '{stream}': {source}")]
    Stream {
        stream: String,
        #[source]
        source: BusError,
    },

    #[error("Failed to bind '{subject}' to '{durable}': {source}")]
    Subscribe {
        subject: String,
        durable: String,
        #[source]
        source: BusError,
    },

    #[error("Failed to encode scheme: {0}")]
    Scheme(#[from] EnvelopeError),
}

pub type Result<T> = std::result::Result<T, RouterError>;

/// One row of the dispatch table.
pub struct Binding {
    pub consumer: ConsumerSpec,
    pub handler_name: &'static str,
    pub handler: Arc<dyn MessageHandler>,
}

/// Routes the subjects of one form to its handlers.
pub struct MessageRouter<E: FormEntity> {
    bus: Arc<dyn MessageBus>,
    form: Arc<Form>,
    store: Arc<dyn EntityStore<E>>,
    policy: RedeliveryPolicy,
    dead_letters: Arc<dyn DeadLetterPublisher>,
}

impl<E: FormEntity> MessageRouter<E> {
    pub fn new(
        bus: Arc<dyn MessageBus>,
        form: Arc<Form>,
        store: Arc<dyn EntityStore<E>>,
        policy: RedeliveryPolicy,
    ) -> Self {
        let dead_letters = Arc::new(BusDeadLetterPublisher::new(Arc::clone(&bus)));
        Self {
            bus,
            form,
            store,
            policy,
            dead_letters,
        }
    }

    /// Replace the dead-letter publisher.
    pub fn with_dead_letter_publisher(
        mut self,
        dead_letters: Arc<dyn DeadLetterPublisher>,
    ) -> Self {
        self.dead_letters = dead_letters;
        self
    }

    pub fn form(&self) -> &Arc<Form> {
        &self.form
    }

    /// Streams this form needs.
    pub fn streams(&self) -> Vec<StreamSpec> {
        vec![
            StreamSpec::new(
                subject::SCHEME_STREAM,
                subject::stream_subjects(subject::SCHEME_BASE),
            ),
            StreamSpec::new(
                subject::DATA_STREAM,
                subject::stream_subjects(subject::DATA_BASE),
            ),
            StreamSpec::new(
                subject::DEAD_LETTER_STREAM,
                vec![format!("{}.>", subject::DLQ_BASE)],
            ),
        ]
    }

    /// The dispatch table, built once.
    pub fn bindings(&self) -> Result<Vec<Binding>> {
        let form_name = self.form.name.as_str();
        let scheme = encode_scheme(&self.form)?;

        Ok(vec![
            self.bind(
                subject::SCHEME_STREAM,
                subject::scheme_by_name(form_name),
                subject::durable_scheme_by_name(form_name),
                GetScheme::by_name(Arc::clone(&self.bus), scheme.clone()),
            ),
            self.bind(
                subject::SCHEME_STREAM,
                subject::scheme(),
                subject::durable_scheme(form_name),
                GetScheme::generic(Arc::clone(&self.bus), scheme),
            ),
            self.bind(
                subject::DATA_STREAM,
                subject::data_list(form_name),
                subject::durable_list(form_name),
                ListEntities::new(Arc::clone(&self.bus), Arc::clone(&self.store)),
            ),
            self.bind(
                subject::DATA_STREAM,
                subject::data_create(form_name),
                subject::durable_create(form_name),
                CreateEntity::new(Arc::clone(&self.bus), Arc::clone(&self.store), form_name),
            ),
        ])
    }

    fn bind<H: RequestHandler>(
        &self,
        stream: &str,
        filter_subject: String,
        durable: String,
        handler: H,
    ) -> Binding {
        let handler_name = handler.name();
        let dispatcher = Dispatcher::new(
            Arc::new(handler),
            Arc::clone(&self.bus),
            &self.form.name,
            self.policy,
            Arc::clone(&self.dead_letters),
        );

        Binding {
            consumer: ConsumerSpec {
                stream: stream.to_string(),
                durable,
                filter_subject,
                max_deliver: self.policy.max_deliver,
            },
            handler_name,
            handler: Arc::new(dispatcher),
        }
    }

    /// Declare every stream, then bind every subject.
    pub async fn setup_routes(&self) -> Result<()> {
        for stream in self.streams() {
            self.bus.ensure_stream(&stream).await.map_err(|source| {
                error!(stream = %stream.name, error = %source, "Stream declaration failed");
                RouterError::Stream {
                    stream: stream.name.clone(),
                    source,
                }
            })?;
            info!(stream = %stream.name, subjects = ?stream.subjects, "Stream ready");
        }

        for binding in self.bindings()? {
            let consumer = &binding.consumer;
            self.bus
                .subscribe(consumer, binding.handler)
                .await
                .map_err(|source| {
                    error!(
                        subject = %consumer.filter_subject,
                        durable = %consumer.durable,
                        error = %source,
                        "Subscription failed"
                    );
                    RouterError::Subscribe {
                        subject: consumer.filter_subject.clone(),
                        durable: consumer.durable.clone(),
                        source,
                    }
                })?;
            info!(
                subject = %consumer.filter_subject,
                durable = %consumer.durable,
                handler = binding.handler_name,
                "Route bound"
            );
        }

        info!(form = %self.form.name, "Routes set up");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::ChannelMessageBus;
    use crate::config::FormConfig;
    use crate::entities::{form_for, Prison};
    use crate::storage::MemoryStore;

    fn router(bus: &ChannelMessageBus) -> MessageRouter<Prison> {
        MessageRouter::new(
            Arc::new(bus.clone()),
            Arc::new(form_for::<Prison>(&FormConfig::default())),
            Arc::new(MemoryStore::<Prison>::new()),
            RedeliveryPolicy::new(3),
        )
    }

    #[test]
    fn test_binding_table() {
        let bus = ChannelMessageBus::new();
        let bindings = router(&bus).bindings().unwrap();

        let rows: Vec<(&str, &str, &str, &str)> = bindings
            .iter()
            .map(|b| {
                (
                    b.consumer.stream.as_str(),
                    b.consumer.filter_subject.as_str(),
                    b.consumer.durable.as_str(),
                    b.handler_name,
                )
            })
            .collect();

        assert_eq!(
            rows,
            vec![
                (
                    "form_scheme_stream",
                    "scheme.prisons",
                    "form_data_prisons_s_scheme",
                    "get_scheme_by_name"
                ),
                (
                    "form_scheme_stream",
                    "scheme",
                    "form_data_prisons_scheme",
                    "get_scheme"
                ),
                (
                    "form_data_stream",
                    "data.prisons",
                    "form_data_prisons_all",
                    "list_entities"
                ),
                (
                    "form_data_stream",
                    "data.prisons.create",
                    "form_data_prisons_create",
                    "create_entity"
                ),
            ]
        );
        assert!(bindings.iter().all(|b| b.consumer.max_deliver == 3));
    }

    #[test]
    fn test_streams_cover_every_bound_subject() {
        let bus = ChannelMessageBus::new();
        let router = router(&bus);
        let streams = router.streams();

        for binding in router.bindings().unwrap() {
            let stream = streams
                .iter()
                .find(|s| s.name == binding.consumer.stream)
                .unwrap();
            assert!(stream
                .subjects
                .iter()
                .any(|p| subject::matches(&binding.consumer.filter_subject, p)));
        }

        let dlq = streams
            .iter()
            .find(|s| s.name == "form_dead_letter_stream")
            .unwrap();
        assert!(subject::matches("dlq.data.prisons.create", &dlq.subjects[0]));
    }

    #[tokio::test]
    async fn test_setup_routes_is_idempotent_per_bus() {
        let bus = ChannelMessageBus::new();
        router(&bus).setup_routes().await.unwrap();

        // A second instance joins the same durable groups.
        router(&bus).setup_routes().await.unwrap();
    }

    #[tokio::test]
    async fn test_setup_routes_fails_on_stream_conflict() {
        let bus = ChannelMessageBus::new();
        bus.ensure_stream(&StreamSpec::new("other", vec!["data.>".to_string()]))
            .await
            .unwrap();

        let result = router(&bus).setup_routes().await;

        assert!(matches!(
            result,
            Err(RouterError::Stream { ref stream, .. }) if stream == "form_data_stream"
        ));
    }
}
