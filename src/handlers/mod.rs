//! Request handlers for one form.
//!
//! - [`GetScheme`]: reply with the form on `scheme.<correlation_id>`
//! - [`ListEntities`]: reply with every stored entity on `data.<correlation_id>`
//! - [`CreateEntity`]: persist a new entity; only failures are answered,
//!   on `data.<form>.<correlation_id>`

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::bus::MessageBus;
use crate::dispatch::{self, HandlerError, HandlerResult, Json, NoPayload, RequestHandler};
use crate::entities::FormEntity;
use crate::envelope::{EnvelopeError, Response};
use crate::schema::Form;
use crate::storage::{EntityStore, StorageError};
use crate::subject;

/// Encode the schema reply once; every schema request gets these bytes.
pub fn encode_scheme(form: &Form) -> Result<Bytes, EnvelopeError> {
    Response::ok(form).encode()
}

// ============================================================================
// Schema
// ============================================================================

/// Replies with the process-wide form.
pub struct GetScheme {
    name: &'static str,
    bus: Arc<dyn MessageBus>,
    reply: Bytes,
}

impl GetScheme {
    /// Handler bound to `scheme`.
    pub fn generic(bus: Arc<dyn MessageBus>, reply: Bytes) -> Self {
        Self {
            name: "get_scheme",
            bus,
            reply,
        }
    }

    /// Handler bound to `scheme.<form>`.
    pub fn by_name(bus: Arc<dyn MessageBus>, reply: Bytes) -> Self {
        Self {
            name: "get_scheme_by_name",
            bus,
            reply,
        }
    }
}

#[async_trait]
impl RequestHandler for GetScheme {
    type Payload = NoPayload;

    fn name(&self) -> &'static str {
        self.name
    }

    async fn handle(&self, correlation_id: &str, _payload: NoPayload) -> HandlerResult {
        let reply_subject = subject::scheme_reply(correlation_id);
        self.bus.publish(&reply_subject, self.reply.clone()).await?;
        debug!(subject = %reply_subject, "Sent scheme");
        Ok(())
    }
}

// ============================================================================
// List
// ============================================================================

/// Replies with every stored entity, in store order.
pub struct ListEntities<E: FormEntity> {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn EntityStore<E>>,
}

impl<E: FormEntity> ListEntities<E> {
    pub fn new(bus: Arc<dyn MessageBus>, store: Arc<dyn EntityStore<E>>) -> Self {
        Self { bus, store }
    }
}

#[async_trait]
impl<E: FormEntity> RequestHandler for ListEntities<E> {
    type Payload = NoPayload;

    fn name(&self) -> &'static str {
        "list_entities"
    }

    async fn handle(&self, correlation_id: &str, _payload: NoPayload) -> HandlerResult {
        let entities = self.store.list_all().await?;
        let count = entities.len();
        let body = Response::ok(entities).encode()?;

        let reply_subject = subject::data_reply(correlation_id);
        self.bus.publish(&reply_subject, body).await?;
        debug!(subject = %reply_subject, count, "Sent entities");
        Ok(())
    }
}

// ============================================================================
// Create
// ============================================================================

type IdGenerator = Arc<dyn Fn() -> Uuid + Send + Sync>;

/// Persists a new entity under a freshly generated id.
///
/// Success is silent. Integrity violations are returned as
/// [`HandlerError::Integrity`] for the dispatcher to answer with a 422. Any
/// other storage failure is answered here with a 500 and the request counts
/// as handled; only a failed reply publish is reported to the dispatcher.
pub struct CreateEntity<E: FormEntity> {
    bus: Arc<dyn MessageBus>,
    store: Arc<dyn EntityStore<E>>,
    form_name: String,
    request_subject: String,
    next_id: IdGenerator,
}

impl<E: FormEntity> CreateEntity<E> {
    pub fn new(bus: Arc<dyn MessageBus>, store: Arc<dyn EntityStore<E>>, form_name: &str) -> Self {
        Self {
            bus,
            store,
            form_name: form_name.to_string(),
            request_subject: subject::data_create(form_name),
            next_id: Arc::new(Uuid::new_v4),
        }
    }

    /// Replace the id source.
    pub fn with_id_generator(
        mut self,
        next_id: impl Fn() -> Uuid + Send + Sync + 'static,
    ) -> Self {
        self.next_id = Arc::new(next_id);
        self
    }
}

#[async_trait]
impl<E: FormEntity> RequestHandler for CreateEntity<E> {
    type Payload = Json<E::Create>;

    fn name(&self) -> &'static str {
        "create_entity"
    }

    async fn handle(&self, correlation_id: &str, payload: Json<E::Create>) -> HandlerResult {
        let entity = E::from_create((self.next_id)(), payload.into_inner());
        let id = entity.id();
        let label = entity.label().to_string();

        match self.store.create(entity).await {
            Ok(()) => {
                info!(id = %id, label = %label, "Added new data");
                Ok(())
            }
            Err(StorageError::Integrity(detail)) => Err(HandlerError::Integrity(detail)),
            Err(e) => {
                error!(correlation_id = %correlation_id, id = %id, error = %e, "Create failed");
                dispatch::send_error_reply(
                    self.bus.as_ref(),
                    &self.form_name,
                    &self.request_subject,
                    correlation_id,
                    &Response::internal(e.to_string()),
                )
                .await
            }
        }
    }
}
