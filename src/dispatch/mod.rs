//! Request dispatch.
//!
//! Adapts a typed [`RequestHandler`] into a [`MessageHandler`] the bus can
//! drive. The payload contract of each handler is its associated
//! [`Payload`] type, fixed at compile time, so binding a handler to a
//! subject never inspects anything at runtime.
//!
//! Per message:
//! 1. Extract the correlation id from the `req_id` header. Messages without
//!    one are acknowledged and dropped: there is no reply subject to use.
//! 2. Decode the body as the handler's payload type. Failure is a
//!    [`HandlerError::Validation`], answered with a 422 `Invalid request data`
//!    reply on `data.<form>.<correlation_id>`.
//! 3. Invoke the handler. Success replies are the handler's job.
//! 4. Map the outcome to an acknowledgment:
//!
//! | Outcome | Reply | Disposition |
//! |---|---|---|
//! | success | by handler | ack |
//! | validation / integrity | 422 | ack (nak if the reply fails) |
//! | unexpected, deliveries left | none | nak |
//! | unexpected, last delivery | dead letter | term (nak if the DLQ fails) |

use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn, Instrument};

use crate::bus::{BusError, Disposition, InboundMessage, MessageBus, MessageHandler};
use crate::dlq::{DeadLetter, DeadLetterPublisher};
use crate::envelope::{self, EnvelopeError, ErrorDetail, Response};
use crate::metrics;
use crate::storage::StorageError;
use crate::subject;

/// Errors a request handler can report.
///
/// The variant decides the reply shape and the acknowledgment.
#[derive(Debug, thiserror::Error)]
pub enum HandlerError {
    /// The request body did not decode as the handler's payload type.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// The store rejected a write on a data constraint; the detail is sent to
    /// the caller.
    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),

    #[error("Bus error: {0}")]
    Bus(#[from] BusError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),
}

impl HandlerError {
    /// Whether the failure is answered with a 422 reply instead of redelivery.
    pub fn is_unprocessable(&self) -> bool {
        matches!(
            self,
            HandlerError::Validation(_)
                | HandlerError::Integrity(_)
                | HandlerError::Storage(StorageError::Integrity(_))
        )
    }

    /// Detail string for the error reply.
    pub fn detail(&self) -> String {
        match self {
            HandlerError::Validation(_) => envelope::INVALID_REQUEST_DETAIL.to_string(),
            HandlerError::Integrity(detail) => detail.clone(),
            HandlerError::Storage(StorageError::Integrity(detail)) => detail.clone(),
            other => other.to_string(),
        }
    }
}

impl From<EnvelopeError> for HandlerError {
    fn from(err: EnvelopeError) -> Self {
        HandlerError::Unexpected(err.to_string())
    }
}

/// Result type for handler invocations.
pub type HandlerResult = std::result::Result<(), HandlerError>;

/// Publish an error reply on `data.<form>.<correlation_id>`.
///
/// The reply is counted against `request_subject`, the subject the request
/// arrived on, never against the reply subject.
pub async fn send_error_reply(
    bus: &dyn MessageBus,
    form_name: &str,
    request_subject: &str,
    correlation_id: &str,
    response: &Response<ErrorDetail>,
) -> HandlerResult {
    let reply_subject = subject::error_reply(form_name, correlation_id);
    bus.publish(&reply_subject, response.encode()?).await?;
    metrics::record_error_reply(request_subject, response.status_code);
    debug!(subject = %reply_subject, status_code = response.status_code, "Sent error reply");
    Ok(())
}

// ============================================================================
// Payload contract
// ============================================================================

/// How a handler's input is decoded from a request body.
pub trait Payload: Sized + Send + 'static {
    fn decode(body: &[u8]) -> Result<Self, EnvelopeError>;
}

/// The handler takes only the correlation id; the body is ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NoPayload;

impl Payload for NoPayload {
    fn decode(_body: &[u8]) -> Result<Self, EnvelopeError> {
        Ok(NoPayload)
    }
}

/// The handler takes a `{"data": T}` request body.
#[derive(Debug, Clone, PartialEq)]
pub struct Json<T>(pub T);

impl<T> Json<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T: DeserializeOwned + Send + 'static> Payload for Json<T> {
    fn decode(body: &[u8]) -> Result<Self, EnvelopeError> {
        envelope::decode_request(body).map(Json)
    }
}

/// A typed request handler.
#[async_trait]
pub trait RequestHandler: Send + Sync + 'static {
    /// Input decoded from the request body before the handler runs.
    type Payload: Payload;

    /// Stable name used in logs and dead letters.
    fn name(&self) -> &'static str;

    async fn handle(&self, correlation_id: &str, payload: Self::Payload) -> HandlerResult;
}

// ============================================================================
// Redelivery policy
// ============================================================================

/// Delivery budget for messages whose handler fails unexpectedly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RedeliveryPolicy {
    pub max_deliver: u64,
}

impl RedeliveryPolicy {
    pub fn new(max_deliver: u64) -> Self {
        Self {
            max_deliver: max_deliver.max(1),
        }
    }

    /// Whether the broker will not deliver the message again after this attempt.
    pub fn is_final(&self, delivery_count: u64) -> bool {
        delivery_count >= self.max_deliver
    }
}

impl Default for RedeliveryPolicy {
    fn default() -> Self {
        Self::new(5)
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Outcome of dispatching one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    Handled,
    /// No usable correlation id.
    Dropped,
    /// A 422 reply was published.
    Rejected,
    /// A 422 reply could not be published.
    ReplyFailed,
    /// Unexpected failure with deliveries left.
    Retry,
    DeadLettered,
    /// Unexpected failure on the last delivery and the DLQ publish failed.
    DeadLetterFailed,
}

impl DispatchOutcome {
    pub fn disposition(&self) -> Disposition {
        match self {
            Self::Handled | Self::Dropped | Self::Rejected => Disposition::Ack,
            Self::ReplyFailed | Self::Retry | Self::DeadLetterFailed => Disposition::Nak,
            Self::DeadLettered => Disposition::Term,
        }
    }
}

/// Drives one [`RequestHandler`] from bus messages.
pub struct Dispatcher<H> {
    handler: Arc<H>,
    bus: Arc<dyn MessageBus>,
    form_name: Arc<str>,
    policy: RedeliveryPolicy,
    dead_letters: Arc<dyn DeadLetterPublisher>,
}

impl<H> Clone for Dispatcher<H> {
    fn clone(&self) -> Self {
        Self {
            handler: Arc::clone(&self.handler),
            bus: Arc::clone(&self.bus),
            form_name: Arc::clone(&self.form_name),
            policy: self.policy,
            dead_letters: Arc::clone(&self.dead_letters),
        }
    }
}

impl<H: RequestHandler> Dispatcher<H> {
    pub fn new(
        handler: Arc<H>,
        bus: Arc<dyn MessageBus>,
        form_name: &str,
        policy: RedeliveryPolicy,
        dead_letters: Arc<dyn DeadLetterPublisher>,
    ) -> Self {
        Self {
            handler,
            bus,
            form_name: Arc::from(form_name),
            policy,
            dead_letters,
        }
    }

    /// Run the per-message algorithm and report what happened.
    pub async fn dispatch(&self, message: InboundMessage) -> DispatchOutcome {
        metrics::record_dispatch(&message.subject);

        if message.is_redelivery() {
            metrics::record_redelivery(&message.subject);
            warn!(
                subject = %message.subject,
                delivery_count = message.delivery_count,
                "Redelivered message"
            );
        }

        let correlation_id = match message.correlation_id() {
            Some(id) if subject::is_valid_token(id) => id.to_string(),
            other => {
                warn!(
                    subject = %message.subject,
                    correlation_id = ?other,
                    "Message without usable correlation id, dropping"
                );
                return DispatchOutcome::Dropped;
            }
        };

        debug!(subject = %message.subject, correlation_id = %correlation_id, "Received request");

        let result = match H::Payload::decode(&message.payload) {
            Ok(payload) => self.handler.handle(&correlation_id, payload).await,
            Err(e) => Err(HandlerError::Validation(e.to_string())),
        };

        match result {
            Ok(()) => DispatchOutcome::Handled,
            Err(e) if e.is_unprocessable() => {
                error!(
                    subject = %message.subject,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Request rejected"
                );
                self.reply_unprocessable(&message.subject, &correlation_id, &e)
                    .await
            }
            Err(e) => self.on_unexpected(&message, e).await,
        }
    }

    async fn reply_unprocessable(
        &self,
        request_subject: &str,
        correlation_id: &str,
        err: &HandlerError,
    ) -> DispatchOutcome {
        let response = Response::unprocessable(err.detail());
        match send_error_reply(
            self.bus.as_ref(),
            &self.form_name,
            request_subject,
            correlation_id,
            &response,
        )
        .await
        {
            Ok(()) => DispatchOutcome::Rejected,
            Err(e) => {
                error!(
                    subject = %request_subject,
                    correlation_id = %correlation_id,
                    error = %e,
                    "Failed to send error reply"
                );
                DispatchOutcome::ReplyFailed
            }
        }
    }

    async fn on_unexpected(&self, message: &InboundMessage, err: HandlerError) -> DispatchOutcome {
        if !self.policy.is_final(message.delivery_count) {
            error!(
                subject = %message.subject,
                handler = self.handler.name(),
                delivery_count = message.delivery_count,
                max_deliver = self.policy.max_deliver,
                error = %err,
                "Handler failed, requesting redelivery"
            );
            return DispatchOutcome::Retry;
        }

        error!(
            subject = %message.subject,
            handler = self.handler.name(),
            delivery_count = message.delivery_count,
            error = %err,
            "Handler failed on last delivery"
        );

        let dead_letter = DeadLetter::from_message(message, self.handler.name(), err.to_string());
        match self.dead_letters.publish(dead_letter).await {
            Ok(()) => DispatchOutcome::DeadLettered,
            Err(e) => {
                error!(subject = %message.subject, error = %e, "Failed to publish dead letter");
                DispatchOutcome::DeadLetterFailed
            }
        }
    }
}

impl<H: RequestHandler> MessageHandler for Dispatcher<H> {
    fn handle(&self, message: InboundMessage) -> BoxFuture<'static, Disposition> {
        let dispatcher = self.clone();
        let span = tracing::info_span!(
            "dispatch",
            subject = %message.subject,
            handler = self.handler.name(),
        );

        Box::pin(
            async move { dispatcher.dispatch(message).await.disposition() }.instrument(span),
        )
    }
}
