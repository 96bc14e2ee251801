//! formbus - request/reply over persistent streams for schema-described forms
//!
//! Exposes one form (a named, ordered field list) and its entities over a
//! message broker. Requests carry a correlation id in the `req_id` header;
//! replies are published on subjects ending in that id so each requester can
//! listen for its own answer.
//!
//! - [`router`] declares the streams and binds subjects to handlers
//! - [`dispatch`] decodes requests, runs handlers and decides acknowledgment
//! - [`handlers`] implement schema read, list and create
//! - [`bus`] abstracts the broker (NATS JetStream or in-process)
//! - [`storage`] persists entities (SQLite or in-memory)

pub mod bus;
pub mod config;
pub mod dispatch;
pub mod dlq;
pub mod entities;
pub mod envelope;
pub mod handlers;
pub mod http;
pub mod metrics;
pub mod router;
pub mod schema;
pub mod storage;
pub mod subject;
pub mod utils;
