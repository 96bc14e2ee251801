//! Wire envelopes for request and response bodies.
//!
//! - Request: `{"data": <T>}`
//! - Success response: `{"status_code": 200, "data": <T>}`
//! - Error response: `{"status_code": 422|500, "data": {"detail": "<message>"}}`
//!
//! Status codes borrow the HTTP vocabulary; no HTTP transport is involved.

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Success.
pub const STATUS_OK: u16 = 200;
/// Validation or integrity failure.
pub const STATUS_UNPROCESSABLE: u16 = 422;
/// Unexpected failure.
pub const STATUS_INTERNAL: u16 = 500;

/// Detail sent when a request body does not match the handler's payload type.
pub const INVALID_REQUEST_DETAIL: &str = "Invalid request data";

/// Errors produced while encoding or decoding envelopes.
#[derive(Debug, thiserror::Error)]
pub enum EnvelopeError {
    #[error("Failed to decode request: {0}")]
    Decode(#[source] serde_json::Error),

    #[error("Failed to encode response: {0}")]
    Encode(#[source] serde_json::Error),
}

/// Inbound request body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request<T> {
    pub data: T,
}

impl<T: Serialize> Request<T> {
    pub fn new(data: T) -> Self {
        Self { data }
    }

    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(EnvelopeError::Encode)
    }
}

/// Error payload carried by non-200 responses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub detail: String,
}

/// Outbound response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response<T> {
    pub status_code: u16,
    pub data: T,
}

impl<T> Response<T> {
    pub fn ok(data: T) -> Self {
        Self {
            status_code: STATUS_OK,
            data,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status_code == STATUS_OK
    }
}

impl<T: Serialize> Response<T> {
    pub fn encode(&self) -> Result<Bytes, EnvelopeError> {
        serde_json::to_vec(self)
            .map(Bytes::from)
            .map_err(EnvelopeError::Encode)
    }
}

impl Response<ErrorDetail> {
    pub fn error(status_code: u16, detail: impl Into<String>) -> Self {
        Self {
            status_code,
            data: ErrorDetail {
                detail: detail.into(),
            },
        }
    }

    pub fn unprocessable(detail: impl Into<String>) -> Self {
        Self::error(STATUS_UNPROCESSABLE, detail)
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        Self::error(STATUS_INTERNAL, detail)
    }
}

/// Decode a `{"data": T}` body and return the inner payload.
///
/// Any failure (invalid UTF-8, malformed JSON, missing `data`, type mismatch)
/// is reported as [`EnvelopeError::Decode`].
pub fn decode_request<T: DeserializeOwned>(body: &[u8]) -> Result<T, EnvelopeError> {
    serde_json::from_slice::<Request<T>>(body)
        .map(|request| request.data)
        .map_err(EnvelopeError::Decode)
}

/// Decode a response body of known payload type.
pub fn decode_response<T: DeserializeOwned>(body: &[u8]) -> Result<Response<T>, EnvelopeError> {
    serde_json::from_slice(body).map_err(EnvelopeError::Decode)
}
