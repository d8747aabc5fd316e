//! Error types for hmp-ig
//!
//! Engine-side failures (`IngestError`) are local to a single loop iteration
//! and never abort ingestion; HTTP-side failures (`ApiError`) map to status
//! codes on the inbound transport.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use hmp_common::record::SourceKind;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::router::SendError;

/// Failures inside one engine iteration
#[derive(Debug, Error)]
pub enum IngestError {
    /// Record failed validation (unknown source included); dropped
    #[error("malformed record: {0}")]
    MalformedRecord(String),

    /// No buffered session for this correlation id
    #[error("no buffered session for {0}")]
    UnknownSession(Uuid),

    /// Extraction attempted without a mandatory slot filled
    #[error("session {uuid} extracted without a {missing} record")]
    MissingSlot { uuid: Uuid, missing: SourceKind },

    /// Second record for an already-filled slot under the reject policy
    #[error("duplicate {kind} record for session {uuid}")]
    DuplicateRecord { uuid: Uuid, kind: SourceKind },

    /// Missing-sample count at or above the drop threshold
    #[error("session {uuid} has {missing} missing samples (threshold {threshold})")]
    ExcessiveMissingData {
        uuid: Uuid,
        missing: usize,
        threshold: usize,
    },

    /// Partial session evicted after exceeding its TTL
    #[error("session {0} expired before completion")]
    ExpiredSession(Uuid),

    /// Downstream send failed; the session is lost for this attempt
    #[error("session {uuid} not delivered: {source}")]
    Send {
        uuid: Uuid,
        #[source]
        source: SendError,
    },

    /// Inbound channel closed; terminates the run loop
    #[error("inbound channel closed")]
    ChannelClosed,
}

/// API error type for the inbound transport
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Service cannot accept the message right now (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
