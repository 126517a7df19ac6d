// persona-server/src/error.rs
// ============================================================================
// Module: Persona HTTP Errors
// Description: Error envelope and status mapping for the HTTP surface.
// Purpose: Render service errors as stable client-facing responses.
// Dependencies: persona-core, axum, serde
// ============================================================================

//! ## Overview
//! Every failed request returns the envelope `{error_code, error_message,
//! error_description, traceId}`. Client faults map to 4xx, storage and
//! internal faults to 5xx, and lock contention to 503 once the retry policy
//! is exhausted. The trace identifier is generated per request by the
//! middleware in `crate::trace`.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use persona_core::ServiceError;
use serde::Serialize;

use crate::trace::TraceId;

// ============================================================================
// SECTION: Error Envelope
// ============================================================================

/// Client-facing error envelope.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorEnvelope {
    /// Stable error code.
    pub error_code: String,
    /// Short error label.
    pub error_message: String,
    /// Human-readable description.
    pub error_description: String,
    /// Request trace identifier.
    #[serde(rename = "traceId")]
    pub trace_id: String,
}

/// Service error bound to a request trace.
#[derive(Debug)]
pub struct ApiError {
    /// Underlying service error.
    error: ServiceError,
    /// Request trace identifier.
    trace_id: TraceId,
}

impl ApiError {
    /// Binds a service error to the request trace.
    #[must_use]
    pub const fn new(error: ServiceError, trace_id: TraceId) -> Self {
        Self { error, trace_id }
    }

    /// HTTP status for the underlying error kind.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match &self.error {
            ServiceError::InvalidEvent(_) | ServiceError::InvalidRule(_) => StatusCode::BAD_REQUEST,
            ServiceError::Auth(_) => StatusCode::UNAUTHORIZED,
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::LockContention(_) => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Store(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Renders the envelope body.
    #[must_use]
    pub fn envelope(&self) -> ErrorEnvelope {
        ErrorEnvelope {
            error_code: self.error.error_code().to_string(),
            error_message: self.error.error_message().to_string(),
            error_description: self.error.to_string(),
            trace_id: self.trace_id.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self.envelope())).into_response()
    }
}
