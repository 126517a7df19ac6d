// persona-server/src/trace.rs
// ============================================================================
// Module: Persona Request Tracing
// Description: Per-request trace identifiers.
// Purpose: Attach a trace id to every request for the error envelope and audit.
// Dependencies: axum, uuid
// ============================================================================

//! ## Overview
//! The trace middleware generates a trace identifier for each request,
//! exposes it to handlers through request extensions, and echoes it back in
//! the `x-trace-id` response header.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;

use axum::extract::Request;
use axum::http::HeaderValue;
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

// ============================================================================
// SECTION: Trace Id
// ============================================================================

/// Response header carrying the trace identifier.
pub const TRACE_HEADER: &str = "x-trace-id";

/// Per-request trace identifier.
#[derive(Debug, Clone)]
pub struct TraceId(String);

impl TraceId {
    /// Generates a fresh trace identifier.
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Generates a trace id, stores it in request extensions, and echoes it in
/// the response header.
pub async fn trace_middleware(mut request: Request, next: Next) -> Response {
    let trace_id = TraceId::generate();
    request.extensions_mut().insert(trace_id.clone());
    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(trace_id.as_str()) {
        response.headers_mut().insert(TRACE_HEADER, value);
    }
    response
}
