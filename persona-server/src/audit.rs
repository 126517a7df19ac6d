// persona-server/src/audit.rs
// ============================================================================
// Module: Persona Request Audit
// Description: Structured audit events for HTTP request handling.
// Purpose: Emit request logs without hard logging-framework dependencies.
// Dependencies: persona-core, axum, serde
// ============================================================================

//! ## Overview
//! This module defines the request audit payload and sinks. It is
//! intentionally lightweight so deployments can route events to their
//! preferred logging pipeline. The pipeline workers reuse the core audit
//! sink; this one covers the synchronous HTTP surface.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::Request;
use axum::extract::State;
use axum::middleware::Next;
use axum::response::Response;
use persona_core::Timestamp;
use serde::Serialize;

use crate::trace::TraceId;

// ============================================================================
// SECTION: Types
// ============================================================================

/// HTTP request audit payload.
#[derive(Debug, Clone, Serialize)]
pub struct RequestAuditEvent {
    /// Event label.
    pub event: &'static str,
    /// Event timestamp in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Request trace identifier.
    pub trace_id: Option<String>,
    /// Request method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Response status code.
    pub status: u16,
    /// Handling duration in milliseconds.
    pub elapsed_ms: u128,
}

/// Audit sink for request events.
pub trait RequestAuditSink: Send + Sync {
    /// Records one audit event. Sinks must not fail the request.
    fn record(&self, event: &RequestAuditEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRequestAudit;

impl RequestAuditSink for NoopRequestAudit {
    fn record(&self, _event: &RequestAuditEvent) {}
}

/// Sink that writes JSON lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrRequestAudit;

impl RequestAuditSink for StderrRequestAudit {
    fn record(&self, event: &RequestAuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}

// ============================================================================
// SECTION: Middleware
// ============================================================================

/// Records one audit line per handled request.
pub async fn audit_middleware(
    State(sink): State<Arc<dyn RequestAuditSink>>,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().to_string();
    let path = request.uri().path().to_string();
    let trace_id = request.extensions().get::<TraceId>().map(|trace| trace.to_string());
    let started = Instant::now();
    let response = next.run(request).await;
    sink.record(&RequestAuditEvent {
        event: "http_request",
        timestamp_ms: Timestamp::now_millis(),
        trace_id,
        method,
        path,
        status: response.status().as_u16(),
        elapsed_ms: started.elapsed().as_millis(),
    });
    response
}
