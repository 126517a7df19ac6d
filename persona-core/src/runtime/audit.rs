// persona-core/src/runtime/audit.rs
// ============================================================================
// Module: Persona Pipeline Audit
// Description: Structured audit events for async pipeline processing.
// Purpose: Surface per-event worker outcomes without a hard logging dependency.
// Dependencies: crate::core, serde
// ============================================================================

//! ## Overview
//! Workers log per-event outcomes through a sink trait so deployments can
//! route them to their preferred logging pipeline. Failures recorded here are
//! never retried in-line; the event log remains the source of truth for any
//! future reconciler.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::io;
use std::io::Write;

use serde::Serialize;

use crate::core::Timestamp;

// ============================================================================
// SECTION: Types
// ============================================================================

/// Pipeline audit event payload.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineAuditEvent {
    /// Pipeline stage label (ingest, enrichment, resolution).
    pub stage: &'static str,
    /// Event timestamp in epoch milliseconds.
    pub timestamp_ms: i64,
    /// Profile the work was performed for.
    pub profile_id: String,
    /// Event being processed, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,
    /// Rule involved, when applicable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    /// Outcome label.
    pub outcome: &'static str,
    /// Free-form detail, typically an error rendering.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl PipelineAuditEvent {
    /// Creates an audit event for the given stage and profile.
    #[must_use]
    pub fn new(stage: &'static str, profile_id: impl Into<String>, outcome: &'static str) -> Self {
        Self {
            stage,
            timestamp_ms: Timestamp::now_millis(),
            profile_id: profile_id.into(),
            event_id: None,
            rule_id: None,
            outcome,
            detail: None,
        }
    }

    /// Attaches the event identifier.
    #[must_use]
    pub fn with_event(mut self, event_id: impl Into<String>) -> Self {
        self.event_id = Some(event_id.into());
        self
    }

    /// Attaches the rule identifier.
    #[must_use]
    pub fn with_rule(mut self, rule_id: impl Into<String>) -> Self {
        self.rule_id = Some(rule_id.into());
        self
    }

    /// Attaches free-form detail.
    #[must_use]
    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

// ============================================================================
// SECTION: Sinks
// ============================================================================

/// Audit sink for pipeline events.
pub trait PipelineAuditSink: Send + Sync {
    /// Records one audit event. Sinks must not fail the pipeline.
    fn record(&self, event: &PipelineAuditEvent);
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopPipelineAudit;

impl PipelineAuditSink for NoopPipelineAudit {
    fn record(&self, _event: &PipelineAuditEvent) {}
}

/// Sink that writes JSON lines to stderr.
#[derive(Debug, Default, Clone, Copy)]
pub struct StderrPipelineAudit;

impl PipelineAuditSink for StderrPipelineAudit {
    fn record(&self, event: &PipelineAuditEvent) {
        if let Ok(line) = serde_json::to_string(event) {
            let mut stderr = io::stderr().lock();
            let _ = writeln!(stderr, "{line}");
        }
    }
}
