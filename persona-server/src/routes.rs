// persona-server/src/routes.rs
// ============================================================================
// Module: Persona Routes
// Description: Router construction for the /api/v1 surface.
// Purpose: Bind handlers, tracing, and audit middleware into one router.
// Dependencies: crate::{audit, handlers, state, trace}, axum
// ============================================================================

//! ## Overview
//! One router serves the whole HTTP surface. The trace middleware runs
//! outermost so both the audit layer and the handlers observe the request's
//! trace identifier.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use axum::middleware;
use axum::routing::get;
use axum::routing::post;
use axum::Router;

use crate::audit::audit_middleware;
use crate::handlers;
use crate::state::AppState;
use crate::trace::trace_middleware;

// ============================================================================
// SECTION: Router
// ============================================================================

/// Builds the full API router over the shared state.
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let audit = Arc::clone(&state.audit);
    Router::new()
        .route("/api/v1/event", post(handlers::ingest_event))
        .route("/api/v1/events", get(handlers::query_events))
        .route("/api/v1/events/{event_id}", get(handlers::get_event))
        .route("/api/v1/profile", get(handlers::list_profiles))
        .route(
            "/api/v1/profile/{profile_id}",
            get(handlers::read_profile).delete(handlers::delete_profile),
        )
        .route(
            "/api/v1/unification-rules",
            post(handlers::create_resolution_rule).get(handlers::list_resolution_rules),
        )
        .route(
            "/api/v1/unification-rules/{rule_id}",
            get(handlers::get_resolution_rule)
                .patch(handlers::patch_resolution_rule)
                .delete(handlers::delete_resolution_rule),
        )
        .route(
            "/api/v1/enrichment-rules",
            post(handlers::create_enrichment_rule).get(handlers::list_enrichment_rules),
        )
        .route(
            "/api/v1/enrichment-rules/{rule_id}",
            get(handlers::get_enrichment_rule)
                .put(handlers::replace_enrichment_rule)
                .delete(handlers::delete_enrichment_rule),
        )
        .route(
            "/api/v1/event-schema",
            post(handlers::create_event_schema).get(handlers::list_event_schemas),
        )
        .route(
            "/api/v1/event-schema/{schema_id}",
            get(handlers::get_event_schema)
                .patch(handlers::patch_event_schema)
                .delete(handlers::delete_event_schema),
        )
        .layer(middleware::from_fn_with_state(audit, audit_middleware))
        .layer(middleware::from_fn(trace_middleware))
        .with_state(state)
}
