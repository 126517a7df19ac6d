// persona-server/src/handlers.rs
// ============================================================================
// Module: Persona HTTP Handlers
// Description: Request handlers for events, profiles, rules, and schemas.
// Purpose: Implement the /api/v1 surface over the service state.
// Dependencies: persona-core, axum, serde
// ============================================================================

//! ## Overview
//! Handlers validate inputs, delegate to the service layer, and map failures
//! to the error envelope. Event ingestion returns after the event is
//! persisted and enqueued, not after async processing. Resolution-rule PATCH
//! permits only the `is_active` field.

// ============================================================================
// SECTION: Imports
// ============================================================================

use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::Extension;
use axum::Json;
use persona_core::interfaces::EventQuery;
use persona_core::EnrichmentRule;
use persona_core::Event;
use persona_core::EventId;
use persona_core::EventSchema;
use persona_core::Profile;
use persona_core::ProfileId;
use persona_core::ResolutionRule;
use persona_core::RuleId;
use persona_core::SchemaId;
use persona_core::ServiceError;
use persona_core::Timestamp;
use persona_core::runtime::document_matches;
use serde::Serialize;
use serde_json::Value;

use crate::error::ApiError;
use crate::filter::parse_filters;
use crate::state::AppState;
use crate::trace::TraceId;

// ============================================================================
// SECTION: Shared Bodies
// ============================================================================

/// Simple acknowledgement body.
#[derive(Debug, Serialize)]
pub struct MessageBody {
    /// Human-readable acknowledgement.
    pub message: &'static str,
}

/// Repeatable query parameters as raw pairs.
type RawQuery = Vec<(String, String)>;

/// Collects every `filter` query parameter.
fn raw_filters(params: &RawQuery) -> Vec<String> {
    params
        .iter()
        .filter(|(key, _)| key == "filter")
        .map(|(_, value)| value.clone())
        .collect()
}

/// Reads an optional integer query parameter.
fn int_param(params: &RawQuery, name: &str) -> Option<i64> {
    params
        .iter()
        .find(|(key, _)| key == name)
        .and_then(|(_, value)| value.trim().parse().ok())
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// POST /api/v1/event
pub async fn ingest_event(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Json(event): Json<Event>,
) -> Result<(StatusCode, Json<MessageBody>), ApiError> {
    state
        .gate
        .ingest(event)
        .await
        .map_err(|error| ApiError::new(error, trace))?;
    Ok((
        StatusCode::CREATED,
        Json(MessageBody {
            message: "Event accepted.",
        }),
    ))
}

/// GET /api/v1/events?filter=&time_range=
pub async fn query_events(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Query(params): Query<RawQuery>,
) -> Result<Json<Vec<Event>>, ApiError> {
    let result = (|| {
        let rules = state.registry.enrichment_rules()?;
        let clauses = parse_filters(&raw_filters(&params), &rules)?;
        let query = EventQuery {
            since: int_param(&params, "time_range")
                .map(|window| Timestamp::now().minus_secs(window)),
            clauses,
            ..EventQuery::default()
        };
        Ok::<_, ServiceError>(state.events.query(&query)?)
    })();
    result.map(Json).map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/events/{event_id}
pub async fn get_event(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(event_id): Path<String>,
) -> Result<Json<Event>, ApiError> {
    let event_id = EventId::new(event_id);
    let result = (|| {
        state
            .events
            .find(&event_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("event {event_id}")))
    })();
    result.map(Json).map_err(|error| ApiError::new(error, trace))
}

// ============================================================================
// SECTION: Profiles
// ============================================================================

/// GET /api/v1/profile?filter=
pub async fn list_profiles(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Query(params): Query<RawQuery>,
) -> Result<Json<Vec<Profile>>, ApiError> {
    let result = (|| {
        let rules = state.registry.enrichment_rules()?;
        let clauses = parse_filters(&raw_filters(&params), &rules)?;
        state.assembler.list(&clauses)
    })();
    result.map(Json).map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/profile/{profile_id}
pub async fn read_profile(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(profile_id): Path<String>,
) -> Result<Json<Profile>, ApiError> {
    state
        .assembler
        .read(&ProfileId::new(profile_id))
        .map(Json)
        .map_err(|error| ApiError::new(error, trace))
}

/// DELETE /api/v1/profile/{profile_id}
pub async fn delete_profile(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(profile_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .deleter
        .delete(&ProfileId::new(profile_id))
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::new(error, trace))
}

// ============================================================================
// SECTION: Resolution Rules
// ============================================================================

/// POST /api/v1/unification-rules
pub async fn create_resolution_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Json(rule): Json<ResolutionRule>,
) -> Result<(StatusCode, Json<ResolutionRule>), ApiError> {
    state
        .registry
        .create_resolution_rule(rule)
        .map(|rule| (StatusCode::CREATED, Json(rule)))
        .map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/unification-rules
pub async fn list_resolution_rules(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
) -> Result<Json<Vec<ResolutionRule>>, ApiError> {
    state
        .registry
        .resolution_rules()
        .map(|rules| Json(rules.as_ref().clone()))
        .map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/unification-rules/{rule_id}
pub async fn get_resolution_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(rule_id): Path<String>,
) -> Result<Json<ResolutionRule>, ApiError> {
    state
        .registry
        .resolution_rule(&RuleId::new(rule_id))
        .map(Json)
        .map_err(|error| ApiError::new(error, trace))
}

/// PATCH /api/v1/unification-rules/{rule_id}; only `is_active` may change.
pub async fn patch_resolution_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(rule_id): Path<String>,
    Json(patch): Json<Value>,
) -> Result<Json<ResolutionRule>, ApiError> {
    let rule_id = RuleId::new(rule_id);
    let result = (|| {
        let Value::Object(fields) = &patch else {
            return Err(ServiceError::InvalidRule("patch body must be an object".to_string()));
        };
        if fields.keys().any(|key| key != "is_active") {
            return Err(ServiceError::InvalidRule(
                "only the is_active field can be updated".to_string(),
            ));
        }
        let is_active = fields
            .get("is_active")
            .and_then(Value::as_bool)
            .ok_or_else(|| ServiceError::InvalidRule("is_active must be a boolean".to_string()))?;
        state.registry.set_resolution_rule_active(&rule_id, is_active)?;
        state.registry.resolution_rule(&rule_id)
    })();
    result.map(Json).map_err(|error| ApiError::new(error, trace))
}

/// DELETE /api/v1/unification-rules/{rule_id}
pub async fn delete_resolution_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .delete_resolution_rule(&RuleId::new(rule_id))
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::new(error, trace))
}

// ============================================================================
// SECTION: Enrichment Rules
// ============================================================================

/// POST /api/v1/enrichment-rules
pub async fn create_enrichment_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Json(rule): Json<EnrichmentRule>,
) -> Result<(StatusCode, Json<EnrichmentRule>), ApiError> {
    state
        .registry
        .create_enrichment_rule(rule)
        .map(|rule| (StatusCode::CREATED, Json(rule)))
        .map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/enrichment-rules?filter=
pub async fn list_enrichment_rules(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Query(params): Query<RawQuery>,
) -> Result<Json<Vec<EnrichmentRule>>, ApiError> {
    let result = (|| {
        let rules = state.registry.enrichment_rules()?;
        let clauses = parse_filters(&raw_filters(&params), &rules)?;
        let rules = rules
            .iter()
            .filter(|rule| {
                clauses.is_empty()
                    || serde_json::to_value(rule)
                        .map(|doc| document_matches(&doc, &clauses))
                        .unwrap_or(false)
            })
            .cloned()
            .collect::<Vec<_>>();
        Ok::<_, ServiceError>(rules)
    })();
    result.map(Json).map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/enrichment-rules/{rule_id}
pub async fn get_enrichment_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(rule_id): Path<String>,
) -> Result<Json<EnrichmentRule>, ApiError> {
    state
        .registry
        .enrichment_rule(&RuleId::new(rule_id))
        .map(Json)
        .map_err(|error| ApiError::new(error, trace))
}

/// PUT /api/v1/enrichment-rules/{rule_id}
pub async fn replace_enrichment_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(rule_id): Path<String>,
    Json(rule): Json<EnrichmentRule>,
) -> Result<Json<EnrichmentRule>, ApiError> {
    state
        .registry
        .replace_enrichment_rule(&RuleId::new(rule_id), rule)
        .map(Json)
        .map_err(|error| ApiError::new(error, trace))
}

/// DELETE /api/v1/enrichment-rules/{rule_id}
pub async fn delete_enrichment_rule(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(rule_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .delete_enrichment_rule(&RuleId::new(rule_id))
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::new(error, trace))
}

// ============================================================================
// SECTION: Event Schemas
// ============================================================================

/// POST /api/v1/event-schema
pub async fn create_event_schema(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Json(schema): Json<EventSchema>,
) -> Result<(StatusCode, Json<EventSchema>), ApiError> {
    state
        .registry
        .create_event_schema(schema)
        .map(|schema| (StatusCode::CREATED, Json(schema)))
        .map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/event-schema
pub async fn list_event_schemas(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
) -> Result<Json<Vec<EventSchema>>, ApiError> {
    state
        .registry
        .event_schemas()
        .map(Json)
        .map_err(|error| ApiError::new(error, trace))
}

/// GET /api/v1/event-schema/{schema_id}
pub async fn get_event_schema(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(schema_id): Path<String>,
) -> Result<Json<EventSchema>, ApiError> {
    state
        .registry
        .event_schema(&SchemaId::new(schema_id))
        .map(Json)
        .map_err(|error| ApiError::new(error, trace))
}

/// PATCH /api/v1/event-schema/{schema_id}
pub async fn patch_event_schema(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(schema_id): Path<String>,
    Json(schema): Json<EventSchema>,
) -> Result<Json<EventSchema>, ApiError> {
    state
        .registry
        .replace_event_schema(&SchemaId::new(schema_id), schema)
        .map(Json)
        .map_err(|error| ApiError::new(error, trace))
}

/// DELETE /api/v1/event-schema/{schema_id}
pub async fn delete_event_schema(
    State(state): State<AppState>,
    Extension(trace): Extension<TraceId>,
    Path(schema_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state
        .registry
        .delete_event_schema(&SchemaId::new(schema_id))
        .map(|()| StatusCode::NO_CONTENT)
        .map_err(|error| ApiError::new(error, trace))
}
