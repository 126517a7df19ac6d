// persona-server/src/state.rs
// ============================================================================
// Module: Persona Server State
// Description: Service wiring shared by every request handler.
// Purpose: Construct the pipeline once at boot and inject it through axum.
// Dependencies: persona-core, persona-config
// ============================================================================

//! ## Overview
//! All handles are constructed once at boot from a single store value that
//! implements every store contract, then injected through axum state. There
//! are no global singletons: the store client, lock manager, and queue all
//! live inside [`AppState`].

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use persona_config::PersonaConfig;
use persona_core::interfaces::EnrichmentRuleStore;
use persona_core::interfaces::EventSchemaStore;
use persona_core::interfaces::EventStore;
use persona_core::interfaces::LockStore;
use persona_core::interfaces::ProfileStore;
use persona_core::interfaces::ResolutionRuleStore;
use persona_core::runtime::CascadeDeleter;
use persona_core::runtime::EnrichmentEngine;
use persona_core::runtime::IngestionGate;
use persona_core::runtime::LockManager;
use persona_core::runtime::Pipeline;
use persona_core::runtime::PipelineAuditSink;
use persona_core::runtime::ReadAssembler;
use persona_core::runtime::ResolutionEngine;
use persona_core::runtime::RuleRegistry;

use crate::audit::RequestAuditSink;

// ============================================================================
// SECTION: App State
// ============================================================================

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    /// Ingestion entry point.
    pub gate: IngestionGate,
    /// Profile read surface.
    pub assembler: ReadAssembler,
    /// Profile delete cascade.
    pub deleter: CascadeDeleter,
    /// Rule registry and CRUD surface.
    pub registry: RuleRegistry,
    /// Event log for the query endpoints.
    pub events: Arc<dyn EventStore>,
    /// Request audit sink.
    pub audit: Arc<dyn RequestAuditSink>,
}

/// Boot-time wiring: state plus the running pipeline.
pub struct Services {
    /// Shared handler state.
    pub state: AppState,
    /// Running pipeline; kept for shutdown.
    pub pipeline: Pipeline,
}

/// Builds the full service graph over one store value implementing every
/// store contract.
pub fn build_services<S>(
    store: Arc<S>,
    config: &PersonaConfig,
    pipeline_audit: Arc<dyn PipelineAuditSink>,
    request_audit: Arc<dyn RequestAuditSink>,
) -> Services
where
    S: ProfileStore
        + EventStore
        + EnrichmentRuleStore
        + ResolutionRuleStore
        + EventSchemaStore
        + LockStore
        + 'static,
{
    let profiles: Arc<dyn ProfileStore> = store.clone();
    let events: Arc<dyn EventStore> = store.clone();
    let enrichment_rules: Arc<dyn EnrichmentRuleStore> = store.clone();
    let resolution_rules: Arc<dyn ResolutionRuleStore> = store.clone();
    let schemas: Arc<dyn EventSchemaStore> = store.clone();
    let lock_store: Arc<dyn LockStore> = store;

    let locks = LockManager::new(lock_store, config.locks.to_lock_config());
    let registry = RuleRegistry::new(enrichment_rules, resolution_rules, schemas);
    let enrichment = EnrichmentEngine::new(
        Arc::clone(&profiles),
        Arc::clone(&events),
        registry.clone(),
        Arc::clone(&pipeline_audit),
    );
    let resolution = ResolutionEngine::new(
        Arc::clone(&profiles),
        registry.clone(),
        locks.clone(),
        Arc::clone(&pipeline_audit),
    );
    let pipeline = Pipeline::start(
        enrichment,
        resolution,
        pipeline_audit,
        &config.pipeline.to_pipeline_config(),
    );
    let gate = IngestionGate::new(
        Arc::clone(&profiles),
        Arc::clone(&events),
        locks,
        pipeline.handle(),
    );
    let assembler = ReadAssembler::new(Arc::clone(&profiles));
    let deleter = CascadeDeleter::new(profiles, Arc::clone(&events));

    Services {
        state: AppState {
            gate,
            assembler,
            deleter,
            registry,
            events,
            audit: request_audit,
        },
        pipeline,
    }
}
