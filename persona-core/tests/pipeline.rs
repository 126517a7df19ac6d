// persona-core/tests/pipeline.rs
// ============================================================================
// Module: Pipeline End-To-End Tests
// Description: Ingestion through enrichment and resolution over the queue.
// Purpose: Pin the documented end-to-end scenarios against the real pipeline.
// Dependencies: persona-core, serde_json, tokio
// ============================================================================
//! ## Overview
//! Drives the full async path: gate admission, profile skeleton creation,
//! event persistence, queue hand-off, enrichment, and unification. Covers
//! first-seen profiles, identify-driven identity, enrichment accumulation,
//! unification by email, event immutability, and admission failures.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use persona_core::interfaces::EnrichmentRuleStore;
use persona_core::interfaces::ProfileStore;
use persona_core::interfaces::ResolutionRuleStore;
use persona_core::runtime::EnrichmentEngine;
use persona_core::runtime::IngestionGate;
use persona_core::runtime::LockConfig;
use persona_core::runtime::LockManager;
use persona_core::runtime::NoopPipelineAudit;
use persona_core::runtime::Pipeline;
use persona_core::runtime::PipelineConfig;
use persona_core::runtime::ResolutionEngine;
use persona_core::runtime::RuleRegistry;
use persona_core::Computation;
use persona_core::EnrichmentRule;
use persona_core::Event;
use persona_core::EventQuery;
use persona_core::EventType;
use persona_core::InMemoryStore;
use persona_core::MergeStrategy;
use persona_core::Profile;
use persona_core::ResolutionRule;
use persona_core::RuleType;
use persona_core::ServiceError;
use persona_core::Timestamp;
use persona_core::Trigger;
use persona_core::ValueType;
use serde_json::json;
use serde_json::Value;

struct Harness {
    store: Arc<InMemoryStore>,
    gate: IngestionGate,
    pipeline: Pipeline,
}

fn harness(workers: usize) -> Harness {
    let store = Arc::new(InMemoryStore::new());
    let profiles = Arc::clone(&store) as Arc<dyn ProfileStore>;
    let events = Arc::clone(&store) as Arc<dyn persona_core::interfaces::EventStore>;
    let enrichment_rules = Arc::clone(&store) as Arc<dyn EnrichmentRuleStore>;
    let resolution_rules = Arc::clone(&store) as Arc<dyn ResolutionRuleStore>;
    let schemas = Arc::clone(&store) as Arc<dyn persona_core::interfaces::EventSchemaStore>;
    let lock_store = Arc::clone(&store) as Arc<dyn persona_core::interfaces::LockStore>;
    let registry = RuleRegistry::new(enrichment_rules, resolution_rules, schemas);
    let locks = LockManager::new(lock_store, LockConfig::default());
    let audit = Arc::new(NoopPipelineAudit);
    let enrichment = EnrichmentEngine::new(
        Arc::clone(&profiles),
        Arc::clone(&events),
        registry.clone(),
        audit.clone(),
    );
    let resolution = ResolutionEngine::new(
        Arc::clone(&profiles),
        registry,
        locks.clone(),
        audit.clone(),
    );
    let pipeline = Pipeline::start(
        enrichment,
        resolution,
        audit,
        &PipelineConfig {
            workers,
            queue_capacity: 1000,
        },
    );
    let gate = IngestionGate::new(
        Arc::clone(&profiles),
        Arc::clone(&events),
        locks,
        pipeline.handle(),
    );
    Harness {
        store,
        gate,
        pipeline,
    }
}

fn event(profile_id: &str, event_type: EventType, name: &str, properties: &[(&str, Value)]) -> Event {
    Event {
        event_id: persona_core::EventId::generate(),
        profile_id: profile_id.into(),
        app_id: "shop-web".into(),
        org_id: "org1".into(),
        event_type,
        event_name: name.to_string(),
        event_timestamp: Timestamp::now(),
        properties: properties
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect(),
        context: BTreeMap::new(),
    }
}

fn stored_profile(store: &InMemoryStore, profile_id: &str) -> Option<Profile> {
    ProfileStore::find(store, &profile_id.into()).expect("find")
}

/// Polls until the predicate holds or a bounded deadline passes.
async fn wait_until<F>(mut check: F)
where
    F: FnMut() -> bool,
{
    for _ in 0..100 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("condition not reached within deadline");
}

// ============================================================================
// SECTION: Admission
// ============================================================================

/// Events without a profile id are rejected before any write.
#[tokio::test(flavor = "multi_thread")]
async fn rejects_events_without_profile_id() {
    let harness = harness(1);
    let outcome = harness
        .gate
        .ingest(event("", EventType::Track, "page_view", &[]))
        .await;
    assert!(matches!(outcome, Err(ServiceError::InvalidEvent(_))));
    harness.pipeline.shutdown().await;
}

/// A first event creates a listed leaf profile and persists the event
/// with normalized type and name.
#[tokio::test(flavor = "multi_thread")]
async fn first_event_creates_profile() {
    let harness = harness(1);
    harness
        .gate
        .ingest(event("p1", EventType::Track, "Page_View", &[]))
        .await
        .expect("ingest");

    let profile = stored_profile(&harness.store, "p1").expect("profile exists");
    assert!(profile.hierarchy.is_parent);
    assert!(profile.hierarchy.list_profile);
    assert!(profile.identity_attributes.is_empty());

    let events = persona_core::interfaces::EventStore::query(
        &*harness.store,
        &EventQuery {
            profile_id: Some("p1".into()),
            ..EventQuery::default()
        },
    )
    .expect("query");
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_name, "page_view");
    harness.pipeline.shutdown().await;
}

/// Re-ingesting for a known profile leaves the stored profile untouched.
#[tokio::test(flavor = "multi_thread")]
async fn existing_profiles_are_not_reset() {
    let harness = harness(1);
    harness
        .gate
        .ingest(event(
            "p1",
            EventType::Identify,
            "login",
            &[("email", json!("a@x.com"))],
        ))
        .await
        .expect("ingest");
    wait_until(|| {
        stored_profile(&harness.store, "p1")
            .is_some_and(|profile| profile.identity_attributes.contains_key("email"))
    })
    .await;

    harness
        .gate
        .ingest(event("p1", EventType::Track, "page_view", &[]))
        .await
        .expect("ingest");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let profile = stored_profile(&harness.store, "p1").expect("profile");
    assert_eq!(profile.identity_attributes.get("email"), Some(&json!("a@x.com")));
    harness.pipeline.shutdown().await;
}

// ============================================================================
// SECTION: Enrichment Scenarios
// ============================================================================

/// Identify events populate identity attributes asynchronously.
#[tokio::test(flavor = "multi_thread")]
async fn identify_populates_identity() {
    let harness = harness(1);
    harness
        .gate
        .ingest(event(
            "p1",
            EventType::Identify,
            "login",
            &[("email", json!("a@x.com")), ("user_id", json!("u1"))],
        ))
        .await
        .expect("ingest");

    wait_until(|| {
        stored_profile(&harness.store, "p1").is_some_and(|profile| {
            profile.identity_attributes.get("email") == Some(&json!("a@x.com"))
                && profile.identity_attributes.get("user_id") == Some(&json!("u1"))
        })
    })
    .await;
    harness.pipeline.shutdown().await;
}

/// Copy-combine enrichment accumulates values across events in order.
#[tokio::test(flavor = "multi_thread")]
async fn enrichment_accumulates_interests() {
    let harness = harness(1);
    EnrichmentRuleStore::upsert(
        &*harness.store,
        &EnrichmentRule {
            rule_id: "interests".into(),
            trait_name: "traits.interests".to_string(),
            rule_type: RuleType::Computed,
            value: None,
            value_type: ValueType::ArrayOfString,
            computation: Some(Computation::Copy),
            source_fields: vec!["category".to_string()],
            time_range: None,
            merge_strategy: MergeStrategy::Combine,
            masking_required: false,
            masking_strategy: None,
            trigger: Trigger {
                event_type: EventType::Track,
                event_name: "category_viewed".to_string(),
                conditions: Vec::new(),
            },
            created_at: Timestamp::from_secs(0),
            updated_at: Timestamp::from_secs(0),
        },
    )
    .expect("rule");

    for category in ["books", "music"] {
        harness
            .gate
            .ingest(event(
                "p1",
                EventType::Track,
                "category_viewed",
                &[("category", json!(category))],
            ))
            .await
            .expect("ingest");
    }

    wait_until(|| {
        stored_profile(&harness.store, "p1").is_some_and(|profile| {
            profile.traits.get("interests") == Some(&json!(["books", "music"]))
        })
    })
    .await;
    harness.pipeline.shutdown().await;
}

// ============================================================================
// SECTION: Unification Scenario
// ============================================================================

/// Two profiles sharing an email unify under a hidden synthetic parent and
/// both read as the merged view.
#[tokio::test(flavor = "multi_thread")]
async fn unification_by_email() {
    let harness = harness(1);
    ResolutionRuleStore::upsert(
        &*harness.store,
        &ResolutionRule {
            rule_id: "email".into(),
            rule_name: "email-match".to_string(),
            attribute: "identity_attributes.email".to_string(),
            priority: 0,
            is_active: true,
            created_at: Timestamp::from_secs(0),
            updated_at: Timestamp::from_secs(0),
        },
    )
    .expect("rule");

    for profile_id in ["p1", "p2"] {
        harness
            .gate
            .ingest(event(
                profile_id,
                EventType::Identify,
                "login",
                &[("email", json!("a@x.com"))],
            ))
            .await
            .expect("ingest");
    }

    wait_until(|| {
        stored_profile(&harness.store, "p1")
            .is_some_and(|profile| !profile.hierarchy.is_parent)
            && stored_profile(&harness.store, "p2")
                .is_some_and(|profile| !profile.hierarchy.is_parent)
    })
    .await;

    let p1 = stored_profile(&harness.store, "p1").expect("p1");
    let parent_id = p1.hierarchy.parent_profile_id.expect("parent set");
    let parent = stored_profile(&harness.store, parent_id.as_str()).expect("parent");
    assert!(parent.hierarchy.is_parent);
    assert!(!parent.hierarchy.list_profile);
    assert_eq!(parent.hierarchy.children.len(), 2);
    assert_eq!(parent.identity_attributes.get("email"), Some(&json!("a@x.com")));
    harness.pipeline.shutdown().await;
}

// ============================================================================
// SECTION: Event Immutability
// ============================================================================

/// Stored events never change, whatever the pipeline does afterwards.
#[tokio::test(flavor = "multi_thread")]
async fn events_are_immutable() {
    let harness = harness(1);
    harness
        .gate
        .ingest(event(
            "p1",
            EventType::Identify,
            "login",
            &[("email", json!("a@x.com"))],
        ))
        .await
        .expect("ingest");

    let before = persona_core::interfaces::EventStore::query(
        &*harness.store,
        &EventQuery::default(),
    )
    .expect("query");
    wait_until(|| {
        stored_profile(&harness.store, "p1")
            .is_some_and(|profile| profile.identity_attributes.contains_key("email"))
    })
    .await;
    let after = persona_core::interfaces::EventStore::query(
        &*harness.store,
        &EventQuery::default(),
    )
    .expect("query");
    assert_eq!(before, after);
    harness.pipeline.shutdown().await;
}

// ============================================================================
// SECTION: Partitioned Workers
// ============================================================================

/// Multiple workers keep per-profile processing intact.
#[tokio::test(flavor = "multi_thread")]
async fn partitioned_workers_process_all_profiles() {
    let harness = harness(4);
    for index in 0..8 {
        let profile_id = format!("p{index}");
        harness
            .gate
            .ingest(event(
                &profile_id,
                EventType::Identify,
                "login",
                &[("user_id", json!(format!("u{index}")))],
            ))
            .await
            .expect("ingest");
    }

    wait_until(|| {
        (0..8).all(|index| {
            stored_profile(&harness.store, &format!("p{index}"))
                .is_some_and(|profile| profile.identity_attributes.contains_key("user_id"))
        })
    })
    .await;
    harness.pipeline.shutdown().await;
}
