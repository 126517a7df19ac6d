// persona-core/tests/assembler.rs
// ============================================================================
// Module: Read Assembler Tests
// Description: Unified reads, listings, and the delete cascade.
// Purpose: Pin the merged-view presentation and cascade semantics.
// Dependencies: persona-core, serde_json, tokio
// ============================================================================
//! ## Overview
//! Validates child reads re-attributed to the caller, listings hiding
//! synthetic parents, filtered listings, and the three delete-cascade
//! shapes (lone parent, merged family, single child).

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::sync::Arc;

use persona_core::interfaces::EventStore;
use persona_core::interfaces::FilterClause;
use persona_core::interfaces::ProfileStore;
use persona_core::interfaces::ResolutionRuleStore;
use persona_core::runtime::CascadeDeleter;
use persona_core::runtime::LockConfig;
use persona_core::runtime::LockManager;
use persona_core::runtime::NoopPipelineAudit;
use persona_core::runtime::ReadAssembler;
use persona_core::runtime::ResolutionEngine;
use persona_core::runtime::RuleRegistry;
use persona_core::ConditionOperator;
use persona_core::Event;
use persona_core::EventType;
use persona_core::InMemoryStore;
use persona_core::Profile;
use persona_core::ResolutionRule;
use persona_core::ServiceError;
use persona_core::Timestamp;
use serde_json::json;

fn profile_with_email(profile_id: &str, email: &str) -> Profile {
    let mut profile = Profile::skeleton(profile_id.into(), Timestamp::now());
    profile
        .identity_attributes
        .insert("email".to_string(), json!(email));
    profile
}

fn seed_event(store: &InMemoryStore, profile_id: &str) {
    let event = Event {
        event_id: persona_core::EventId::generate(),
        profile_id: profile_id.into(),
        app_id: "shop-web".into(),
        org_id: "org1".into(),
        event_type: EventType::Track,
        event_name: "page_view".to_string(),
        event_timestamp: Timestamp::now(),
        properties: std::collections::BTreeMap::new(),
        context: std::collections::BTreeMap::new(),
    };
    store.append(&event).expect("append");
}

/// Builds a merged family: synthetic parent over p1 and p2, sharing an email.
fn build_family(store: &Arc<InMemoryStore>) -> Profile {
    ResolutionRuleStore::upsert(
        &**store,
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
    let p1 = profile_with_email("p1", "a@x.com");
    let p2 = profile_with_email("p2", "a@x.com");
    store.insert_if_absent(&p1).expect("p1");
    store.insert_if_absent(&p2).expect("p2");

    let enrichment_rules = Arc::clone(store) as Arc<dyn persona_core::interfaces::EnrichmentRuleStore>;
    let resolution_rules = Arc::clone(store) as Arc<dyn ResolutionRuleStore>;
    let schemas = Arc::clone(store) as Arc<dyn persona_core::interfaces::EventSchemaStore>;
    let lock_store = Arc::clone(store) as Arc<dyn persona_core::interfaces::LockStore>;
    let profiles = Arc::clone(store) as Arc<dyn ProfileStore>;
    let registry = RuleRegistry::new(enrichment_rules, resolution_rules, schemas);
    let locks = LockManager::new(lock_store, LockConfig::default());
    let engine = ResolutionEngine::new(profiles, registry, locks, Arc::new(NoopPipelineAudit));
    engine.unify(&p2).expect("unify").expect("merged")
}

fn stored_profile(store: &InMemoryStore, profile_id: &str) -> Option<Profile> {
    ProfileStore::find(store, &profile_id.into()).expect("find")
}

// ============================================================================
// SECTION: Reads
// ============================================================================

/// A parent read returns the profile unchanged.
#[test]
fn parent_read_is_identity() {
    let store = Arc::new(InMemoryStore::new());
    let profile = profile_with_email("p1", "a@x.com");
    store.insert_if_absent(&profile).expect("insert");

    let view = ReadAssembler::new(Arc::clone(&store) as Arc<dyn ProfileStore>)
        .read(&"p1".into())
        .expect("read");
    assert_eq!(view, stored_profile(&store, "p1").expect("exists"));
}

/// A child read returns the parent state attributed to the child.
#[tokio::test]
async fn child_read_returns_merged_view() {
    let store = Arc::new(InMemoryStore::new());
    let parent = build_family(&store);

    let assembler = ReadAssembler::new(Arc::clone(&store) as Arc<dyn ProfileStore>);
    let view = assembler.read(&"p1".into()).expect("read");

    assert_eq!(view.profile_id.as_str(), "p1");
    assert!(!view.hierarchy.is_parent);
    assert!(view.hierarchy.list_profile);
    assert_eq!(view.hierarchy.parent_profile_id.as_ref(), Some(&parent.profile_id));
    // Peers stay visible through the child view.
    assert_eq!(view.hierarchy.children.len(), 2);
    assert_eq!(view.identity_attributes.get("email"), Some(&json!("a@x.com")));
}

/// Unknown profiles read as NotFound.
#[test]
fn missing_profile_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let outcome = ReadAssembler::new(Arc::clone(&store) as Arc<dyn ProfileStore>)
        .read(&"ghost".into());
    assert!(matches!(outcome, Err(ServiceError::NotFound(_))));
}

// ============================================================================
// SECTION: Listings
// ============================================================================

/// Listings hide synthetic parents and keep children visible.
#[tokio::test]
async fn listing_hides_synthetic_parents() {
    let store = Arc::new(InMemoryStore::new());
    let parent = build_family(&store);

    let assembler = ReadAssembler::new(Arc::clone(&store) as Arc<dyn ProfileStore>);
    let listed = assembler.list(&[]).expect("list");
    let ids: Vec<&str> = listed.iter().map(|profile| profile.profile_id.as_str()).collect();
    assert!(ids.contains(&"p1"));
    assert!(ids.contains(&"p2"));
    assert!(!ids.contains(&parent.profile_id.as_str()));
}

/// Filter clauses narrow listings over the profile document.
#[test]
fn listing_applies_filters() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_if_absent(&profile_with_email("p1", "a@x.com")).expect("p1");
    store.insert_if_absent(&profile_with_email("p2", "b@x.com")).expect("p2");

    let assembler = ReadAssembler::new(Arc::clone(&store) as Arc<dyn ProfileStore>);
    let listed = assembler
        .list(&[FilterClause {
            field: "identity_attributes.email".to_string(),
            operator: ConditionOperator::Equals,
            value: json!("a@x.com"),
        }])
        .expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].profile_id.as_str(), "p1");
}

// ============================================================================
// SECTION: Delete Cascade
// ============================================================================

fn deleter(store: &Arc<InMemoryStore>) -> CascadeDeleter {
    CascadeDeleter::new(
        Arc::clone(store) as Arc<dyn ProfileStore>,
        Arc::clone(store) as Arc<dyn EventStore>,
    )
}

/// Deleting a lone parent removes it with its events.
#[test]
fn deletes_lone_parent() {
    let store = Arc::new(InMemoryStore::new());
    store.insert_if_absent(&profile_with_email("p1", "a@x.com")).expect("p1");
    seed_event(&store, "p1");

    deleter(&store).delete(&"p1".into()).expect("delete");
    assert!(stored_profile(&store, "p1").is_none());
    let remaining = EventStore::query(&*store, &persona_core::EventQuery::default())
        .expect("query");
    assert!(remaining.is_empty());
}

/// Deleting a merged parent takes every child and their events along.
#[tokio::test]
async fn deletes_family_through_parent() {
    let store = Arc::new(InMemoryStore::new());
    let parent = build_family(&store);
    seed_event(&store, "p1");
    seed_event(&store, "p2");

    deleter(&store).delete(&parent.profile_id).expect("delete");
    assert!(stored_profile(&store, "p1").is_none());
    assert!(stored_profile(&store, "p2").is_none());
    assert!(stored_profile(&store, parent.profile_id.as_str()).is_none());
    let remaining = EventStore::query(&*store, &persona_core::EventQuery::default())
        .expect("query");
    assert!(remaining.is_empty());
}

/// Deleting a child detaches it from the surviving parent.
#[tokio::test]
async fn deleting_child_detaches_from_parent() {
    let store = Arc::new(InMemoryStore::new());
    let parent = build_family(&store);
    seed_event(&store, "p1");

    deleter(&store).delete(&"p1".into()).expect("delete");
    assert!(stored_profile(&store, "p1").is_none());
    let parent = stored_profile(&store, parent.profile_id.as_str()).expect("parent survives");
    assert_eq!(parent.hierarchy.children.len(), 1);
    assert_eq!(parent.hierarchy.children[0].child_profile_id.as_str(), "p2");
}

/// Deleting a missing profile is NotFound.
#[test]
fn delete_missing_is_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let outcome = deleter(&store).delete(&"ghost".into());
    assert!(matches!(outcome, Err(ServiceError::NotFound(_))));
}
