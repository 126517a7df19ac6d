// persona-store-sqlite/tests/sqlite_store.rs
// ============================================================================
// Module: SQLite Store Tests
// Description: Durable store behavior for every collection and the locks.
// Purpose: Pin document round-trips, ordering, and lock persistence.
// Dependencies: persona-core, persona-store-sqlite, serde_json, tempfile
// ============================================================================
//! ## Overview
//! Exercises the `SQLite` store through the persona-core contracts:
//! insert-only profile upserts, positional device updates, event queries
//! with document clauses, rule insertion order across replacements, and
//! lock acquisition surviving a reopened database.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use std::collections::BTreeMap;
use std::path::PathBuf;

use persona_core::interfaces::EnrichmentRuleStore;
use persona_core::interfaces::EventQuery;
use persona_core::interfaces::EventStore;
use persona_core::interfaces::FilterClause;
use persona_core::interfaces::LockStore;
use persona_core::interfaces::ProfileStore;
use persona_core::interfaces::ResolutionRuleStore;
use persona_core::Computation;
use persona_core::ConditionOperator;
use persona_core::Device;
use persona_core::EnrichmentRule;
use persona_core::Event;
use persona_core::EventType;
use persona_core::MergeStrategy;
use persona_core::Profile;
use persona_core::ResolutionRule;
use persona_core::RuleType;
use persona_core::Timestamp;
use persona_core::TraitNamespace;
use persona_core::Trigger;
use persona_core::ValueType;
use persona_store_sqlite::SqliteStore;
use persona_store_sqlite::SqliteStoreConfig;
use serde_json::json;
use tempfile::TempDir;

fn open_store(dir: &TempDir) -> (SqliteStore, PathBuf) {
    let path = dir.path().join("persona.db");
    let store = SqliteStore::open(&SqliteStoreConfig::at(&path)).expect("open store");
    (store, path)
}

fn profile(profile_id: &str) -> Profile {
    Profile::skeleton(profile_id.into(), Timestamp::from_secs(1_700_000_000))
}

fn track_event(event_id: &str, profile_id: &str, name: &str, at: i64) -> Event {
    Event {
        event_id: event_id.into(),
        profile_id: profile_id.into(),
        app_id: "shop-web".into(),
        org_id: "org1".into(),
        event_type: EventType::Track,
        event_name: name.to_string(),
        event_timestamp: Timestamp::from_secs(at),
        properties: BTreeMap::new(),
        context: BTreeMap::new(),
    }
}

// ============================================================================
// SECTION: Profiles
// ============================================================================

/// Insert-only semantics leave existing documents untouched.
#[test]
fn insert_if_absent_is_insert_only() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);

    let mut first = profile("p1");
    first.identity_attributes.insert("email".to_string(), json!("a@x.com"));
    assert!(ProfileStore::insert_if_absent(&store, &first).expect("insert"));

    let skeleton = profile("p1");
    assert!(!ProfileStore::insert_if_absent(&store, &skeleton).expect("second insert"));

    let stored = ProfileStore::find(&store, &"p1".into()).expect("find").expect("exists");
    assert_eq!(stored.identity_attributes.get("email"), Some(&json!("a@x.com")));
}

/// Positional device updates merge by device id.
#[test]
fn upsert_device_merges_by_id() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    ProfileStore::insert_if_absent(&store, &profile("p1")).expect("insert");

    let first = Device {
        device_id: "d1".to_string(),
        os: Some("mac".to_string()),
        ..Device::default()
    };
    ProfileStore::upsert_device(&store, &"p1".into(), &"shop-web".into(), &first)
        .expect("device");
    let second = Device {
        device_id: "d1".to_string(),
        browser: Some("chrome".to_string()),
        ..Device::default()
    };
    ProfileStore::upsert_device(&store, &"p1".into(), &"shop-web".into(), &second)
        .expect("device");

    let stored = ProfileStore::find(&store, &"p1".into()).expect("find").expect("exists");
    let devices = &stored.application_data[0].devices;
    assert_eq!(devices.len(), 1);
    assert_eq!(devices[0].os.as_deref(), Some("mac"));
    assert_eq!(devices[0].browser.as_deref(), Some("chrome"));
}

/// Trait writes land in the addressed namespace.
#[test]
fn set_trait_value_by_namespace() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    ProfileStore::insert_if_absent(&store, &profile("p1")).expect("insert");

    ProfileStore::set_trait_value(
        &store,
        &"p1".into(),
        TraitNamespace::Traits,
        "interests",
        json!(["books"]),
    )
    .expect("trait");
    ProfileStore::set_trait_value(
        &store,
        &"p1".into(),
        TraitNamespace::IdentityAttributes,
        "email",
        json!("a@x.com"),
    )
    .expect("identity");

    let stored = ProfileStore::find(&store, &"p1".into()).expect("find").expect("exists");
    assert_eq!(stored.traits.get("interests"), Some(&json!(["books"])));
    assert_eq!(stored.identity_attributes.get("email"), Some(&json!("a@x.com")));
}

/// Parent candidates exclude the requesting profile and children.
#[test]
fn find_parents_except_filters() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    ProfileStore::insert_if_absent(&store, &profile("p1")).expect("p1");
    ProfileStore::insert_if_absent(&store, &profile("p2")).expect("p2");
    let mut child = profile("p3");
    child.hierarchy = persona_core::ProfileHierarchy::child_of("p1".into());
    ProfileStore::insert_if_absent(&store, &child).expect("p3");

    let parents = ProfileStore::find_parents_except(&store, &"p1".into()).expect("parents");
    let ids: Vec<&str> = parents.iter().map(|profile| profile.profile_id.as_str()).collect();
    assert_eq!(ids, vec!["p2"]);
}

// ============================================================================
// SECTION: Events
// ============================================================================

/// Event queries prefilter in SQL and apply document clauses in process.
#[test]
fn event_query_filters() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    EventStore::append(&store, &track_event("e1", "p1", "page_view", 1_000)).expect("e1");
    EventStore::append(&store, &track_event("e2", "p1", "purchase", 2_000)).expect("e2");
    EventStore::append(&store, &track_event("e3", "p2", "page_view", 3_000)).expect("e3");

    let by_profile = EventStore::query(
        &store,
        &EventQuery {
            profile_id: Some("p1".into()),
            ..EventQuery::default()
        },
    )
    .expect("query");
    assert_eq!(by_profile.len(), 2);

    let since = EventStore::query(
        &store,
        &EventQuery {
            since: Some(Timestamp::from_secs(1_500)),
            ..EventQuery::default()
        },
    )
    .expect("query");
    assert_eq!(since.len(), 2);

    let by_clause = EventStore::query(
        &store,
        &EventQuery {
            clauses: vec![FilterClause {
                field: "event_name".to_string(),
                operator: ConditionOperator::Equals,
                value: json!("purchase"),
            }],
            ..EventQuery::default()
        },
    )
    .expect("query");
    assert_eq!(by_clause.len(), 1);
    assert_eq!(by_clause[0].event_id.as_str(), "e2");
}

/// Deleting a profile's events reports the removed count.
#[test]
fn delete_for_profile_counts() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    EventStore::append(&store, &track_event("e1", "p1", "page_view", 1_000)).expect("e1");
    EventStore::append(&store, &track_event("e2", "p1", "page_view", 2_000)).expect("e2");
    EventStore::append(&store, &track_event("e3", "p2", "page_view", 3_000)).expect("e3");

    let removed = EventStore::delete_for_profile(&store, &"p1".into()).expect("delete");
    assert_eq!(removed, 2);
    let remaining = EventStore::query(&store, &EventQuery::default()).expect("query");
    assert_eq!(remaining.len(), 1);
}

// ============================================================================
// SECTION: Rules
// ============================================================================

/// Rule replacement keeps the original insertion order.
#[test]
fn rule_order_survives_replacement() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    for (rule_id, priority) in [("first", 0), ("second", 1), ("third", 2)] {
        ResolutionRuleStore::upsert(
            &store,
            &ResolutionRule {
                rule_id: rule_id.into(),
                rule_name: format!("{rule_id}-match"),
                attribute: "identity_attributes.email".to_string(),
                priority,
                is_active: true,
                created_at: Timestamp::from_secs(0),
                updated_at: Timestamp::from_secs(0),
            },
        )
        .expect("rule");
    }

    // Replacing the first rule must not move it to the end.
    ResolutionRuleStore::upsert(
        &store,
        &ResolutionRule {
            rule_id: "first".into(),
            rule_name: "first-match".to_string(),
            attribute: "identity_attributes.user_id".to_string(),
            priority: 0,
            is_active: false,
            created_at: Timestamp::from_secs(0),
            updated_at: Timestamp::from_secs(0),
        },
    )
    .expect("replace");

    let rules = ResolutionRuleStore::list(&store).expect("list");
    let ids: Vec<&str> = rules.iter().map(|rule| rule.rule_id.as_str()).collect();
    assert_eq!(ids, vec!["first", "second", "third"]);
    assert_eq!(rules[0].attribute, "identity_attributes.user_id");
}

/// set_active round-trips and reports missing rules.
#[test]
fn set_active_toggles() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    ResolutionRuleStore::upsert(
        &store,
        &ResolutionRule {
            rule_id: "r1".into(),
            rule_name: "email-match".to_string(),
            attribute: "identity_attributes.email".to_string(),
            priority: 0,
            is_active: true,
            created_at: Timestamp::from_secs(0),
            updated_at: Timestamp::from_secs(0),
        },
    )
    .expect("rule");

    assert!(ResolutionRuleStore::set_active(&store, &"r1".into(), false).expect("toggle"));
    let rule = ResolutionRuleStore::find(&store, &"r1".into()).expect("find").expect("exists");
    assert!(!rule.is_active);
    assert!(!ResolutionRuleStore::set_active(&store, &"ghost".into(), true).expect("missing"));
}

/// Enrichment rules round-trip their full shape.
#[test]
fn enrichment_rule_round_trip() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);
    let rule = EnrichmentRule {
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
        created_at: Timestamp::from_secs(10),
        updated_at: Timestamp::from_secs(20),
    };
    EnrichmentRuleStore::upsert(&store, &rule).expect("upsert");
    let stored = EnrichmentRuleStore::find(&store, &"interests".into())
        .expect("find")
        .expect("exists");
    assert_eq!(stored, rule);
}

// ============================================================================
// SECTION: Locks
// ============================================================================

/// Lock acquisition is a conditional upsert honoring expiry.
#[test]
fn lock_conditional_upsert() {
    let dir = TempDir::new().expect("tempdir");
    let (store, _) = open_store(&dir);

    let first = LockStore::try_acquire(&store, "lock:profile:p1", 1_000, 500)
        .expect("store ok")
        .expect("acquired");
    assert!(LockStore::try_acquire(&store, "lock:profile:p1", 2_000, 900)
        .expect("store ok")
        .is_none());
    let second = LockStore::try_acquire(&store, "lock:profile:p1", 3_000, 1_500)
        .expect("store ok")
        .expect("reacquired after expiry");
    assert!(second > first);

    LockStore::release(&store, "lock:profile:p1").expect("release");
    LockStore::release(&store, "lock:profile:p1").expect("idempotent release");
}

/// Locks survive a reopened database, respecting TTLs.
#[test]
fn locks_survive_restart() {
    let dir = TempDir::new().expect("tempdir");
    let (store, path) = open_store(&dir);
    LockStore::try_acquire(&store, "lock:profile:p1", i64::MAX, 0)
        .expect("store ok")
        .expect("acquired");
    drop(store);

    let reopened = SqliteStore::open(&SqliteStoreConfig::at(path)).expect("reopen");
    assert!(LockStore::try_acquire(&reopened, "lock:profile:p1", i64::MAX, 1)
        .expect("store ok")
        .is_none());
}
