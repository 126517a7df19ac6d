// persona-core/src/runtime/store.rs
// ============================================================================
// Module: Persona In-Memory Store
// Description: In-memory document store for tests and local demos.
// Purpose: Provide a deterministic store implementation without external deps.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! This module provides an in-memory implementation of every store contract
//! for tests and local demos. It is not intended for production use. Rule
//! collections preserve insertion order because resolution tie-breaking
//! depends on store-returned order.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use serde_json::Value;

use crate::core::AppId;
use crate::core::Device;
use crate::core::EnrichmentRule;
use crate::core::Event;
use crate::core::EventId;
use crate::core::EventSchema;
use crate::core::Profile;
use crate::core::ProfileId;
use crate::core::ResolutionRule;
use crate::core::RuleId;
use crate::core::SchemaId;
use crate::core::Timestamp;
use crate::core::TraitNamespace;
use crate::interfaces::EnrichmentRuleStore;
use crate::interfaces::EventQuery;
use crate::interfaces::EventSchemaStore;
use crate::interfaces::EventStore;
use crate::interfaces::LockStore;
use crate::interfaces::ProfileStore;
use crate::interfaces::ResolutionRuleStore;
use crate::interfaces::StoreError;
use crate::runtime::condition::document_matches;

// ============================================================================
// SECTION: In-Memory Store
// ============================================================================

/// Persisted lock row.
#[derive(Debug, Clone)]
struct LockRow {
    /// Expiry in epoch milliseconds.
    expires_at_ms: i64,
}

/// Mutable collections behind the store mutex.
#[derive(Default)]
struct Collections {
    /// Profile documents by id.
    profiles: BTreeMap<ProfileId, Profile>,
    /// Append-only event log in arrival order.
    events: Vec<Event>,
    /// Enrichment rules in insertion order.
    enrichment_rules: Vec<EnrichmentRule>,
    /// Resolution rules in insertion order.
    resolution_rules: Vec<ResolutionRule>,
    /// Event schemas in insertion order.
    event_schemas: Vec<EventSchema>,
    /// Advisory locks by key.
    locks: BTreeMap<String, LockRow>,
    /// Monotonic fence counter.
    next_fence: u64,
}

/// In-memory document store for tests and examples.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    /// Collections guarded by a mutex.
    inner: Arc<Mutex<Collections>>,
}

impl InMemoryStore {
    /// Creates an empty in-memory store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Locks the collections, mapping poisoning to a store error.
    fn lock(&self) -> Result<MutexGuard<'_, Collections>, StoreError> {
        self.inner
            .lock()
            .map_err(|_| StoreError::Store("in-memory store mutex poisoned".to_string()))
    }
}

impl ProfileStore for InMemoryStore {
    fn insert_if_absent(&self, profile: &Profile) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        if inner.profiles.contains_key(&profile.profile_id) {
            return Ok(false);
        }
        inner.profiles.insert(profile.profile_id.clone(), profile.clone());
        Ok(true)
    }

    fn find(&self, profile_id: &ProfileId) -> Result<Option<Profile>, StoreError> {
        Ok(self.lock()?.profiles.get(profile_id).cloned())
    }

    fn save(&self, profile: &Profile) -> Result<(), StoreError> {
        self.lock()?.profiles.insert(profile.profile_id.clone(), profile.clone());
        Ok(())
    }

    fn delete(&self, profile_id: &ProfileId) -> Result<bool, StoreError> {
        Ok(self.lock()?.profiles.remove(profile_id).is_some())
    }

    fn list(&self) -> Result<Vec<Profile>, StoreError> {
        Ok(self.lock()?.profiles.values().cloned().collect())
    }

    fn find_parents_except(&self, profile_id: &ProfileId) -> Result<Vec<Profile>, StoreError> {
        Ok(self
            .lock()?
            .profiles
            .values()
            .filter(|profile| {
                profile.hierarchy.is_parent && &profile.profile_id != profile_id
            })
            .cloned()
            .collect())
    }

    fn upsert_device(
        &self,
        profile_id: &ProfileId,
        app_id: &AppId,
        device: &Device,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let profile = inner
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| StoreError::Invalid(format!("profile {profile_id} not found")))?;
        profile.application_data_mut(app_id).upsert_device(device);
        profile.updated_at = Timestamp::now();
        Ok(())
    }

    fn set_trait_value(
        &self,
        profile_id: &ProfileId,
        namespace: TraitNamespace,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let profile = inner
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| StoreError::Invalid(format!("profile {profile_id} not found")))?;
        match namespace {
            TraitNamespace::Traits => {
                profile.traits.insert(field.to_string(), value);
            }
            TraitNamespace::IdentityAttributes => {
                profile.identity_attributes.insert(field.to_string(), value);
            }
            TraitNamespace::ApplicationData => {
                return Err(StoreError::Invalid(
                    "application_data trait writes are not supported".to_string(),
                ));
            }
        }
        profile.updated_at = Timestamp::now();
        Ok(())
    }

    fn merge_identity_attributes(
        &self,
        profile_id: &ProfileId,
        attributes: &BTreeMap<String, Value>,
    ) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        let profile = inner
            .profiles
            .get_mut(profile_id)
            .ok_or_else(|| StoreError::Invalid(format!("profile {profile_id} not found")))?;
        for (name, value) in attributes {
            profile.identity_attributes.insert(name.clone(), value.clone());
        }
        profile.updated_at = Timestamp::now();
        Ok(())
    }
}

impl EventStore for InMemoryStore {
    fn append(&self, event: &Event) -> Result<(), StoreError> {
        self.lock()?.events.push(event.clone());
        Ok(())
    }

    fn find(&self, event_id: &EventId) -> Result<Option<Event>, StoreError> {
        Ok(self.lock()?.events.iter().find(|event| &event.event_id == event_id).cloned())
    }

    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError> {
        Ok(self
            .lock()?
            .events
            .iter()
            .filter(|event| event_matches(event, query))
            .cloned()
            .collect())
    }

    fn delete_for_profile(&self, profile_id: &ProfileId) -> Result<u64, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.events.len();
        inner.events.retain(|event| &event.profile_id != profile_id);
        Ok((before - inner.events.len()) as u64)
    }
}

/// Applies an event query against a single event.
fn event_matches(event: &Event, query: &EventQuery) -> bool {
    if let Some(profile_id) = &query.profile_id {
        if &event.profile_id != profile_id {
            return false;
        }
    }
    if let Some(event_type) = query.event_type {
        if event.event_type != event_type {
            return false;
        }
    }
    if let Some(event_name) = &query.event_name {
        if !event.event_name.eq_ignore_ascii_case(event_name) {
            return false;
        }
    }
    if let Some(since) = query.since {
        if event.event_timestamp < since {
            return false;
        }
    }
    query.clauses.is_empty() || document_matches(&event.to_document(), &query.clauses)
}

impl EnrichmentRuleStore for InMemoryStore {
    fn upsert(&self, rule: &EnrichmentRule) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if let Some(existing) =
            inner.enrichment_rules.iter_mut().find(|entry| entry.rule_id == rule.rule_id)
        {
            *existing = rule.clone();
        } else {
            inner.enrichment_rules.push(rule.clone());
        }
        Ok(())
    }

    fn find(&self, rule_id: &RuleId) -> Result<Option<EnrichmentRule>, StoreError> {
        Ok(self.lock()?.enrichment_rules.iter().find(|rule| &rule.rule_id == rule_id).cloned())
    }

    fn list(&self) -> Result<Vec<EnrichmentRule>, StoreError> {
        Ok(self.lock()?.enrichment_rules.clone())
    }

    fn delete(&self, rule_id: &RuleId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.enrichment_rules.len();
        inner.enrichment_rules.retain(|rule| &rule.rule_id != rule_id);
        Ok(inner.enrichment_rules.len() < before)
    }
}

impl ResolutionRuleStore for InMemoryStore {
    fn upsert(&self, rule: &ResolutionRule) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if let Some(existing) =
            inner.resolution_rules.iter_mut().find(|entry| entry.rule_id == rule.rule_id)
        {
            *existing = rule.clone();
        } else {
            inner.resolution_rules.push(rule.clone());
        }
        Ok(())
    }

    fn find(&self, rule_id: &RuleId) -> Result<Option<ResolutionRule>, StoreError> {
        Ok(self.lock()?.resolution_rules.iter().find(|rule| &rule.rule_id == rule_id).cloned())
    }

    fn list(&self) -> Result<Vec<ResolutionRule>, StoreError> {
        Ok(self.lock()?.resolution_rules.clone())
    }

    fn set_active(&self, rule_id: &RuleId, is_active: bool) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let Some(rule) =
            inner.resolution_rules.iter_mut().find(|rule| &rule.rule_id == rule_id)
        else {
            return Ok(false);
        };
        rule.is_active = is_active;
        rule.updated_at = Timestamp::now();
        Ok(true)
    }

    fn delete(&self, rule_id: &RuleId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.resolution_rules.len();
        inner.resolution_rules.retain(|rule| &rule.rule_id != rule_id);
        Ok(inner.resolution_rules.len() < before)
    }
}

impl EventSchemaStore for InMemoryStore {
    fn upsert(&self, schema: &EventSchema) -> Result<(), StoreError> {
        let mut inner = self.lock()?;
        if let Some(existing) =
            inner.event_schemas.iter_mut().find(|entry| entry.schema_id == schema.schema_id)
        {
            *existing = schema.clone();
        } else {
            inner.event_schemas.push(schema.clone());
        }
        Ok(())
    }

    fn find(&self, schema_id: &SchemaId) -> Result<Option<EventSchema>, StoreError> {
        Ok(self
            .lock()?
            .event_schemas
            .iter()
            .find(|schema| &schema.schema_id == schema_id)
            .cloned())
    }

    fn list(&self) -> Result<Vec<EventSchema>, StoreError> {
        Ok(self.lock()?.event_schemas.clone())
    }

    fn delete(&self, schema_id: &SchemaId) -> Result<bool, StoreError> {
        let mut inner = self.lock()?;
        let before = inner.event_schemas.len();
        inner.event_schemas.retain(|schema| &schema.schema_id != schema_id);
        Ok(inner.event_schemas.len() < before)
    }
}

impl LockStore for InMemoryStore {
    fn try_acquire(
        &self,
        key: &str,
        expires_at_ms: i64,
        now_ms: i64,
    ) -> Result<Option<u64>, StoreError> {
        let mut inner = self.lock()?;
        if let Some(row) = inner.locks.get(key) {
            if row.expires_at_ms > now_ms {
                return Ok(None);
            }
        }
        inner.next_fence += 1;
        let fence = inner.next_fence;
        inner.locks.insert(
            key.to_string(),
            LockRow {
                expires_at_ms,
            },
        );
        Ok(Some(fence))
    }

    fn release(&self, key: &str) -> Result<(), StoreError> {
        self.lock()?.locks.remove(key);
        Ok(())
    }
}
