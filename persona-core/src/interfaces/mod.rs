// persona-core/src/interfaces/mod.rs
// ============================================================================
// Module: Persona Store Interfaces
// Description: Backend-agnostic persistence and lock contracts.
// Purpose: Define the document-store surface the pipeline depends on.
// Dependencies: crate::core, serde, thiserror
// ============================================================================

//! ## Overview
//! The store holds four logical collections (profiles, events, enrichment
//! rules, resolution rules) plus event schemas and the persisted lock table.
//! Implementations must provide atomic upsert, positional device update, and
//! filtered find. The pipeline owns correctness above these contracts: all
//! profile writes flow through the lock manager, so stores only need
//! per-operation atomicity.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::AppId;
use crate::core::ConditionOperator;
use crate::core::Device;
use crate::core::EnrichmentRule;
use crate::core::Event;
use crate::core::EventId;
use crate::core::EventSchema;
use crate::core::EventType;
use crate::core::Profile;
use crate::core::ProfileId;
use crate::core::ResolutionRule;
use crate::core::RuleId;
use crate::core::SchemaId;
use crate::core::Timestamp;
use crate::core::TraitNamespace;

// ============================================================================
// SECTION: Store Errors
// ============================================================================

/// Store errors shared by every backend.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Store I/O error.
    #[error("store io error: {0}")]
    Io(String),
    /// Store data is corrupted or fails to deserialize.
    #[error("store corruption: {0}")]
    Corrupt(String),
    /// Store data is invalid.
    #[error("store invalid data: {0}")]
    Invalid(String),
    /// Store engine reported an error.
    #[error("store error: {0}")]
    Store(String),
}

// ============================================================================
// SECTION: Filters
// ============================================================================

/// Single filter clause evaluated against a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FilterClause {
    /// Dotted field path within the document.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Expected value, coerced by the caller.
    pub value: Value,
}

/// Query over the event log.
#[derive(Debug, Clone, Default)]
pub struct EventQuery {
    /// Restrict to a single profile.
    pub profile_id: Option<ProfileId>,
    /// Restrict to an event type.
    pub event_type: Option<EventType>,
    /// Restrict to an event name (stored lowercase).
    pub event_name: Option<String>,
    /// Only events at or after this timestamp.
    pub since: Option<Timestamp>,
    /// Additional document filter clauses.
    pub clauses: Vec<FilterClause>,
}

// ============================================================================
// SECTION: Profile Store
// ============================================================================

/// Profile collection contract.
pub trait ProfileStore: Send + Sync {
    /// Inserts the profile only when no document exists for its id.
    /// Returns whether an insert happened.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn insert_if_absent(&self, profile: &Profile) -> Result<bool, StoreError>;

    /// Loads a profile by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find(&self, profile_id: &ProfileId) -> Result<Option<Profile>, StoreError>;

    /// Upserts the full profile document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn save(&self, profile: &Profile) -> Result<(), StoreError>;

    /// Deletes a profile. Returns whether a document was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete(&self, profile_id: &ProfileId) -> Result<bool, StoreError>;

    /// Lists all profiles.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list(&self) -> Result<Vec<Profile>, StoreError>;

    /// Lists parent profiles excluding the given id; the resolution
    /// candidate set.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find_parents_except(&self, profile_id: &ProfileId) -> Result<Vec<Profile>, StoreError>;

    /// Positional device update: merges the device into
    /// `application_data[app_id].devices` by `device_id`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the profile is missing or the write fails.
    fn upsert_device(
        &self,
        profile_id: &ProfileId,
        app_id: &AppId,
        device: &Device,
    ) -> Result<(), StoreError>;

    /// Writes a single trait value under the namespace field.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the profile is missing or the write fails.
    fn set_trait_value(
        &self,
        profile_id: &ProfileId,
        namespace: TraitNamespace,
        field: &str,
        value: Value,
    ) -> Result<(), StoreError>;

    /// Merges the attribute map into `identity_attributes`, incoming wins.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the profile is missing or the write fails.
    fn merge_identity_attributes(
        &self,
        profile_id: &ProfileId,
        attributes: &BTreeMap<String, Value>,
    ) -> Result<(), StoreError>;
}

// ============================================================================
// SECTION: Event Store
// ============================================================================

/// Append-only event log contract.
pub trait EventStore: Send + Sync {
    /// Appends one event. Stored events are never updated.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn append(&self, event: &Event) -> Result<(), StoreError>;

    /// Loads one event by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find(&self, event_id: &EventId) -> Result<Option<Event>, StoreError>;

    /// Filtered find over the event log.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn query(&self, query: &EventQuery) -> Result<Vec<Event>, StoreError>;

    /// Deletes all events for a profile; part of the delete cascade.
    /// Returns the number of removed events.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete_for_profile(&self, profile_id: &ProfileId) -> Result<u64, StoreError>;
}

// ============================================================================
// SECTION: Rule Stores
// ============================================================================

/// Enrichment-rule collection contract.
pub trait EnrichmentRuleStore: Send + Sync {
    /// Inserts or replaces a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert(&self, rule: &EnrichmentRule) -> Result<(), StoreError>;

    /// Loads one rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find(&self, rule_id: &RuleId) -> Result<Option<EnrichmentRule>, StoreError>;

    /// Lists all rules in insertion order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list(&self) -> Result<Vec<EnrichmentRule>, StoreError>;

    /// Deletes a rule. Returns whether a rule was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete(&self, rule_id: &RuleId) -> Result<bool, StoreError>;
}

/// Resolution-rule collection contract.
pub trait ResolutionRuleStore: Send + Sync {
    /// Inserts or replaces a rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert(&self, rule: &ResolutionRule) -> Result<(), StoreError>;

    /// Loads one rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find(&self, rule_id: &RuleId) -> Result<Option<ResolutionRule>, StoreError>;

    /// Lists all rules in insertion order; ties between equal priorities are
    /// broken by this order.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list(&self) -> Result<Vec<ResolutionRule>, StoreError>;

    /// Toggles `is_active`. Returns whether the rule exists.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn set_active(&self, rule_id: &RuleId, is_active: bool) -> Result<bool, StoreError>;

    /// Deletes a rule. Returns whether a rule was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete(&self, rule_id: &RuleId) -> Result<bool, StoreError>;
}

/// Event-schema collection contract.
pub trait EventSchemaStore: Send + Sync {
    /// Inserts or replaces a schema by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn upsert(&self, schema: &EventSchema) -> Result<(), StoreError>;

    /// Loads one schema by id.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn find(&self, schema_id: &SchemaId) -> Result<Option<EventSchema>, StoreError>;

    /// Lists all schemas.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the read fails.
    fn list(&self) -> Result<Vec<EventSchema>, StoreError>;

    /// Deletes a schema. Returns whether a schema was removed.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the delete fails.
    fn delete(&self, schema_id: &SchemaId) -> Result<bool, StoreError>;
}

// ============================================================================
// SECTION: Lock Store
// ============================================================================

/// Persisted advisory lock contract.
///
/// Acquisition is a conditional upsert that succeeds only when no live lock
/// holds the key; a lock whose expiry has passed is free. Fences increase
/// monotonically per store.
pub trait LockStore: Send + Sync {
    /// Attempts to acquire the named lock until `expires_at_ms`. Returns the
    /// fence token on success and `None` when the lock is held.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn try_acquire(
        &self,
        key: &str,
        expires_at_ms: i64,
        now_ms: i64,
    ) -> Result<Option<u64>, StoreError>;

    /// Releases the named lock. Idempotent: releasing a free lock succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] when the write fails.
    fn release(&self, key: &str) -> Result<(), StoreError>;
}
