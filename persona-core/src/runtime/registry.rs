// persona-core/src/runtime/registry.rs
// ============================================================================
// Module: Persona Rule Registry
// Description: Cached in-process view over enrichment and resolution rules.
// Purpose: Validate rules on write and serve them cheaply to the engines.
// Dependencies: crate::core, crate::interfaces
// ============================================================================

//! ## Overview
//! The registry validates rules before they reach the store and keeps a
//! cached snapshot of each collection. Writes invalidate the affected cache;
//! reads refresh on demand. The engines fetch through the registry on every
//! event, so the cache keeps rule evaluation off the store's hot path.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;
use std::sync::Mutex;

use crate::core::EnrichmentRule;
use crate::core::EventSchema;
use crate::core::ResolutionRule;
use crate::core::RuleId;
use crate::core::SchemaId;
use crate::core::ServiceError;
use crate::core::Timestamp;
use crate::interfaces::EnrichmentRuleStore;
use crate::interfaces::EventSchemaStore;
use crate::interfaces::ResolutionRuleStore;

// ============================================================================
// SECTION: Registry
// ============================================================================

/// Cached snapshots, rebuilt lazily after invalidation.
#[derive(Default)]
struct RegistryCache {
    /// Enrichment rules snapshot.
    enrichment: Option<Arc<Vec<EnrichmentRule>>>,
    /// Resolution rules snapshot, store order preserved.
    resolution: Option<Arc<Vec<ResolutionRule>>>,
}

/// Rule registry over the rule and schema stores.
#[derive(Clone)]
pub struct RuleRegistry {
    /// Enrichment-rule collection.
    enrichment: Arc<dyn EnrichmentRuleStore>,
    /// Resolution-rule collection.
    resolution: Arc<dyn ResolutionRuleStore>,
    /// Event-schema collection.
    schemas: Arc<dyn EventSchemaStore>,
    /// Cached snapshots guarded by a mutex.
    cache: Arc<Mutex<RegistryCache>>,
}

impl RuleRegistry {
    /// Creates a registry over the given stores.
    #[must_use]
    pub fn new(
        enrichment: Arc<dyn EnrichmentRuleStore>,
        resolution: Arc<dyn ResolutionRuleStore>,
        schemas: Arc<dyn EventSchemaStore>,
    ) -> Self {
        Self {
            enrichment,
            resolution,
            schemas,
            cache: Arc::new(Mutex::new(RegistryCache::default())),
        }
    }

    // ------------------------------------------------------------------
    // Enrichment rules
    // ------------------------------------------------------------------

    /// Returns the enrichment-rule snapshot, refreshing on demand.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the refresh fails.
    pub fn enrichment_rules(&self) -> Result<Arc<Vec<EnrichmentRule>>, ServiceError> {
        let mut cache = self.lock_cache()?;
        if let Some(snapshot) = &cache.enrichment {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(self.enrichment.list()?);
        cache.enrichment = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Loads one enrichment rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the rule does not exist.
    pub fn enrichment_rule(&self, rule_id: &RuleId) -> Result<EnrichmentRule, ServiceError> {
        self.enrichment
            .find(rule_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("enrichment rule {rule_id}")))
    }

    /// Validates and stores a new enrichment rule, assigning an id and
    /// timestamps.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRule`] on validation failure.
    pub fn create_enrichment_rule(
        &self,
        mut rule: EnrichmentRule,
    ) -> Result<EnrichmentRule, ServiceError> {
        rule.validate()?;
        if rule.rule_id.is_empty() {
            rule.rule_id = RuleId::generate();
        }
        let now = Timestamp::now();
        rule.created_at = now;
        rule.updated_at = now;
        self.enrichment.upsert(&rule)?;
        self.invalidate_enrichment()?;
        Ok(rule)
    }

    /// Validates and replaces an existing enrichment rule.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the rule does not exist and
    /// [`ServiceError::InvalidRule`] on validation failure.
    pub fn replace_enrichment_rule(
        &self,
        rule_id: &RuleId,
        mut rule: EnrichmentRule,
    ) -> Result<EnrichmentRule, ServiceError> {
        rule.validate()?;
        let existing = self.enrichment_rule(rule_id)?;
        rule.rule_id = rule_id.clone();
        rule.created_at = existing.created_at;
        rule.updated_at = Timestamp::now();
        self.enrichment.upsert(&rule)?;
        self.invalidate_enrichment()?;
        Ok(rule)
    }

    /// Deletes an enrichment rule.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the rule does not exist.
    pub fn delete_enrichment_rule(&self, rule_id: &RuleId) -> Result<(), ServiceError> {
        if !self.enrichment.delete(rule_id)? {
            return Err(ServiceError::NotFound(format!("enrichment rule {rule_id}")));
        }
        self.invalidate_enrichment()
    }

    // ------------------------------------------------------------------
    // Resolution rules
    // ------------------------------------------------------------------

    /// Returns the resolution-rule snapshot, refreshing on demand.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the refresh fails.
    pub fn resolution_rules(&self) -> Result<Arc<Vec<ResolutionRule>>, ServiceError> {
        let mut cache = self.lock_cache()?;
        if let Some(snapshot) = &cache.resolution {
            return Ok(Arc::clone(snapshot));
        }
        let snapshot = Arc::new(self.resolution.list()?);
        cache.resolution = Some(Arc::clone(&snapshot));
        Ok(snapshot)
    }

    /// Active resolution rules sorted ascending by priority; ties keep store
    /// order.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the refresh fails.
    pub fn active_resolution_rules(&self) -> Result<Vec<ResolutionRule>, ServiceError> {
        let mut rules: Vec<ResolutionRule> = self
            .resolution_rules()?
            .iter()
            .filter(|rule| rule.is_active)
            .cloned()
            .collect();
        rules.sort_by_key(|rule| rule.priority);
        Ok(rules)
    }

    /// Loads one resolution rule by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the rule does not exist.
    pub fn resolution_rule(&self, rule_id: &RuleId) -> Result<ResolutionRule, ServiceError> {
        self.resolution
            .find(rule_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("resolution rule {rule_id}")))
    }

    /// Validates and stores a new resolution rule.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRule`] on validation failure.
    pub fn create_resolution_rule(
        &self,
        mut rule: ResolutionRule,
    ) -> Result<ResolutionRule, ServiceError> {
        rule.validate()?;
        if rule.rule_id.is_empty() {
            rule.rule_id = RuleId::generate();
        }
        let now = Timestamp::now();
        rule.created_at = now;
        rule.updated_at = now;
        self.resolution.upsert(&rule)?;
        self.invalidate_resolution()?;
        Ok(rule)
    }

    /// Toggles `is_active` on a resolution rule; the only patchable field.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the rule does not exist.
    pub fn set_resolution_rule_active(
        &self,
        rule_id: &RuleId,
        is_active: bool,
    ) -> Result<(), ServiceError> {
        if !self.resolution.set_active(rule_id, is_active)? {
            return Err(ServiceError::NotFound(format!("resolution rule {rule_id}")));
        }
        self.invalidate_resolution()
    }

    /// Deletes a resolution rule.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the rule does not exist.
    pub fn delete_resolution_rule(&self, rule_id: &RuleId) -> Result<(), ServiceError> {
        if !self.resolution.delete(rule_id)? {
            return Err(ServiceError::NotFound(format!("resolution rule {rule_id}")));
        }
        self.invalidate_resolution()
    }

    // ------------------------------------------------------------------
    // Event schemas
    // ------------------------------------------------------------------

    /// Lists all event schemas.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when the read fails.
    pub fn event_schemas(&self) -> Result<Vec<EventSchema>, ServiceError> {
        Ok(self.schemas.list()?)
    }

    /// Loads one event schema by id.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the schema does not exist.
    pub fn event_schema(&self, schema_id: &SchemaId) -> Result<EventSchema, ServiceError> {
        self.schemas
            .find(schema_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("event schema {schema_id}")))
    }

    /// Validates and stores a new event schema.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::InvalidRule`] on validation failure.
    pub fn create_event_schema(&self, mut schema: EventSchema) -> Result<EventSchema, ServiceError> {
        schema.validate()?;
        if schema.schema_id.is_empty() {
            schema.schema_id = SchemaId::generate();
        }
        let now = Timestamp::now();
        schema.created_at = now;
        schema.updated_at = now;
        self.schemas.upsert(&schema)?;
        Ok(schema)
    }

    /// Validates and replaces an existing event schema.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the schema does not exist.
    pub fn replace_event_schema(
        &self,
        schema_id: &SchemaId,
        mut schema: EventSchema,
    ) -> Result<EventSchema, ServiceError> {
        schema.validate()?;
        let existing = self.event_schema(schema_id)?;
        schema.schema_id = schema_id.clone();
        schema.created_at = existing.created_at;
        schema.updated_at = Timestamp::now();
        self.schemas.upsert(&schema)?;
        Ok(schema)
    }

    /// Deletes an event schema.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the schema does not exist.
    pub fn delete_event_schema(&self, schema_id: &SchemaId) -> Result<(), ServiceError> {
        if !self.schemas.delete(schema_id)? {
            return Err(ServiceError::NotFound(format!("event schema {schema_id}")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Cache plumbing
    // ------------------------------------------------------------------

    /// Locks the cache, mapping poisoning to an internal error.
    fn lock_cache(&self) -> Result<std::sync::MutexGuard<'_, RegistryCache>, ServiceError> {
        self.cache
            .lock()
            .map_err(|_| ServiceError::Internal("rule registry cache mutex poisoned".to_string()))
    }

    /// Drops the enrichment snapshot.
    fn invalidate_enrichment(&self) -> Result<(), ServiceError> {
        self.lock_cache()?.enrichment = None;
        Ok(())
    }

    /// Drops the resolution snapshot.
    fn invalidate_resolution(&self) -> Result<(), ServiceError> {
        self.lock_cache()?.resolution = None;
        Ok(())
    }
}
