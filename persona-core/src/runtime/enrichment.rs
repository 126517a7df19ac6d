// persona-core/src/runtime/enrichment.rs
// ============================================================================
// Module: Persona Enrichment Engine
// Description: Rule-driven profile enrichment from admitted events.
// Purpose: Apply device capture, schema rules, and identity extraction.
// Dependencies: crate::core, crate::interfaces, crate::runtime::{audit, condition, merge, registry}
// ============================================================================

//! ## Overview
//! For each dequeued event the engine runs three phases against the
//! effective parent of the event's profile: device capture from event
//! context, evaluation of every matching enrichment rule (value computation,
//! masking, typed merge, trait write), and identity extraction for identify
//! events. A single rule failure is logged and skipped; the event is never
//! requeued, so rule effects are at-most-once per event.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

use crate::core::apply_masking;
use crate::core::Computation;
use crate::core::Device;
use crate::core::EnrichmentRule;
use crate::core::Event;
use crate::core::EventType;
use crate::core::Profile;
use crate::core::ProfileId;
use crate::core::RuleType;
use crate::core::ServiceError;
use crate::core::Timestamp;
use crate::core::TraitNamespace;
use crate::interfaces::EventQuery;
use crate::interfaces::EventStore;
use crate::interfaces::ProfileStore;
use crate::runtime::audit::PipelineAuditEvent;
use crate::runtime::audit::PipelineAuditSink;
use crate::runtime::condition::evaluate_conditions;
use crate::runtime::merge::merge_trait_value;
use crate::runtime::registry::RuleRegistry;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// Attempts when waiting for the event's profile to appear.
const PROFILE_WAIT_ATTEMPTS: u32 = 5;
/// Delay between profile wait attempts.
const PROFILE_WAIT_DELAY: Duration = Duration::from_millis(100);

/// Identity properties copied from identify events.
const IDENTITY_WHITELIST: [&str; 6] =
    ["email", "user_name", "first_name", "last_name", "user_id", "phone_number"];

// ============================================================================
// SECTION: Enrichment Engine
// ============================================================================

/// Rule-driven enrichment consumer.
#[derive(Clone)]
pub struct EnrichmentEngine {
    /// Profile collection.
    profiles: Arc<dyn ProfileStore>,
    /// Event log, queried by count computations.
    events: Arc<dyn EventStore>,
    /// Rule registry.
    registry: RuleRegistry,
    /// Worker audit sink.
    audit: Arc<dyn PipelineAuditSink>,
}

impl EnrichmentEngine {
    /// Creates an enrichment engine.
    #[must_use]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        events: Arc<dyn EventStore>,
        registry: RuleRegistry,
        audit: Arc<dyn PipelineAuditSink>,
    ) -> Self {
        Self {
            profiles,
            events,
            registry,
            audit,
        }
    }

    /// Enriches the effective parent of the event's profile and returns it
    /// for the resolution engine.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::NotFound`] when the profile never becomes
    /// visible and [`ServiceError::Store`] when a phase write fails. Rule
    /// failures inside phase B are logged and skipped instead.
    pub async fn process(&self, event: &Event) -> Result<Profile, ServiceError> {
        let profile = self
            .wait_for_profile(&event.profile_id)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {}", event.profile_id)))?;
        let target_id = profile.effective_parent_id();

        self.capture_device(event, &target_id)?;
        let mut target = self
            .profiles
            .find(&target_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {target_id}")))?;
        self.apply_rules(event, &mut target)?;
        self.extract_identity(event, &target_id)?;

        self.profiles
            .find(&target_id)?
            .ok_or_else(|| ServiceError::NotFound(format!("profile {target_id}")))
    }

    // ------------------------------------------------------------------
    // Phase A: device capture
    // ------------------------------------------------------------------

    /// Merges the context device into the effective parent, keyed by
    /// `device_id` with last-write-wins per field.
    fn capture_device(&self, event: &Event, target_id: &ProfileId) -> Result<(), ServiceError> {
        let Some(device) = Device::from_context(&event.context, event.event_timestamp) else {
            return Ok(());
        };
        self.profiles.upsert_device(target_id, &event.app_id, &device)?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Phase B: rule evaluation
    // ------------------------------------------------------------------

    /// Evaluates every enrichment rule whose trigger matches the event.
    fn apply_rules(&self, event: &Event, target: &mut Profile) -> Result<(), ServiceError> {
        let rules = self.registry.enrichment_rules()?;
        for rule in rules.iter() {
            if !rule.trigger.matches(event.event_type, &event.event_name) {
                continue;
            }
            if !evaluate_conditions(event, &rule.trigger.conditions) {
                continue;
            }
            if let Err(error) = self.apply_rule(event, rule, target) {
                self.audit.record(
                    &PipelineAuditEvent::new("enrichment", target.profile_id.as_str(), "rule_skipped")
                        .with_event(event.event_id.as_str())
                        .with_rule(rule.rule_id.as_str())
                        .with_detail(error.to_string()),
                );
            }
        }
        Ok(())
    }

    /// Computes, masks, merges, and writes one rule's trait value.
    fn apply_rule(
        &self,
        event: &Event,
        rule: &EnrichmentRule,
        target: &mut Profile,
    ) -> Result<(), ServiceError> {
        let path = rule.trait_path()?;
        if path.namespace == TraitNamespace::ApplicationData {
            // Semantics for application_data trait writes are unspecified.
            return Err(ServiceError::InvalidRule(
                "application_data trait writes are skipped".to_string(),
            ));
        }

        let Some(mut value) = self.compute_value(event, rule, &target.profile_id)? else {
            return Ok(());
        };
        if rule.masking_required {
            if let (Value::String(text), Some(strategy)) = (&value, rule.masking_strategy) {
                value = Value::String(apply_masking(text, strategy));
            }
        }

        let existing = match path.namespace {
            TraitNamespace::Traits => target.traits.get(&path.field),
            TraitNamespace::IdentityAttributes => target.identity_attributes.get(&path.field),
            TraitNamespace::ApplicationData => None,
        };
        let merged = merge_trait_value(existing, value, rule.merge_strategy, rule.value_type);

        self.profiles.set_trait_value(&target.profile_id, path.namespace, &path.field, merged.clone())?;
        // Keep the local copy current so later rules see this write.
        match path.namespace {
            TraitNamespace::Traits => {
                target.traits.insert(path.field, merged);
            }
            TraitNamespace::IdentityAttributes => {
                target.identity_attributes.insert(path.field, merged);
            }
            TraitNamespace::ApplicationData => {}
        }
        Ok(())
    }

    /// Computes the rule value; `None` means nothing to write.
    fn compute_value(
        &self,
        event: &Event,
        rule: &EnrichmentRule,
        target_id: &ProfileId,
    ) -> Result<Option<Value>, ServiceError> {
        match rule.rule_type {
            RuleType::Static => Ok(rule.value.clone()),
            RuleType::Computed => {
                let computation = rule.computation.ok_or_else(|| {
                    ServiceError::InvalidRule("computed rule without computation".to_string())
                })?;
                match computation {
                    Computation::Copy => {
                        let [field] = rule.source_fields.as_slice() else {
                            return Err(ServiceError::InvalidRule(
                                "copy requires exactly one source field".to_string(),
                            ));
                        };
                        Ok(event.property(field).cloned())
                    }
                    Computation::Concat => {
                        if rule.source_fields.len() < 2 {
                            return Err(ServiceError::InvalidRule(
                                "concat requires at least two source fields".to_string(),
                            ));
                        }
                        let mut parts = String::new();
                        for field in &rule.source_fields {
                            match event.property(field) {
                                None | Some(Value::Null) => {}
                                Some(Value::String(text)) => parts.push_str(text),
                                Some(other) => parts.push_str(&other.to_string()),
                            }
                        }
                        if parts.is_empty() {
                            Ok(None)
                        } else {
                            Ok(Some(Value::String(parts)))
                        }
                    }
                    Computation::Count => {
                        let count = self.count_matching_events(rule, target_id)?;
                        Ok(Some(Value::from(count)))
                    }
                }
            }
        }
    }

    /// Counts events for the target profile matching the rule trigger within
    /// the trailing time window, re-evaluating conditions per event.
    fn count_matching_events(
        &self,
        rule: &EnrichmentRule,
        target_id: &ProfileId,
    ) -> Result<u64, ServiceError> {
        let window = rule.time_range.ok_or_else(|| {
            ServiceError::InvalidRule("count requires time_range".to_string())
        })?;
        let query = EventQuery {
            profile_id: Some(target_id.clone()),
            event_type: Some(rule.trigger.event_type),
            event_name: Some(rule.trigger.event_name.to_ascii_lowercase()),
            since: Some(Timestamp::now().minus_secs(window)),
            clauses: Vec::new(),
        };
        let events = self.events.query(&query)?;
        let count = events
            .iter()
            .filter(|candidate| evaluate_conditions(candidate, &rule.trigger.conditions))
            .count();
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Phase C: identity extraction
    // ------------------------------------------------------------------

    /// Copies whitelisted non-empty string properties of identify events into
    /// the effective parent's identity attributes.
    fn extract_identity(&self, event: &Event, target_id: &ProfileId) -> Result<(), ServiceError> {
        if event.event_type != EventType::Identify {
            return Ok(());
        }
        let mut attributes = BTreeMap::new();
        for name in IDENTITY_WHITELIST {
            if let Some(Value::String(text)) = event.property(name) {
                if !text.is_empty() {
                    attributes.insert(name.to_string(), Value::String(text.clone()));
                }
            }
        }
        if attributes.is_empty() {
            return Ok(());
        }
        self.profiles.merge_identity_attributes(target_id, &attributes)?;
        Ok(())
    }

    /// Bounded poll for the event's profile, tolerating ingestion races.
    async fn wait_for_profile(
        &self,
        profile_id: &ProfileId,
    ) -> Result<Option<Profile>, ServiceError> {
        for attempt in 0..PROFILE_WAIT_ATTEMPTS {
            if attempt > 0 {
                tokio::time::sleep(PROFILE_WAIT_DELAY).await;
            }
            if let Some(profile) = self.profiles.find(profile_id)? {
                return Ok(Some(profile));
            }
        }
        Ok(None)
    }
}
