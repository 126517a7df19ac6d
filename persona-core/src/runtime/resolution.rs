// persona-core/src/runtime/resolution.rs
// ============================================================================
// Module: Persona Resolution Engine
// Description: Identity resolution and profile unification.
// Purpose: Merge profiles that match a resolution rule into one hierarchy.
// Dependencies: crate::core, crate::interfaces, crate::runtime::{audit, lock, merge, registry}
// ============================================================================

//! ## Overview
//! After enrichment the engine searches for another parent profile matching
//! any active resolution rule and rewrites the hierarchy on a match. A match
//! against a childless candidate creates a fresh synthetic parent over both
//! profiles; a match against an existing synthetic parent absorbs the
//! incoming profile as a new child; when both sides already own children,
//! the incoming parent's children are folded into the candidate and the
//! incoming parent is deleted. The whole step runs under the unification
//! lock and exits without work when another unifier is in flight.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::sync::Arc;

use serde_json::Value;

use crate::core::extract_strings;
use crate::core::ChildLink;
use crate::core::EnrichmentRule;
use crate::core::Profile;
use crate::core::ProfileHierarchy;
use crate::core::ProfileId;
use crate::core::ResolutionRule;
use crate::core::ServiceError;
use crate::core::Timestamp;
use crate::core::TraitNamespace;
use crate::interfaces::ProfileStore;
use crate::runtime::audit::PipelineAuditEvent;
use crate::runtime::audit::PipelineAuditSink;
use crate::runtime::lock::LockManager;
use crate::runtime::merge::merge_trait_value;
use crate::runtime::registry::RuleRegistry;

// ============================================================================
// SECTION: Resolution Engine
// ============================================================================

/// Identity resolution consumer, invoked after enrichment.
#[derive(Clone)]
pub struct ResolutionEngine {
    /// Profile collection.
    profiles: Arc<dyn ProfileStore>,
    /// Rule registry.
    registry: RuleRegistry,
    /// Lock manager guarding the unification critical section.
    locks: LockManager,
    /// Worker audit sink.
    audit: Arc<dyn PipelineAuditSink>,
}

impl ResolutionEngine {
    /// Creates a resolution engine.
    #[must_use]
    pub fn new(
        profiles: Arc<dyn ProfileStore>,
        registry: RuleRegistry,
        locks: LockManager,
        audit: Arc<dyn PipelineAuditSink>,
    ) -> Self {
        Self {
            profiles,
            registry,
            locks,
            audit,
        }
    }

    /// Attempts to unify the just-enriched profile with another parent.
    /// Returns the surviving parent when a merge happened, `None` otherwise.
    ///
    /// # Errors
    ///
    /// Returns [`ServiceError::Store`] when hierarchy writes fail.
    pub fn unify(&self, profile: &Profile) -> Result<Option<Profile>, ServiceError> {
        let Some(guard) = self.locks.try_acquire_unify(&profile.profile_id)? else {
            // Another unifier is in flight for this profile.
            return Ok(None);
        };
        let outcome = self.unify_locked(profile);
        guard.release()?;
        outcome
    }

    /// Unification body, executed while the unify lock is held.
    fn unify_locked(&self, profile: &Profile) -> Result<Option<Profile>, ServiceError> {
        let rules = self.registry.active_resolution_rules()?;
        if rules.is_empty() {
            return Ok(None);
        }
        let candidates = self.profiles.find_parents_except(&profile.profile_id)?;
        if candidates.is_empty() {
            return Ok(None);
        }
        let trait_rules = self.registry.enrichment_rules()?;

        let document = profile.to_document();
        for rule in &rules {
            for candidate in &candidates {
                if !profiles_match(&candidate.to_document(), &document, rule) {
                    continue;
                }
                let merged = self.merge_profiles(candidate, profile, rule, &trait_rules)?;
                self.audit.record(
                    &PipelineAuditEvent::new("resolution", profile.profile_id.as_str(), "unified")
                        .with_rule(rule.rule_id.as_str())
                        .with_detail(format!(
                            "merged with {} under {}",
                            candidate.profile_id, merged.profile_id
                        )),
                );
                // Stop after the first match.
                return Ok(Some(merged));
            }
        }
        Ok(None)
    }

    /// Executes the hierarchy rewrite for a matched pair.
    fn merge_profiles(
        &self,
        candidate: &Profile,
        profile: &Profile,
        rule: &ResolutionRule,
        trait_rules: &[EnrichmentRule],
    ) -> Result<Profile, ServiceError> {
        let candidate_has_children = !candidate.hierarchy.children.is_empty();
        let profile_has_children = !profile.hierarchy.children.is_empty();

        match (candidate_has_children, profile_has_children) {
            (false, false) => self.create_synthetic_parent(candidate, profile, rule, trait_rules),
            (true, false) => self.absorb_child(candidate, profile, rule, trait_rules),
            (false, true) => self.absorb_child(profile, candidate, rule, trait_rules),
            (true, true) => self.fold_children(candidate, profile, rule, trait_rules),
        }
    }

    /// Case A: neither side owns children. Creates a synthetic parent over
    /// both profiles.
    fn create_synthetic_parent(
        &self,
        candidate: &Profile,
        profile: &Profile,
        rule: &ResolutionRule,
        trait_rules: &[EnrichmentRule],
    ) -> Result<Profile, ServiceError> {
        let now = Timestamp::now();
        let mut parent = merge_profile_fields(candidate, profile, trait_rules);
        parent.profile_id = ProfileId::generate();
        parent.hierarchy = ProfileHierarchy::merged_parent(vec![
            ChildLink {
                child_profile_id: profile.profile_id.clone(),
                rule_name: rule.rule_name.clone(),
            },
            ChildLink {
                child_profile_id: candidate.profile_id.clone(),
                rule_name: rule.rule_name.clone(),
            },
        ]);
        parent.created_at = now;
        parent.updated_at = now;
        self.profiles.save(&parent)?;

        self.repoint_to_parent(profile, &parent.profile_id, now)?;
        self.repoint_to_parent(candidate, &parent.profile_id, now)?;
        Ok(parent)
    }

    /// Case B: `parent` is an existing synthetic parent. Appends `child` to
    /// its children and persists the merged fields onto it.
    fn absorb_child(
        &self,
        parent: &Profile,
        child: &Profile,
        rule: &ResolutionRule,
        trait_rules: &[EnrichmentRule],
    ) -> Result<Profile, ServiceError> {
        let now = Timestamp::now();
        let mut merged = merge_profile_fields(parent, child, trait_rules);
        merged.hierarchy.children.push(ChildLink {
            child_profile_id: child.profile_id.clone(),
            rule_name: rule.rule_name.clone(),
        });
        merged.updated_at = now;
        self.profiles.save(&merged)?;

        self.repoint_to_parent(child, &parent.profile_id, now)?;
        Ok(merged)
    }

    /// Case C: both sides own children. Folds the incoming parent's children
    /// into the candidate and deletes the incoming parent.
    fn fold_children(
        &self,
        candidate: &Profile,
        profile: &Profile,
        rule: &ResolutionRule,
        trait_rules: &[EnrichmentRule],
    ) -> Result<Profile, ServiceError> {
        let now = Timestamp::now();
        let mut merged = merge_profile_fields(candidate, profile, trait_rules);
        for link in &profile.hierarchy.children {
            if let Some(child) = self.profiles.find(&link.child_profile_id)? {
                self.repoint_to_parent(&child, &candidate.profile_id, now)?;
            }
            merged.hierarchy.children.push(ChildLink {
                child_profile_id: link.child_profile_id.clone(),
                rule_name: rule.rule_name.clone(),
            });
        }
        merged.updated_at = now;
        self.profiles.save(&merged)?;
        self.profiles.delete(&profile.profile_id)?;
        Ok(merged)
    }

    /// Rewrites a profile into a child of `parent_id`.
    fn repoint_to_parent(
        &self,
        profile: &Profile,
        parent_id: &ProfileId,
        now: Timestamp,
    ) -> Result<(), ServiceError> {
        let mut child = profile.clone();
        child.hierarchy = ProfileHierarchy::child_of(parent_id.clone());
        child.updated_at = now;
        self.profiles.save(&child)?;
        Ok(())
    }
}

// ============================================================================
// SECTION: Matching
// ============================================================================

/// Returns whether two profile documents share a string value at the rule's
/// attribute path. The set-intersection check is symmetric, so the outcome
/// does not depend on which side was enriched last.
#[must_use]
pub fn profiles_match(candidate: &Value, profile: &Value, rule: &ResolutionRule) -> bool {
    let candidate_values = extract_strings(candidate, &rule.attribute);
    if candidate_values.is_empty() {
        return false;
    }
    let profile_values = extract_strings(profile, &rule.attribute);
    profile_values.iter().any(|value| candidate_values.contains(value))
}

// ============================================================================
// SECTION: Field Merging
// ============================================================================

/// Merges `incoming` into `existing` field by field: rule-driven merges for
/// traits and identity attributes named by the enrichment-rule table,
/// fill-missing union for the remaining attributes, and device-list union
/// within application data.
#[must_use]
pub fn merge_profile_fields(
    existing: &Profile,
    incoming: &Profile,
    trait_rules: &[EnrichmentRule],
) -> Profile {
    let mut merged = existing.clone();

    // Rule-driven merges take their strategy from the enrichment rule that
    // owns the trait.
    for rule in trait_rules {
        let Ok(path) = rule.trait_path() else {
            continue;
        };
        let (existing_map, incoming_map) = match path.namespace {
            TraitNamespace::Traits => (&merged.traits, &incoming.traits),
            TraitNamespace::IdentityAttributes => {
                (&merged.identity_attributes, &incoming.identity_attributes)
            }
            TraitNamespace::ApplicationData => continue,
        };
        let Some(incoming_value) = incoming_map.get(&path.field).cloned() else {
            continue;
        };
        let value = merge_trait_value(
            existing_map.get(&path.field),
            incoming_value,
            rule.merge_strategy,
            rule.value_type,
        );
        match path.namespace {
            TraitNamespace::Traits => {
                merged.traits.insert(path.field, value);
            }
            TraitNamespace::IdentityAttributes => {
                merged.identity_attributes.insert(path.field, value);
            }
            TraitNamespace::ApplicationData => {}
        }
    }

    // Attributes without a governing rule fill missing slots only.
    for (name, value) in &incoming.identity_attributes {
        merged
            .identity_attributes
            .entry(name.clone())
            .or_insert_with(|| value.clone());
    }
    for (name, value) in &incoming.traits {
        merged.traits.entry(name.clone()).or_insert_with(|| value.clone());
    }

    // Application data unions by app id, devices by device id.
    for data in &incoming.application_data {
        let target = merged.application_data_mut(&data.app_id);
        for device in &data.devices {
            target.upsert_device(device);
        }
        for (name, value) in &data.app_specific_data {
            target
                .app_specific_data
                .entry(name.clone())
                .or_insert_with(|| value.clone());
        }
    }

    merged
}
