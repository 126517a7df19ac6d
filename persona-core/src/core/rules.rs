// persona-core/src/core/rules.rs
// ============================================================================
// Module: Persona Rule Definitions
// Description: Enrichment rules, resolution rules, and event schemas.
// Purpose: Define the declarative rule surface with write-time validation.
// Dependencies: crate::core::{event, identifiers, time}, serde, thiserror
// ============================================================================

//! ## Overview
//! Enrichment rules transform matching events into trait writes; resolution
//! rules declare the attribute-equality predicates that drive profile
//! unification. Rules are validated when written so the engines can trust the
//! stored shape: a static rule always carries a value, a copy computation
//! always has exactly one source field, and every condition operator is known.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

use crate::core::event::EventType;
use crate::core::identifiers::RuleId;
use crate::core::identifiers::SchemaId;
use crate::core::time::Timestamp;

// ============================================================================
// SECTION: Rule Errors
// ============================================================================

/// Validation failures for stored rules.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RuleError {
    /// A required field is missing or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// Source-field arity does not fit the computation.
    #[error("computation {computation} requires {expected}, got {actual} source fields")]
    SourceFieldArity {
        /// Computation being validated.
        computation: Computation,
        /// Human-readable arity requirement.
        expected: &'static str,
        /// Number of source fields supplied.
        actual: usize,
    },
    /// The trait name is not a `namespace.field` path.
    #[error("invalid trait name: {0}")]
    InvalidTraitName(String),
    /// A computed rule needs a computation and a count needs a time range.
    #[error("invalid computation: {0}")]
    InvalidComputation(String),
    /// Masking was required without a strategy.
    #[error("masking_required set without masking_strategy")]
    MissingMaskingStrategy,
}

// ============================================================================
// SECTION: Conditions
// ============================================================================

/// Condition operators over event properties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    /// String-formatted equality.
    Equals,
    /// String-formatted inequality.
    NotEquals,
    /// Value is present and renders non-empty.
    Exists,
    /// Value is absent or renders empty.
    NotExists,
    /// Substring match over string values.
    Contains,
    /// Negated substring match over string values.
    NotContains,
    /// Numeric strictly-greater comparison.
    GreaterThan,
    /// Numeric greater-or-equal comparison.
    GreaterThanEquals,
    /// Numeric strictly-less comparison.
    LessThan,
    /// Numeric less-or-equal comparison.
    LessThanEquals,
}

impl ConditionOperator {
    /// Returns the canonical snake_case name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Equals => "equals",
            Self::NotEquals => "not_equals",
            Self::Exists => "exists",
            Self::NotExists => "not_exists",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::GreaterThan => "greater_than",
            Self::GreaterThanEquals => "greater_than_equals",
            Self::LessThan => "less_than",
            Self::LessThanEquals => "less_than_equals",
        }
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConditionOperator {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "equals" => Ok(Self::Equals),
            "not_equals" => Ok(Self::NotEquals),
            "exists" => Ok(Self::Exists),
            "not_exists" => Ok(Self::NotExists),
            "contains" => Ok(Self::Contains),
            "not_contains" => Ok(Self::NotContains),
            "greater_than" => Ok(Self::GreaterThan),
            "greater_than_equals" => Ok(Self::GreaterThanEquals),
            "less_than" => Ok(Self::LessThan),
            "less_than_equals" => Ok(Self::LessThanEquals),
            other => Err(format!("unknown operator: {other}")),
        }
    }
}

/// Single trigger condition over an event property.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    /// Property name, shallow lookup in `event.properties`.
    pub field: String,
    /// Comparison operator.
    pub operator: ConditionOperator,
    /// Expected value rendered as a string.
    #[serde(default)]
    pub value: String,
}

/// Event trigger for an enrichment rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Trigger {
    /// Event type the rule fires on.
    pub event_type: EventType,
    /// Event name the rule fires on, matched case-insensitively.
    pub event_name: String,
    /// Conditions combined with AND; an empty list always passes.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

impl Trigger {
    /// Returns whether the trigger matches the event type and name.
    #[must_use]
    pub fn matches(&self, event_type: EventType, event_name: &str) -> bool {
        self.event_type == event_type && self.event_name.eq_ignore_ascii_case(event_name)
    }
}

// ============================================================================
// SECTION: Enrichment Rule Vocabulary
// ============================================================================

/// Rule classification: fixed value or computed from the event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    /// Writes the rule's literal value.
    Static,
    /// Computes the value from the event or the event log.
    Computed,
}

/// Computation applied by computed rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Computation {
    /// Copies a single source field from the event.
    Copy,
    /// Concatenates two or more source fields without a separator.
    Concat,
    /// Counts matching events within a trailing time window.
    Count,
}

impl fmt::Display for Computation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Copy => "copy",
            Self::Concat => "concat",
            Self::Count => "count",
        };
        f.write_str(name)
    }
}

/// Declared value type of a trait; authoritative coercion hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ValueType {
    /// UTF-8 string.
    #[serde(rename = "string")]
    String,
    /// Signed integer.
    #[serde(rename = "int")]
    Int,
    /// Boolean.
    #[serde(rename = "boolean")]
    Boolean,
    /// Epoch-second date.
    #[serde(rename = "date")]
    Date,
    /// List of strings.
    #[serde(rename = "arrayOfString")]
    ArrayOfString,
    /// List of integers.
    #[serde(rename = "arrayOfInt")]
    ArrayOfInt,
}

/// Strategy for reconciling an incoming trait value with the stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Incoming wins unless it is nil or an empty string.
    Overwrite,
    /// Union for array types, overwrite otherwise.
    Combine,
    /// Existing wins when present.
    Ignore,
}

/// Masking applied to string results before the merge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaskingStrategy {
    /// Keep the first and last two characters.
    Partial,
    /// Hex-encoded SHA-256.
    Hash,
    /// Replace with the literal `REDACTED`.
    Redact,
}

// ============================================================================
// SECTION: Trait Paths
// ============================================================================

/// Profile namespaces addressable by enrichment rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraitNamespace {
    /// Rule-populated traits map.
    Traits,
    /// Identity attributes map.
    IdentityAttributes,
    /// Per-application data records. Writes to this namespace are accepted
    /// but skipped by the engine; see DESIGN.md.
    ApplicationData,
}

/// Parsed `namespace.field` trait destination.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraitPath {
    /// Destination namespace.
    pub namespace: TraitNamespace,
    /// Field name within the namespace.
    pub field: String,
}

impl TraitPath {
    /// Parses a dotted `namespace.field` trait name.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidTraitName`] when the path has no dot, an
    /// empty field, or an unknown namespace.
    pub fn parse(trait_name: &str) -> Result<Self, RuleError> {
        let (namespace, field) = trait_name
            .split_once('.')
            .ok_or_else(|| RuleError::InvalidTraitName(trait_name.to_string()))?;
        if field.is_empty() {
            return Err(RuleError::InvalidTraitName(trait_name.to_string()));
        }
        let namespace = match namespace {
            "traits" => TraitNamespace::Traits,
            "identity_attributes" => TraitNamespace::IdentityAttributes,
            "application_data" => TraitNamespace::ApplicationData,
            _ => return Err(RuleError::InvalidTraitName(trait_name.to_string())),
        };
        Ok(Self {
            namespace,
            field: field.to_string(),
        })
    }
}

// ============================================================================
// SECTION: Enrichment Rule
// ============================================================================

/// Declarative transformer: on event match, compute and write a trait.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichmentRule {
    /// Rule identifier.
    #[serde(default)]
    pub rule_id: RuleId,
    /// Destination as a dotted `namespace.field` path.
    pub trait_name: String,
    /// Static or computed.
    pub rule_type: RuleType,
    /// Literal value for static rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    /// Declared value type of the trait.
    pub value_type: ValueType,
    /// Computation for computed rules.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub computation: Option<Computation>,
    /// Event property names feeding the computation.
    #[serde(default)]
    pub source_fields: Vec<String>,
    /// Trailing window in seconds for count computations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time_range: Option<i64>,
    /// Merge strategy against the stored trait value.
    pub merge_strategy: MergeStrategy,
    /// Whether string results are masked before merging.
    #[serde(default)]
    pub masking_required: bool,
    /// Masking strategy when masking is required.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub masking_strategy: Option<MaskingStrategy>,
    /// Event trigger.
    pub trigger: Trigger,
    /// Creation time in epoch seconds.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Last update time in epoch seconds.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl EnrichmentRule {
    /// Validates the rule shape for storage.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] describing the first violated constraint.
    pub fn validate(&self) -> Result<(), RuleError> {
        TraitPath::parse(&self.trait_name)?;
        if self.trigger.event_name.is_empty() {
            return Err(RuleError::MissingField("trigger.event_name"));
        }
        match self.rule_type {
            RuleType::Static => {
                if self.value.is_none() {
                    return Err(RuleError::MissingField("value"));
                }
            }
            RuleType::Computed => {
                let computation = self.computation.ok_or_else(|| {
                    RuleError::InvalidComputation("computed rule without computation".to_string())
                })?;
                match computation {
                    Computation::Copy => {
                        if self.source_fields.len() != 1 {
                            return Err(RuleError::SourceFieldArity {
                                computation,
                                expected: "exactly one",
                                actual: self.source_fields.len(),
                            });
                        }
                    }
                    Computation::Concat => {
                        if self.source_fields.len() < 2 {
                            return Err(RuleError::SourceFieldArity {
                                computation,
                                expected: "at least two",
                                actual: self.source_fields.len(),
                            });
                        }
                    }
                    Computation::Count => {
                        if self.time_range.is_none() {
                            return Err(RuleError::InvalidComputation(
                                "count requires time_range".to_string(),
                            ));
                        }
                    }
                }
            }
        }
        if self.masking_required && self.masking_strategy.is_none() {
            return Err(RuleError::MissingMaskingStrategy);
        }
        Ok(())
    }

    /// Parses the rule's destination trait path. Valid for stored rules by
    /// construction.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError::InvalidTraitName`] when the stored path is
    /// malformed.
    pub fn trait_path(&self) -> Result<TraitPath, RuleError> {
        TraitPath::parse(&self.trait_name)
    }
}

// ============================================================================
// SECTION: Resolution Rule
// ============================================================================

/// Declarative attribute-equality predicate driving unification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResolutionRule {
    /// Rule identifier.
    #[serde(default)]
    pub rule_id: RuleId,
    /// Display name recorded on hierarchy links.
    pub rule_name: String,
    /// Dotted path into the profile document.
    pub attribute: String,
    /// Priority, 0 is highest.
    pub priority: u32,
    /// Whether the rule participates in resolution.
    pub is_active: bool,
    /// Creation time in epoch seconds.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Last update time in epoch seconds.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl ResolutionRule {
    /// Validates the rule shape for storage.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the name or attribute is missing.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.rule_name.is_empty() {
            return Err(RuleError::MissingField("rule_name"));
        }
        if self.attribute.is_empty() {
            return Err(RuleError::MissingField("attribute"));
        }
        Ok(())
    }
}

// ============================================================================
// SECTION: Event Schema
// ============================================================================

/// Declared property of an event schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaProperty {
    /// Property name.
    pub name: String,
    /// Declared property type.
    pub property_type: String,
}

/// Stored event schema. Served over CRUD; never enforced on the ingest path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventSchema {
    /// Schema identifier.
    #[serde(default)]
    pub schema_id: SchemaId,
    /// Event type the schema describes.
    pub event_type: EventType,
    /// Event name the schema describes.
    pub event_name: String,
    /// Declared properties.
    #[serde(default)]
    pub properties: Vec<SchemaProperty>,
    /// Creation time in epoch seconds.
    #[serde(default)]
    pub created_at: Timestamp,
    /// Last update time in epoch seconds.
    #[serde(default)]
    pub updated_at: Timestamp,
}

impl EventSchema {
    /// Validates the schema shape for storage.
    ///
    /// # Errors
    ///
    /// Returns [`RuleError`] when the event name is missing or a property is
    /// incomplete.
    pub fn validate(&self) -> Result<(), RuleError> {
        if self.event_name.is_empty() {
            return Err(RuleError::MissingField("event_name"));
        }
        for property in &self.properties {
            if property.name.is_empty() || property.property_type.is_empty() {
                return Err(RuleError::MissingField("properties"));
            }
        }
        Ok(())
    }
}
