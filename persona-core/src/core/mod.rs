// persona-core/src/core/mod.rs
// ============================================================================
// Module: Persona Core Types
// Description: Domain model shared by the pipeline, stores, and the server.
// Purpose: Group profile, event, rule, and supporting value types.
// Dependencies: crate::core::{error, event, identifiers, masking, path, profile, rules, time}
// ============================================================================

//! ## Overview
//! Core types are plain serde documents with validation helpers. Behavior
//! lives in `crate::runtime`; persistence contracts live in
//! `crate::interfaces`.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub mod error;
pub mod event;
pub mod identifiers;
pub mod masking;
pub mod path;
pub mod profile;
pub mod rules;
pub mod time;

// ============================================================================
// SECTION: Re-Exports
// ============================================================================

pub use error::ServiceError;
pub use event::Event;
pub use event::EventType;
pub use identifiers::AppId;
pub use identifiers::EventId;
pub use identifiers::OrgId;
pub use identifiers::ProfileId;
pub use identifiers::RuleId;
pub use identifiers::SchemaId;
pub use masking::apply_masking;
pub use path::extract_strings;
pub use path::extract_values;
pub use profile::ApplicationData;
pub use profile::ChildLink;
pub use profile::Device;
pub use profile::Profile;
pub use profile::ProfileHierarchy;
pub use rules::Computation;
pub use rules::Condition;
pub use rules::ConditionOperator;
pub use rules::EnrichmentRule;
pub use rules::EventSchema;
pub use rules::MaskingStrategy;
pub use rules::MergeStrategy;
pub use rules::ResolutionRule;
pub use rules::RuleError;
pub use rules::RuleType;
pub use rules::SchemaProperty;
pub use rules::TraitNamespace;
pub use rules::TraitPath;
pub use rules::Trigger;
pub use rules::ValueType;
pub use time::Timestamp;
