// persona-core/src/runtime/merge.rs
// ============================================================================
// Module: Persona Trait Merging
// Description: Typed merge strategies for trait values.
// Purpose: Reconcile incoming trait values with stored ones.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Merge laws: `overwrite` keeps the existing value when the incoming one is
//! nil or an empty string; `ignore` keeps the existing value whenever one is
//! present; `combine` unions array types preserving first-seen order and
//! falls back to overwrite for scalars. Array union is commutative up to
//! ordering and idempotent under set equality.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::MergeStrategy;
use crate::core::ValueType;

// ============================================================================
// SECTION: Merge
// ============================================================================

/// Merges an incoming trait value with the stored one.
#[must_use]
pub fn merge_trait_value(
    existing: Option<&Value>,
    incoming: Value,
    strategy: MergeStrategy,
    value_type: ValueType,
) -> Value {
    match strategy {
        MergeStrategy::Overwrite => {
            if is_empty(&incoming) {
                existing.cloned().unwrap_or(incoming)
            } else {
                incoming
            }
        }
        MergeStrategy::Ignore => match existing {
            Some(value) if !value.is_null() => value.clone(),
            _ => incoming,
        },
        MergeStrategy::Combine => match value_type {
            ValueType::ArrayOfString => {
                let mut merged = to_string_vec(existing);
                for item in to_string_vec(Some(&incoming)) {
                    if !merged.contains(&item) {
                        merged.push(item);
                    }
                }
                Value::from(merged)
            }
            ValueType::ArrayOfInt => {
                let mut merged = to_int_vec(existing);
                for item in to_int_vec(Some(&incoming)) {
                    if !merged.contains(&item) {
                        merged.push(item);
                    }
                }
                Value::from(merged)
            }
            _ => incoming,
        },
    }
}

/// Whether a value counts as empty for overwrite semantics.
fn is_empty(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(text) => text.is_empty(),
        _ => false,
    }
}

/// Coerces a value into a string list: scalars wrap, lists keep their string
/// members, everything else is dropped.
#[must_use]
pub fn to_string_vec(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(text)) => vec![text.clone()],
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| item.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Coerces a value into an integer list, accepting numeric strings.
#[must_use]
pub fn to_int_vec(value: Option<&Value>) -> Vec<i64> {
    match value {
        Some(Value::Number(number)) => number.as_i64().into_iter().collect(),
        Some(Value::String(text)) => text.trim().parse().into_iter().collect(),
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::Number(number) => number.as_i64(),
                Value::String(text) => text.trim().parse().ok(),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}
