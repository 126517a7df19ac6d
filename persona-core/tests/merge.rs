// persona-core/tests/merge.rs
// ============================================================================
// Module: Trait Merge Tests
// Description: Merge-strategy laws for trait values.
// Purpose: Pin overwrite, ignore, and combine semantics.
// Dependencies: persona-core, serde_json
// ============================================================================
//! ## Overview
//! Validates the merge laws: overwrite keeps existing on empty incoming,
//! ignore keeps existing when present, combine unions arrays preserving
//! first-seen order and is idempotent under set equality.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use persona_core::runtime::merge_trait_value;
use persona_core::MergeStrategy;
use persona_core::ValueType;
use serde_json::json;
use serde_json::Value;

// ============================================================================
// SECTION: Overwrite
// ============================================================================

/// Overwrite takes the incoming value when it carries content.
#[test]
fn overwrite_takes_incoming() {
    let merged = merge_trait_value(
        Some(&json!("old")),
        json!("new"),
        MergeStrategy::Overwrite,
        ValueType::String,
    );
    assert_eq!(merged, json!("new"));
}

/// Overwrite with a nil or empty incoming keeps the existing value.
#[test]
fn overwrite_keeps_existing_on_empty_incoming() {
    let merged = merge_trait_value(
        Some(&json!("old")),
        Value::Null,
        MergeStrategy::Overwrite,
        ValueType::String,
    );
    assert_eq!(merged, json!("old"));

    let merged = merge_trait_value(
        Some(&json!("old")),
        json!(""),
        MergeStrategy::Overwrite,
        ValueType::String,
    );
    assert_eq!(merged, json!("old"));
}

// ============================================================================
// SECTION: Ignore
// ============================================================================

/// Ignore keeps a present existing value.
#[test]
fn ignore_keeps_existing() {
    let merged = merge_trait_value(
        Some(&json!("old")),
        json!("new"),
        MergeStrategy::Ignore,
        ValueType::String,
    );
    assert_eq!(merged, json!("old"));
}

/// Ignore falls back to incoming when nothing is stored.
#[test]
fn ignore_takes_incoming_when_absent() {
    let merged =
        merge_trait_value(None, json!("new"), MergeStrategy::Ignore, ValueType::String);
    assert_eq!(merged, json!("new"));

    let merged = merge_trait_value(
        Some(&Value::Null),
        json!("new"),
        MergeStrategy::Ignore,
        ValueType::String,
    );
    assert_eq!(merged, json!("new"));
}

// ============================================================================
// SECTION: Combine
// ============================================================================

/// String arrays union preserving first-seen order.
#[test]
fn combine_unions_string_arrays() {
    let merged = merge_trait_value(
        Some(&json!(["books", "music"])),
        json!(["music", "films"]),
        MergeStrategy::Combine,
        ValueType::ArrayOfString,
    );
    assert_eq!(merged, json!(["books", "music", "films"]));
}

/// A scalar incoming value is wrapped before the union.
#[test]
fn combine_wraps_scalar_incoming() {
    let merged = merge_trait_value(
        Some(&json!(["books"])),
        json!("music"),
        MergeStrategy::Combine,
        ValueType::ArrayOfString,
    );
    assert_eq!(merged, json!(["books", "music"]));
}

/// Integer arrays union, accepting numeric strings.
#[test]
fn combine_unions_int_arrays() {
    let merged = merge_trait_value(
        Some(&json!([1, 2])),
        json!([2, 3, "4"]),
        MergeStrategy::Combine,
        ValueType::ArrayOfInt,
    );
    assert_eq!(merged, json!([1, 2, 3, 4]));
}

/// Combine on a scalar value type falls back to overwrite.
#[test]
fn combine_falls_back_to_overwrite_for_scalars() {
    let merged = merge_trait_value(
        Some(&json!("old")),
        json!("new"),
        MergeStrategy::Combine,
        ValueType::String,
    );
    assert_eq!(merged, json!("new"));
}

/// Combining a set with itself leaves it unchanged.
#[test]
fn combine_is_idempotent() {
    let merged = merge_trait_value(
        Some(&json!(["a", "b"])),
        json!(["a", "b"]),
        MergeStrategy::Combine,
        ValueType::ArrayOfString,
    );
    assert_eq!(merged, json!(["a", "b"]));
}

/// Combine is commutative up to ordering.
#[test]
fn combine_is_commutative_up_to_order() {
    let left = merge_trait_value(
        Some(&json!(["a"])),
        json!(["b"]),
        MergeStrategy::Combine,
        ValueType::ArrayOfString,
    );
    let right = merge_trait_value(
        Some(&json!(["b"])),
        json!(["a"]),
        MergeStrategy::Combine,
        ValueType::ArrayOfString,
    );
    let mut left_items: Vec<String> =
        left.as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
    let mut right_items: Vec<String> =
        right.as_array().unwrap().iter().map(|v| v.as_str().unwrap().to_string()).collect();
    left_items.sort();
    right_items.sort();
    assert_eq!(left_items, right_items);
}
