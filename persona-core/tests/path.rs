// persona-core/tests/path.rs
// ============================================================================
// Module: Dotted Path Tests
// Description: Traversal behavior over maps, lists, and scalars.
// Purpose: Pin list fan-out and flattening for resolution matching.
// Dependencies: persona-core, serde_json
// ============================================================================
//! ## Overview
//! Validates dotted-path extraction: scalar wrapping, terminal list
//! flattening, and fan-out through list segments with results concatenated
//! in element order.

#![allow(
    clippy::panic,
    clippy::unwrap_used,
    clippy::expect_used,
    reason = "Test-only panic-based assertions are permitted."
)]

use persona_core::extract_strings;
use persona_core::extract_values;
use serde_json::json;

// ============================================================================
// SECTION: Scalars and Maps
// ============================================================================

/// A terminal scalar is wrapped in a single-element list.
#[test]
fn scalar_is_wrapped() {
    let doc = json!({"identity_attributes": {"email": "a@x.com"}});
    let values = extract_values(&doc, "identity_attributes.email");
    assert_eq!(values, vec![json!("a@x.com")]);
}

/// Missing paths resolve to an empty list.
#[test]
fn missing_path_is_empty() {
    let doc = json!({"identity_attributes": {}});
    assert!(extract_values(&doc, "identity_attributes.email").is_empty());
    assert!(extract_values(&doc, "nope.deeper").is_empty());
}

/// Null leaves are dropped.
#[test]
fn null_leaf_is_dropped() {
    let doc = json!({"traits": {"score": null}});
    assert!(extract_values(&doc, "traits.score").is_empty());
}

// ============================================================================
// SECTION: Lists
// ============================================================================

/// A terminal list is flattened into its members.
#[test]
fn terminal_list_is_flattened() {
    let doc = json!({"traits": {"interests": ["books", "music"]}});
    let values = extract_values(&doc, "traits.interests");
    assert_eq!(values, vec![json!("books"), json!("music")]);
}

/// A list segment fans out over each element and concatenates results.
#[test]
fn list_segment_fans_out() {
    let doc = json!({
        "application_data": [
            {"app_id": "a1", "devices": [{"device_id": "d1"}, {"device_id": "d2"}]},
            {"app_id": "a2", "devices": [{"device_id": "d3"}]},
        ]
    });
    let values = extract_values(&doc, "application_data.devices.device_id");
    assert_eq!(values, vec![json!("d1"), json!("d2"), json!("d3")]);
}

/// Nested terminal lists flatten recursively.
#[test]
fn nested_lists_flatten() {
    let doc = json!({"traits": {"tags": [["a", "b"], ["c"]]}});
    let values = extract_values(&doc, "traits.tags");
    assert_eq!(values, vec![json!("a"), json!("b"), json!("c")]);
}

// ============================================================================
// SECTION: String Extraction
// ============================================================================

/// String extraction keeps only string members.
#[test]
fn extract_strings_filters_non_strings() {
    let doc = json!({"traits": {"mixed": ["a", 1, true, "b"]}});
    let values = extract_strings(&doc, "traits.mixed");
    assert_eq!(values, vec!["a".to_string(), "b".to_string()]);
}

/// Empty and degenerate paths resolve to nothing.
#[test]
fn degenerate_paths_are_empty() {
    let doc = json!({"a": 1});
    assert!(extract_values(&doc, "").is_empty());
    assert!(extract_values(&doc, "...").is_empty());
}
