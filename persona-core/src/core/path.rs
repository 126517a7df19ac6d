// persona-core/src/core/path.rs
// ============================================================================
// Module: Persona Dotted Paths
// Description: Dotted-path traversal over JSON documents.
// Purpose: Extract attribute values for resolution matching and filters.
// Dependencies: serde_json
// ============================================================================

//! ## Overview
//! Resolution rules and query filters address profile and event documents
//! through dotted paths such as `identity_attributes.email` or
//! `application_data.devices.device_id`. Traversal recurses through maps and
//! lists: a list segment fans out over each element and concatenates the
//! results, a terminal list is flattened, and a terminal scalar is wrapped in
//! a single-element list.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

// ============================================================================
// SECTION: Extraction
// ============================================================================

/// Extracts every value at `path` within `document`.
///
/// Returns an empty vector when the path does not resolve. `Null` leaves are
/// dropped so extraction output only carries present values.
#[must_use]
pub fn extract_values(document: &Value, path: &str) -> Vec<Value> {
    let segments: Vec<&str> = path.split('.').filter(|segment| !segment.is_empty()).collect();
    if segments.is_empty() {
        return Vec::new();
    }
    let mut out = Vec::new();
    walk(document, &segments, &mut out);
    out
}

/// Extracts the string renderings of every value at `path`.
#[must_use]
pub fn extract_strings(document: &Value, path: &str) -> Vec<String> {
    extract_values(document, path)
        .iter()
        .filter_map(|value| match value {
            Value::String(text) => Some(text.clone()),
            _ => None,
        })
        .collect()
}

/// Recursive walker over `{map, list, scalar}` document variants.
fn walk(node: &Value, segments: &[&str], out: &mut Vec<Value>) {
    let Some((head, rest)) = segments.split_first() else {
        collect_leaf(node, out);
        return;
    };
    match node {
        Value::Object(map) => {
            if let Some(child) = map.get(*head) {
                walk(child, rest, out);
            }
        }
        Value::Array(items) => {
            // A list segment fans out: each element is walked with the full
            // remaining path and results are concatenated in element order.
            for item in items {
                walk(item, segments, out);
            }
        }
        _ => {}
    }
}

/// Flattens a terminal node into the output list.
fn collect_leaf(node: &Value, out: &mut Vec<Value>) {
    match node {
        Value::Null => {}
        Value::Array(items) => {
            for item in items {
                collect_leaf(item, out);
            }
        }
        other => out.push(other.clone()),
    }
}
