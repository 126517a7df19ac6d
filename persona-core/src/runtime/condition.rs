// persona-core/src/runtime/condition.rs
// ============================================================================
// Module: Persona Condition Evaluation
// Description: Trigger-condition and filter-clause evaluation.
// Purpose: Decide whether events and documents satisfy declared predicates.
// Dependencies: crate::core, serde_json
// ============================================================================

//! ## Overview
//! Trigger conditions are evaluated against `event.properties` with a shallow
//! lookup and combined with AND; an empty condition list passes. Filter
//! clauses reuse the same operators against dotted paths of a full document.
//! Numeric operators parse both sides as floats and evaluate to false on
//! parse failure, matching the stored-rule contract.

// ============================================================================
// SECTION: Imports
// ============================================================================

use serde_json::Value;

use crate::core::path::extract_values;
use crate::core::Condition;
use crate::core::ConditionOperator;
use crate::core::Event;
use crate::interfaces::FilterClause;

// ============================================================================
// SECTION: Trigger Conditions
// ============================================================================

/// Evaluates all conditions against the event; conjunction.
#[must_use]
pub fn evaluate_conditions(event: &Event, conditions: &[Condition]) -> bool {
    conditions.iter().all(|condition| {
        evaluate_condition(event.property(&condition.field), condition.operator, &condition.value)
    })
}

/// Evaluates one operator against an optional actual value.
#[must_use]
pub fn evaluate_condition(
    actual: Option<&Value>,
    operator: ConditionOperator,
    expected: &str,
) -> bool {
    match operator {
        ConditionOperator::Equals => render(actual) == expected,
        ConditionOperator::NotEquals => render(actual) != expected,
        ConditionOperator::Exists => !render(actual).is_empty(),
        ConditionOperator::NotExists => render(actual).is_empty(),
        ConditionOperator::Contains => {
            actual.and_then(Value::as_str).is_some_and(|text| text.contains(expected))
        }
        ConditionOperator::NotContains => {
            actual.and_then(Value::as_str).is_some_and(|text| !text.contains(expected))
        }
        ConditionOperator::GreaterThan => compare_numeric(actual, expected, f64::gt),
        ConditionOperator::GreaterThanEquals => compare_numeric(actual, expected, f64::ge),
        ConditionOperator::LessThan => compare_numeric(actual, expected, f64::lt),
        ConditionOperator::LessThanEquals => compare_numeric(actual, expected, f64::le),
    }
}

/// String rendering used by equality and existence operators. Absent and
/// null values render empty.
fn render(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
    }
}

/// Numeric comparison; false when either side fails to parse as a float.
fn compare_numeric(
    actual: Option<&Value>,
    expected: &str,
    compare: fn(&f64, &f64) -> bool,
) -> bool {
    let Some(actual) = actual.and_then(as_float) else {
        return false;
    };
    let Ok(expected) = expected.trim().parse::<f64>() else {
        return false;
    };
    compare(&actual, &expected)
}

/// Renders a JSON value as a float where possible.
fn as_float(value: &Value) -> Option<f64> {
    match value {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

// ============================================================================
// SECTION: Filter Clauses
// ============================================================================

/// Evaluates filter clauses against a JSON document; conjunction.
///
/// Existence operators look at whether the path resolves at all; every other
/// operator passes when any extracted value satisfies it.
#[must_use]
pub fn document_matches(document: &Value, clauses: &[FilterClause]) -> bool {
    clauses.iter().all(|clause| clause_matches(document, clause))
}

/// Evaluates one clause against a document.
fn clause_matches(document: &Value, clause: &FilterClause) -> bool {
    let values = extract_values(document, &clause.field);
    let expected = match &clause.value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    };
    match clause.operator {
        ConditionOperator::NotExists => {
            values.iter().all(|value| evaluate_condition(Some(value), clause.operator, &expected))
        }
        ConditionOperator::Exists => values
            .iter()
            .any(|value| evaluate_condition(Some(value), clause.operator, &expected)),
        _ if values.is_empty() => false,
        operator => {
            values.iter().any(|value| evaluate_condition(Some(value), operator, &expected))
        }
    }
}
