// persona-server/src/filter.rs
// ============================================================================
// Module: Persona Filter Grammar
// Description: Query-string filter parsing with typed coercion.
// Purpose: Turn repeatable `filter=<field> <op> <value>` params into clauses.
// Dependencies: persona-core, serde_json
// ============================================================================

//! ## Overview
//! Each `filter` query parameter is a space-separated `<field> <operator>
//! <value>` triple; the value may itself contain spaces. Operators come from
//! the condition vocabulary. Values are coerced using the `value_type` of the
//! enrichment rule whose trait name matches the field, falling back to
//! strings for unruled fields.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeMap;

use persona_core::interfaces::FilterClause;
use persona_core::EnrichmentRule;
use persona_core::ServiceError;
use persona_core::ValueType;
use serde_json::Value;

// ============================================================================
// SECTION: Parsing
// ============================================================================

/// Parses raw filter strings into typed clauses.
///
/// # Errors
///
/// Returns [`ServiceError::InvalidEvent`] for malformed clauses or unknown
/// operators.
pub fn parse_filters(
    raw_filters: &[String],
    rules: &[EnrichmentRule],
) -> Result<Vec<FilterClause>, ServiceError> {
    let types = trait_type_map(rules);
    raw_filters.iter().map(|raw| parse_filter(raw, &types)).collect()
}

/// Parses one `<field> <operator> <value>` clause.
fn parse_filter(
    raw: &str,
    types: &BTreeMap<String, ValueType>,
) -> Result<FilterClause, ServiceError> {
    let mut parts = raw.splitn(3, ' ');
    let field = parts
        .next()
        .filter(|field| !field.is_empty())
        .ok_or_else(|| invalid(raw))?;
    let operator = parts.next().ok_or_else(|| invalid(raw))?;
    let operator = operator
        .parse()
        .map_err(|_| ServiceError::InvalidEvent(format!("unknown filter operator in: {raw}")))?;
    let value = parts.next().unwrap_or_default();
    let value = match types.get(field) {
        Some(value_type) => coerce(value, *value_type),
        None => Value::String(value.to_string()),
    };
    Ok(FilterClause {
        field: field.to_string(),
        operator,
        value,
    })
}

/// Builds the field to value-type mapping from the enrichment-rule table.
fn trait_type_map(rules: &[EnrichmentRule]) -> BTreeMap<String, ValueType> {
    rules
        .iter()
        .map(|rule| (rule.trait_name.clone(), rule.value_type))
        .collect()
}

/// Coerces a raw filter value using the declared value type; unparseable
/// values fall back to the raw string.
fn coerce(raw: &str, value_type: ValueType) -> Value {
    match value_type {
        ValueType::String | ValueType::ArrayOfString => Value::String(raw.to_string()),
        ValueType::Int | ValueType::ArrayOfInt | ValueType::Date => raw
            .trim()
            .parse::<i64>()
            .map_or_else(|_| Value::String(raw.to_string()), Value::from),
        ValueType::Boolean => raw
            .trim()
            .parse::<bool>()
            .map_or_else(|_| Value::String(raw.to_string()), Value::from),
    }
}

/// Invalid clause error.
fn invalid(raw: &str) -> ServiceError {
    ServiceError::InvalidEvent(format!("malformed filter clause: {raw}"))
}

// ============================================================================
// SECTION: Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use persona_core::Computation;
    use persona_core::ConditionOperator;
    use persona_core::EnrichmentRule;
    use persona_core::EventType;
    use persona_core::MergeStrategy;
    use persona_core::RuleType;
    use persona_core::Timestamp;
    use persona_core::Trigger;
    use persona_core::ValueType;
    use serde_json::json;

    use super::parse_filters;

    fn int_rule(trait_name: &str) -> EnrichmentRule {
        EnrichmentRule {
            rule_id: "r1".into(),
            trait_name: trait_name.to_string(),
            rule_type: RuleType::Computed,
            value: None,
            value_type: ValueType::Int,
            computation: Some(Computation::Copy),
            source_fields: vec!["count".to_string()],
            time_range: None,
            merge_strategy: MergeStrategy::Overwrite,
            masking_required: false,
            masking_strategy: None,
            trigger: Trigger {
                event_type: EventType::Track,
                event_name: "page_view".to_string(),
                conditions: Vec::new(),
            },
            created_at: Timestamp::from_secs(0),
            updated_at: Timestamp::from_secs(0),
        }
    }

    #[test]
    fn parses_string_clause() {
        let clauses =
            parse_filters(&["event_name equals login".to_string()], &[]).expect("parses");
        assert_eq!(clauses.len(), 1);
        assert_eq!(clauses[0].field, "event_name");
        assert_eq!(clauses[0].operator, ConditionOperator::Equals);
        assert_eq!(clauses[0].value, json!("login"));
    }

    #[test]
    fn value_keeps_embedded_spaces() {
        let clauses = parse_filters(&["traits.city equals New York".to_string()], &[])
            .expect("parses");
        assert_eq!(clauses[0].value, json!("New York"));
    }

    #[test]
    fn coerces_by_rule_value_type() {
        let rules = vec![int_rule("traits.visits")];
        let clauses =
            parse_filters(&["traits.visits greater_than 4".to_string()], &rules).expect("parses");
        assert_eq!(clauses[0].value, json!(4));
    }

    #[test]
    fn rejects_unknown_operator() {
        let result = parse_filters(&["field around 3".to_string()], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn rejects_missing_operator() {
        let result = parse_filters(&["field".to_string()], &[]);
        assert!(result.is_err());
    }

    #[test]
    fn exists_clause_needs_no_value() {
        let clauses = parse_filters(&["identity_attributes.email exists".to_string()], &[])
            .expect("parses");
        assert_eq!(clauses[0].operator, ConditionOperator::Exists);
        assert_eq!(clauses[0].value, json!(""));
    }
}
