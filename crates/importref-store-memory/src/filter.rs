//! condition evaluation over snapshot rows.

use importref_core::{id_format, Condition, Row};
use serde_json::Value;

pub(crate) fn matches(row: &Row, condition: &Condition) -> bool {
    match condition {
        Condition::Eq { field, value } => field_matches(row, field, value),
        Condition::In { field, values } => values
            .iter()
            .any(|value| field_matches(row, field, value)),
        Condition::And(branches) => branches.iter().all(|branch| matches(row, branch)),
        Condition::Or(branches) => branches.iter().any(|branch| matches(row, branch)),
    }
}

/// array columns (graph hosts) match when any element does.
fn field_matches(row: &Row, field: &str, wanted: &Value) -> bool {
    match row.get(field) {
        Some(Value::Array(elements)) => elements.iter().any(|element| {
            let element = element.get("hostid").unwrap_or(element);
            same_value(element, wanted)
        }),
        Some(stored) => same_value(stored, wanted),
        None => false,
    }
}

/// ids and flags may be stored as numbers or numeric strings.
fn same_value(stored: &Value, wanted: &Value) -> bool {
    if stored.is_number() || wanted.is_number() {
        if let (Some(a), Some(b)) = (id_format::parse(stored), id_format::parse(wanted)) {
            return a == b;
        }
    }
    stored == wanted
}

/// restrict a row to the requested output columns.
pub(crate) fn project(row: &Row, output: &[String]) -> Row {
    row.iter()
        .filter(|(field, _)| output.contains(field))
        .map(|(field, value)| (field.clone(), value.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn numeric_strings_match_numbers() {
        let stored = row(json!({ "hostid": "10084", "flags": 4 }));
        assert!(matches(&stored, &Condition::eq("hostid", 10084u64)));
        assert!(matches(&stored, &Condition::one_of("flags", [0u64, 2, 4])));
        assert!(!matches(&stored, &Condition::one_of("flags", [0u64, 2])));
    }

    #[test]
    fn names_compare_exactly() {
        let stored = row(json!({ "name": "007" }));
        assert!(matches(&stored, &Condition::one_of("name", ["007"])));
        assert!(!matches(&stored, &Condition::one_of("name", ["7"])));
    }

    #[test]
    fn array_columns_match_any_element() {
        let stored = row(json!({ "hosts": [{ "hostid": "2" }, 5] }));
        assert!(matches(&stored, &Condition::eq("hosts", 2u64)));
        assert!(matches(&stored, &Condition::eq("hosts", 5u64)));
        assert!(!matches(&stored, &Condition::eq("hosts", 3u64)));
    }

    #[test]
    fn missing_column_never_matches() {
        let stored = row(json!({ "name": "x" }));
        assert!(!matches(&stored, &Condition::eq("uuid", "")));
    }

    #[test]
    fn empty_in_and_empty_or_match_nothing() {
        let stored = row(json!({ "name": "x" }));
        let empty: Vec<String> = Vec::new();
        assert!(!matches(&stored, &Condition::one_of("name", empty)));
        assert!(!matches(&stored, &Condition::any(Vec::new())));
        assert!(matches(&stored, &Condition::all(Vec::new())));
    }

    #[test]
    fn project_keeps_requested_columns_only() {
        let stored = row(json!({ "uuid": "u", "name": "n", "flags": 0 }));
        let projected = project(&stored, &["name".to_string()]);
        assert_eq!(projected, row(json!({ "name": "n" })));
    }
}
