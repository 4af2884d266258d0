//! Predicate compiler.
//!
//! Turns typed conditions and update field sets into DynamoDB expression
//! syntax. Every field goes through a `#field` name alias and every value
//! through a positional `:val{index}` placeholder, so reserved words and
//! user-supplied values never appear in the expression text itself.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::condition::{validate_field_name, Condition, Predicate};
use crate::entity::{Record, UPDATED_AT_FIELD};
use crate::storage::AdapterError;

/// Placeholder bound to the refreshed `updatedAt` in update expressions.
pub const UPDATED_AT_PLACEHOLDER: &str = ":updatedAt";

/// An expression plus its name and value bindings.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledExpression {
    pub expression: String,
    /// `#alias` -> attribute name.
    pub names: BTreeMap<String, String>,
    /// `:placeholder` -> bound value.
    pub values: BTreeMap<String, Value>,
}

impl CompiledExpression {
    fn bind_name(&mut self, field: &str) -> String {
        let alias = format!("#{field}");
        self.names.insert(alias.clone(), field.to_string());
        alias
    }

    fn bind_value(&mut self, placeholder: String, value: Value) -> String {
        self.values.insert(placeholder.clone(), value);
        placeholder
    }
}

fn value_placeholder(index: usize) -> String {
    format!(":val{index}")
}

/// Compiles conditions into a filter expression, AND-ing them in input order.
///
/// Returns `None` for an empty list: no filter at all, not a filter that
/// matches nothing.
pub fn compile_filter(conditions: &[Condition]) -> Result<Option<CompiledExpression>, AdapterError> {
    if conditions.is_empty() {
        return Ok(None);
    }

    let mut compiled = CompiledExpression::default();
    let mut fragments = Vec::with_capacity(conditions.len());

    for (index, condition) in conditions.iter().enumerate() {
        condition.validate()?;

        let name = compiled.bind_name(&condition.field);
        let fragment = match &condition.predicate {
            // The store has no null type: a null equality is an absence test.
            Predicate::Eq(Value::Null) | Predicate::IsNull => {
                format!("attribute_not_exists({name})")
            }
            Predicate::Ne(Value::Null) => format!("attribute_exists({name})"),
            Predicate::Eq(v) => compare(&mut compiled, &name, "=", index, v),
            Predicate::Ne(v) => compare(&mut compiled, &name, "<>", index, v),
            Predicate::Gt(v) => compare(&mut compiled, &name, ">", index, v),
            Predicate::Gte(v) => compare(&mut compiled, &name, ">=", index, v),
            Predicate::Lt(v) => compare(&mut compiled, &name, "<", index, v),
            Predicate::Lte(v) => compare(&mut compiled, &name, "<=", index, v),
            Predicate::In(values) => {
                let placeholders: Vec<String> = values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| compiled.bind_value(format!(":val{index}_{i}"), v.clone()))
                    .collect();
                format!("{name} IN ({})", placeholders.join(", "))
            }
            Predicate::Contains(v) => {
                let value = compiled.bind_value(value_placeholder(index), v.clone());
                format!("contains({name}, {value})")
            }
            Predicate::StartsWith(prefix) => {
                let value =
                    compiled.bind_value(value_placeholder(index), Value::String(prefix.clone()));
                format!("begins_with({name}, {value})")
            }
        };
        fragments.push(fragment);
    }

    compiled.expression = fragments.join(" AND ");
    Ok(Some(compiled))
}

fn compare(
    compiled: &mut CompiledExpression,
    name: &str,
    op: &str,
    index: usize,
    value: &Value,
) -> String {
    let value = compiled.bind_value(value_placeholder(index), value.clone());
    format!("{name} {op} {value}")
}

/// Compiles an update expression over `fields`, always refreshing `updatedAt`.
///
/// Null values remove the attribute. Any caller-supplied `updatedAt` is
/// replaced by `timestamp`. Fields listed in `immutable` are rejected.
pub fn compile_update(
    fields: &Record,
    immutable: &[&str],
    timestamp: &str,
) -> Result<CompiledExpression, AdapterError> {
    let mut compiled = CompiledExpression::default();
    let mut assignments = Vec::with_capacity(fields.len() + 1);
    let mut removals = Vec::new();

    for (index, (field, value)) in fields.iter().enumerate() {
        if field == UPDATED_AT_FIELD {
            continue;
        }
        validate_field_name(field).map_err(|e| AdapterError::InvalidUpdate {
            field: field.clone(),
            reason: e.to_string(),
        })?;
        if immutable.contains(&field.as_str()) {
            return Err(AdapterError::InvalidUpdate {
                field: field.clone(),
                reason: "key and discriminator attributes are immutable".to_string(),
            });
        }

        let name = compiled.bind_name(field);
        if value.is_null() {
            removals.push(name);
        } else {
            let placeholder = compiled.bind_value(value_placeholder(index), value.clone());
            assignments.push(format!("{name} = {placeholder}"));
        }
    }

    let name = compiled.bind_name(UPDATED_AT_FIELD);
    let placeholder = compiled.bind_value(
        UPDATED_AT_PLACEHOLDER.to_string(),
        Value::String(timestamp.to_string()),
    );
    assignments.push(format!("{name} = {placeholder}"));

    compiled.expression = format!("SET {}", assignments.join(", "));
    if !removals.is_empty() {
        compiled.expression.push_str(" REMOVE ");
        compiled.expression.push_str(&removals.join(", "));
    }

    Ok(compiled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    #[test]
    fn test_empty_conditions_compile_to_no_filter() {
        assert_eq!(compile_filter(&[]).unwrap(), None);
    }

    #[test]
    fn test_single_equality() {
        let compiled = compile_filter(&[Condition::eq("email", "a@b.c")])
            .unwrap()
            .unwrap();

        assert_eq!(compiled.expression, "#email = :val0");
        assert_eq!(compiled.names.get("#email"), Some(&"email".to_string()));
        assert_eq!(compiled.values.get(":val0"), Some(&json!("a@b.c")));
    }

    #[test]
    fn test_operator_mapping() {
        let cases = [
            (Condition::ne("a", 1), "#a <> :val0"),
            (Condition::gt("a", 1), "#a > :val0"),
            (Condition::gte("a", 1), "#a >= :val0"),
            (Condition::lt("a", 1), "#a < :val0"),
            (Condition::lte("a", 1), "#a <= :val0"),
            (Condition::contains("a", "x"), "contains(#a, :val0)"),
            (Condition::starts_with("a", "x"), "begins_with(#a, :val0)"),
            (Condition::is_null("a"), "attribute_not_exists(#a)"),
            (Condition::eq("a", Value::Null), "attribute_not_exists(#a)"),
            (Condition::ne("a", Value::Null), "attribute_exists(#a)"),
        ];

        for (condition, expected) in cases {
            let compiled = compile_filter(&[condition]).unwrap().unwrap();
            assert_eq!(compiled.expression, expected);
        }
    }

    #[test]
    fn test_null_checks_bind_no_values() {
        let compiled = compile_filter(&[Condition::is_null("image")])
            .unwrap()
            .unwrap();
        assert!(compiled.values.is_empty());
        assert_eq!(compiled.names.len(), 1);
    }

    #[test]
    fn test_in_expands_one_placeholder_per_element() {
        let compiled = compile_filter(&[Condition::is_in("status", ["a", "b", "c"])])
            .unwrap()
            .unwrap();

        assert_eq!(
            compiled.expression,
            "#status IN (:val0_0, :val0_1, :val0_2)"
        );
        assert_eq!(compiled.values.len(), 3);
        assert_eq!(compiled.values.get(":val0_2"), Some(&json!("c")));
    }

    #[test]
    fn test_conditions_are_and_ed_in_input_order() {
        let compiled = compile_filter(&[
            Condition::eq("userId", "u1"),
            Condition::gt("expiresAt", "2024-01-01"),
            Condition::is_in("role", ["admin"]),
        ])
        .unwrap()
        .unwrap();

        assert_eq!(
            compiled.expression,
            "#userId = :val0 AND #expiresAt > :val1 AND #role IN (:val2_0)"
        );
        assert_eq!(compiled.names.len(), 3);
    }

    #[test]
    fn test_repeated_field_shares_alias() {
        let compiled = compile_filter(&[Condition::gte("age", 18), Condition::lt("age", 65)])
            .unwrap()
            .unwrap();

        assert_eq!(compiled.expression, "#age >= :val0 AND #age < :val1");
        assert_eq!(compiled.names.len(), 1);
        assert_eq!(compiled.values.len(), 2);
    }

    #[test]
    fn test_malformed_condition_fails_compilation() {
        let err = compile_filter(&[Condition::eq("ok", 1), Condition::gt("age", json!({}))])
            .unwrap_err();
        assert!(matches!(err, AdapterError::MalformedCondition { field, .. } if field == "age"));
    }

    #[test]
    fn test_update_sets_fields_and_refreshes_updated_at() {
        let compiled = compile_update(
            &record(json!({ "name": "Jane", "emailVerified": true })),
            &["id"],
            "2024-02-01T00:00:00.000Z",
        )
        .unwrap();

        // serde_json maps iterate in key order.
        assert_eq!(
            compiled.expression,
            "SET #emailVerified = :val0, #name = :val1, #updatedAt = :updatedAt"
        );
        assert_eq!(
            compiled.values.get(":updatedAt"),
            Some(&json!("2024-02-01T00:00:00.000Z"))
        );
        assert_eq!(compiled.names.get("#updatedAt"), Some(&"updatedAt".to_string()));
    }

    #[test]
    fn test_update_overrides_caller_updated_at() {
        let compiled = compile_update(
            &record(json!({ "updatedAt": "1999-01-01T00:00:00.000Z" })),
            &[],
            "2024-02-01T00:00:00.000Z",
        )
        .unwrap();

        assert_eq!(compiled.expression, "SET #updatedAt = :updatedAt");
        assert_eq!(compiled.values.len(), 1);
    }

    #[test]
    fn test_update_null_removes_attribute() {
        let compiled = compile_update(
            &record(json!({ "image": null, "name": "Jane" })),
            &[],
            "2024-02-01T00:00:00.000Z",
        )
        .unwrap();

        assert_eq!(
            compiled.expression,
            "SET #name = :val1, #updatedAt = :updatedAt REMOVE #image"
        );
        assert!(!compiled.values.contains_key(":val0"));
    }

    #[test]
    fn test_update_rejects_immutable_fields() {
        let err = compile_update(
            &record(json!({ "PK": "USER#x" })),
            &["id", "PK", "SK", "_type"],
            "2024-02-01T00:00:00.000Z",
        )
        .unwrap_err();

        assert!(matches!(err, AdapterError::InvalidUpdate { field, .. } if field == "PK"));
    }

    #[test]
    fn test_update_rejects_invalid_field_names() {
        let err = compile_update(&record(json!({ "a.b": 1 })), &[], "t").unwrap_err();
        assert!(matches!(err, AdapterError::InvalidUpdate { .. }));
    }
}
