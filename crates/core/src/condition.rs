//! Structured `where` conditions.
//!
//! Callers hand over loosely typed [`RawCondition`]s (field, operator name,
//! JSON value, connector). They are converted into typed [`Condition`]s,
//! rejecting anything the predicate compiler could not express faithfully.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::storage::AdapterError;

/// How a condition composes with the conditions before it.
///
/// Only conjunction is supported; `Or` exists so caller input can be parsed
/// and rejected explicitly instead of being silently AND-ed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Connector {
    #[default]
    And,
    Or,
}

/// A comparison applied to one field, with a value shaped for that comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    Eq(Value),
    Ne(Value),
    Gt(Value),
    Gte(Value),
    Lt(Value),
    Lte(Value),
    In(Vec<Value>),
    Contains(Value),
    StartsWith(String),
    IsNull,
}

impl Predicate {
    /// Operator name as callers spell it.
    pub fn operator(&self) -> &'static str {
        match self {
            Predicate::Eq(_) => "eq",
            Predicate::Ne(_) => "ne",
            Predicate::Gt(_) => "gt",
            Predicate::Gte(_) => "gte",
            Predicate::Lt(_) => "lt",
            Predicate::Lte(_) => "lte",
            Predicate::In(_) => "in",
            Predicate::Contains(_) => "contains",
            Predicate::StartsWith(_) => "starts_with",
            Predicate::IsNull => "is-null",
        }
    }
}

/// A typed condition on a single field.
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub field: String,
    pub predicate: Predicate,
}

impl Condition {
    pub fn new(field: impl Into<String>, predicate: Predicate) -> Self {
        Self {
            field: field.into(),
            predicate,
        }
    }

    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Eq(value.into()))
    }

    pub fn ne(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Ne(value.into()))
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Gt(value.into()))
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Gte(value.into()))
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Lt(value.into()))
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Lte(value.into()))
    }

    pub fn is_in<I, V>(field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        Self::new(
            field,
            Predicate::In(values.into_iter().map(Into::into).collect()),
        )
    }

    pub fn contains(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(field, Predicate::Contains(value.into()))
    }

    pub fn starts_with(field: impl Into<String>, prefix: impl Into<String>) -> Self {
        Self::new(field, Predicate::StartsWith(prefix.into()))
    }

    pub fn is_null(field: impl Into<String>) -> Self {
        Self::new(field, Predicate::IsNull)
    }

    /// The id looked up when this is a plain string equality on `field`.
    pub fn equality_on(&self, field: &str) -> Option<&str> {
        match &self.predicate {
            Predicate::Eq(Value::String(s)) if self.field == field => Some(s),
            _ => None,
        }
    }

    /// Checks that the field and value shape can be compiled.
    pub fn validate(&self) -> Result<(), AdapterError> {
        validate_field_name(&self.field)?;

        let malformed = |reason: &str| -> Result<(), AdapterError> {
            Err(AdapterError::malformed(&self.field, reason))
        };
        match &self.predicate {
            Predicate::Eq(_) | Predicate::Ne(_) | Predicate::IsNull => Ok(()),
            Predicate::Gt(v) | Predicate::Gte(v) | Predicate::Lt(v) | Predicate::Lte(v) => {
                if v.is_string() || v.is_number() {
                    Ok(())
                } else {
                    malformed("range comparisons need a string or number value")
                }
            }
            Predicate::In(values) => {
                if values.is_empty() {
                    malformed("'in' needs at least one value")
                } else if values.len() > MAX_IN_OPERANDS {
                    malformed("'in' accepts at most 100 values")
                } else if values.iter().any(|v| v.is_null() || v.is_array() || v.is_object()) {
                    malformed("'in' values must be scalars")
                } else {
                    Ok(())
                }
            }
            Predicate::Contains(v) => {
                if v.is_null() || v.is_array() || v.is_object() {
                    malformed("'contains' needs a scalar value")
                } else {
                    Ok(())
                }
            }
            Predicate::StartsWith(_) => Ok(()),
        }
    }
}

/// Operand ceiling of a DynamoDB `IN` comparison.
pub const MAX_IN_OPERANDS: usize = 100;

/// Field names are used verbatim as expression name aliases (`#field`).
pub fn validate_field_name(field: &str) -> Result<(), AdapterError> {
    if field.is_empty() {
        return Err(AdapterError::malformed(field, "field name is empty"));
    }
    if !field.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(AdapterError::malformed(
            field,
            "field names may only contain ASCII letters, digits and '_'",
        ));
    }
    Ok(())
}

/// A condition as the identity framework sends it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawCondition {
    pub field: String,
    #[serde(default)]
    pub operator: Option<String>,
    #[serde(default)]
    pub value: Value,
    #[serde(default)]
    pub connector: Connector,
}

impl TryFrom<RawCondition> for Condition {
    type Error = AdapterError;

    fn try_from(raw: RawCondition) -> Result<Self, Self::Error> {
        if raw.connector == Connector::Or {
            return Err(AdapterError::malformed(
                &raw.field,
                "OR connectors are not supported; conditions are always AND-ed",
            ));
        }

        let operator = raw.operator.as_deref().unwrap_or("eq");
        let predicate = match operator {
            "eq" => Predicate::Eq(raw.value),
            "ne" => Predicate::Ne(raw.value),
            "gt" => Predicate::Gt(raw.value),
            "gte" | "ge" => Predicate::Gte(raw.value),
            "lt" => Predicate::Lt(raw.value),
            "lte" | "le" => Predicate::Lte(raw.value),
            "in" => match raw.value {
                Value::Array(values) => Predicate::In(values),
                _ => return Err(AdapterError::malformed(&raw.field, "'in' needs a list value")),
            },
            "contains" => Predicate::Contains(raw.value),
            "starts_with" => match raw.value {
                Value::String(prefix) => Predicate::StartsWith(prefix),
                _ => {
                    return Err(AdapterError::malformed(
                        &raw.field,
                        "'starts_with' needs a string value",
                    ))
                }
            },
            "is-null" | "is_null" => Predicate::IsNull,
            other => {
                return Err(AdapterError::malformed(
                    &raw.field,
                    format!("unknown operator '{other}'"),
                ))
            }
        };

        let condition = Condition::new(raw.field, predicate);
        condition.validate()?;
        Ok(condition)
    }
}

/// Converts a caller's condition list, failing on the first malformed entry.
pub fn parse_conditions(raw: Vec<RawCondition>) -> Result<Vec<Condition>, AdapterError> {
    raw.into_iter().map(Condition::try_from).collect()
}
