//! DynamoDB attribute conversion functions.
//!
//! Pure functions for converting between DynamoDB AttributeValue maps and
//! JSON items. These are testable in isolation without DynamoDB access.

use std::collections::{BTreeMap, HashMap};

use aws_sdk_dynamodb::types::AttributeValue;
use serde_json::{Number, Value};

use authkv_core::keys::PhysicalKey;
use authkv_core::storage::{Item, StoreError};

/// Convert a JSON value to a DynamoDB attribute value.
pub fn to_attribute_value(value: &Value) -> AttributeValue {
    match value {
        Value::Null => AttributeValue::Null(true),
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Number(n) => AttributeValue::N(n.to_string()),
        Value::String(s) => AttributeValue::S(s.clone()),
        Value::Array(elements) => AttributeValue::L(elements.iter().map(to_attribute_value).collect()),
        Value::Object(fields) => AttributeValue::M(
            fields
                .iter()
                .map(|(k, v)| (k.clone(), to_attribute_value(v)))
                .collect(),
        ),
    }
}

/// Convert a DynamoDB attribute value to a JSON value.
///
/// String and number sets become lists. Binary attributes are rejected.
pub fn from_attribute_value(value: &AttributeValue) -> Result<Value, StoreError> {
    match value {
        AttributeValue::S(s) => Ok(Value::String(s.clone())),
        AttributeValue::N(n) => parse_number(n),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        AttributeValue::L(elements) => elements
            .iter()
            .map(from_attribute_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        AttributeValue::M(fields) => attributes_to_item(fields).map(Value::Object),
        AttributeValue::Ss(strings) => Ok(Value::Array(
            strings.iter().cloned().map(Value::String).collect(),
        )),
        AttributeValue::Ns(numbers) => numbers
            .iter()
            .map(|n| parse_number(n))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array),
        AttributeValue::B(_) | AttributeValue::Bs(_) => Err(StoreError::Serialization(
            "binary attributes are not supported".to_string(),
        )),
        other => Err(StoreError::Serialization(format!(
            "unsupported attribute value: {other:?}"
        ))),
    }
}

fn parse_number(n: &str) -> Result<Value, StoreError> {
    if let Ok(i) = n.parse::<i64>() {
        return Ok(Value::from(i));
    }
    if let Ok(u) = n.parse::<u64>() {
        return Ok(Value::from(u));
    }
    n.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| StoreError::Serialization(format!("invalid number attribute '{n}'")))
}

/// Convert an item to a DynamoDB attribute map.
pub fn item_to_attributes(item: &Item) -> HashMap<String, AttributeValue> {
    item.iter()
        .map(|(k, v)| (k.clone(), to_attribute_value(v)))
        .collect()
}

/// Convert a DynamoDB attribute map to an item.
pub fn attributes_to_item(attributes: &HashMap<String, AttributeValue>) -> Result<Item, StoreError> {
    attributes
        .iter()
        .map(|(k, v)| from_attribute_value(v).map(|v| (k.clone(), v)))
        .collect()
}

/// Convert a physical key to the DynamoDB key map.
pub fn key_to_attributes(key: &PhysicalKey) -> HashMap<String, AttributeValue> {
    key.attributes()
        .into_iter()
        .map(|(name, value)| (name.to_string(), AttributeValue::S(value.to_string())))
        .collect()
}

/// Expression attribute names, or `None` when there are none.
///
/// DynamoDB rejects empty expression attribute maps.
pub fn expression_names(names: &BTreeMap<String, String>) -> Option<HashMap<String, String>> {
    (!names.is_empty()).then(|| names.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
}

/// Expression attribute values, or `None` when there are none.
pub fn expression_values(
    values: &BTreeMap<String, Value>,
) -> Option<HashMap<String, AttributeValue>> {
    (!values.is_empty()).then(|| {
        values
            .iter()
            .map(|(k, v)| (k.clone(), to_attribute_value(v)))
            .collect()
    })
}
