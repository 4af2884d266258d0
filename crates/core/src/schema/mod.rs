//! Schema provisioning.
//!
//! Describes the tables a topology needs and renders them as a CloudFormation
//! template. Producing a descriptor never touches the store.

mod config;

pub use config::{
    model_table_config, single_table_config, AttributeType, BillingMode, GsiConfig, KeyAttribute,
    ProjectionType, TableConfig,
};

use serde_json::{json, Map, Value};

use crate::keys::{KeyStrategy, Topology};

/// CloudFormation template format version.
pub const TEMPLATE_FORMAT_VERSION: &str = "2010-09-09";

/// Logical resource id of the shared table.
pub const SINGLE_TABLE_RESOURCE: &str = "AuthKvTable";

/// Models the identity framework stores when none are listed explicitly.
pub const DEFAULT_MODELS: &[&str] = &["user", "session", "account", "verification"];

/// A table together with its logical resource id in the template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableResource {
    pub logical_id: String,
    pub config: TableConfig,
}

/// Declarative description of every table a topology needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaDescriptor {
    pub tables: Vec<TableResource>,
}

/// Describes the tables required to store `models` under `keys`' topology.
pub fn describe_schema(keys: &KeyStrategy, models: &[&str]) -> SchemaDescriptor {
    let tables = match keys.topology() {
        Topology::SingleTable { table_name } => vec![TableResource {
            logical_id: SINGLE_TABLE_RESOURCE.to_string(),
            config: single_table_config(table_name),
        }],
        Topology::MultiTable { .. } => {
            let mut tables: Vec<TableResource> = Vec::with_capacity(models.len());
            for model in models {
                let table_name = keys.resolve_table(model);
                if tables.iter().any(|t| t.config.table_name == table_name) {
                    continue;
                }
                let logical_id = unique_logical_id(&tables, &logical_name(model));
                tables.push(TableResource {
                    logical_id,
                    config: model_table_config(&table_name),
                });
            }
            tables
        }
    };

    SchemaDescriptor { tables }
}

/// `{name}Table`, numbered from 2 when models like `email_otp` and
/// `emailOtp` share a PascalCase form.
fn unique_logical_id(tables: &[TableResource], name: &str) -> String {
    let taken = |id: &str| tables.iter().any(|t| t.logical_id == id);
    let mut logical_id = format!("{name}Table");
    let mut n = 2;
    while taken(&logical_id) {
        logical_id = format!("{name}{n}Table");
        n += 1;
    }
    logical_id
}

/// PascalCase, alphanumeric-only form of a model name (`email_otp` -> `EmailOtp`).
fn logical_name(model: &str) -> String {
    model
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .map(|part| {
            let mut chars = part.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect()
}

impl SchemaDescriptor {
    /// Renders the descriptor as a CloudFormation template.
    pub fn to_cloudformation(&self) -> Value {
        let resources: Map<String, Value> = self
            .tables
            .iter()
            .map(|table| (table.logical_id.clone(), table_resource(&table.config)))
            .collect();

        json!({
            "AWSTemplateFormatVersion": TEMPLATE_FORMAT_VERSION,
            "Resources": resources,
        })
    }

    /// Pretty-printed CloudFormation JSON.
    pub fn to_cloudformation_string(&self) -> String {
        // Serializing a `Value` cannot fail.
        serde_json::to_string_pretty(&self.to_cloudformation()).unwrap_or_default()
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables
            .iter()
            .map(|t| t.config.table_name.as_str())
            .collect()
    }
}

fn key_schema(partition_key: &KeyAttribute, sort_key: Option<&KeyAttribute>) -> Value {
    let mut elements = vec![json!({ "AttributeName": partition_key.name, "KeyType": "HASH" })];
    if let Some(sk) = sort_key {
        elements.push(json!({ "AttributeName": sk.name, "KeyType": "RANGE" }));
    }
    Value::Array(elements)
}

fn table_resource(config: &TableConfig) -> Value {
    let attribute_definitions: Vec<Value> = config
        .key_attributes()
        .iter()
        .map(|a| json!({ "AttributeName": a.name, "AttributeType": a.attribute_type.as_str() }))
        .collect();

    let mut properties = json!({
        "TableName": config.table_name,
        "BillingMode": config.billing_mode.as_str(),
        "AttributeDefinitions": attribute_definitions,
        "KeySchema": key_schema(&config.partition_key, config.sort_key.as_ref()),
    });

    if !config.gsis.is_empty() {
        let indexes: Vec<Value> = config
            .gsis
            .iter()
            .map(|gsi| {
                json!({
                    "IndexName": gsi.name,
                    "KeySchema": key_schema(&gsi.partition_key, gsi.sort_key.as_ref()),
                    "Projection": { "ProjectionType": gsi.projection.as_str() },
                })
            })
            .collect();
        properties["GlobalSecondaryIndexes"] = Value::Array(indexes);
    }

    json!({
        "Type": "AWS::DynamoDB::Table",
        "Properties": properties,
    })
}
