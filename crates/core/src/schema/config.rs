//! Table schema configuration types (Functional Core - pure data).

use crate::keys::{
    GSI1_NAME, GSI1_PARTITION_KEY, GSI1_SORT_KEY, ID_FIELD, PARTITION_KEY, SORT_KEY,
};

/// Table schema configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableConfig {
    pub table_name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub gsis: Vec<GsiConfig>,
    pub billing_mode: BillingMode,
}

/// A key attribute definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAttribute {
    pub name: String,
    pub attribute_type: AttributeType,
}

/// DynamoDB attribute types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeType {
    String,
}

impl AttributeType {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttributeType::String => "S",
        }
    }
}

/// Global Secondary Index configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GsiConfig {
    pub name: String,
    pub partition_key: KeyAttribute,
    pub sort_key: Option<KeyAttribute>,
    pub projection: ProjectionType,
}

/// GSI projection type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionType {
    All,
}

impl ProjectionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProjectionType::All => "ALL",
        }
    }
}

/// Billing mode for the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BillingMode {
    PayPerRequest,
}

impl BillingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            BillingMode::PayPerRequest => "PAY_PER_REQUEST",
        }
    }
}

impl KeyAttribute {
    pub fn string(name: &str) -> Self {
        Self {
            name: name.to_string(),
            attribute_type: AttributeType::String,
        }
    }
}

impl TableConfig {
    /// Every attribute that appears in the table or index key schemas, deduplicated.
    pub fn key_attributes(&self) -> Vec<&KeyAttribute> {
        let mut attributes: Vec<&KeyAttribute> = Vec::new();
        let candidates = std::iter::once(&self.partition_key)
            .chain(self.sort_key.iter())
            .chain(
                self.gsis
                    .iter()
                    .flat_map(|gsi| std::iter::once(&gsi.partition_key).chain(gsi.sort_key.iter())),
            );
        for attribute in candidates {
            if !attributes.iter().any(|a| a.name == attribute.name) {
                attributes.push(attribute);
            }
        }
        attributes
    }
}

/// The shared table of the single-table topology.
///
/// Composite `PK`/`SK` primary key plus `GSI1` for auxiliary access patterns.
pub fn single_table_config(table_name: &str) -> TableConfig {
    TableConfig {
        table_name: table_name.to_string(),
        partition_key: KeyAttribute::string(PARTITION_KEY),
        sort_key: Some(KeyAttribute::string(SORT_KEY)),
        gsis: vec![GsiConfig {
            name: GSI1_NAME.to_string(),
            partition_key: KeyAttribute::string(GSI1_PARTITION_KEY),
            sort_key: Some(KeyAttribute::string(GSI1_SORT_KEY)),
            projection: ProjectionType::All,
        }],
        billing_mode: BillingMode::PayPerRequest,
    }
}

/// One model's table in the multi-table topology, keyed by `id`.
pub fn model_table_config(table_name: &str) -> TableConfig {
    TableConfig {
        table_name: table_name.to_string(),
        partition_key: KeyAttribute::string(ID_FIELD),
        sort_key: None,
        gsis: Vec::new(),
        billing_mode: BillingMode::PayPerRequest,
    }
}
