use serde_json::{Map, Value};

use crate::expression::CompiledExpression;
use crate::keys::PhysicalKey;

/// A stored item: attribute name to JSON value.
pub type Item = Map<String, Value>;

/// A filtered scan over one table.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanRequest {
    pub table: String,
    pub filter: Option<CompiledExpression>,
    /// Maximum number of matching items to return. `None` reads the whole table.
    pub limit: Option<usize>,
}

impl ScanRequest {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            limit: None,
        }
    }

    pub fn with_filter(mut self, filter: Option<CompiledExpression>) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_limit(mut self, limit: Option<usize>) -> Self {
        self.limit = limit;
        self
    }
}

/// An in-place update of a single item.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateRequest {
    pub table: String,
    pub key: PhysicalKey,
    pub update: CompiledExpression,
    /// Condition the stored item must satisfy, e.g. `attribute_exists(PK)`.
    pub condition: Option<String>,
}

/// Result of one batch write request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchWriteOutcome {
    pub processed: usize,
    pub unprocessed: usize,
}
