use std::env;

use authkv_core::keys::{KeyStrategy, DEFAULT_TABLE_NAME};

/// Default number of per-row updates `update_many` keeps in flight.
pub const DEFAULT_MAX_CONCURRENCY: usize = 16;

/// Adapter configuration loaded from environment variables.
///
/// Set once at construction; the adapter never mutates it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Store every model in one shared table (default: true)
    pub single_table: bool,
    /// Shared table name in single-table mode (default: "authkv")
    pub table_name: String,
    /// Table name prefix in multi-table mode (default: "")
    pub table_prefix: String,
    /// Concurrent per-row updates in `update_many` (default: 16)
    pub max_concurrency: usize,
    /// Keep `PK`, `SK` and `_type` in returned entities (default: false)
    pub expose_internal_fields: bool,
}

impl AdapterConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `AUTHKV_SINGLE_TABLE` - Use the single-table topology (default: true)
    /// - `AUTHKV_TABLE_NAME` - Shared table name (default: "authkv")
    /// - `AUTHKV_TABLE_PREFIX` - Per-model table prefix (default: "")
    /// - `AUTHKV_MAX_CONCURRENCY` - Concurrent updates in `update_many` (default: 16)
    /// - `AUTHKV_EXPOSE_INTERNAL_FIELDS` - Return internal attributes (default: false)
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        Self {
            single_table: lookup("AUTHKV_SINGLE_TABLE")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(true),
            table_name: lookup("AUTHKV_TABLE_NAME")
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| DEFAULT_TABLE_NAME.to_string()),
            table_prefix: lookup("AUTHKV_TABLE_PREFIX").unwrap_or_default(),
            max_concurrency: lookup("AUTHKV_MAX_CONCURRENCY")
                .and_then(|v| v.parse().ok())
                .filter(|&n: &usize| n > 0)
                .unwrap_or(DEFAULT_MAX_CONCURRENCY),
            expose_internal_fields: lookup("AUTHKV_EXPOSE_INTERNAL_FIELDS")
                .and_then(|v| parse_flag(&v))
                .unwrap_or(false),
        }
    }

    /// Single-table configuration storing every model in `table_name`.
    pub fn single_table(table_name: impl Into<String>) -> Self {
        Self {
            single_table: true,
            table_name: table_name.into(),
            table_prefix: String::new(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            expose_internal_fields: false,
        }
    }

    /// Multi-table configuration storing each model in `<table_prefix><model>`.
    pub fn multi_table(table_prefix: impl Into<String>) -> Self {
        Self {
            single_table: false,
            table_name: DEFAULT_TABLE_NAME.to_string(),
            table_prefix: table_prefix.into(),
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            expose_internal_fields: false,
        }
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    pub fn with_expose_internal_fields(mut self, expose: bool) -> Self {
        self.expose_internal_fields = expose;
        self
    }

    /// Applies command-line topology overrides on top of this config.
    ///
    /// `None` keeps the current value.
    pub fn with_overrides(
        mut self,
        single_table: Option<bool>,
        table_name: Option<String>,
        table_prefix: Option<String>,
    ) -> Self {
        if let Some(single_table) = single_table {
            self.single_table = single_table;
        }
        if let Some(table_name) = table_name {
            self.table_name = table_name;
        }
        if let Some(table_prefix) = table_prefix {
            self.table_prefix = table_prefix;
        }
        self
    }

    /// Key strategy for the configured topology.
    pub fn key_strategy(&self) -> KeyStrategy {
        if self.single_table {
            KeyStrategy::single_table(&self.table_name)
        } else {
            KeyStrategy::multi_table(&self.table_prefix)
        }
    }
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self::from_env()
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// AWS client configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AwsConfig {
    /// Custom endpoint URL (for local DynamoDB).
    pub endpoint_url: Option<String>,
    /// AWS region.
    pub region: String,
}

impl Default for AwsConfig {
    fn default() -> Self {
        Self {
            endpoint_url: env::var("AWS_ENDPOINT_URL").ok(),
            region: env::var("AWS_REGION").unwrap_or_else(|_| "us-east-1".to_string()),
        }
    }
}

impl AwsConfig {
    /// Returns a display string for the target environment.
    pub fn target_display(&self) -> String {
        match &self.endpoint_url {
            Some(url) => format!("Local DynamoDB ({url})"),
            None => format!("AWS DynamoDB (region: {})", self.region),
        }
    }
}
