//! Key-value data-access adapter for identity frameworks.
//!
//! [`KvAdapter`] maps create/find/update/delete/count operations onto a
//! [`DocumentStore`](authkv_core::DocumentStore): DynamoDB in production
//! (behind the `dynamodb` feature) or [`InMemoryStore`] in tests.

pub mod adapter;
pub mod batch;
pub mod config;
pub mod schema;
pub mod storage;

pub use adapter::KvAdapter;
pub use batch::BatchExecutor;
pub use config::{AdapterConfig, AwsConfig};
pub use schema::{render_schema, write_schema, SchemaError, SchemaFile, DEFAULT_SCHEMA_PATH};
#[cfg(feature = "dynamodb")]
pub use storage::DynamoDbStore;
pub use storage::InMemoryStore;
