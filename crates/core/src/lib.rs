//! Functional core of authkv.
//!
//! Everything in this crate is pure: key derivation, condition validation,
//! expression compilation, result post-processing and schema description.
//! The store itself is reached only through the [`storage::DocumentStore`]
//! trait, implemented in the `authkv` crate.

pub mod batch;
pub mod condition;
pub mod entity;
pub mod expression;
pub mod keys;
pub mod pagination;
pub mod schema;
pub mod storage;

pub use condition::{parse_conditions, Condition, Connector, Predicate, RawCondition};
pub use entity::{Entity, Record};
pub use expression::{compile_filter, compile_update, CompiledExpression};
pub use keys::{KeyStrategy, PhysicalKey, Topology};
pub use pagination::{Direction, Pagination, SortBy};
pub use schema::{describe_schema, SchemaDescriptor};
pub use storage::{AdapterError, DocumentStore, Item, Operation, StoreError};
