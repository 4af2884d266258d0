//! In-memory storage backend.
//!
//! Holds tables in a `HashMap` wrapped in `Arc<RwLock<_>>` and evaluates the
//! same expressions the DynamoDB backend sends. Data is lost when the store is
//! dropped.
//!
//! # Example
//!
//! ```rust,ignore
//! use authkv::storage::inmemory::InMemoryStore;
//! use authkv_core::{describe_schema, keys::KeyStrategy, schema::DEFAULT_MODELS};
//!
//! let keys = KeyStrategy::default();
//! let store = InMemoryStore::with_schema(&describe_schema(&keys, DEFAULT_MODELS));
//! ```

mod expression;
mod store;

pub use store::{InMemoryStore, RequestCounts};
