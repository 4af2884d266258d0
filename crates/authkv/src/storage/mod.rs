//! Storage backend implementations.
//!
//! This module provides concrete implementations of the `DocumentStore`
//! trait defined in `authkv_core::storage`.
//!
//! # Feature Flags
//!
//! - `dynamodb` (default): AWS DynamoDB backend using `aws-sdk-dynamodb`
//!
//! The in-memory backend is always compiled; it backs the test suite.

#[cfg(feature = "dynamodb")]
pub mod dynamodb;

pub mod inmemory;

#[cfg(feature = "dynamodb")]
pub use dynamodb::DynamoDbStore;

pub use inmemory::InMemoryStore;
