//! DynamoDB storage backend.
//!
//! Implements `DocumentStore` with `aws-sdk-dynamodb`. Enabled by the
//! `dynamodb` feature (on by default).

mod client;
mod conversions;
mod error;
mod store;

pub use client::create_client;
pub use store::DynamoDbStore;
