use async_trait::async_trait;

use crate::keys::PhysicalKey;

use super::{BatchWriteOutcome, Item, ScanRequest, StoreError, UpdateRequest};

/// Primitive operations of a key-value document store.
///
/// Implementations only offer primary-key access and filtered scans; every
/// richer query is composed on top of these by the adapter.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Reads a single item by its primary key.
    async fn get_item(&self, table: &str, key: &PhysicalKey)
        -> Result<Option<Item>, StoreError>;

    /// Writes an item unconditionally, replacing any item with the same key.
    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError>;

    /// Applies an update expression and returns the full item after the update.
    ///
    /// Returns `StoreError::ConditionFailed` when the request condition does not hold.
    async fn update_item(&self, request: UpdateRequest) -> Result<Item, StoreError>;

    /// Deletes a single item by its primary key. Deleting a missing item is not an error.
    async fn delete_item(&self, table: &str, key: &PhysicalKey) -> Result<(), StoreError>;

    /// Scans a table, returning matching items in store order.
    async fn scan(&self, request: ScanRequest) -> Result<Vec<Item>, StoreError>;

    /// Deletes up to one batch worth of keys in a single request.
    async fn batch_delete(
        &self,
        table: &str,
        keys: &[PhysicalKey],
    ) -> Result<BatchWriteOutcome, StoreError>;
}
