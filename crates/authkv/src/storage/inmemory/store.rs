//! In-memory document store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use authkv_core::keys::PhysicalKey;
use authkv_core::schema::SchemaDescriptor;
use authkv_core::storage::{
    BatchWriteOutcome, DocumentStore, Item, ScanRequest, StoreError, UpdateRequest,
};

use super::expression::{FilterExpression, UpdateExpression};

/// Number of requests received per store operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RequestCounts {
    pub get_item: usize,
    pub put_item: usize,
    pub update_item: usize,
    pub delete_item: usize,
    pub scan: usize,
    pub batch_write: usize,
}

impl RequestCounts {
    /// Requests that may have changed stored data.
    pub fn mutations(&self) -> usize {
        self.put_item + self.update_item + self.delete_item + self.batch_write
    }
}

#[derive(Debug, Default)]
struct Counters {
    get_item: AtomicUsize,
    put_item: AtomicUsize,
    update_item: AtomicUsize,
    delete_item: AtomicUsize,
    scan: AtomicUsize,
    batch_write: AtomicUsize,
}

impl Counters {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn snapshot(&self) -> RequestCounts {
        RequestCounts {
            get_item: self.get_item.load(Ordering::SeqCst),
            put_item: self.put_item.load(Ordering::SeqCst),
            update_item: self.update_item.load(Ordering::SeqCst),
            delete_item: self.delete_item.load(Ordering::SeqCst),
            scan: self.scan.load(Ordering::SeqCst),
            batch_write: self.batch_write.load(Ordering::SeqCst),
        }
    }
}

/// Stored key values, in key-schema order.
type StoredKey = Vec<String>;

#[derive(Debug, Clone)]
struct Table {
    key_attributes: Vec<String>,
    /// Insertion order stands in for the store's scan order.
    items: Vec<(StoredKey, Item)>,
}

impl Table {
    fn new(key_attributes: Vec<String>) -> Self {
        Self {
            key_attributes,
            items: Vec::new(),
        }
    }

    fn key_of_item(&self, item: &Item) -> Result<StoredKey, StoreError> {
        self.key_attributes
            .iter()
            .map(|name| match item.get(name) {
                Some(serde_json::Value::String(value)) => Ok(value.clone()),
                _ => Err(StoreError::Validation(format!(
                    "missing string key attribute '{name}'"
                ))),
            })
            .collect()
    }

    fn key_of(&self, key: &PhysicalKey) -> Result<StoredKey, StoreError> {
        let attributes = key.attributes();
        let matches_schema = attributes.len() == self.key_attributes.len()
            && attributes
                .iter()
                .zip(&self.key_attributes)
                .all(|((name, _), expected)| *name == expected.as_str());
        if !matches_schema {
            return Err(StoreError::Validation(
                "key does not match the table key schema".to_string(),
            ));
        }
        Ok(attributes.into_iter().map(|(_, v)| v.to_string()).collect())
    }

    fn position(&self, key: &StoredKey) -> Option<usize> {
        self.items.iter().position(|(k, _)| k == key)
    }

    fn upsert(&mut self, key: StoredKey, item: Item) {
        match self.position(&key) {
            Some(index) => self.items[index].1 = item,
            None => self.items.push((key, item)),
        }
    }

    fn remove(&mut self, key: &StoredKey) {
        if let Some(index) = self.position(key) {
            self.items.remove(index);
        }
    }
}

/// In-memory [`DocumentStore`] for tests and local development.
///
/// Tables must be provisioned before use, like the real store. Filter,
/// condition and update expressions are parsed and evaluated, so the adapter
/// runs against it unchanged. Every request is counted.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    tables: Arc<RwLock<HashMap<String, Table>>>,
    counters: Arc<Counters>,
    /// Batch writes allowed to succeed before failures are injected.
    batch_write_budget: Arc<RwLock<Option<usize>>>,
}

impl InMemoryStore {
    /// Creates a store with no tables.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store with every table of `schema` provisioned.
    pub fn with_schema(schema: &SchemaDescriptor) -> Self {
        let tables = schema
            .tables
            .iter()
            .map(|resource| {
                let config = &resource.config;
                let key_attributes = std::iter::once(&config.partition_key)
                    .chain(config.sort_key.iter())
                    .map(|attribute| attribute.name.clone())
                    .collect();
                (config.table_name.clone(), Table::new(key_attributes))
            })
            .collect();

        Self {
            tables: Arc::new(RwLock::new(tables)),
            ..Self::default()
        }
    }

    /// Snapshot of the requests received so far.
    pub fn request_counts(&self) -> RequestCounts {
        self.counters.snapshot()
    }

    /// Makes every batch write after the first `successes` fail as unavailable.
    pub async fn fail_batch_writes_after(&self, successes: usize) {
        *self.batch_write_budget.write().await = Some(successes);
    }

    /// All items of `table`, in scan order.
    pub async fn items(&self, table: &str) -> Vec<Item> {
        self.tables
            .read()
            .await
            .get(table)
            .map(|t| t.items.iter().map(|(_, item)| item.clone()).collect())
            .unwrap_or_default()
    }
}

fn table_not_found(table: &str) -> StoreError {
    StoreError::TableNotFound(table.to_string())
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_item(&self, table: &str, key: &PhysicalKey) -> Result<Option<Item>, StoreError> {
        Counters::bump(&self.counters.get_item);
        let tables = self.tables.read().await;
        let table = tables.get(table).ok_or_else(|| table_not_found(table))?;
        let key = table.key_of(key)?;
        Ok(table.position(&key).map(|i| table.items[i].1.clone()))
    }

    async fn put_item(&self, table: &str, item: Item) -> Result<(), StoreError> {
        Counters::bump(&self.counters.put_item);
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        let key = table.key_of_item(&item)?;
        table.upsert(key, item);
        Ok(())
    }

    async fn update_item(&self, request: UpdateRequest) -> Result<Item, StoreError> {
        Counters::bump(&self.counters.update_item);
        let update = UpdateExpression::parse(
            &request.update.expression,
            &request.update.names,
            &request.update.values,
        )?;
        let condition = request
            .condition
            .as_deref()
            .map(|c| FilterExpression::parse(c, &request.update.names, &request.update.values))
            .transpose()?;

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&request.table)
            .ok_or_else(|| table_not_found(&request.table))?;
        let key = table.key_of(&request.key)?;

        let existing = table.position(&key).map(|index| table.items[index].1.clone());

        // The condition sees the stored item, or nothing at all.
        if let Some(condition) = condition {
            if !condition.matches(existing.as_ref().unwrap_or(&Item::new())) {
                return Err(StoreError::ConditionFailed);
            }
        }

        // An unconditional update of a missing item starts from its key attributes.
        let mut item = existing.unwrap_or_else(|| {
            request
                .key
                .attributes()
                .into_iter()
                .map(|(name, value)| (name.to_string(), value.into()))
                .collect()
        });

        update.apply(&mut item)?;
        table.upsert(key, item.clone());
        Ok(item)
    }

    async fn delete_item(&self, table: &str, key: &PhysicalKey) -> Result<(), StoreError> {
        Counters::bump(&self.counters.delete_item);
        let mut tables = self.tables.write().await;
        let table = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        let key = table.key_of(key)?;
        table.remove(&key);
        Ok(())
    }

    async fn scan(&self, request: ScanRequest) -> Result<Vec<Item>, StoreError> {
        Counters::bump(&self.counters.scan);
        let filter = request
            .filter
            .as_ref()
            .map(|f| FilterExpression::parse(&f.expression, &f.names, &f.values))
            .transpose()?;

        let tables = self.tables.read().await;
        let table = tables
            .get(&request.table)
            .ok_or_else(|| table_not_found(&request.table))?;

        let matching = table
            .items
            .iter()
            .map(|(_, item)| item)
            .filter(|item| filter.as_ref().map_or(true, |f| f.matches(item)))
            .cloned();

        Ok(match request.limit {
            Some(limit) => matching.take(limit).collect(),
            None => matching.collect(),
        })
    }

    async fn batch_delete(
        &self,
        table: &str,
        keys: &[PhysicalKey],
    ) -> Result<BatchWriteOutcome, StoreError> {
        Counters::bump(&self.counters.batch_write);
        {
            let mut budget = self.batch_write_budget.write().await;
            match *budget {
                Some(0) => {
                    return Err(StoreError::Unavailable(
                        "injected batch write failure".to_string(),
                    ))
                }
                Some(remaining) => *budget = Some(remaining - 1),
                None => {}
            }
        }

        let mut tables = self.tables.write().await;
        let table = tables.get_mut(table).ok_or_else(|| table_not_found(table))?;
        for key in keys {
            let key = table.key_of(key)?;
            table.remove(&key);
        }

        Ok(BatchWriteOutcome {
            processed: keys.len(),
            unprocessed: 0,
        })
    }
}

#[cfg(test)]
mod tests {
    use authkv_core::expression::{compile_filter, compile_update};
    use authkv_core::keys::KeyStrategy;
    use authkv_core::schema::describe_schema;
    use authkv_core::Condition;
    use serde_json::{json, Value};

    use super::*;

    fn item(value: Value) -> Item {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected an object"),
        }
    }

    fn multi_table_store() -> InMemoryStore {
        InMemoryStore::with_schema(&describe_schema(&KeyStrategy::multi_table(""), &["user"]))
    }

    fn user_key(id: &str) -> PhysicalKey {
        PhysicalKey::Simple { id: id.to_string() }
    }

    #[tokio::test]
    async fn test_put_then_get() {
        let store = multi_table_store();
        store
            .put_item("user", item(json!({"id": "u1", "name": "Ada"})))
            .await
            .unwrap();

        let found = store.get_item("user", &user_key("u1")).await.unwrap();
        assert_eq!(found, Some(item(json!({"id": "u1", "name": "Ada"}))));
        assert_eq!(store.get_item("user", &user_key("u2")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_put_replaces_existing_item() {
        let store = multi_table_store();
        store
            .put_item("user", item(json!({"id": "u1", "name": "Ada"})))
            .await
            .unwrap();
        store
            .put_item("user", item(json!({"id": "u1", "email": "ada@example.com"})))
            .await
            .unwrap();

        assert_eq!(
            store.items("user").await,
            vec![item(json!({"id": "u1", "email": "ada@example.com"}))]
        );
    }

    #[tokio::test]
    async fn test_unknown_table_is_reported() {
        let store = multi_table_store();
        let err = store.get_item("session", &user_key("s1")).await.unwrap_err();
        assert_eq!(err, StoreError::TableNotFound("session".to_string()));
    }

    #[tokio::test]
    async fn test_key_must_match_table_schema() {
        let store = multi_table_store();
        let key = PhysicalKey::Composite {
            pk: "USER#u1".to_string(),
            sk: "USER#u1".to_string(),
        };
        let err = store.get_item("user", &key).await.unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));

        let err = store
            .put_item("user", item(json!({"name": "no id"})))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Validation(_)));
    }

    #[tokio::test]
    async fn test_scan_filters_and_limits_matches() {
        let store = multi_table_store();
        for (id, role) in [("u1", "admin"), ("u2", "user"), ("u3", "user"), ("u4", "user")] {
            store
                .put_item("user", item(json!({"id": id, "role": role})))
                .await
                .unwrap();
        }

        let filter = compile_filter(&[Condition::eq("role", "user")]).unwrap();
        let rows = store
            .scan(ScanRequest::new("user").with_filter(filter).with_limit(Some(2)))
            .await
            .unwrap();

        let ids: Vec<_> = rows.iter().map(|r| r["id"].as_str().unwrap()).collect();
        assert_eq!(ids, vec!["u2", "u3"]);
        assert_eq!(store.request_counts().scan, 1);
    }

    #[tokio::test]
    async fn test_conditional_update_on_missing_item_fails() {
        let store = multi_table_store();
        let key = user_key("ghost");
        let request = UpdateRequest {
            table: "user".to_string(),
            key: key.clone(),
            update: compile_update(&item(json!({"name": "x"})), &["id"], "t").unwrap(),
            condition: Some(key.exists_condition()),
        };

        let err = store.update_item(request).await.unwrap_err();
        assert_eq!(err, StoreError::ConditionFailed);
        assert!(store.items("user").await.is_empty());
    }

    #[tokio::test]
    async fn test_unconditional_update_creates_missing_item() {
        let store = multi_table_store();
        let updated = store
            .update_item(UpdateRequest {
                table: "user".to_string(),
                key: user_key("u9"),
                update: compile_update(&item(json!({"name": "x"})), &["id"], "t").unwrap(),
                condition: None,
            })
            .await
            .unwrap();

        assert_eq!(updated, item(json!({"id": "u9", "name": "x", "updatedAt": "t"})));
        assert_eq!(store.items("user").await.len(), 1);
    }

    #[tokio::test]
    async fn test_update_returns_new_item() {
        let store = multi_table_store();
        store
            .put_item("user", item(json!({"id": "u1", "name": "Ada"})))
            .await
            .unwrap();

        let key = user_key("u1");
        let updated = store
            .update_item(UpdateRequest {
                table: "user".to_string(),
                key: key.clone(),
                update: compile_update(&item(json!({"name": "Ada L."})), &["id"], "t1").unwrap(),
                condition: Some(key.exists_condition()),
            })
            .await
            .unwrap();

        assert_eq!(
            updated,
            item(json!({"id": "u1", "name": "Ada L.", "updatedAt": "t1"}))
        );
        assert_eq!(store.items("user").await, vec![updated]);
    }

    #[tokio::test]
    async fn test_batch_write_failure_injection() {
        let store = multi_table_store();
        for id in ["u1", "u2"] {
            store
                .put_item("user", item(json!({"id": id})))
                .await
                .unwrap();
        }
        store.fail_batch_writes_after(1).await;

        let outcome = store
            .batch_delete("user", &[user_key("u1")])
            .await
            .unwrap();
        assert_eq!(outcome.processed, 1);

        let err = store
            .batch_delete("user", &[user_key("u2")])
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
        assert_eq!(store.items("user").await.len(), 1);
        assert_eq!(store.request_counts().batch_write, 2);
    }

    #[tokio::test]
    async fn test_request_counts() {
        let store = multi_table_store();
        store
            .put_item("user", item(json!({"id": "u1"})))
            .await
            .unwrap();
        store.get_item("user", &user_key("u1")).await.unwrap();
        store.delete_item("user", &user_key("u1")).await.unwrap();

        let counts = store.request_counts();
        assert_eq!(counts.get_item, 1);
        assert_eq!(counts.mutations(), 2);
    }
}
