//! CRUD adapter.
//!
//! Exposes relational-style operations over a [`DocumentStore`] that only
//! offers primary-key access and filtered scans. Reads resolve to a direct
//! key lookup when the conditions pin down an `id`, and to a filtered scan
//! otherwise. Writes go through the resolved physical key.
//!
//! `update_many`, `delete_many` and `count` read every matching row first,
//! so their cost grows with the number of matches.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, info};

use authkv_core::condition::Condition;
use authkv_core::entity::{now_timestamp, Entity, Record, CREATED_AT_FIELD, UPDATED_AT_FIELD};
use authkv_core::expression::{compile_filter, compile_update, CompiledExpression};
use authkv_core::keys::{KeyStrategy, ID_FIELD, TYPE_FIELD};
use authkv_core::pagination::{self, Pagination};
use authkv_core::schema::{describe_schema, SchemaDescriptor};
use authkv_core::storage::{
    AdapterError, DocumentStore, Item, Operation, Result, ScanRequest, StoreError, UpdateRequest,
};

use crate::batch::BatchExecutor;
use crate::config::AdapterConfig;

/// Data-access adapter for one store and topology.
pub struct KvAdapter<S> {
    store: Arc<S>,
    keys: KeyStrategy,
    batch: BatchExecutor<S>,
    config: AdapterConfig,
}

impl<S> Clone for KvAdapter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            keys: self.keys.clone(),
            batch: self.batch.clone(),
            config: self.config.clone(),
        }
    }
}

impl<S: DocumentStore> KvAdapter<S> {
    pub fn new(store: Arc<S>, config: AdapterConfig) -> Self {
        let batch =
            BatchExecutor::new(Arc::clone(&store)).with_max_concurrency(config.max_concurrency);
        Self {
            store,
            keys: config.key_strategy(),
            batch,
            config,
        }
    }

    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    pub fn key_strategy(&self) -> &KeyStrategy {
        &self.keys
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Writes a new entity and returns it as stored.
    ///
    /// `data` must carry a string `id`. Writing an existing (model, id)
    /// replaces it. Null fields are not stored. `createdAt` and `updatedAt`
    /// default to the current time.
    pub async fn create(&self, model: &str, data: Record) -> Result<Entity> {
        let id = entity_id(&data)?.to_string();
        let table = self.keys.resolve_table(model);

        let mut item: Item = data.into_iter().filter(|(_, v)| !v.is_null()).collect();
        let now = now_timestamp();
        for field in [CREATED_AT_FIELD, UPDATED_AT_FIELD] {
            item.entry(field)
                .or_insert_with(|| Value::String(now.clone()));
        }
        for (name, value) in self.keys.resolve_key(model, &id).attributes() {
            item.insert(name.to_string(), Value::String(value.to_string()));
        }
        if self.keys.is_single_table() {
            item.insert(TYPE_FIELD.to_string(), Value::String(model.to_string()));
        }

        debug!(model, table = %table, id = %id, "put item");
        self.store
            .put_item(&table, item.clone())
            .await
            .map_err(|e| AdapterError::store(Operation::Create, model, e))?;

        Ok(self.to_entity(item))
    }

    /// Finds the first entity matching every condition.
    ///
    /// A single `id` equality is served by a direct key lookup. No conditions
    /// means no match.
    pub async fn find_one(&self, model: &str, conditions: &[Condition]) -> Result<Option<Entity>> {
        Ok(self
            .find_item(Operation::FindOne, model, conditions)
            .await?
            .map(|item| self.to_entity(item)))
    }

    /// Finds every entity matching the conditions, then sorts and pages them.
    pub async fn find_many(
        &self,
        model: &str,
        conditions: &[Condition],
        pagination: &Pagination,
    ) -> Result<Vec<Entity>> {
        let rows = self
            .scan_items(Operation::FindMany, model, conditions, pagination.fetch_cap())
            .await?;

        Ok(pagination::apply(rows, pagination)
            .into_iter()
            .map(|item| self.to_entity(item))
            .collect())
    }

    /// Updates the first entity matching the conditions.
    ///
    /// Returns `None` without writing when nothing matches, or when the row
    /// disappears between the read and the write.
    pub async fn update(
        &self,
        model: &str,
        conditions: &[Condition],
        fields: &Record,
    ) -> Result<Option<Entity>> {
        let update = self.compile_update(fields)?;

        let Some(target) = self.find_item(Operation::Update, model, conditions).await? else {
            debug!(model, "update matched nothing");
            return Ok(None);
        };
        let id = entity_id(&target)?;

        Ok(self
            .update_by_id(Operation::Update, model, id, update)
            .await?
            .map(|item| self.to_entity(item)))
    }

    /// Updates every entity matching the conditions.
    ///
    /// Returns how many rows were updated. Rows removed between the read and
    /// their write are skipped.
    pub async fn update_many(
        &self,
        model: &str,
        conditions: &[Condition],
        fields: &Record,
    ) -> Result<usize> {
        let update = self.compile_update(fields)?;
        let rows = self
            .scan_items(Operation::UpdateMany, model, conditions, None)
            .await?;
        let ids = rows
            .iter()
            .map(|row| entity_id(row).map(str::to_string))
            .collect::<Result<Vec<_>>>()?;

        let matched = ids.len();
        let updated = self
            .batch
            .for_each_concurrent(Operation::UpdateMany, model, ids, |id| {
                let update = update.clone();
                async move {
                    self.update_by_id(Operation::UpdateMany, model, &id, update)
                        .await
                }
            })
            .await?
            .into_iter()
            .filter(Option::is_some)
            .count();

        info!(model, matched, updated, "update_many completed");
        Ok(updated)
    }

    /// Deletes the first entity matching the conditions. Returns 0 or 1.
    pub async fn delete(&self, model: &str, conditions: &[Condition]) -> Result<usize> {
        let Some(target) = self.find_item(Operation::Delete, model, conditions).await? else {
            return Ok(0);
        };
        let id = entity_id(&target)?;
        let table = self.keys.resolve_table(model);

        debug!(model, table = %table, id, "delete item");
        self.store
            .delete_item(&table, &self.keys.resolve_key(model, id))
            .await
            .map_err(|e| AdapterError::store(Operation::Delete, model, e))?;
        Ok(1)
    }

    /// Deletes every entity matching the conditions and returns how many.
    pub async fn delete_many(&self, model: &str, conditions: &[Condition]) -> Result<usize> {
        let rows = self
            .scan_items(Operation::DeleteMany, model, conditions, None)
            .await?;
        if rows.is_empty() {
            return Ok(0);
        }

        let keys = rows
            .iter()
            .map(|row| entity_id(row).map(|id| self.keys.resolve_key(model, id)))
            .collect::<Result<Vec<_>>>()?;
        let table = self.keys.resolve_table(model);

        self.batch.delete_all(model, &table, &keys).await
    }

    /// Counts the entities matching the conditions.
    pub async fn count(&self, model: &str, conditions: &[Condition]) -> Result<usize> {
        Ok(self
            .scan_items(Operation::Count, model, conditions, None)
            .await?
            .len())
    }

    /// Describes the tables needed to store `models`.
    pub fn describe_schema(&self, models: &[&str]) -> SchemaDescriptor {
        describe_schema(&self.keys, models)
    }

    fn compile_update(&self, fields: &Record) -> Result<CompiledExpression> {
        compile_update(fields, self.keys.immutable_attributes(), &now_timestamp())
    }

    async fn find_item(
        &self,
        operation: Operation,
        model: &str,
        conditions: &[Condition],
    ) -> Result<Option<Item>> {
        if conditions.is_empty() {
            return Ok(None);
        }

        if let [condition] = conditions {
            if let Some(id) = condition.equality_on(ID_FIELD) {
                let table = self.keys.resolve_table(model);
                debug!(model, table = %table, id, "get item");
                return self
                    .store
                    .get_item(&table, &self.keys.resolve_key(model, id))
                    .await
                    .map_err(|e| AdapterError::store(operation, model, e));
            }
        }

        Ok(self
            .scan_items(operation, model, conditions, Some(1))
            .await?
            .into_iter()
            .next())
    }

    async fn scan_items(
        &self,
        operation: Operation,
        model: &str,
        conditions: &[Condition],
        limit: Option<usize>,
    ) -> Result<Vec<Item>> {
        let table = self.keys.resolve_table(model);
        let filter = if self.keys.is_single_table() {
            // Models share the table: every scan is scoped to this model.
            let scoped: Vec<Condition> = std::iter::once(Condition::eq(TYPE_FIELD, model))
                .chain(conditions.iter().cloned())
                .collect();
            compile_filter(&scoped)?
        } else {
            compile_filter(conditions)?
        };

        debug!(model, table = %table, %operation, ?limit, "scan");
        self.store
            .scan(ScanRequest::new(&table).with_filter(filter).with_limit(limit))
            .await
            .map_err(|e| AdapterError::store(operation, model, e))
    }

    async fn update_by_id(
        &self,
        operation: Operation,
        model: &str,
        id: &str,
        update: CompiledExpression,
    ) -> Result<Option<Item>> {
        let key = self.keys.resolve_key(model, id);
        let request = UpdateRequest {
            table: self.keys.resolve_table(model),
            condition: Some(key.exists_condition()),
            key,
            update,
        };

        debug!(model, table = %request.table, id, "update item");
        match self.store.update_item(request).await {
            Ok(item) => Ok(Some(item)),
            Err(StoreError::ConditionFailed) => {
                debug!(model, id, "update target disappeared");
                Ok(None)
            }
            Err(e) => Err(AdapterError::store(operation, model, e)),
        }
    }

    /// The caller-visible view of a stored item.
    fn to_entity(&self, mut item: Item) -> Entity {
        if !self.config.expose_internal_fields {
            for name in self.keys.internal_attributes() {
                item.remove(*name);
            }
        }
        Entity::new(item)
    }
}

fn entity_id(record: &Record) -> Result<&str> {
    match record.get(ID_FIELD) {
        Some(Value::String(id)) if !id.is_empty() => Ok(id),
        _ => Err(AdapterError::InvalidData(format!(
            "entity requires a non-empty string '{ID_FIELD}'"
        ))),
    }
}
