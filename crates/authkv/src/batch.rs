//! Batch executor.
//!
//! Bulk deletes go out as sequential `BatchWriteItem` requests of at most 25
//! keys. Per-row operations fan out through a bounded `buffer_unordered`
//! stream. Nothing is rolled back: a failure reports how many items were
//! confirmed before it.

use std::future::Future;
use std::sync::Arc;

use futures_util::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use authkv_core::batch::{chunk_count, plan_chunks, MAX_BATCH_WRITE_ITEMS};
use authkv_core::keys::PhysicalKey;
use authkv_core::storage::{AdapterError, DocumentStore, Operation, Result, StoreError};

use crate::config::DEFAULT_MAX_CONCURRENCY;

pub struct BatchExecutor<S> {
    store: Arc<S>,
    chunk_size: usize,
    max_concurrency: usize,
}

// Manual impl: cloning shares the store and does not require `S: Clone`.
impl<S> Clone for BatchExecutor<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            chunk_size: self.chunk_size,
            max_concurrency: self.max_concurrency,
        }
    }
}

impl<S: DocumentStore> BatchExecutor<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self {
            store,
            chunk_size: MAX_BATCH_WRITE_ITEMS,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    /// Sets the chunk size, clamped to `1..=25`.
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size.clamp(1, MAX_BATCH_WRITE_ITEMS);
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency.max(1);
        self
    }

    /// Deletes `keys` from `table` in chunks, one batch request per chunk.
    ///
    /// Returns the number of deleted items. Chunks run in order; a failed or
    /// partially processed chunk stops the run.
    pub async fn delete_all(&self, model: &str, table: &str, keys: &[PhysicalKey]) -> Result<usize> {
        let total = keys.len();
        let mut completed = 0;

        debug!(
            model,
            table,
            total,
            batches = chunk_count(total, self.chunk_size),
            "starting batch delete"
        );

        for chunk in plan_chunks(keys, self.chunk_size) {
            let failure = match self.store.batch_delete(table, chunk).await {
                Ok(outcome) => {
                    completed += outcome.processed;
                    if outcome.unprocessed == 0 {
                        continue;
                    }
                    StoreError::Unprocessed {
                        requested: chunk.len(),
                        unprocessed: outcome.unprocessed,
                    }
                }
                Err(source) => source,
            };

            let source = AdapterError::store(Operation::DeleteMany, model, failure);
            if completed == 0 {
                return Err(source);
            }
            warn!(model, table, completed, total, error = %source, "batch delete stopped early");
            return Err(AdapterError::BatchPartialFailure {
                operation: Operation::DeleteMany,
                model: model.to_string(),
                completed,
                total,
                source: Box::new(source),
            });
        }

        info!(model, table, count = completed, "batch delete completed");
        Ok(completed)
    }

    /// Runs `operation` on every item with at most `max_concurrency` in flight.
    ///
    /// Every item is attempted. When some fail, the first failure is returned:
    /// as is if nothing succeeded, otherwise wrapped in
    /// [`AdapterError::BatchPartialFailure`] with the success count.
    pub async fn for_each_concurrent<T, R, F, Fut>(
        &self,
        operation: Operation,
        model: &str,
        items: Vec<T>,
        run: F,
    ) -> Result<Vec<R>>
    where
        F: FnMut(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let total = items.len();
        let mut outcomes = stream::iter(items)
            .map(run)
            .buffer_unordered(self.max_concurrency);

        let mut succeeded = Vec::with_capacity(total);
        let mut first_failure = None;
        let mut failures = 0;
        while let Some(outcome) = outcomes.next().await {
            match outcome {
                Ok(value) => succeeded.push(value),
                Err(err) => {
                    failures += 1;
                    first_failure.get_or_insert(err);
                }
            }
        }

        match first_failure {
            None => Ok(succeeded),
            Some(err) if succeeded.is_empty() => Err(err),
            Some(err) => {
                warn!(
                    %operation,
                    model,
                    completed = succeeded.len(),
                    failures,
                    total,
                    error = %err,
                    "concurrent run finished with failures"
                );
                Err(AdapterError::BatchPartialFailure {
                    operation,
                    model: model.to_string(),
                    completed: succeeded.len(),
                    total,
                    source: Box::new(err),
                })
            }
        }
    }
}
