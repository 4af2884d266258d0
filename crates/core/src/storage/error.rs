use std::fmt;

use thiserror::Error;

/// Errors reported by a [`DocumentStore`](super::DocumentStore) implementation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Throttled: {0}")]
    Throttled(String),
    #[error("Table not found: {0}")]
    TableNotFound(String),
    #[error("Condition check failed")]
    ConditionFailed,
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Serialization error: {0}")]
    Serialization(String),
    #[error("Request failed: {0}")]
    RequestFailed(String),
    #[error("{unprocessed} of {requested} batch items were not processed")]
    Unprocessed { requested: usize, unprocessed: usize },
}

/// The caller-facing operation that produced an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Create,
    Update,
    UpdateMany,
    Delete,
    DeleteMany,
    FindOne,
    FindMany,
    Count,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Create => "create",
            Operation::Update => "update",
            Operation::UpdateMany => "update_many",
            Operation::Delete => "delete",
            Operation::DeleteMany => "delete_many",
            Operation::FindOne => "find_one",
            Operation::FindMany => "find_many",
            Operation::Count => "count",
        };
        f.write_str(name)
    }
}

/// Errors surfaced to callers of the adapter.
///
/// A missing target is never an error: `update` returns `None` and `delete`
/// returns zero.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum AdapterError {
    #[error("Malformed condition on field '{field}': {reason}")]
    MalformedCondition { field: String, reason: String },
    #[error("Invalid update of field '{field}': {reason}")]
    InvalidUpdate { field: String, reason: String },
    #[error("Invalid data: {0}")]
    InvalidData(String),
    #[error("{operation} on model '{model}' failed: {source}")]
    Store {
        operation: Operation,
        model: String,
        #[source]
        source: StoreError,
    },
    #[error(
        "{operation} on model '{model}' stopped after {completed} of {total} items: {source}"
    )]
    BatchPartialFailure {
        operation: Operation,
        model: String,
        completed: usize,
        total: usize,
        #[source]
        source: Box<AdapterError>,
    },
}

impl AdapterError {
    /// Wraps a store error with the operation and model that triggered it.
    pub fn store(operation: Operation, model: impl Into<String>, source: StoreError) -> Self {
        Self::Store {
            operation,
            model: model.into(),
            source,
        }
    }

    pub(crate) fn malformed(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCondition {
            field: field.into(),
            reason: reason.into(),
        }
    }

    /// Returns the underlying store error, looking through batch failures.
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            AdapterError::Store { source, .. } => Some(source),
            AdapterError::BatchPartialFailure { source, .. } => source.store_error(),
            _ => None,
        }
    }

    /// True when the store asked the caller to back off.
    pub fn is_throttled(&self) -> bool {
        matches!(self.store_error(), Some(StoreError::Throttled(_)))
    }
}

/// Result type for adapter operations.
pub type Result<T> = std::result::Result<T, AdapterError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_unprocessed_display() {
        let error = StoreError::Unprocessed {
            requested: 25,
            unprocessed: 3,
        };
        assert_eq!(error.to_string(), "3 of 25 batch items were not processed");
    }

    #[test]
    fn test_malformed_condition_display() {
        let error = AdapterError::malformed("email", "unknown operator 'like'");
        assert_eq!(
            error.to_string(),
            "Malformed condition on field 'email': unknown operator 'like'"
        );
    }

    #[test]
    fn test_store_error_carries_operation_context() {
        let error = AdapterError::store(
            Operation::FindMany,
            "session",
            StoreError::Throttled("slow down".to_string()),
        );
        assert_eq!(
            error.to_string(),
            "find_many on model 'session' failed: Throttled: slow down"
        );
        assert!(error.is_throttled());
    }

    #[test]
    fn test_batch_partial_failure_exposes_store_error() {
        let error = AdapterError::BatchPartialFailure {
            operation: Operation::DeleteMany,
            model: "session".to_string(),
            completed: 25,
            total: 60,
            source: Box::new(AdapterError::store(
                Operation::DeleteMany,
                "session",
                StoreError::Unavailable("connection reset".to_string()),
            )),
        };

        assert_eq!(
            error.store_error(),
            Some(&StoreError::Unavailable("connection reset".to_string()))
        );
        assert!(!error.is_throttled());
        assert!(error.to_string().contains("stopped after 25 of 60 items"));
    }
}
