mod error;
mod traits;
mod types;

pub use error::{AdapterError, Operation, Result, StoreError};
pub use traits::DocumentStore;
pub use types::{BatchWriteOutcome, Item, ScanRequest, UpdateRequest};
