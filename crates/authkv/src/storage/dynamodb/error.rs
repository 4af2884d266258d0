//! DynamoDB error mapping.
//!
//! Maps AWS SDK errors to `StoreError` from `authkv_core::storage`.

use std::fmt::Debug;

use aws_sdk_dynamodb::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_dynamodb::operation::batch_write_item::BatchWriteItemError;
use aws_sdk_dynamodb::operation::delete_item::DeleteItemError;
use aws_sdk_dynamodb::operation::get_item::GetItemError;
use aws_sdk_dynamodb::operation::put_item::PutItemError;
use aws_sdk_dynamodb::operation::scan::ScanError;
use aws_sdk_dynamodb::operation::update_item::UpdateItemError;
use authkv_core::storage::StoreError;

/// Splits an SDK error into the service error, or a store error when the
/// request never got a service response.
fn service_error<E: Debug, R: Debug>(
    err: SdkError<E, R>,
    operation: &str,
) -> Result<E, StoreError> {
    match err {
        SdkError::ServiceError(context) => Ok(context.into_err()),
        SdkError::TimeoutError(_) => Err(StoreError::Unavailable(format!("{operation} timed out"))),
        SdkError::DispatchFailure(failure) => Err(StoreError::Unavailable(format!(
            "{operation} dispatch failed: {failure:?}"
        ))),
        other => Err(StoreError::RequestFailed(format!(
            "{operation} failed: {other:?}"
        ))),
    }
}

/// Maps a service error the operation-specific functions do not name.
fn unmodeled_error<E: ProvideErrorMetadata + Debug>(err: E, operation: &str) -> StoreError {
    let message = err.message().unwrap_or_default().to_string();
    match err.code() {
        Some("ValidationException") => StoreError::Validation(message),
        Some("ThrottlingException") => StoreError::Throttled(message),
        _ => StoreError::RequestFailed(format!("{operation} failed: {err:?}")),
    }
}

fn table_not_found(table: &str) -> StoreError {
    StoreError::TableNotFound(table.to_string())
}

fn throughput_exceeded() -> StoreError {
    StoreError::Throttled("Throughput exceeded, please retry".to_string())
}

fn request_limit_exceeded() -> StoreError {
    StoreError::Throttled("Request limit exceeded, please retry".to_string())
}

fn internal_server_error() -> StoreError {
    StoreError::Unavailable("DynamoDB internal server error".to_string())
}

/// Map a GetItem SDK error to StoreError.
pub fn map_get_item_error<R: Debug>(err: SdkError<GetItemError, R>, table: &str) -> StoreError {
    match service_error(err, "GetItem") {
        Ok(GetItemError::ResourceNotFoundException(_)) => table_not_found(table),
        Ok(GetItemError::ProvisionedThroughputExceededException(_)) => throughput_exceeded(),
        Ok(GetItemError::RequestLimitExceeded(_)) => request_limit_exceeded(),
        Ok(GetItemError::InternalServerError(_)) => internal_server_error(),
        Ok(err) => unmodeled_error(err, "GetItem"),
        Err(err) => err,
    }
}

/// Map a PutItem SDK error to StoreError.
pub fn map_put_item_error<R: Debug>(err: SdkError<PutItemError, R>, table: &str) -> StoreError {
    match service_error(err, "PutItem") {
        Ok(PutItemError::ConditionalCheckFailedException(_)) => StoreError::ConditionFailed,
        Ok(PutItemError::ResourceNotFoundException(_)) => table_not_found(table),
        Ok(PutItemError::ProvisionedThroughputExceededException(_)) => throughput_exceeded(),
        Ok(PutItemError::RequestLimitExceeded(_)) => request_limit_exceeded(),
        Ok(PutItemError::ItemCollectionSizeLimitExceededException(_)) => {
            StoreError::RequestFailed("Item collection size limit exceeded".to_string())
        }
        Ok(PutItemError::TransactionConflictException(_)) => {
            StoreError::Throttled("Transaction conflict, please retry".to_string())
        }
        Ok(PutItemError::InternalServerError(_)) => internal_server_error(),
        Ok(err) => unmodeled_error(err, "PutItem"),
        Err(err) => err,
    }
}

/// Map an UpdateItem SDK error to StoreError.
pub fn map_update_item_error<R: Debug>(
    err: SdkError<UpdateItemError, R>,
    table: &str,
) -> StoreError {
    match service_error(err, "UpdateItem") {
        Ok(UpdateItemError::ConditionalCheckFailedException(_)) => StoreError::ConditionFailed,
        Ok(UpdateItemError::ResourceNotFoundException(_)) => table_not_found(table),
        Ok(UpdateItemError::ProvisionedThroughputExceededException(_)) => throughput_exceeded(),
        Ok(UpdateItemError::RequestLimitExceeded(_)) => request_limit_exceeded(),
        Ok(UpdateItemError::ItemCollectionSizeLimitExceededException(_)) => {
            StoreError::RequestFailed("Item collection size limit exceeded".to_string())
        }
        Ok(UpdateItemError::TransactionConflictException(_)) => {
            StoreError::Throttled("Transaction conflict, please retry".to_string())
        }
        Ok(UpdateItemError::InternalServerError(_)) => internal_server_error(),
        Ok(err) => unmodeled_error(err, "UpdateItem"),
        Err(err) => err,
    }
}

/// Map a DeleteItem SDK error to StoreError.
pub fn map_delete_item_error<R: Debug>(
    err: SdkError<DeleteItemError, R>,
    table: &str,
) -> StoreError {
    match service_error(err, "DeleteItem") {
        Ok(DeleteItemError::ConditionalCheckFailedException(_)) => StoreError::ConditionFailed,
        Ok(DeleteItemError::ResourceNotFoundException(_)) => table_not_found(table),
        Ok(DeleteItemError::ProvisionedThroughputExceededException(_)) => throughput_exceeded(),
        Ok(DeleteItemError::RequestLimitExceeded(_)) => request_limit_exceeded(),
        Ok(DeleteItemError::TransactionConflictException(_)) => {
            StoreError::Throttled("Transaction conflict, please retry".to_string())
        }
        Ok(DeleteItemError::InternalServerError(_)) => internal_server_error(),
        Ok(err) => unmodeled_error(err, "DeleteItem"),
        Err(err) => err,
    }
}

/// Map a Scan SDK error to StoreError.
pub fn map_scan_error<R: Debug>(err: SdkError<ScanError, R>, table: &str) -> StoreError {
    match service_error(err, "Scan") {
        Ok(ScanError::ResourceNotFoundException(_)) => table_not_found(table),
        Ok(ScanError::ProvisionedThroughputExceededException(_)) => throughput_exceeded(),
        Ok(ScanError::RequestLimitExceeded(_)) => request_limit_exceeded(),
        Ok(ScanError::InternalServerError(_)) => internal_server_error(),
        Ok(err) => unmodeled_error(err, "Scan"),
        Err(err) => err,
    }
}

/// Map a BatchWriteItem SDK error to StoreError.
pub fn map_batch_write_error<R: Debug>(
    err: SdkError<BatchWriteItemError, R>,
    table: &str,
) -> StoreError {
    match service_error(err, "BatchWriteItem") {
        Ok(BatchWriteItemError::ResourceNotFoundException(_)) => table_not_found(table),
        Ok(BatchWriteItemError::ProvisionedThroughputExceededException(_)) => {
            throughput_exceeded()
        }
        Ok(BatchWriteItemError::RequestLimitExceeded(_)) => request_limit_exceeded(),
        Ok(BatchWriteItemError::ItemCollectionSizeLimitExceededException(_)) => {
            StoreError::RequestFailed("Item collection size limit exceeded".to_string())
        }
        Ok(BatchWriteItemError::InternalServerError(_)) => internal_server_error(),
        Ok(err) => unmodeled_error(err, "BatchWriteItem"),
        Err(err) => err,
    }
}

/// Map a request-building error to StoreError.
pub fn map_build_error(err: impl std::fmt::Display) -> StoreError {
    StoreError::Validation(err.to_string())
}
