//! Table state lookups (Imperative Shell).

use aws_sdk_dynamodb::types::{IndexStatus, TableDescription};
use aws_sdk_dynamodb::Client;

use super::error::{DynamodbError, Result};
use super::planning::{GsiState, GsiStatus, TableState, TableStatus};

/// Fetches current table state, returns None if table doesn't exist.
pub async fn get_table_state(client: &Client, table_name: &str) -> Result<Option<TableState>> {
    match client.describe_table().table_name(table_name).send().await {
        Ok(response) => Ok(response.table().map(table_state)),
        Err(err) => {
            let not_found = err
                .as_service_error()
                .is_some_and(|e| e.is_resource_not_found_exception());
            if not_found {
                Ok(None)
            } else {
                Err(DynamodbError::AwsSdk(format!("DescribeTable {table_name}: {err}")))
            }
        }
    }
}

/// Fetches the state of every named table that exists.
pub async fn get_table_states(
    client: &Client,
    table_names: &[&str],
) -> Result<Vec<(String, TableState)>> {
    let mut states = Vec::with_capacity(table_names.len());
    for name in table_names {
        if let Some(state) = get_table_state(client, name).await? {
            states.push((name.to_string(), state));
        }
    }
    Ok(states)
}

fn table_state(table: &TableDescription) -> TableState {
    use aws_sdk_dynamodb::types::TableStatus as Status;

    let gsis = table
        .global_secondary_indexes()
        .iter()
        .map(|gsi| GsiState {
            name: gsi.index_name().unwrap_or_default().to_string(),
            status: match gsi.index_status() {
                Some(IndexStatus::Creating) => GsiStatus::Creating,
                Some(IndexStatus::Updating) => GsiStatus::Updating,
                Some(IndexStatus::Deleting) => GsiStatus::Deleting,
                _ => GsiStatus::Active,
            },
        })
        .collect();

    let status = match table.table_status() {
        Some(Status::Creating) => TableStatus::Creating,
        Some(Status::Updating) => TableStatus::Updating,
        Some(Status::Deleting) => TableStatus::Deleting,
        _ => TableStatus::Active,
    };

    TableState { status, gsis }
}
