//! Table deployment operations (Imperative Shell).

use std::time::Duration;

use aws_sdk_dynamodb::types::{
    AttributeDefinition, BillingMode, CreateGlobalSecondaryIndexAction, GlobalSecondaryIndex,
    GlobalSecondaryIndexUpdate, KeySchemaElement, KeyType, Projection, ProjectionType,
    ScalarAttributeType,
};
use aws_sdk_dynamodb::Client;

use authkv_core::schema::{self, GsiConfig, KeyAttribute, TableConfig};

use super::client;
use super::error::{DynamodbError, Result};
use super::planning::{DeployPlan, DestroyPlan, DropPlan, GsiStatus, TablePlan, TableStatus};

const ACTIVATION_ATTEMPTS: usize = 60;
const ACTIVATION_DELAY: Duration = Duration::from_secs(2);

/// Execute a deploy plan, one table at a time.
pub async fn execute_deploy_plan(client: &Client, plan: &DeployPlan) -> Result<()> {
    for table in &plan.tables {
        match table {
            TablePlan::Create { config } => {
                create_table(client, config).await?;
                wait_for_table_active(client, &config.table_name).await?;
            }
            TablePlan::AddGsis {
                table_name,
                gsis_to_add,
            } => {
                // DynamoDB accepts one GSI creation per UpdateTable call.
                for gsi in gsis_to_add {
                    add_gsi(client, table_name, gsi).await?;
                    wait_for_table_active(client, table_name).await?;
                }
            }
            TablePlan::NoChanges { .. } => {}
        }
    }
    Ok(())
}

/// Execute a destroy plan.
pub async fn execute_destroy_plan(client: &Client, plan: &DestroyPlan) -> Result<()> {
    for table in &plan.tables {
        if let DropPlan::Delete { table_name } = table {
            client
                .delete_table()
                .table_name(table_name)
                .send()
                .await
                .map_err(DynamodbError::sdk)?;
        }
    }
    Ok(())
}

async fn create_table(client: &Client, config: &TableConfig) -> Result<()> {
    let attribute_definitions = config
        .key_attributes()
        .into_iter()
        .map(attribute_definition)
        .collect::<Result<Vec<_>>>()?;

    let mut request = client
        .create_table()
        .table_name(&config.table_name)
        .set_key_schema(Some(key_schema(&config.partition_key, config.sort_key.as_ref())?))
        .set_attribute_definitions(Some(attribute_definitions))
        .billing_mode(billing_mode(config.billing_mode));

    for gsi in &config.gsis {
        request = request.global_secondary_indexes(
            GlobalSecondaryIndex::builder()
                .index_name(&gsi.name)
                .set_key_schema(Some(key_schema(&gsi.partition_key, gsi.sort_key.as_ref())?))
                .projection(projection(gsi))
                .build()
                .map_err(DynamodbError::sdk)?,
        );
    }

    request.send().await.map_err(DynamodbError::sdk)?;
    Ok(())
}

async fn add_gsi(client: &Client, table_name: &str, gsi: &GsiConfig) -> Result<()> {
    let attribute_definitions = std::iter::once(&gsi.partition_key)
        .chain(gsi.sort_key.iter())
        .map(attribute_definition)
        .collect::<Result<Vec<_>>>()?;

    let create = CreateGlobalSecondaryIndexAction::builder()
        .index_name(&gsi.name)
        .set_key_schema(Some(key_schema(&gsi.partition_key, gsi.sort_key.as_ref())?))
        .projection(projection(gsi))
        .build()
        .map_err(DynamodbError::sdk)?;

    client
        .update_table()
        .table_name(table_name)
        .set_attribute_definitions(Some(attribute_definitions))
        .global_secondary_index_updates(GlobalSecondaryIndexUpdate::builder().create(create).build())
        .send()
        .await
        .map_err(DynamodbError::sdk)?;

    Ok(())
}

async fn wait_for_table_active(client: &Client, table_name: &str) -> Result<()> {
    for _ in 0..ACTIVATION_ATTEMPTS {
        if let Some(state) = client::get_table_state(client, table_name).await? {
            let gsis_active = state.gsis.iter().all(|g| g.status == GsiStatus::Active);
            if state.status == TableStatus::Active && gsis_active {
                return Ok(());
            }
        }
        tokio::time::sleep(ACTIVATION_DELAY).await;
    }

    Err(DynamodbError::TableActivationTimeout {
        table_name: table_name.to_string(),
    })
}

fn key_schema(
    partition_key: &KeyAttribute,
    sort_key: Option<&KeyAttribute>,
) -> Result<Vec<KeySchemaElement>> {
    std::iter::once((partition_key, KeyType::Hash))
        .chain(sort_key.map(|sk| (sk, KeyType::Range)))
        .map(|(attribute, key_type)| {
            KeySchemaElement::builder()
                .attribute_name(&attribute.name)
                .key_type(key_type)
                .build()
                .map_err(DynamodbError::sdk)
        })
        .collect()
}

fn attribute_definition(attribute: &KeyAttribute) -> Result<AttributeDefinition> {
    AttributeDefinition::builder()
        .attribute_name(&attribute.name)
        .attribute_type(scalar_type(attribute.attribute_type))
        .build()
        .map_err(DynamodbError::sdk)
}

fn projection(gsi: &GsiConfig) -> Projection {
    let projection_type = match gsi.projection {
        schema::ProjectionType::All => ProjectionType::All,
    };
    Projection::builder().projection_type(projection_type).build()
}

fn billing_mode(mode: schema::BillingMode) -> BillingMode {
    match mode {
        schema::BillingMode::PayPerRequest => BillingMode::PayPerRequest,
    }
}

fn scalar_type(attribute_type: schema::AttributeType) -> ScalarAttributeType {
    match attribute_type {
        schema::AttributeType::String => ScalarAttributeType::S,
    }
}
