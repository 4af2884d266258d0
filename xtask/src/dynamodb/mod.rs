//! DynamoDB infrastructure management commands.

mod client;
mod deploy;
mod error;
mod planning;

pub use error::{DynamodbError, Result};

use authkv::storage::dynamodb::create_client;
use authkv::{AdapterConfig, AwsConfig};
use authkv_core::schema::{describe_schema, DEFAULT_MODELS};
use dialoguer::Confirm;

use crate::prelude::*;

/// DynamoDB infrastructure management commands.
#[derive(Debug, clap::Parser)]
pub struct DynamodbCommand {
    #[command(subcommand)]
    pub action: DynamodbAction,
}

/// Available DynamoDB actions.
#[derive(Debug, clap::Subcommand)]
pub enum DynamodbAction {
    /// Deploy or destroy the adapter's DynamoDB tables.
    Deploy(DeployCommand),
}

/// Deploy or update DynamoDB infrastructure.
#[derive(Debug, clap::Parser)]
#[command(long_about = "Deploy or destroy the adapter's DynamoDB tables.

By default, this command creates the tables the configured topology needs:
one shared table with a composite key and GSI1 in single-table mode, or one
table per model in multi-table mode. Existing tables are left in place and
only gain missing GSIs.

The command shows a plan of changes before applying and asks for confirmation.

Environment variables:
  AWS_ENDPOINT_URL      - Use local DynamoDB (e.g., http://localhost:8000)
  AWS_REGION            - AWS region (defaults to us-east-1)
  AWS_PROFILE           - AWS profile to use for credentials
  AUTHKV_SINGLE_TABLE   - Topology when --single-table is not given
  AUTHKV_TABLE_NAME     - Shared table name when --table-name is not given
  AUTHKV_TABLE_PREFIX   - Table prefix when --table-prefix is not given")]
pub struct DeployCommand {
    /// Skip confirmation prompts.
    #[arg(long)]
    pub force: bool,

    /// Destroy the tables instead of creating/updating.
    #[arg(long)]
    pub destroy: bool,

    /// Models to provision tables for in multi-table mode.
    #[arg(long, value_delimiter = ',')]
    pub models: Vec<String>,

    /// Store every model in one shared table.
    #[arg(long)]
    pub single_table: Option<bool>,

    /// Shared table name in single-table mode.
    #[arg(long)]
    pub table_name: Option<String>,

    /// Per-model table name prefix in multi-table mode.
    #[arg(long)]
    pub table_prefix: Option<String>,
}

impl DeployCommand {
    fn adapter_config(&self) -> AdapterConfig {
        AdapterConfig::from_env().with_overrides(
            self.single_table,
            self.table_name.clone(),
            self.table_prefix.clone(),
        )
    }

    fn models(&self) -> Vec<&str> {
        if self.models.is_empty() {
            DEFAULT_MODELS.to_vec()
        } else {
            self.models.iter().map(String::as_str).collect()
        }
    }
}

/// Main entry point for dynamodb command.
pub async fn run(command: DynamodbCommand, global: crate::Global) -> Result<()> {
    match command.action {
        DynamodbAction::Deploy(deploy_cmd) => run_deploy(deploy_cmd, &global).await,
    }
}

async fn run_deploy(cmd: DeployCommand, global: &crate::Global) -> Result<()> {
    let aws_config = AwsConfig::default();
    let schema = describe_schema(&cmd.adapter_config().key_strategy(), &cmd.models());
    let table_names = schema.table_names();

    if !global.is_silent() {
        aprintln!("{} {}", p_b("Target:"), aws_config.target_display());
        aprintln!("{} {}", p_b("Tables:"), table_names.join(", "));
        aprintln!();
    }

    let dynamo_client = create_client(&aws_config).await;
    let states = client::get_table_states(&dynamo_client, &table_names).await?;
    let state_of = |name: &str| {
        states
            .iter()
            .find(|(table, _)| table == name)
            .map(|(_, state)| state)
    };

    if cmd.destroy {
        let plan = planning::calculate_destroy_plan(&schema, state_of);

        if !global.is_silent() {
            aprintln!("{}", p_y("Destroy Plan:"));
            for line in planning::format_destroy_plan(&plan) {
                aprintln!("  {}", p_r(&line));
            }
            aprintln!();
        }

        if !plan.has_changes() {
            if !global.is_silent() {
                aprintln!("{}", p_g("Nothing to destroy."));
            }
            return Ok(());
        }

        confirm(
            cmd.force,
            "Are you sure you want to delete these tables? ALL DATA WILL BE LOST",
            false,
        )?;

        if !global.is_silent() {
            aprintln!("{}", p_b("Deleting tables..."));
        }

        deploy::execute_destroy_plan(&dynamo_client, &plan).await?;

        if !global.is_silent() {
            aprintln!("{}", p_g("Tables destroyed successfully."));
        }
    } else {
        let plan = planning::calculate_deploy_plan(&schema, state_of);

        if !global.is_silent() {
            aprintln!("{}", p_c("Deploy Plan:"));
            for line in planning::format_deploy_plan(&plan) {
                if line.starts_with('+') {
                    aprintln!("  {}", p_g(&line));
                } else if line.starts_with('~') {
                    aprintln!("  {}", p_y(&line));
                } else {
                    aprintln!("  {}", line);
                }
            }
            aprintln!();
        }

        if !plan.has_changes() {
            if !global.is_silent() {
                aprintln!("{}", p_g("Infrastructure is up to date."));
            }
            return Ok(());
        }

        confirm(cmd.force, "Apply these changes?", true)?;

        if !global.is_silent() {
            aprintln!("{}", p_b("Applying changes..."));
        }

        deploy::execute_deploy_plan(&dynamo_client, &plan).await?;

        if !global.is_silent() {
            aprintln!("{}", p_g("Infrastructure deployed successfully."));
        }
    }

    Ok(())
}

fn confirm(force: bool, prompt: &str, default: bool) -> Result<()> {
    if force {
        return Ok(());
    }

    let confirmed = Confirm::new()
        .with_prompt(prompt)
        .default(default)
        .interact()
        .map_err(DynamodbError::sdk)?;

    if confirmed {
        Ok(())
    } else {
        Err(DynamodbError::UserCancelled)
    }
}
