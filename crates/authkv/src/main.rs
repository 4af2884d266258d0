use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use authkv::{write_schema, AdapterConfig, DEFAULT_SCHEMA_PATH};
use authkv_core::schema::{describe_schema, DEFAULT_MODELS};

/// AuthKV - Key-value storage for identity frameworks on DynamoDB
#[derive(Parser, Debug)]
#[command(name = "authkv")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the CloudFormation template for the adapter's tables
    Schema(SchemaArgs),
}

#[derive(clap::Args, Debug)]
/// Unset topology options fall back to the `AUTHKV_*` environment variables.
struct SchemaArgs {
    /// Models to provision tables for
    #[arg(long, value_delimiter = ',')]
    models: Vec<String>,

    /// Output file
    #[arg(long, short, default_value = DEFAULT_SCHEMA_PATH)]
    file: PathBuf,

    /// Replace the output file if it exists
    #[arg(long)]
    overwrite: bool,

    /// Store every model in one shared table
    #[arg(long)]
    single_table: Option<bool>,

    /// Shared table name in single-table mode
    #[arg(long)]
    table_name: Option<String>,

    /// Per-model table name prefix in multi-table mode
    #[arg(long)]
    table_prefix: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "authkv=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match cli.command {
        Command::Schema(args) => schema(args),
    }
}

fn schema(args: SchemaArgs) -> Result<()> {
    let config = AdapterConfig::from_env().with_overrides(
        args.single_table,
        args.table_name.clone(),
        args.table_prefix.clone(),
    );
    let models: Vec<&str> = if args.models.is_empty() {
        DEFAULT_MODELS.to_vec()
    } else {
        args.models.iter().map(String::as_str).collect()
    };

    let descriptor = describe_schema(&config.key_strategy(), &models);
    let file = write_schema(&descriptor, Some(&args.file), args.overwrite)?;

    tracing::info!(
        tables = ?descriptor.table_names(),
        path = %file.path.display(),
        "Schema generated"
    );
    Ok(())
}
