//! Schema file output.
//!
//! Renders a [`SchemaDescriptor`] as a CloudFormation template and writes it
//! to disk.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

use authkv_core::schema::SchemaDescriptor;

/// Where the template goes when no path is given.
pub const DEFAULT_SCHEMA_PATH: &str = "dynamodb-cloudformation.json";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("Schema file {0} already exists, pass --overwrite to replace it")]
    AlreadyExists(PathBuf),
    #[error("Failed to write schema file {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// A rendered template and where it was written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaFile {
    pub code: String,
    pub path: PathBuf,
    pub overwrite: bool,
}

/// Renders `descriptor` without touching the filesystem.
pub fn render_schema(descriptor: &SchemaDescriptor, path: Option<&Path>) -> SchemaFile {
    SchemaFile {
        code: descriptor.to_cloudformation_string(),
        path: path.map_or_else(|| PathBuf::from(DEFAULT_SCHEMA_PATH), Path::to_path_buf),
        overwrite: true,
    }
}

/// Renders `descriptor` and writes it to `path`.
///
/// An existing file is only replaced when `overwrite` is set.
pub fn write_schema(
    descriptor: &SchemaDescriptor,
    path: Option<&Path>,
    overwrite: bool,
) -> Result<SchemaFile, SchemaError> {
    let mut file = render_schema(descriptor, path);
    file.overwrite = overwrite;

    if !overwrite && file.path.exists() {
        return Err(SchemaError::AlreadyExists(file.path));
    }

    std::fs::write(&file.path, &file.code).map_err(|source| SchemaError::Write {
        path: file.path.clone(),
        source,
    })?;

    info!(
        path = %file.path.display(),
        tables = descriptor.tables.len(),
        "schema written"
    );
    Ok(file)
}
