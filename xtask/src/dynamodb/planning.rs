//! Pure functions for calculating deployment plans (Functional Core).

use authkv_core::schema::{GsiConfig, SchemaDescriptor, TableConfig};

/// Represents the current state of a table.
#[derive(Debug, Clone)]
pub struct TableState {
    pub status: TableStatus,
    pub gsis: Vec<GsiState>,
}

/// Table status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Active,
    Creating,
    Updating,
    Deleting,
}

/// GSI state.
#[derive(Debug, Clone)]
pub struct GsiState {
    pub name: String,
    pub status: GsiStatus,
}

/// GSI status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GsiStatus {
    Active,
    Creating,
    Updating,
    Deleting,
}

/// Planned changes for one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TablePlan {
    /// Table doesn't exist, needs to be created.
    Create { config: TableConfig },
    /// Table exists, GSIs need to be added.
    AddGsis {
        table_name: String,
        gsis_to_add: Vec<GsiConfig>,
    },
    /// Table is up to date.
    NoChanges { table_name: String },
}

/// Plan for removing one table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropPlan {
    /// Table exists and will be deleted.
    Delete { table_name: String },
    /// Table doesn't exist, nothing to do.
    AlreadyGone { table_name: String },
}

/// Plan for every table of a schema, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployPlan {
    pub tables: Vec<TablePlan>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DestroyPlan {
    pub tables: Vec<DropPlan>,
}

impl DeployPlan {
    pub fn has_changes(&self) -> bool {
        self.tables
            .iter()
            .any(|t| !matches!(t, TablePlan::NoChanges { .. }))
    }
}

impl DestroyPlan {
    pub fn has_changes(&self) -> bool {
        self.tables
            .iter()
            .any(|t| matches!(t, DropPlan::Delete { .. }))
    }
}

/// Calculate the changes one table needs to reach `desired`.
pub fn plan_table(current: Option<&TableState>, desired: &TableConfig) -> TablePlan {
    let Some(state) = current else {
        return TablePlan::Create {
            config: desired.clone(),
        };
    };

    let gsis_to_add: Vec<GsiConfig> = desired
        .gsis
        .iter()
        .filter(|gsi| !state.gsis.iter().any(|g| g.name == gsi.name))
        .cloned()
        .collect();

    if gsis_to_add.is_empty() {
        TablePlan::NoChanges {
            table_name: desired.table_name.clone(),
        }
    } else {
        TablePlan::AddGsis {
            table_name: desired.table_name.clone(),
            gsis_to_add,
        }
    }
}

/// Calculate the deploy plan of a schema.
///
/// `state_of` returns the current state of a table by name.
pub fn calculate_deploy_plan<'a>(
    schema: &SchemaDescriptor,
    state_of: impl Fn(&str) -> Option<&'a TableState>,
) -> DeployPlan {
    DeployPlan {
        tables: schema
            .tables
            .iter()
            .map(|t| plan_table(state_of(&t.config.table_name), &t.config))
            .collect(),
    }
}

/// Calculate the destroy plan of a schema.
pub fn calculate_destroy_plan<'a>(
    schema: &SchemaDescriptor,
    state_of: impl Fn(&str) -> Option<&'a TableState>,
) -> DestroyPlan {
    DestroyPlan {
        tables: schema
            .tables
            .iter()
            .map(|t| {
                let table_name = t.config.table_name.clone();
                match state_of(&table_name) {
                    Some(_) => DropPlan::Delete { table_name },
                    None => DropPlan::AlreadyGone { table_name },
                }
            })
            .collect(),
    }
}

/// Format a deploy plan for display.
pub fn format_deploy_plan(plan: &DeployPlan) -> Vec<String> {
    plan.tables.iter().flat_map(format_table_plan).collect()
}

fn format_table_plan(plan: &TablePlan) -> Vec<String> {
    match plan {
        TablePlan::Create { config } => {
            let mut lines = vec![
                format!("+ Create table: {}", config.table_name),
                format!(
                    "  Partition key: {} ({})",
                    config.partition_key.name,
                    config.partition_key.attribute_type.as_str()
                ),
            ];
            if let Some(sk) = &config.sort_key {
                lines.push(format!("  Sort key: {} ({})", sk.name, sk.attribute_type.as_str()));
            }
            for gsi in &config.gsis {
                lines.push(format!("  + GSI: {}", gsi.name));
                lines.push(format!("    Partition key: {}", gsi.partition_key.name));
                if let Some(sk) = &gsi.sort_key {
                    lines.push(format!("    Sort key: {}", sk.name));
                }
            }
            lines.push(format!("  Billing: {}", config.billing_mode.as_str()));
            lines
        }
        TablePlan::AddGsis {
            table_name,
            gsis_to_add,
        } => std::iter::once(format!("~ Update table: {table_name}"))
            .chain(gsis_to_add.iter().map(|gsi| format!("  + Add GSI: {}", gsi.name)))
            .collect(),
        TablePlan::NoChanges { table_name } => {
            vec![format!("= Table '{table_name}' is up to date")]
        }
    }
}

/// Format a destroy plan for display.
pub fn format_destroy_plan(plan: &DestroyPlan) -> Vec<String> {
    plan.tables
        .iter()
        .map(|t| match t {
            DropPlan::Delete { table_name } => {
                format!("- Delete table: {table_name} (ALL DATA WILL BE LOST)")
            }
            DropPlan::AlreadyGone { table_name } => {
                format!("= Table '{table_name}' does not exist")
            }
        })
        .collect()
}
