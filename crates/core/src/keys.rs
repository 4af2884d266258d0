//! Physical key derivation.
//!
//! Pure functions mapping a logical (model, id) pair onto a table name and a
//! primary key, for either storage topology. Nothing here performs I/O.

// ============================================================================
// Attribute names
// ============================================================================

/// Partition key attribute in single-table mode.
pub const PARTITION_KEY: &str = "PK";
/// Sort key attribute in single-table mode.
pub const SORT_KEY: &str = "SK";
/// Primary key attribute in multi-table mode, and the entity id everywhere.
pub const ID_FIELD: &str = "id";
/// Model discriminator written alongside entities in single-table mode.
pub const TYPE_FIELD: &str = "_type";

pub const GSI1_NAME: &str = "GSI1";
pub const GSI1_PARTITION_KEY: &str = "GSI1PK";
pub const GSI1_SORT_KEY: &str = "GSI1SK";

/// Table name used in single-table mode when none is configured.
pub const DEFAULT_TABLE_NAME: &str = "authkv";

// ============================================================================
// Topology
// ============================================================================

/// How logical models are laid out over physical tables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Topology {
    /// Every model shares one table, keyed by `PK`/`SK` composites.
    SingleTable { table_name: String },
    /// One table per model, named `<prefix><model>` and keyed by `id`.
    MultiTable { table_prefix: String },
}

impl Default for Topology {
    fn default() -> Self {
        Topology::SingleTable {
            table_name: DEFAULT_TABLE_NAME.to_string(),
        }
    }
}

/// Primary key of a stored entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PhysicalKey {
    Composite { pk: String, sk: String },
    Simple { id: String },
}

impl PhysicalKey {
    /// Key attributes as (name, value) pairs, in key-schema order.
    pub fn attributes(&self) -> Vec<(&'static str, &str)> {
        match self {
            PhysicalKey::Composite { pk, sk } => {
                vec![(PARTITION_KEY, pk.as_str()), (SORT_KEY, sk.as_str())]
            }
            PhysicalKey::Simple { id } => vec![(ID_FIELD, id.as_str())],
        }
    }

    /// The hash key attribute name.
    pub fn hash_attribute(&self) -> &'static str {
        match self {
            PhysicalKey::Composite { .. } => PARTITION_KEY,
            PhysicalKey::Simple { .. } => ID_FIELD,
        }
    }

    /// Condition expression requiring the keyed item to exist.
    pub fn exists_condition(&self) -> String {
        format!("attribute_exists({})", self.hash_attribute())
    }
}

/// Generate the composite key component for a model and id.
///
/// Pattern: `<MODEL>#<id>`
pub fn composite_key(model: &str, id: &str) -> String {
    format!("{}#{id}", model.to_uppercase())
}

// ============================================================================
// Key strategy
// ============================================================================

/// Resolves table names and primary keys under a fixed topology.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct KeyStrategy {
    topology: Topology,
}

impl KeyStrategy {
    pub fn new(topology: Topology) -> Self {
        Self { topology }
    }

    pub fn single_table(table_name: impl Into<String>) -> Self {
        Self::new(Topology::SingleTable {
            table_name: table_name.into(),
        })
    }

    pub fn multi_table(table_prefix: impl Into<String>) -> Self {
        Self::new(Topology::MultiTable {
            table_prefix: table_prefix.into(),
        })
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    pub fn is_single_table(&self) -> bool {
        matches!(self.topology, Topology::SingleTable { .. })
    }

    /// Physical table holding entities of `model`.
    pub fn resolve_table(&self, model: &str) -> String {
        match &self.topology {
            Topology::SingleTable { table_name } => table_name.clone(),
            Topology::MultiTable { table_prefix } => format!("{table_prefix}{model}"),
        }
    }

    /// Primary key of the entity `id` of `model`.
    pub fn resolve_key(&self, model: &str, id: &str) -> PhysicalKey {
        match &self.topology {
            Topology::SingleTable { .. } => PhysicalKey::Composite {
                pk: composite_key(model, id),
                sk: composite_key(model, id),
            },
            Topology::MultiTable { .. } => PhysicalKey::Simple { id: id.to_string() },
        }
    }

    /// Attributes the adapter writes for its own bookkeeping.
    pub fn internal_attributes(&self) -> &'static [&'static str] {
        match self.topology {
            Topology::SingleTable { .. } => &[PARTITION_KEY, SORT_KEY, TYPE_FIELD],
            Topology::MultiTable { .. } => &[],
        }
    }

    /// Attributes an update may never touch.
    pub fn immutable_attributes(&self) -> &'static [&'static str] {
        match self.topology {
            Topology::SingleTable { .. } => &[ID_FIELD, PARTITION_KEY, SORT_KEY, TYPE_FIELD],
            Topology::MultiTable { .. } => &[ID_FIELD],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_composite_key_uppercases_model() {
        assert_eq!(composite_key("session", "abc-123"), "SESSION#abc-123");
    }

    #[test]
    fn test_single_table_resolution() {
        let keys = KeyStrategy::single_table("auth");

        assert_eq!(keys.resolve_table("user"), "auth");
        assert_eq!(keys.resolve_table("session"), "auth");
        assert_eq!(
            keys.resolve_key("user", "u1"),
            PhysicalKey::Composite {
                pk: "USER#u1".to_string(),
                sk: "USER#u1".to_string(),
            }
        );
    }

    #[test]
    fn test_multi_table_resolution() {
        let keys = KeyStrategy::multi_table("prod_");

        assert_eq!(keys.resolve_table("user"), "prod_user");
        assert_eq!(
            keys.resolve_key("user", "u1"),
            PhysicalKey::Simple {
                id: "u1".to_string()
            }
        );
    }

    #[test]
    fn test_resolution_is_deterministic() {
        let keys = KeyStrategy::default();
        assert_eq!(keys.resolve_key("account", "a"), keys.resolve_key("account", "a"));
        assert_ne!(keys.resolve_key("account", "a"), keys.resolve_key("user", "a"));
    }

    #[test]
    fn test_default_topology_is_single_table() {
        let keys = KeyStrategy::default();
        assert!(keys.is_single_table());
        assert_eq!(keys.resolve_table("user"), DEFAULT_TABLE_NAME);
    }

    #[test]
    fn test_key_attributes_and_condition() {
        let composite = KeyStrategy::single_table("t").resolve_key("user", "u1");
        assert_eq!(
            composite.attributes(),
            vec![("PK", "USER#u1"), ("SK", "USER#u1")]
        );
        assert_eq!(composite.exists_condition(), "attribute_exists(PK)");

        let simple = KeyStrategy::multi_table("").resolve_key("user", "u1");
        assert_eq!(simple.attributes(), vec![("id", "u1")]);
        assert_eq!(simple.exists_condition(), "attribute_exists(id)");
    }

    #[test]
    fn test_internal_attributes() {
        assert_eq!(
            KeyStrategy::single_table("t").internal_attributes(),
            &["PK", "SK", "_type"]
        );
        assert!(KeyStrategy::multi_table("").internal_attributes().is_empty());
    }
}
