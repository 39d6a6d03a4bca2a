//! Migration descriptors handed to the storage adapter.

use serde::{Deserialize, Serialize};

use crate::field::FieldSchema;

/// An index requested by a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    pub columns: Vec<String>,
}

/// The schema change for one storage adapter at one version.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDescriptor {
    /// Storage adapter (table) name.
    pub applies_to: String,
    /// Model name.
    pub model: String,
    pub version: String,
    #[serde(default)]
    pub description: String,
    /// Storable columns of the model.
    #[serde(default)]
    pub add: Vec<FieldSchema>,
    #[serde(default)]
    pub indexes: Vec<IndexDescriptor>,
}

impl MigrationDescriptor {
    /// The conventional index name for a column (`INDEX_<table>_<column>`).
    pub fn index_name(table: &str, column: &str) -> String {
        format!("INDEX_{table}_{column}")
    }

    /// Add a single-column index unless it is already present.
    pub fn add_index(&mut self, column: &str) {
        let name = Self::index_name(&self.applies_to, column);
        if self.indexes.iter().all(|index| index.name != name) {
            self.indexes.push(IndexDescriptor {
                name,
                columns: vec![column.to_string()],
            });
        }
    }
}

/// Adapter answer to a migration request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MigrationStatus {
    /// `false` when the adapter already stored this version.
    pub applied: bool,
}

impl MigrationStatus {
    pub const APPLIED: MigrationStatus = MigrationStatus { applied: true };
    pub const UNCHANGED: MigrationStatus = MigrationStatus { applied: false };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexes_are_not_duplicated() {
        let mut descriptor = MigrationDescriptor {
            applies_to: "OrderBase".into(),
            model: "Order".into(),
            version: "1.0".into(),
            description: String::new(),
            add: Vec::new(),
            indexes: Vec::new(),
        };
        descriptor.add_index("customer");
        descriptor.add_index("customer");
        assert_eq!(descriptor.indexes.len(), 1);
        assert_eq!(descriptor.indexes[0].name, "INDEX_OrderBase_customer");
    }
}
