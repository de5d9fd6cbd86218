//! Migration request: the desired shape of one existing table.

use serde::{Deserialize, Serialize};

use crate::core::schema::{ColumnSpec, TableSpec};

/// Desired shape for one table, as submitted by a caller.
///
/// `columns` is the complete desired column list. Current columns it does
/// not match are dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationRequest {
    pub table: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    pub columns: Vec<ColumnSpec>,

    /// Desired primary key in order. When absent, membership comes from
    /// each column's `primary_key` flag.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key: Option<Vec<String>>,

    /// Free text recorded in the journal.
    #[serde(default)]
    pub description: String,
}

impl MigrationRequest {
    pub fn new(table: impl Into<String>, columns: Vec<ColumnSpec>) -> Self {
        Self {
            table: table.into(),
            schema: None,
            columns,
            primary_key: None,
            description: String::new(),
        }
    }

    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = Some(columns.iter().map(|c| c.to_string()).collect());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Desired TableSpec, keeping what the request does not describe
    /// (schema, constraint names, foreign keys, indexes) from `current`.
    pub fn desired(&self, current: &TableSpec) -> TableSpec {
        let mut table = TableSpec::new(
            self.schema.clone().or_else(|| current.schema.clone()),
            self.table.clone(),
        )
        .with_columns(self.columns.clone());
        table.primary_key_constraint = current.primary_key_constraint.clone();
        table.foreign_keys = current.foreign_keys.clone();
        table.indexes = current.indexes.clone();

        if let Some(pk) = &self.primary_key {
            table.set_primary_key(pk);
        }
        table
    }
}
