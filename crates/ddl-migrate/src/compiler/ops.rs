//! Typed DDL operation records.
//!
//! The planner emits these; a [`Dialect`](crate::core::traits::Dialect)
//! renders each one to a single statement. Column-carrying operations hold
//! the column's full state *after* the operation, which is what dialects
//! that restate the whole definition (`MODIFY COLUMN`) need and what
//! [`apply_plan`](super::apply_plan) writes back.

use serde::{Deserialize, Serialize};

use crate::core::schema::ColumnSpec;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum DdlOp {
    AddColumn {
        column: ColumnSpec,
    },
    DropColumn {
        column: ColumnSpec,
    },
    RenameColumn {
        from: String,
        column: ColumnSpec,
    },
    AlterType {
        column: ColumnSpec,
    },
    /// `with_default` means the statement also establishes the column's
    /// default, so existing rows can satisfy NOT NULL.
    AlterNullability {
        column: ColumnSpec,
        with_default: bool,
    },
    AlterIdentity {
        column: ColumnSpec,
    },
    SetDefault {
        column: ColumnSpec,
    },
    DropDefault {
        column: String,
        constraint: Option<String>,
    },
    AddUnique {
        column: String,
        constraint: String,
    },
    DropUnique {
        column: String,
        constraint: String,
    },
    DropPrimaryKey {
        columns: Vec<String>,
        constraint: Option<String>,
    },
    AddPrimaryKey {
        columns: Vec<String>,
        constraint: Option<String>,
    },
    /// Key drop and key add in one statement. Planned for dialects where an
    /// AUTO_INCREMENT column may never be left without a key.
    ReplacePrimaryKey {
        old_columns: Vec<String>,
        old_constraint: Option<String>,
        columns: Vec<String>,
        constraint: Option<String>,
    },
}

impl DdlOp {
    /// Column the operation targets, for diagnostics.
    pub fn column_name(&self) -> Option<&str> {
        match self {
            DdlOp::AddColumn { column }
            | DdlOp::DropColumn { column }
            | DdlOp::RenameColumn { column, .. }
            | DdlOp::AlterType { column }
            | DdlOp::AlterNullability { column, .. }
            | DdlOp::AlterIdentity { column }
            | DdlOp::SetDefault { column } => Some(column.name.as_str()),
            DdlOp::DropDefault { column, .. }
            | DdlOp::AddUnique { column, .. }
            | DdlOp::DropUnique { column, .. } => Some(column.as_str()),
            DdlOp::DropPrimaryKey { .. }
            | DdlOp::AddPrimaryKey { .. }
            | DdlOp::ReplacePrimaryKey { .. } => None,
        }
    }

    /// Short operation name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            DdlOp::AddColumn { .. } => "add_column",
            DdlOp::DropColumn { .. } => "drop_column",
            DdlOp::RenameColumn { .. } => "rename_column",
            DdlOp::AlterType { .. } => "alter_type",
            DdlOp::AlterNullability { .. } => "alter_nullability",
            DdlOp::AlterIdentity { .. } => "alter_identity",
            DdlOp::SetDefault { .. } => "set_default",
            DdlOp::DropDefault { .. } => "drop_default",
            DdlOp::AddUnique { .. } => "add_unique",
            DdlOp::DropUnique { .. } => "drop_unique",
            DdlOp::DropPrimaryKey { .. } => "drop_primary_key",
            DdlOp::AddPrimaryKey { .. } => "add_primary_key",
            DdlOp::ReplacePrimaryKey { .. } => "replace_primary_key",
        }
    }
}
