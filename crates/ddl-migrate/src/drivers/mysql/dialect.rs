//! MySQL/MariaDB DDL dialect (Strategy pattern).
//!
//! MySQL restates the full column definition for type, nullability and
//! identity changes (`MODIFY COLUMN`) and for renames (`CHANGE COLUMN`), so a
//! default set alongside a nullability change lands in the same statement.

use crate::compiler::DdlOp;
use crate::core::identifier::{json_literal, qualify_mysql, quote_mysql, quote_mysql_literal};
use crate::core::schema::{ColumnSpec, TableRef, TableSpec};
use crate::core::traits::{check_identity_rules, Dialect};
use crate::dialect::bounds::{BIGINT, INT, MEDIUMINT, SMALLINT, TINYINT};
use crate::dialect::{base_type_name, CanonicalCategory, IntegerBounds};
use crate::error::{MigrateError, Result};

/// Blob types that take a length.
const SIZED_BLOBS: &[&str] = &["binary", "varbinary"];

/// MySQL/MariaDB dialect implementation.
///
/// Compatible with MySQL 5.7+, 8.0+, and MariaDB 10.2+.
#[derive(Debug, Clone, Default)]
pub struct MysqlDialect;

impl MysqlDialect {
    /// Create a new MySQL dialect instance.
    pub fn new() -> Self {
        Self
    }
}

impl Dialect for MysqlDialect {
    fn name(&self) -> &str {
        "mysql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mysql(name)
    }

    fn qualify_table(&self, table: &TableRef) -> Result<String> {
        match &table.schema {
            Some(schema) => qualify_mysql(schema, &table.name),
            None => quote_mysql(&table.name),
        }
    }

    fn quote_string(&self, value: &str, _column: &ColumnSpec) -> String {
        quote_mysql_literal(value)
    }

    fn fallback_literal(&self, value: &str) -> String {
        json_literal(value)
    }

    fn supports_category(&self, _category: CanonicalCategory) -> bool {
        true
    }

    fn is_length_eligible(&self, column: &ColumnSpec) -> bool {
        match column.category() {
            CanonicalCategory::String | CanonicalCategory::Float | CanonicalCategory::Bit => true,
            CanonicalCategory::Blob => {
                SIZED_BLOBS.contains(&base_type_name(&column.native_type).as_str())
            }
            _ => false,
        }
    }

    fn identity_clause(&self) -> &str {
        "AUTO_INCREMENT"
    }

    fn integer_bounds(&self, native_type: &str) -> Option<IntegerBounds> {
        match base_type_name(native_type).as_str() {
            "tinyint" => Some(TINYINT),
            "smallint" => Some(SMALLINT),
            "mediumint" => Some(MEDIUMINT),
            "int" | "integer" => Some(INT),
            "bigint" => Some(BIGINT),
            _ => None,
        }
    }

    fn supports_unsigned(&self) -> bool {
        true
    }

    /// `DROP PRIMARY KEY` on its own fails while an AUTO_INCREMENT column
    /// depends on the key (ER 1075).
    fn replaces_primary_key_in_one_statement(&self) -> bool {
        true
    }

    /// MySQL only accepts AUTO_INCREMENT on a key column.
    fn validate_table(&self, table: &TableSpec) -> Result<()> {
        check_identity_rules(self.name(), table)?;
        if let Some(col) = table.live_columns().find(|c| c.auto_increment) {
            if !col.primary_key && !col.unique {
                return Err(MigrateError::invalid_spec(
                    &table.name,
                    format!(
                        "AUTO_INCREMENT column '{}' must be part of the primary key or unique",
                        col.name
                    ),
                ));
            }
        }
        Ok(())
    }

    fn render(&self, table: &TableRef, op: &DdlOp) -> Result<String> {
        let clause = match op {
            DdlOp::AddColumn { column } => {
                format!("ADD COLUMN {}", self.column_definition(table, column)?)
            }
            DdlOp::DropColumn { column } => {
                format!("DROP COLUMN {}", self.quote_ident(&column.name)?)
            }
            DdlOp::RenameColumn { from, column } => format!(
                "CHANGE COLUMN {} {}",
                self.quote_ident(from)?,
                self.column_definition(table, column)?
            ),
            DdlOp::AlterType { column }
            | DdlOp::AlterNullability { column, .. }
            | DdlOp::AlterIdentity { column } => {
                format!("MODIFY COLUMN {}", self.column_definition(table, column)?)
            }
            DdlOp::SetDefault { column } => {
                let name = self.quote_ident(&column.name)?;
                match self.format_default(column)? {
                    Some(value) => format!("ALTER COLUMN {} SET DEFAULT {}", name, value),
                    None => format!("ALTER COLUMN {} DROP DEFAULT", name),
                }
            }
            DdlOp::DropDefault { column, .. } => {
                format!("ALTER COLUMN {} DROP DEFAULT", self.quote_ident(column)?)
            }
            DdlOp::AddUnique { column, constraint } => format!(
                "ADD CONSTRAINT {} UNIQUE ({})",
                self.quote_ident(constraint)?,
                self.quote_ident(column)?
            ),
            DdlOp::DropUnique { constraint, .. } => {
                format!("DROP INDEX {}", self.quote_ident(constraint)?)
            }
            DdlOp::DropPrimaryKey { .. } => "DROP PRIMARY KEY".to_string(),
            DdlOp::AddPrimaryKey { columns, .. } => {
                format!("ADD PRIMARY KEY ({})", self.quote_list(columns)?)
            }
            DdlOp::ReplacePrimaryKey { columns, .. } => format!(
                "DROP PRIMARY KEY, ADD PRIMARY KEY ({})",
                self.quote_list(columns)?
            ),
        };
        Ok(format!("ALTER TABLE {} {}", self.qualify_table(table)?, clause))
    }
}
