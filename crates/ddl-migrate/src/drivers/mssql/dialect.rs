//! Microsoft SQL Server DDL dialect (Strategy pattern).
//!
//! SQL Server names its defaults as constraints, so setting, replacing and
//! dropping a default are constraint operations, and a column cannot be
//! dropped or retyped while a default or unique constraint still binds it.

use crate::compiler::DdlOp;
use crate::core::identifier::{
    qualify_mssql, quote_literal, quote_mssql, quote_national_literal, validate_identifier,
};
use crate::core::schema::{ColumnSpec, TableRef};
use crate::core::traits::Dialect;
use crate::dialect::bounds::{BIGINT, INT, SMALLINT};
use crate::dialect::{base_type_name, CanonicalCategory, IntegerBounds};
use crate::error::{MigrateError, Result};

/// Default schema when a table reference carries none.
const DEFAULT_SCHEMA: &str = "dbo";

/// Types that reject an explicit length or precision suffix.
const NO_LENGTH_TYPES: &[&str] = &[
    "bigint",
    "bit",
    "date",
    "datetime",
    "datetime2",
    "datetimeoffset",
    "float",
    "geography",
    "geometry",
    "hierarchyid",
    "image",
    "int",
    "money",
    "real",
    "json",
    "smalldatetime",
    "smallint",
    "smallmoney",
    "text",
    "ntext",
    "time",
    "timestamp",
    "tinyint",
    "uniqueidentifier",
    "xml",
];

/// SQL Server tinyint is unsigned only.
const TINYINT: IntegerBounds = IntegerBounds::new(255, 255);

/// SQL Server dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct MssqlDialect;

impl MssqlDialect {
    /// Create a new SQL Server dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn constraint_for(&self, table: &TableRef, column: &ColumnSpec) -> String {
        column
            .default_constraint
            .clone()
            .unwrap_or_else(|| format!("DF_{}_{}", table.name, column.name))
    }

    /// `ADD CONSTRAINT [DF_t_c] DEFAULT v FOR [c]`
    fn add_default(&self, table: &TableRef, column: &ColumnSpec) -> Result<String> {
        let value = self
            .format_default(column)?
            .unwrap_or_else(|| "NULL".to_string());
        Ok(format!(
            "ADD CONSTRAINT {} DEFAULT {} FOR {}",
            self.quote_ident(&self.constraint_for(table, column))?,
            value,
            self.quote_ident(&column.name)?
        ))
    }

    /// `ALTER COLUMN [c] type NULL|NOT NULL`
    fn alter_column(&self, column: &ColumnSpec) -> Result<String> {
        Ok(format!(
            "ALTER COLUMN {} {} {}",
            self.quote_ident(&column.name)?,
            self.column_type(column)?,
            self.nullability_clause(column)
        ))
    }

    fn key_name(table: &TableRef, constraint: &Option<String>) -> String {
        constraint
            .clone()
            .unwrap_or_else(|| format!("PK_{}", table.name))
    }

    fn drop_key(&self, table: &TableRef, constraint: &Option<String>) -> Result<String> {
        Ok(format!(
            "DROP CONSTRAINT {}",
            self.quote_ident(&Self::key_name(table, constraint))?
        ))
    }

    fn add_key(
        &self,
        table: &TableRef,
        columns: &[String],
        constraint: &Option<String>,
    ) -> Result<String> {
        Ok(format!(
            "ADD CONSTRAINT {} PRIMARY KEY ({})",
            self.quote_ident(&Self::key_name(table, constraint))?,
            self.quote_list(columns)?
        ))
    }
}

impl Dialect for MssqlDialect {
    fn name(&self) -> &str {
        "mssql"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_mssql(name)
    }

    fn qualify_table(&self, table: &TableRef) -> Result<String> {
        qualify_mssql(
            table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA),
            &table.name,
        )
    }

    /// Unicode column types take `N'...'` literals.
    fn quote_string(&self, value: &str, column: &ColumnSpec) -> String {
        if base_type_name(&column.native_type).starts_with('n') {
            quote_national_literal(value)
        } else {
            quote_literal(value)
        }
    }

    fn fallback_literal(&self, value: &str) -> String {
        quote_literal(value)
    }

    fn supports_category(&self, category: CanonicalCategory) -> bool {
        !matches!(
            category,
            CanonicalCategory::Enum
                | CanonicalCategory::Year
                | CanonicalCategory::Boolean
                | CanonicalCategory::Point
                | CanonicalCategory::LineString
                | CanonicalCategory::Polygon
                | CanonicalCategory::MultiPoint
                | CanonicalCategory::MultiLineString
                | CanonicalCategory::MultiPolygon
        )
    }

    fn is_length_eligible(&self, column: &ColumnSpec) -> bool {
        !NO_LENGTH_TYPES.contains(&base_type_name(&column.native_type).as_str())
    }

    fn identity_clause(&self) -> &str {
        "IDENTITY(1,1)"
    }

    fn integer_bounds(&self, native_type: &str) -> Option<IntegerBounds> {
        match base_type_name(native_type).as_str() {
            "tinyint" => Some(TINYINT),
            "smallint" => Some(SMALLINT),
            "int" => Some(INT),
            "bigint" => Some(BIGINT),
            _ => None,
        }
    }

    fn max_length_keyword(&self) -> Option<&str> {
        Some("max")
    }

    fn default_constraint_name(&self, table: &str, column: &str) -> Option<String> {
        Some(format!("DF_{}_{}", table, column))
    }

    fn primary_key_name(&self, table: &str) -> Option<String> {
        Some(format!("PK_{}", table))
    }

    fn drops_constraints_before_column(&self) -> bool {
        true
    }

    fn default_requires_drop_before_replace(&self) -> bool {
        true
    }

    fn supports_identity_change(&self) -> bool {
        false
    }

    /// Inline defaults are named constraints.
    fn default_clause(&self, table: &TableRef, column: &ColumnSpec) -> Result<Option<String>> {
        if column.effective_default().is_none() {
            return Ok(None);
        }
        let Some(value) = self.format_default(column)? else {
            return Ok(None);
        };
        Ok(Some(format!(
            "CONSTRAINT {} DEFAULT {}",
            self.quote_ident(&self.constraint_for(table, column))?,
            value
        )))
    }

    fn render(&self, table: &TableRef, op: &DdlOp) -> Result<String> {
        let target = self.qualify_table(table)?;
        let clause = match op {
            DdlOp::AddColumn { column } => {
                format!("ADD {}", self.column_definition(table, column)?)
            }
            DdlOp::DropColumn { column } => {
                format!("DROP COLUMN {}", self.quote_ident(&column.name)?)
            }
            DdlOp::RenameColumn { from, column } => {
                validate_identifier(&column.name)?;
                let object = format!("{}.{}", target, self.quote_ident(from)?);
                return Ok(format!(
                    "EXEC sp_rename {}, {}, 'COLUMN'",
                    quote_literal(&object),
                    quote_literal(&column.name)
                ));
            }
            DdlOp::AlterType { column } => self.alter_column(column)?,
            DdlOp::AlterNullability {
                column,
                with_default: true,
            } => {
                return Ok(format!(
                    "ALTER TABLE {} {}; ALTER TABLE {} {}",
                    target,
                    self.add_default(table, column)?,
                    target,
                    self.alter_column(column)?
                ));
            }
            DdlOp::AlterNullability { column, .. } => self.alter_column(column)?,
            DdlOp::AlterIdentity { column } => {
                return Err(MigrateError::Unsupported {
                    dialect: self.name().to_string(),
                    table: table.name.clone(),
                    column: column.name.clone(),
                    message: "identity cannot be added to or removed from an existing column"
                        .to_string(),
                });
            }
            DdlOp::SetDefault { column } => self.add_default(table, column)?,
            DdlOp::DropDefault { column, constraint } => {
                let name = constraint
                    .clone()
                    .unwrap_or_else(|| format!("DF_{}_{}", table.name, column));
                format!("DROP CONSTRAINT {}", self.quote_ident(&name)?)
            }
            DdlOp::AddUnique { column, constraint } => format!(
                "ADD CONSTRAINT {} UNIQUE ({})",
                self.quote_ident(constraint)?,
                self.quote_ident(column)?
            ),
            DdlOp::DropUnique { constraint, .. } => {
                format!("DROP CONSTRAINT {}", self.quote_ident(constraint)?)
            }
            DdlOp::DropPrimaryKey { constraint, .. } => self.drop_key(table, constraint)?,
            DdlOp::AddPrimaryKey {
                columns,
                constraint,
            } => self.add_key(table, columns, constraint)?,
            DdlOp::ReplacePrimaryKey {
                old_constraint,
                columns,
                constraint,
                ..
            } => {
                return Ok(format!(
                    "ALTER TABLE {} {}; ALTER TABLE {} {}",
                    target,
                    self.drop_key(table, old_constraint)?,
                    target,
                    self.add_key(table, columns, constraint)?
                ));
            }
        };
        Ok(format!("ALTER TABLE {} {}", target, clause))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t() -> TableRef {
        TableRef::new(None, "users")
    }

    #[test]
    fn test_quote_ident() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.quote_ident("users").unwrap(), "[users]");
        assert_eq!(dialect.quote_ident("table]name").unwrap(), "[table]]name]");
        assert!(dialect.quote_ident("bad\0name").is_err());
    }

    #[test]
    fn test_default_schema_is_dbo() {
        let dialect = MssqlDialect::new();
        assert_eq!(dialect.qualify_table(&t()).unwrap(), "[dbo].[users]");
        assert_eq!(
            dialect
                .qualify_table(&TableRef::new(Some("sales".into()), "users"))
                .unwrap(),
            "[sales].[users]"
        );
    }

    #[test]
    fn test_replace_primary_key_is_two_batched_statements() {
        let dialect = MssqlDialect::new();
        let op = DdlOp::ReplacePrimaryKey {
            old_columns: vec!["id".into()],
            old_constraint: Some("PK__users__3213E83F".into()),
            columns: vec!["id".into(), "org".into()],
            constraint: None,
        };
        assert_eq!(
            dialect.render(&t(), &op).unwrap(),
            "ALTER TABLE [dbo].[users] DROP CONSTRAINT [PK__users__3213E83F]; \
             ALTER TABLE [dbo].[users] ADD CONSTRAINT [PK_users] PRIMARY KEY ([id], [org])"
        );
    }

    #[test]
    fn test_length_disabled_types() {
        let dialect = MssqlDialect::new();
        let col = ColumnSpec::new("n", "int").with_length(10);
        assert_eq!(dialect.column_type(&col).unwrap(), "int");
        let col = ColumnSpec::new("n", "uniqueidentifier").with_length(36);
        assert_eq!(dialect.column_type(&col).unwrap(), "uniqueidentifier");
        let col = ColumnSpec::new("n", "nvarchar").with_length(-1);
        assert_eq!(dialect.column_type(&col).unwrap(), "nvarchar(max)");
        let col = ColumnSpec::new("n", "decimal").with_precision(18, Some(4));
        assert_eq!(dialect.column_type(&col).unwrap(), "decimal(18,4)");
    }

    #[test]
    fn test_unsigned_is_not_emitted() {
        let dialect = MssqlDialect::new();
        let col = ColumnSpec::new("n", "int").unsigned();
        assert_eq!(dialect.column_type(&col).unwrap(), "int");
    }

    #[test]
    fn test_national_literals() {
        let dialect = MssqlDialect::new();
        let col = ColumnSpec::new("title", "nvarchar").with_default("it's");
        assert_eq!(
            dialect.format_default(&col).unwrap().as_deref(),
            Some("N'it''s'")
        );
        let col = ColumnSpec::new("title", "varchar").with_default("plain");
        assert_eq!(
            dialect.format_default(&col).unwrap().as_deref(),
            Some("'plain'")
        );
    }

    #[test]
    fn test_unmapped_categories() {
        let dialect = MssqlDialect::new();
        assert!(!dialect.supports_category(CanonicalCategory::Enum));
        assert!(!dialect.supports_category(CanonicalCategory::Boolean));
        assert!(!dialect.supports_category(CanonicalCategory::MultiPolygon));
        assert!(dialect.supports_category(CanonicalCategory::Geometry));
        assert!(dialect.supports_category(CanonicalCategory::Bit));
    }

    #[test]
    fn test_render_defaults() {
        let dialect = MssqlDialect::new();
        let col = ColumnSpec::new("created", "datetime2").with_default("getdate()");
        assert_eq!(
            dialect
                .render(&t(), &DdlOp::SetDefault { column: col })
                .unwrap(),
            "ALTER TABLE [dbo].[users] ADD CONSTRAINT [DF_users_created] DEFAULT getdate() FOR [created]"
        );
        let drop = DdlOp::DropDefault {
            column: "created".into(),
            constraint: None,
        };
        assert_eq!(
            dialect.render(&t(), &drop).unwrap(),
            "ALTER TABLE [dbo].[users] DROP CONSTRAINT [DF_users_created]"
        );
    }

    #[test]
    fn test_rename_escapes_quotes() {
        let dialect = MssqlDialect::new();
        let op = DdlOp::RenameColumn {
            from: "o'ld".into(),
            column: ColumnSpec::new("n'ew", "int"),
        };
        assert_eq!(
            dialect.render(&t(), &op).unwrap(),
            "EXEC sp_rename '[dbo].[users].[o''ld]', 'n''ew', 'COLUMN'"
        );
    }

    #[test]
    fn test_identity_change_unsupported() {
        let dialect = MssqlDialect::new();
        let op = DdlOp::AlterIdentity {
            column: ColumnSpec::new("id", "int").identity(),
        };
        assert!(matches!(
            dialect.render(&t(), &op),
            Err(MigrateError::Unsupported { .. })
        ));
    }

    #[test]
    fn test_tinyint_is_unsigned() {
        let dialect = MssqlDialect::new();
        let bounds = dialect.integer_bounds("tinyint").unwrap();
        assert_eq!(bounds.max_for(false), 255);
        assert!(dialect.integer_bounds("mediumint").is_none());
    }
}
