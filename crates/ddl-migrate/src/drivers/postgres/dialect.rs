//! PostgreSQL DDL dialect (Strategy pattern).

use crate::compiler::DdlOp;
use crate::core::identifier::{qualify_pg, quote_literal, quote_pg};
use crate::core::schema::{ColumnSpec, TableRef};
use crate::core::traits::Dialect;
use crate::dialect::bounds::{BIGINT, INT, SMALLINT};
use crate::dialect::{base_type_name, CanonicalCategory, IntegerBounds};
use crate::error::Result;

const DEFAULT_SCHEMA: &str = "public";

/// Types that accept `(n)` or `(p,s)`.
const SIZED_TYPES: &[&str] = &[
    "varchar",
    "char",
    "character",
    "character varying",
    "bpchar",
    "bit",
    "varbit",
    "bit varying",
    "numeric",
    "decimal",
];

/// PostgreSQL has no unsigned integers.
const fn signed(bounds: IntegerBounds) -> IntegerBounds {
    IntegerBounds::new(bounds.signed_max, bounds.signed_max)
}

/// PostgreSQL dialect implementation.
#[derive(Debug, Clone, Default)]
pub struct PostgresDialect;

impl PostgresDialect {
    /// Create a new PostgreSQL dialect instance.
    pub fn new() -> Self {
        Self
    }

    fn key_name(table: &TableRef, constraint: &Option<String>) -> String {
        constraint
            .clone()
            .unwrap_or_else(|| format!("{}_pkey", table.name))
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

impl Dialect for PostgresDialect {
    fn name(&self) -> &str {
        "postgres"
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        quote_pg(name)
    }

    fn qualify_table(&self, table: &TableRef) -> Result<String> {
        qualify_pg(
            table.schema.as_deref().unwrap_or(DEFAULT_SCHEMA),
            &table.name,
        )
    }

    fn quote_string(&self, value: &str, _column: &ColumnSpec) -> String {
        quote_literal(value)
    }

    fn fallback_literal(&self, value: &str) -> String {
        quote_literal(value)
    }

    fn supports_category(&self, category: CanonicalCategory) -> bool {
        !matches!(
            category,
            CanonicalCategory::Enum
                | CanonicalCategory::Year
                | CanonicalCategory::LineString
                | CanonicalCategory::MultiPoint
                | CanonicalCategory::MultiLineString
                | CanonicalCategory::MultiPolygon
        )
    }

    fn is_length_eligible(&self, column: &ColumnSpec) -> bool {
        SIZED_TYPES.contains(&base_type_name(&column.native_type).as_str())
    }

    fn identity_clause(&self) -> &str {
        "GENERATED BY DEFAULT AS IDENTITY"
    }

    fn integer_bounds(&self, native_type: &str) -> Option<IntegerBounds> {
        match base_type_name(native_type).as_str() {
            "smallint" | "int2" | "smallserial" | "serial2" => Some(signed(SMALLINT)),
            "integer" | "int" | "int4" | "serial" | "serial4" => Some(signed(INT)),
            "bigint" | "int8" | "bigserial" | "serial8" => Some(signed(BIGINT)),
            _ => None,
        }
    }

    fn primary_key_name(&self, table: &str) -> Option<String> {
        Some(format!("{}_pkey", table))
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
                "RENAME COLUMN {} TO {}",
                self.quote_ident(from)?,
                self.quote_ident(&column.name)?
            ),
            DdlOp::AlterType { column } => format!(
                "ALTER COLUMN {} TYPE {}",
                self.quote_ident(&column.name)?,
                self.column_type(column)?
            ),
            DdlOp::AlterNullability {
                column,
                with_default,
            } => {
                let name = self.quote_ident(&column.name)?;
                let nullability = if column.nullable {
                    format!("ALTER COLUMN {} DROP NOT NULL", name)
                } else {
                    format!("ALTER COLUMN {} SET NOT NULL", name)
                };
                match self.format_default(column)? {
                    Some(value) if *with_default => format!(
                        "ALTER COLUMN {} SET DEFAULT {}, {}",
                        name, value, nullability
                    ),
                    _ => nullability,
                }
            }
            DdlOp::AlterIdentity { column } => {
                let name = self.quote_ident(&column.name)?;
                if column.auto_increment {
                    format!("ALTER COLUMN {} ADD {}", name, self.identity_clause())
                } else {
                    format!("ALTER COLUMN {} DROP IDENTITY", name)
                }
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
            } => format!(
                "{}, {}",
                self.drop_key(table, old_constraint)?,
                self.add_key(table, columns, constraint)?
            ),
        };
        Ok(format!("ALTER TABLE {} {}", self.qualify_table(table)?, clause))
    }
}
