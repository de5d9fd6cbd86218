//! Core traits for dialect-aware DDL compilation and execution.
//!
//! - [`Dialect`]: DDL syntax and naming strategy for one SQL engine
//! - [`StatementExecutor`]: raw execution primitive the migrator hands statements to
//! - [`SchemaIntrospector`]: source of the bulk introspection rows
//!
//! # Design Patterns
//!
//! - **Strategy**: one compiler, many `Dialect` implementations
//! - **Template Method**: provided methods on `Dialect` hold the shared rules
//!   (type suffixes, default-literal formatting, column definitions) and call
//!   the few primitives each dialect must supply

use async_trait::async_trait;

use crate::compiler::DdlOp;
use crate::core::identifier::{validate_default_expression, validate_type_name};
use crate::core::schema::{ColumnSpec, TableRef, TableSpec};
use crate::dialect::{CanonicalCategory, IntegerBounds};
use crate::error::{DriverError, MigrateError, Result};
use crate::schema_cache::RawRow;

/// Niladic functions accepted as unquoted date/time defaults.
const DATE_KEYWORDS: &[&str] = &[
    "current_timestamp",
    "current_date",
    "current_time",
    "localtimestamp",
    "localtime",
    "now",
    "getdate",
    "getutcdate",
    "sysdatetime",
    "sysutcdatetime",
    "sysdatetimeoffset",
];

/// Whether a date/time default looks like an expression rather than a value:
/// a function call, a parenthesized expression or a niladic time function.
pub fn looks_like_expression(raw: &str) -> bool {
    let trimmed = raw.trim();
    let lower = trimmed.to_lowercase();
    if lower.contains("getdate") {
        return true;
    }
    if DATE_KEYWORDS.contains(&lower.as_str()) {
        return true;
    }
    // name(args) or (expr): the value must end in a parenthesized group
    if trimmed.ends_with(')') {
        if let Some(open) = trimmed.find('(') {
            let head = &trimmed[..open];
            return head.is_empty()
                || head
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.');
        }
    }
    false
}

/// DDL syntax strategy for one SQL engine.
///
/// A dialect supplies identifier quoting, literal quoting, naming
/// conventions, capability flags and the rendering of each [`DdlOp`]. The
/// compiler owns ordering and state tracking; the dialect owns grammar.
/// Implementations are stateless and shared across concurrent compilations.
pub trait Dialect: Send + Sync {
    /// Get the dialect identifier (e.g., "mysql", "mssql").
    fn name(&self) -> &str;

    /// Quote an identifier after validating it.
    fn quote_ident(&self, name: &str) -> Result<String>;

    /// Quote and schema-qualify a table reference.
    fn qualify_table(&self, table: &TableRef) -> Result<String>;

    /// Quote a character literal for a column of this dialect.
    fn quote_string(&self, value: &str, column: &ColumnSpec) -> String;

    /// Quote a default whose category has no dedicated rule.
    fn fallback_literal(&self, value: &str) -> String;

    /// Whether the category maps to a type this dialect can declare.
    fn supports_category(&self, category: CanonicalCategory) -> bool;

    /// Whether the column's type accepts an explicit `(n)` / `(p,s)` suffix.
    fn is_length_eligible(&self, column: &ColumnSpec) -> bool;

    /// Identity / auto-increment clause.
    fn identity_clause(&self) -> &str;

    /// Signed/unsigned maxima for an integer type, if it is one.
    fn integer_bounds(&self, native_type: &str) -> Option<IntegerBounds>;

    /// Render one operation as a single statement.
    fn render(&self, table: &TableRef, op: &DdlOp) -> Result<String>;

    /// Keyword used inside the suffix for length -1 (`max`), if any.
    fn max_length_keyword(&self) -> Option<&str> {
        None
    }

    /// Whether `unsigned` is emitted after the type.
    fn supports_unsigned(&self) -> bool {
        false
    }

    /// Deterministic default-constraint name, for dialects that name them.
    fn default_constraint_name(&self, _table: &str, _column: &str) -> Option<String> {
        None
    }

    /// Deterministic unique-constraint name.
    fn unique_constraint_name(&self, table: &str, column: &str) -> String {
        format!("UQ_{}_{}", table, column)
    }

    /// Deterministic primary-key constraint name, for dialects that name it.
    fn primary_key_name(&self, _table: &str) -> Option<String> {
        None
    }

    /// Default and unique constraints must be dropped before their column.
    fn drops_constraints_before_column(&self) -> bool {
        false
    }

    /// An existing default must be dropped before a new one is set.
    fn default_requires_drop_before_replace(&self) -> bool {
        false
    }

    /// A primary-key change drops and re-adds the key in one statement,
    /// after the column alterations.
    fn replaces_primary_key_in_one_statement(&self) -> bool {
        false
    }

    /// Identity can be added to or removed from an existing column.
    fn supports_identity_change(&self) -> bool {
        true
    }

    /// Identity rules for a whole table. Dialects with stricter rules
    /// extend [`check_identity_rules`].
    fn validate_table(&self, table: &TableSpec) -> Result<()> {
        check_identity_rules(self.name(), table)
    }

    /// Type with optional length/precision suffix and signedness.
    fn column_type(&self, column: &ColumnSpec) -> Result<String> {
        let native = column.native_type.trim();
        validate_type_name(native)?;
        let mut ty = native.to_string();

        if !native.contains('(') && self.is_length_eligible(column) {
            if let Some(suffix) = type_suffix(self.max_length_keyword(), column) {
                ty.push_str(&suffix);
            }
        }

        if column.unsigned
            && self.supports_unsigned()
            && !native.to_lowercase().contains("unsigned")
        {
            ty.push_str(" unsigned");
        }
        Ok(ty)
    }

    /// Format the column's default as a SQL literal.
    ///
    /// - blank or `NULL` compiles to `NULL` (character columns keep `''`)
    /// - integer, float, boolean and bit pass through unquoted
    /// - date/time pass through when they look like an expression, else quoted
    /// - character data is always quoted with escaping
    /// - everything else uses the dialect's fallback quoting
    fn format_default(&self, column: &ColumnSpec) -> Result<Option<String>> {
        let Some(raw) = column.default_expression.as_deref() else {
            return Ok(None);
        };
        let category = column.category();
        let trimmed = raw.trim();

        if trimmed.eq_ignore_ascii_case("null") {
            return Ok(Some("NULL".to_string()));
        }
        if category.is_character() {
            return Ok(Some(self.quote_string(raw, column)));
        }
        if trimmed.is_empty() {
            return Ok(Some("NULL".to_string()));
        }
        if category.is_numeric() || category == CanonicalCategory::Bit {
            validate_default_expression(trimmed)?;
            return Ok(Some(trimmed.to_string()));
        }
        if category == CanonicalCategory::Date {
            if looks_like_expression(trimmed) {
                validate_default_expression(trimmed)?;
                return Ok(Some(trimmed.to_string()));
            }
            return Ok(Some(self.quote_string(raw, column)));
        }
        Ok(Some(self.fallback_literal(raw)))
    }

    /// `NULL` / `NOT NULL`.
    fn nullability_clause(&self, column: &ColumnSpec) -> &'static str {
        if column.nullable {
            "NULL"
        } else {
            "NOT NULL"
        }
    }

    /// Inline default clause for a column definition.
    fn default_clause(&self, _table: &TableRef, column: &ColumnSpec) -> Result<Option<String>> {
        if column.effective_default().is_none() {
            return Ok(None);
        }
        Ok(self.format_default(column)?.map(|v| format!("DEFAULT {}", v)))
    }

    /// Full column definition: name, type, nullability, identity, default.
    fn column_definition(&self, table: &TableRef, column: &ColumnSpec) -> Result<String> {
        let mut def = format!(
            "{} {} {}",
            self.quote_ident(&column.name)?,
            self.column_type(column)?,
            self.nullability_clause(column)
        );
        if column.auto_increment {
            def.push(' ');
            def.push_str(self.identity_clause());
        }
        if let Some(clause) = self.default_clause(table, column)? {
            def.push(' ');
            def.push_str(&clause);
        }
        Ok(def)
    }

    /// Comma-separated quoted identifiers.
    fn quote_list(&self, names: &[String]) -> Result<String> {
        let quoted = names
            .iter()
            .map(|n| self.quote_ident(n))
            .collect::<Result<Vec<_>>>()?;
        Ok(quoted.join(", "))
    }
}

/// At most one identity column, and an identity column carries no default.
pub fn check_identity_rules(dialect: &str, table: &TableSpec) -> Result<()> {
    let identities: Vec<&ColumnSpec> =
        table.live_columns().filter(|c| c.auto_increment).collect();
    if identities.len() > 1 {
        return Err(MigrateError::invalid_spec(
            &table.name,
            format!(
                "{} allows one identity column, found {}",
                dialect,
                identities
                    .iter()
                    .map(|c| c.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        ));
    }
    if let Some(col) = identities.first() {
        if col.effective_default().is_some() {
            return Err(MigrateError::invalid_spec(
                &table.name,
                format!("identity column '{}' cannot have a default", col.name),
            ));
        }
    }
    Ok(())
}

/// Length/precision suffix for a column, before eligibility is applied.
///
/// Floats prefer `(p,s)`; everything else prefers the length, falling back
/// to precision when no length was given.
pub fn type_suffix(max_keyword: Option<&str>, column: &ColumnSpec) -> Option<String> {
    let precision = |p: u32| match column.scale {
        Some(s) => format!("({},{})", p, s),
        None => format!("({})", p),
    };

    if column.category() == CanonicalCategory::Float {
        if let Some(p) = column.precision {
            return Some(precision(p));
        }
    }
    match column.length {
        Some(-1) => max_keyword.map(|kw| format!("({})", kw)),
        Some(n) if n > 0 => Some(format!("({})", n)),
        _ => column.precision.map(precision),
    }
}

/// Raw execution primitive: one statement at a time.
#[async_trait]
pub trait StatementExecutor: Send + Sync {
    /// Dialect identifier of the connection.
    fn db_type(&self) -> &str;

    /// Execute one statement, returning affected rows where the driver
    /// reports them.
    async fn execute(&self, sql: &str) -> std::result::Result<u64, DriverError>;

    /// Run a query and return each row as a JSON map keyed by column name.
    /// Cells decode as text, integers or booleans; anything else is null.
    async fn query(&self, sql: &str) -> std::result::Result<Vec<RawRow>, DriverError>;
}

/// Source of introspection rows.
#[async_trait]
pub trait SchemaIntrospector: Send + Sync {
    /// Dialect identifier of the connection.
    fn db_type(&self) -> &str;

    /// One row per (table, column) across the schema.
    async fn fetch_rows(&self) -> Result<Vec<RawRow>>;

    /// Rows for a single table.
    async fn fetch_table_rows(&self, table: &str) -> Result<Vec<RawRow>>;
}
