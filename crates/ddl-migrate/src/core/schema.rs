//! Table and column shape descriptors.
//!
//! A [`TableSpec`] is either the current shape of a table (read from the
//! schema cache) or the shape a caller wants it to have. The compiler never
//! mutates these; it diffs two of them and emits DDL.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::changes::ChangeFlags;
use crate::core::identifier::validate_identifier;
use crate::dialect::{classify, CanonicalCategory};
use crate::error::{MigrateError, Result};

fn default_true() -> bool {
    true
}

/// One column's desired or current shape.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    /// Column name.
    pub name: String,

    /// Stable identifier used to match a column across renames.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Dialect-native type name (e.g., "varchar", "int", "datetime2").
    #[serde(alias = "type", alias = "data_type")]
    pub native_type: String,

    /// Character/binary length. -1 means the dialect's MAX.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub length: Option<i64>,

    /// Numeric precision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision: Option<u32>,

    /// Numeric scale.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,

    #[serde(default = "default_true")]
    pub nullable: bool,

    #[serde(default)]
    pub primary_key: bool,

    #[serde(default)]
    pub auto_increment: bool,

    #[serde(default)]
    pub unique: bool,

    #[serde(default)]
    pub unsigned: bool,

    /// Raw default expression as the caller wrote it (`0`, `hello`, `getdate()`).
    #[serde(default, alias = "default", skip_serializing_if = "Option::is_none")]
    pub default_expression: Option<String>,

    /// Previous name when the caller renames the column.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rename_from: Option<String>,

    /// Introspected name of the default constraint, when the database
    /// named it something other than the dialect's deterministic name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_constraint: Option<String>,

    /// Introspected name of the column's single-column unique constraint
    /// (or unique index on MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unique_constraint: Option<String>,

    /// Caller-declared change flags (wire bitmask).
    #[serde(default, skip_serializing_if = "ChangeFlags::is_empty")]
    pub change_flags: ChangeFlags,
}

impl ColumnSpec {
    /// Create a nullable column with no constraints.
    pub fn new(name: impl Into<String>, native_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            id: None,
            native_type: native_type.into(),
            length: None,
            precision: None,
            scale: None,
            nullable: true,
            primary_key: false,
            auto_increment: false,
            unique: false,
            unsigned: false,
            default_expression: None,
            rename_from: None,
            default_constraint: None,
            unique_constraint: None,
            change_flags: ChangeFlags::NONE,
        }
    }

    pub fn with_length(mut self, length: i64) -> Self {
        self.length = Some(length);
        self
    }

    pub fn with_precision(mut self, precision: u32, scale: Option<u32>) -> Self {
        self.precision = Some(precision);
        self.scale = scale;
        self
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn with_default(mut self, expression: impl Into<String>) -> Self {
        self.default_expression = Some(expression.into());
        self
    }

    pub fn primary(mut self) -> Self {
        self.primary_key = true;
        self.nullable = false;
        self
    }

    pub fn identity(mut self) -> Self {
        self.auto_increment = true;
        self
    }

    pub fn unique(mut self) -> Self {
        self.unique = true;
        self
    }

    pub fn unsigned(mut self) -> Self {
        self.unsigned = true;
        self
    }

    pub fn renamed_from(mut self, previous: impl Into<String>) -> Self {
        self.rename_from = Some(previous.into());
        self
    }

    pub fn with_flags(mut self, flags: ChangeFlags) -> Self {
        self.change_flags = flags;
        self
    }

    /// Canonical category of the native type.
    pub fn category(&self) -> CanonicalCategory {
        classify(&self.native_type)
    }

    /// Whether the caller marked this entry as a deletion.
    pub fn is_marked_deleted(&self) -> bool {
        self.change_flags.contains(ChangeFlags::DELETED)
    }

    /// Type, length, precision, scale or signedness differ.
    pub fn type_differs(&self, other: &ColumnSpec) -> bool {
        !self.native_type.eq_ignore_ascii_case(&other.native_type)
            || self.length != other.length
            || self.precision != other.precision
            || self.scale != other.scale
            || self.unsigned != other.unsigned
    }

    /// Default expressions differ. An empty expression counts as no default.
    pub fn default_differs(&self, other: &ColumnSpec) -> bool {
        self.effective_default() != other.effective_default()
    }

    /// The default expression, treating blank and `NULL` as absent.
    pub fn effective_default(&self) -> Option<&str> {
        self.default_expression
            .as_deref()
            .filter(|d| !d.trim().is_empty() && !d.trim().eq_ignore_ascii_case("null"))
    }

    /// Any attribute the compiler acts on differs (name excluded).
    pub fn shape_differs(&self, other: &ColumnSpec) -> bool {
        self.type_differs(other)
            || self.nullable != other.nullable
            || self.auto_increment != other.auto_increment
            || self.unique != other.unique
            || self.default_differs(other)
    }

    /// Copy of this column with caller bookkeeping cleared and an absent
    /// default normalized to `None`.
    pub fn shape(&self) -> ColumnSpec {
        ColumnSpec {
            id: None,
            rename_from: None,
            change_flags: ChangeFlags::NONE,
            default_expression: self.effective_default().map(str::to_string),
            ..self.clone()
        }
    }
}

/// Reference to a table for rendering: optional schema plus name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TableRef {
    pub schema: Option<String>,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
        }
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        match &self.schema {
            Some(schema) => format!("{}.{}", schema, self.name),
            None => self.name.clone(),
        }
    }
}

/// Table metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableSpec {
    /// Schema name; dialects apply their own default when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Table name.
    pub name: String,

    /// Column definitions in declared order.
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,

    /// Declared primary-key order. Membership comes from
    /// `ColumnSpec::primary_key`; this only orders it.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub primary_key_order: Vec<String>,

    /// Introspected primary-key constraint name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub primary_key_constraint: Option<String>,

    /// Foreign key constraints.
    #[serde(default)]
    pub foreign_keys: Vec<ForeignKey>,

    /// Non-primary key indexes.
    #[serde(default)]
    pub indexes: Vec<Index>,
}

impl TableSpec {
    pub fn new(schema: Option<String>, name: impl Into<String>) -> Self {
        Self {
            schema,
            name: name.into(),
            columns: Vec::new(),
            primary_key_order: Vec::new(),
            primary_key_constraint: None,
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_columns(mut self, columns: Vec<ColumnSpec>) -> Self {
        self.columns = columns;
        self
    }

    pub fn table_ref(&self) -> TableRef {
        TableRef::new(self.schema.clone(), self.name.clone())
    }

    /// Get the fully qualified table name.
    pub fn full_name(&self) -> String {
        self.table_ref().full_name()
    }

    pub fn column(&self, name: &str) -> Option<&ColumnSpec> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn column_mut(&mut self, name: &str) -> Option<&mut ColumnSpec> {
        self.columns.iter_mut().find(|c| c.name == name)
    }

    /// Columns not marked for deletion.
    pub fn live_columns(&self) -> impl Iterator<Item = &ColumnSpec> {
        self.columns.iter().filter(|c| !c.is_marked_deleted())
    }

    /// Ordered primary-key column names.
    ///
    /// Members are the live columns flagged `primary_key`. Names listed in
    /// `primary_key_order` come first in that order; the rest follow in
    /// column order.
    pub fn primary_key_columns(&self) -> Vec<String> {
        let members: Vec<&str> = self
            .live_columns()
            .filter(|c| c.primary_key)
            .map(|c| c.name.as_str())
            .collect();

        let mut ordered: Vec<String> = self
            .primary_key_order
            .iter()
            .filter(|name| members.contains(&name.as_str()))
            .cloned()
            .collect();
        for name in members {
            if !ordered.iter().any(|o| o == name) {
                ordered.push(name.to_string());
            }
        }
        ordered
    }

    /// Replace the primary key with `columns`, in that order.
    pub fn set_primary_key(&mut self, columns: &[String]) {
        for col in &mut self.columns {
            col.primary_key = columns.contains(&col.name);
        }
        self.primary_key_order = columns.to_vec();
    }

    pub fn has_pk(&self) -> bool {
        self.live_columns().any(|c| c.primary_key)
    }

    /// Structural validation independent of dialect.
    ///
    /// Rejects invalid identifiers, duplicate live column names and
    /// primary-key ordering entries that name no primary-key column.
    pub fn validate(&self) -> Result<()> {
        validate_identifier(&self.name)?;
        if let Some(schema) = &self.schema {
            validate_identifier(schema)?;
        }

        let mut seen = HashSet::new();
        for col in self.live_columns() {
            validate_identifier(&col.name)?;
            if !seen.insert(col.name.to_lowercase()) {
                return Err(MigrateError::invalid_spec(
                    &self.name,
                    format!("duplicate column '{}'", col.name),
                ));
            }
            if col.native_type.trim().is_empty() {
                return Err(MigrateError::invalid_spec(
                    &self.name,
                    format!("column '{}' has no type", col.name),
                ));
            }
        }

        for name in &self.primary_key_order {
            match self.live_columns().find(|c| &c.name == name) {
                Some(col) if col.primary_key => {}
                Some(_) => {
                    return Err(MigrateError::invalid_spec(
                        &self.name,
                        format!("primary key lists '{}' but the column is not marked primary", name),
                    ))
                }
                None => {
                    return Err(MigrateError::invalid_spec(
                        &self.name,
                        format!("primary key names unknown column '{}'", name),
                    ))
                }
            }
        }

        Ok(())
    }

    /// Same columns (by name, ignoring order and caller bookkeeping) and the
    /// same ordered primary key.
    pub fn same_shape(&self, other: &TableSpec) -> bool {
        let mut mine: Vec<ColumnSpec> = self.live_columns().map(|c| c.shape()).collect();
        let mut theirs: Vec<ColumnSpec> = other.live_columns().map(|c| c.shape()).collect();
        mine.sort_by(|a, b| a.name.cmp(&b.name));
        theirs.sort_by(|a, b| a.name.cmp(&b.name));

        let strip = |cols: Vec<ColumnSpec>| -> Vec<ColumnSpec> {
            cols.into_iter()
                .map(|c| ColumnSpec {
                    default_constraint: None,
                    unique_constraint: None,
                    ..c
                })
                .collect()
        };

        strip(mine) == strip(theirs) && self.primary_key_columns() == other.primary_key_columns()
    }
}

/// Index metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    /// Index name.
    pub name: String,

    /// Indexed column names.
    pub columns: Vec<String>,

    /// Whether the index is unique.
    #[serde(default)]
    pub is_unique: bool,
}

/// Foreign key metadata.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForeignKey {
    /// Constraint name.
    pub name: String,

    /// Source column names.
    pub columns: Vec<String>,

    /// Referenced table name.
    pub ref_table: String,

    /// Referenced schema name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_schema: Option<String>,

    /// Referenced column names.
    pub ref_columns: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn users() -> TableSpec {
        TableSpec::new(Some("dbo".into()), "users").with_columns(vec![
            ColumnSpec::new("id", "int").primary().identity(),
            ColumnSpec::new("tenant", "int").primary(),
            ColumnSpec::new("name", "varchar").with_length(100),
        ])
    }

    #[test]
    fn test_primary_key_columns_in_column_order_by_default() {
        assert_eq!(users().primary_key_columns(), vec!["id", "tenant"]);
    }

    #[test]
    fn test_primary_key_order_is_respected() {
        let mut table = users();
        table.primary_key_order = vec!["tenant".into(), "id".into()];
        assert_eq!(table.primary_key_columns(), vec!["tenant", "id"]);
    }

    #[test]
    fn test_set_primary_key_updates_flags() {
        let mut table = users();
        table.set_primary_key(&["name".to_string()]);
        assert_eq!(table.primary_key_columns(), vec!["name"]);
        assert!(!table.column("id").unwrap().primary_key);
    }

    #[test]
    fn test_deleted_columns_leave_primary_key() {
        let mut table = users();
        table.columns[1].change_flags = ChangeFlags::DELETED;
        assert_eq!(table.primary_key_columns(), vec!["id"]);
    }

    #[test]
    fn test_validate_rejects_duplicates() {
        let mut table = users();
        table.columns.push(ColumnSpec::new("NAME", "text"));
        let err = table.validate().unwrap_err();
        assert!(err.to_string().contains("duplicate column 'NAME'"));
    }

    #[test]
    fn test_validate_rejects_unknown_pk_column() {
        let mut table = users();
        table.primary_key_order = vec!["missing".into()];
        assert!(table.validate().unwrap_err().to_string().contains("unknown column"));
    }

    #[test]
    fn test_validate_rejects_empty_type() {
        let mut table = users();
        table.columns.push(ColumnSpec::new("x", " "));
        assert!(table.validate().is_err());
    }

    #[test]
    fn test_same_shape_ignores_order_and_bookkeeping() {
        let a = users();
        let mut b = users();
        b.columns.reverse();
        b.columns[0].rename_from = Some("old".into());
        b.primary_key_order = vec!["id".into(), "tenant".into()];
        assert!(a.same_shape(&b));

        b.columns[0].nullable = false;
        assert!(!a.same_shape(&b));
    }

    #[test]
    fn test_blank_default_is_no_default() {
        let a = ColumnSpec::new("age", "int").with_default("");
        let b = ColumnSpec::new("age", "int");
        assert!(!a.default_differs(&b));
        assert!(!a.shape_differs(&b));
    }

    #[test]
    fn test_null_default_is_no_default() {
        let a = ColumnSpec::new("age", "int").with_default("NULL");
        assert_eq!(a.effective_default(), None);
        assert_eq!(a.shape().default_expression, None);
        assert!(!a.default_differs(&ColumnSpec::new("age", "int")));
    }

    #[test]
    fn test_type_differs_is_case_insensitive() {
        let a = ColumnSpec::new("n", "VARCHAR").with_length(10);
        let b = ColumnSpec::new("n", "varchar").with_length(10);
        assert!(!a.type_differs(&b));
        assert!(a.type_differs(&b.clone().with_length(20)));
    }

    #[test]
    fn test_column_deserializes_with_defaults() {
        let col: ColumnSpec =
            serde_json::from_str(r#"{"name":"age","type":"int","default":"0"}"#).unwrap();
        assert!(col.nullable);
        assert_eq!(col.default_expression.as_deref(), Some("0"));
        assert_eq!(col.category(), CanonicalCategory::Integer);
        assert!(col.change_flags.is_empty());
    }
}
