//! In-memory schema cache built from one bulk introspection result set.
//!
//! The cache is the source of the "old" side of every migration. It is
//! built once per connection and patched after each successful migration.
//! A table missing from the cache is unknown, never assumed dropped: a
//! partial load leaves later tables out, and callers re-fetch before acting.

mod row;

pub use row::{lowercase_keys, normalize_default, IntrospectionRow, RawRow};

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::core::schema::{ForeignKey, Index, TableSpec};
use crate::core::traits::SchemaIntrospector;
use crate::error::{MigrateError, Result};

/// Result of a cache lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lookup<'a> {
    Known(&'a TableSpec),
    /// Not loaded. Re-fetch before acting.
    Unknown,
}

impl<'a> Lookup<'a> {
    pub fn known(self) -> Option<&'a TableSpec> {
        match self {
            Lookup::Known(table) => Some(table),
            Lookup::Unknown => None,
        }
    }
}

/// Foreign-key adjacency between cached tables.
///
/// `edges[i][j]` is true when `tables[i]` references `tables[j]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Adjacency {
    pub tables: Vec<String>,
    pub edges: Vec<Vec<bool>>,
}

/// Tables keyed by lower-cased name.
#[derive(Debug, Clone, Default)]
pub struct SchemaCache {
    tables: BTreeMap<String, TableSpec>,
    complete: bool,
}

/// Per-table accumulator used while rows are folded in.
struct Pending {
    table: TableSpec,
    ordinals: HashMap<String, i64>,
    pk_ordinals: Vec<(i64, String)>,
}

impl Pending {
    fn new(row: &IntrospectionRow) -> Self {
        Self {
            table: TableSpec::new(row.table_schema.clone(), row.table_name.clone()),
            ordinals: HashMap::new(),
            pk_ordinals: Vec::new(),
        }
    }

    /// Fold one row in. A column may appear on several rows, one per
    /// constraint or index it belongs to.
    fn add(&mut self, row: &IntrospectionRow) {
        let name = &row.column_name;
        if self.table.column(name).is_none() {
            let mut col = row.to_column();
            col.primary_key = false;
            self.table.columns.push(col);
            self.ordinals.insert(
                name.clone(),
                row.ordinal_position.unwrap_or(self.ordinals.len() as i64 + 1),
            );
        }
        let Some(col) = self.table.column_mut(name) else {
            return;
        };

        if row.is_primary() && !col.primary_key {
            col.primary_key = true;
            let ordinal = row
                .pk_ordinal
                .unwrap_or(self.pk_ordinals.len() as i64 + 1);
            self.pk_ordinals.push((ordinal, name.clone()));
        }
        if row.is_unique() {
            col.unique = true;
            if col.unique_constraint.is_none() {
                col.unique_constraint = row.unique_constraint_name.clone();
            }
        }
        if row.is_auto_increment() {
            col.auto_increment = true;
        }
        if col.default_constraint.is_none() {
            col.default_constraint = row.default_constraint_name.clone();
        }
        if self.table.primary_key_constraint.is_none() {
            self.table.primary_key_constraint = row.pk_constraint_name.clone();
        }

        if let Some(ref_table) = &row.referenced_table_name {
            let fk_name = row
                .constraint_name
                .clone()
                .unwrap_or_else(|| format!("FK_{}_{}", row.table_name, name));
            let ref_column = row.referenced_column_name.clone().unwrap_or_default();
            match self.table.foreign_keys.iter_mut().find(|fk| fk.name == fk_name) {
                Some(fk) => {
                    if !fk.columns.contains(name) {
                        fk.columns.push(name.clone());
                        fk.ref_columns.push(ref_column);
                    }
                }
                None => self.table.foreign_keys.push(ForeignKey {
                    name: fk_name,
                    columns: vec![name.clone()],
                    ref_table: ref_table.clone(),
                    ref_schema: row.referenced_table_schema.clone(),
                    ref_columns: vec![ref_column],
                }),
            }
        }

        if let Some(index_name) = &row.index_name {
            if index_name.eq_ignore_ascii_case("PRIMARY") {
                return;
            }
            let is_unique = row.non_unique == Some(false);
            match self.table.indexes.iter_mut().find(|ix| &ix.name == index_name) {
                Some(ix) => {
                    if !ix.columns.contains(name) {
                        ix.columns.push(name.clone());
                    }
                }
                None => self.table.indexes.push(Index {
                    name: index_name.clone(),
                    columns: vec![name.clone()],
                    is_unique,
                }),
            }
        }
    }

    fn finish(mut self) -> TableSpec {
        let ordinals = self.ordinals;
        self.table
            .columns
            .sort_by_key(|c| ordinals.get(&c.name).copied().unwrap_or(i64::MAX));
        self.pk_ordinals.sort();
        self.table.primary_key_order = self.pk_ordinals.into_iter().map(|(_, n)| n).collect();

        // A unique column backed by a single-column unique index takes the
        // index name when no constraint name was reported.
        let indexes = &self.table.indexes;
        for col in self.table.columns.iter_mut() {
            if col.unique && col.unique_constraint.is_none() {
                col.unique_constraint = indexes
                    .iter()
                    .find(|ix| ix.is_unique && ix.columns.len() == 1 && ix.columns[0] == col.name)
                    .map(|ix| ix.name.clone());
            }
        }
        self.table
    }
}

fn decode(row: RawRow) -> std::result::Result<IntrospectionRow, String> {
    serde_json::from_value(Value::Object(lowercase_keys(row))).map_err(|e| e.to_string())
}

/// Fold rows into tables. On a malformed row, the tables completed so far
/// are returned with the error; the table holding the bad row is dropped.
fn fold(rows: Vec<RawRow>) -> (Vec<TableSpec>, Option<String>) {
    let mut pending: Vec<Pending> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for (i, raw) in rows.into_iter().enumerate() {
        let table_hint = raw
            .iter()
            .find(|(k, _)| {
                let k = k.to_lowercase();
                k == "table_name" || k == "tn"
            })
            .and_then(|(_, v)| v.as_str().map(str::to_lowercase));

        let row = match decode(raw) {
            Ok(row) => row,
            Err(e) => {
                if let Some(pos) = table_hint.and_then(|t| index.get(&t).copied()) {
                    pending.remove(pos);
                }
                let tables = pending.into_iter().map(Pending::finish).collect();
                return (tables, Some(format!("row {}: {}", i, e)));
            }
        };

        let key = row.table_name.to_lowercase();
        let pos = *index.entry(key).or_insert_with(|| {
            pending.push(Pending::new(&row));
            pending.len() - 1
        });
        pending[pos].add(&row);
    }

    (pending.into_iter().map(Pending::finish).collect(), None)
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Populate the cache from a bulk introspection result set.
    ///
    /// Existing entries for the tables in `rows` are replaced; other entries
    /// are kept. On a malformed row the tables decoded before it stay cached,
    /// the cache is marked incomplete and an `Introspection` error is returned.
    pub fn build(&mut self, rows: Vec<RawRow>) -> Result<usize> {
        let (tables, failure) = fold(rows);
        let loaded = tables.len();
        for table in tables {
            self.upsert_table(table);
        }
        match failure {
            Some(message) => {
                self.complete = false;
                Err(MigrateError::introspection(message, loaded))
            }
            None => {
                self.complete = true;
                Ok(loaded)
            }
        }
    }

    /// Whether the last bulk load finished.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    pub fn table(&self, name: &str) -> Lookup<'_> {
        match self.tables.get(&name.to_lowercase()) {
            Some(table) => Lookup::Known(table),
            None => Lookup::Unknown,
        }
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableSpec> {
        self.tables.values()
    }

    /// Cached table names, sorted case-insensitively.
    pub fn table_names(&self) -> Vec<String> {
        self.tables.values().map(|t| t.name.clone()).collect()
    }

    /// Whether `child` has a foreign key referencing `parent`.
    pub fn references(&self, parent: &str, child: &str) -> bool {
        match self.table(child) {
            Lookup::Known(table) => table
                .foreign_keys
                .iter()
                .any(|fk| fk.ref_table.eq_ignore_ascii_case(parent)),
            Lookup::Unknown => false,
        }
    }

    /// Tables with a foreign key referencing `table`.
    pub fn dependents(&self, table: &str) -> Vec<String> {
        self.tables
            .values()
            .filter(|t| self.references(table, &t.name))
            .map(|t| t.name.clone())
            .collect()
    }

    /// Tables that `table` references.
    pub fn dependencies(&self, table: &str) -> Vec<String> {
        match self.table(table) {
            Lookup::Known(spec) => {
                let mut names: Vec<String> =
                    spec.foreign_keys.iter().map(|fk| fk.ref_table.clone()).collect();
                names.sort();
                names.dedup();
                names
            }
            Lookup::Unknown => Vec::new(),
        }
    }

    pub fn adjacency(&self) -> Adjacency {
        let tables = self.table_names();
        let edges = tables
            .iter()
            .map(|child| {
                tables
                    .iter()
                    .map(|parent| self.references(parent, child))
                    .collect()
            })
            .collect();
        Adjacency { tables, edges }
    }

    pub fn upsert_table(&mut self, table: TableSpec) {
        self.tables.insert(table.name.to_lowercase(), table);
    }

    /// Forget a table that was dropped.
    pub fn remove_table(&mut self, name: &str) -> Option<TableSpec> {
        self.tables.remove(&name.to_lowercase())
    }

    /// Forget a table whose live shape is no longer known. The next lookup
    /// reports it unknown so it is re-fetched.
    pub fn invalidate(&mut self, name: &str) {
        if self.tables.remove(&name.to_lowercase()).is_some() {
            debug!("Invalidated cache entry for {}", name);
        }
    }

    /// Bulk load through an introspector.
    pub async fn load(&mut self, introspector: &dyn SchemaIntrospector) -> Result<usize> {
        let rows = match introspector.fetch_rows().await {
            Ok(rows) => rows,
            Err(e) => {
                self.complete = false;
                return Err(match e {
                    MigrateError::Introspection { .. } => e,
                    other => MigrateError::introspection(other, self.tables.len()),
                });
            }
        };
        let row_count = rows.len();
        let loaded = self.build(rows)?;
        info!(
            "Schema cache loaded: {} table(s) from {} row(s) ({})",
            loaded,
            row_count,
            introspector.db_type()
        );
        Ok(loaded)
    }

    /// Re-fetch one table. Returns false when the database has no such table.
    pub async fn refresh_table(
        &mut self,
        introspector: &dyn SchemaIntrospector,
        table: &str,
    ) -> Result<bool> {
        let rows = introspector.fetch_table_rows(table).await?;
        let (tables, failure) = fold(rows);
        if let Some(message) = failure {
            return Err(MigrateError::introspection(message, 0));
        }
        match tables
            .into_iter()
            .find(|t| t.name.eq_ignore_ascii_case(table))
        {
            Some(spec) => {
                debug!("Refreshed {} ({} column(s))", spec.name, spec.columns.len());
                self.upsert_table(spec);
                Ok(true)
            }
            None => {
                warn!("Table {} not found on refresh", table);
                self.remove_table(table);
                Ok(false)
            }
        }
    }
}
