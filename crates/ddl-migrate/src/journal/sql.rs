//! Database-backed journal, written through the migration connection.
//!
//! Statements are built as text and handed to the [`StatementExecutor`].
//! Identifiers go through the dialect's quoting and every value goes
//! through the dialect's literal quoting for its column.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use super::{JournalBackend, JournalRecord, JournalStatus};
use crate::core::schema::{ColumnSpec, TableRef};
use crate::core::traits::{Dialect, StatementExecutor};
use crate::error::{MigrateError, Result};
use crate::schema_cache::{lowercase_keys, RawRow};

/// Column order used for inserts and selects.
const COLUMNS: [&str; 9] = [
    "id",
    "title",
    "title_down",
    "description",
    "batch",
    "checksum",
    "status",
    "created",
    "updated",
];

/// Journal table in the migrated database.
pub struct SqlJournal {
    dialect: Arc<dyn Dialect>,
    executor: Arc<dyn StatementExecutor>,
    table: TableRef,
}

impl SqlJournal {
    pub fn new(
        dialect: Arc<dyn Dialect>,
        executor: Arc<dyn StatementExecutor>,
        table: TableRef,
    ) -> Self {
        Self {
            dialect,
            executor,
            table,
        }
    }

    fn text_column(&self, name: &str) -> ColumnSpec {
        match self.dialect.name() {
            "mssql" => ColumnSpec::new(name, "nvarchar").with_length(-1),
            "mysql" => ColumnSpec::new(name, "longtext"),
            _ => ColumnSpec::new(name, "text"),
        }
    }

    /// Column shapes, in [`COLUMNS`] order.
    fn columns(&self) -> Vec<ColumnSpec> {
        vec![
            ColumnSpec::new("id", "varchar").with_length(36).not_null(),
            self.text_column("title").not_null(),
            self.text_column("title_down").not_null(),
            self.text_column("description"),
            ColumnSpec::new("batch", "bigint").not_null(),
            ColumnSpec::new("checksum", "varchar").with_length(64).not_null(),
            ColumnSpec::new("status", "varchar").with_length(16).not_null(),
            ColumnSpec::new("created", "varchar").with_length(40).not_null(),
            ColumnSpec::new("updated", "varchar").with_length(40).not_null(),
        ]
    }

    fn literal(&self, column: &ColumnSpec, value: &str) -> String {
        self.dialect.quote_string(value, column)
    }

    fn column(&self, name: &str) -> ColumnSpec {
        self.columns()
            .into_iter()
            .find(|c| c.name == name)
            .unwrap_or_else(|| ColumnSpec::new(name, "varchar"))
    }

    /// `CREATE TABLE` guarded so it is safe to run on every start.
    pub fn create_table_sql(&self) -> Result<String> {
        let qualified = self.dialect.qualify_table(&self.table)?;
        let definitions = self
            .columns()
            .iter()
            .map(|c| self.dialect.column_definition(&self.table, c))
            .collect::<Result<Vec<_>>>()?;
        let body = format!(
            "({}, PRIMARY KEY ({}))",
            definitions.join(", "),
            self.dialect.quote_ident("id")?
        );

        Ok(match self.dialect.name() {
            "mssql" => format!(
                "IF OBJECT_ID({}, N'U') IS NULL CREATE TABLE {} {}",
                self.literal(&ColumnSpec::new("", "nvarchar"), &qualified),
                qualified,
                body
            ),
            _ => format!("CREATE TABLE IF NOT EXISTS {} {}", qualified, body),
        })
    }

    /// `INSERT` for one record.
    pub fn insert_sql(&self, record: &JournalRecord) -> Result<String> {
        let columns = self.columns();
        let values = [
            record.id.to_string(),
            record.title.clone(),
            record.title_down.clone(),
            record.description.clone(),
            record.batch.to_string(),
            record.checksum.clone(),
            record.status.as_str().to_string(),
            timestamp(&record.created),
            timestamp(&record.updated),
        ];
        let rendered: Vec<String> = columns
            .iter()
            .zip(values.iter())
            .map(|(column, value)| {
                if column.name == "batch" {
                    value.clone()
                } else {
                    self.literal(column, value)
                }
            })
            .collect();

        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.dialect.qualify_table(&self.table)?,
            self.column_list()?,
            rendered.join(", ")
        ))
    }

    fn update_status_sql(&self, id: Uuid, status: JournalStatus) -> Result<String> {
        Ok(format!(
            "UPDATE {} SET {} = {}, {} = {} WHERE {} = {}",
            self.dialect.qualify_table(&self.table)?,
            self.dialect.quote_ident("status")?,
            self.literal(&self.column("status"), status.as_str()),
            self.dialect.quote_ident("updated")?,
            self.literal(&self.column("updated"), &timestamp(&Utc::now())),
            self.dialect.quote_ident("id")?,
            self.literal(&self.column("id"), &id.to_string()),
        ))
    }

    fn select_sql(&self) -> Result<String> {
        Ok(format!(
            "SELECT {} FROM {} ORDER BY {}, {}",
            self.column_list()?,
            self.dialect.qualify_table(&self.table)?,
            self.dialect.quote_ident("created")?,
            self.dialect.quote_ident("id")?
        ))
    }

    fn column_list(&self) -> Result<String> {
        let names: Vec<String> = COLUMNS.iter().map(|c| c.to_string()).collect();
        self.dialect.quote_list(&names)
    }

    async fn execute(&self, sql: &str) -> Result<()> {
        debug!("journal: {}", sql);
        self.executor
            .execute(sql)
            .await
            .map_err(|e| MigrateError::Journal(format!("{} ({})", e, sql)))?;
        Ok(())
    }
}

/// Fixed-width RFC 3339 so the text column sorts chronologically.
fn timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn text(row: &RawRow, key: &str) -> Result<String> {
    match row.get(key) {
        Some(Value::String(s)) => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        Some(Value::Null) | None => Ok(String::new()),
        Some(other) => Err(MigrateError::Journal(format!(
            "Unexpected value for journal column {}: {}",
            key, other
        ))),
    }
}

fn parse_row(row: RawRow) -> Result<JournalRecord> {
    let row = lowercase_keys(row);
    let bad = |key: &str, e: &dyn std::fmt::Display| {
        MigrateError::Journal(format!("Invalid journal column {}: {}", key, e))
    };

    let id = text(&row, "id")?;
    let batch = text(&row, "batch")?;
    let created = text(&row, "created")?;
    let updated = text(&row, "updated")?;

    Ok(JournalRecord {
        id: Uuid::parse_str(id.trim()).map_err(|e| bad("id", &e))?,
        title: text(&row, "title")?,
        title_down: text(&row, "title_down")?,
        description: text(&row, "description")?,
        batch: batch.trim().parse().map_err(|e| bad("batch", &e))?,
        checksum: text(&row, "checksum")?,
        status: JournalStatus::parse(&text(&row, "status")?)?,
        created: DateTime::parse_from_rfc3339(created.trim())
            .map_err(|e| bad("created", &e))?
            .with_timezone(&Utc),
        updated: DateTime::parse_from_rfc3339(updated.trim())
            .map_err(|e| bad("updated", &e))?
            .with_timezone(&Utc),
    })
}

#[async_trait]
impl JournalBackend for SqlJournal {
    async fn init(&self) -> Result<()> {
        let sql = self.create_table_sql()?;
        self.execute(&sql).await
    }

    async fn append(&self, record: &JournalRecord) -> Result<()> {
        let sql = self.insert_sql(record)?;
        self.execute(&sql).await
    }

    async fn set_status(&self, id: Uuid, status: JournalStatus) -> Result<()> {
        let sql = self.update_status_sql(id, status)?;
        self.execute(&sql).await
    }

    async fn records(&self) -> Result<Vec<JournalRecord>> {
        let sql = self.select_sql()?;
        let rows = self
            .executor
            .query(&sql)
            .await
            .map_err(|e| MigrateError::Journal(format!("{} ({})", e, sql)))?;
        rows.into_iter().map(parse_row).collect()
    }

    async fn next_batch(&self) -> Result<i64> {
        let sql = format!(
            "SELECT MAX({}) AS max_batch FROM {}",
            self.dialect.quote_ident("batch")?,
            self.dialect.qualify_table(&self.table)?
        );
        let rows = self
            .executor
            .query(&sql)
            .await
            .map_err(|e| MigrateError::Journal(format!("{} ({})", e, sql)))?;
        let max = match rows.into_iter().next().map(lowercase_keys) {
            Some(row) => {
                let value = text(&row, "max_batch")?;
                if value.trim().is_empty() {
                    0
                } else {
                    value
                        .trim()
                        .parse::<i64>()
                        .map_err(|e| MigrateError::Journal(format!("Invalid max batch: {}", e)))?
                }
            }
            None => 0,
        };
        Ok(max + 1)
    }

    fn backend_type(&self) -> &'static str {
        "database"
    }
}
