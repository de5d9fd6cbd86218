//! MySQL/MariaDB connection: statement execution and schema introspection.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::mysql::{MySqlConnectOptions, MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::{Column, Row, ValueRef};
use tracing::info;

use crate::config::ConnectionConfig;
use crate::core::traits::{SchemaIntrospector, StatementExecutor};
use crate::drivers::common::SslMode;
use crate::error::{DriverError, MigrateError, Result};
use crate::schema_cache::RawRow;

/// Connection pool timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// One row per (table, column), annotated with key membership and the
/// name of the column's single-column unique index. String
/// columns are CAST to CHAR and numbers to SIGNED so every driver version
/// decodes them the same way.
const INTROSPECTION_QUERY: &str = r#"
    SELECT
        CAST(c.TABLE_SCHEMA AS CHAR(255)) AS ts,
        CAST(c.TABLE_NAME AS CHAR(255)) AS tn,
        CAST(c.COLUMN_NAME AS CHAR(255)) AS cn,
        CAST(c.ORDINAL_POSITION AS SIGNED) AS op,
        CAST(c.DATA_TYPE AS CHAR(255)) AS dt,
        CAST(c.COLUMN_TYPE AS CHAR(1024)) AS ct,
        IF(c.IS_NULLABLE = 'YES', 1, 0) AS nrqd,
        CAST(c.COLUMN_KEY AS CHAR(3)) AS ck,
        CAST(c.EXTRA AS CHAR(255)) AS ext,
        CAST(c.COLUMN_DEFAULT AS CHAR(4096)) AS cdf,
        CAST(CASE
            WHEN c.CHARACTER_MAXIMUM_LENGTH > 2147483647 THEN -1
            ELSE c.CHARACTER_MAXIMUM_LENGTH
        END AS SIGNED) AS clen,
        CAST(c.NUMERIC_PRECISION AS SIGNED) AS np,
        CAST(c.NUMERIC_SCALE AS SIGNED) AS ns,
        CAST(pk.ORDINAL_POSITION AS SIGNED) AS pk_ordinal,
        CAST(uq.INDEX_NAME AS CHAR(255)) AS unique_constraint_name,
        CAST(fk.CONSTRAINT_NAME AS CHAR(255)) AS constraint_name,
        CAST(fk.REFERENCED_TABLE_SCHEMA AS CHAR(255)) AS rts,
        CAST(fk.REFERENCED_TABLE_NAME AS CHAR(255)) AS rtn,
        CAST(fk.REFERENCED_COLUMN_NAME AS CHAR(255)) AS rcn
    FROM INFORMATION_SCHEMA.COLUMNS c
    JOIN INFORMATION_SCHEMA.TABLES t
        ON t.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND t.TABLE_NAME = c.TABLE_NAME
        AND t.TABLE_TYPE = 'BASE TABLE'
    LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE pk
        ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND pk.TABLE_NAME = c.TABLE_NAME
        AND pk.COLUMN_NAME = c.COLUMN_NAME
        AND pk.CONSTRAINT_NAME = 'PRIMARY'
    LEFT JOIN (
        SELECT s.TABLE_SCHEMA, s.TABLE_NAME, s.COLUMN_NAME, MIN(s.INDEX_NAME) AS INDEX_NAME
        FROM INFORMATION_SCHEMA.STATISTICS s
        WHERE s.NON_UNIQUE = 0
            AND s.INDEX_NAME <> 'PRIMARY'
            AND NOT EXISTS (
                SELECT 1
                FROM INFORMATION_SCHEMA.STATISTICS s2
                WHERE s2.TABLE_SCHEMA = s.TABLE_SCHEMA
                    AND s2.TABLE_NAME = s.TABLE_NAME
                    AND s2.INDEX_NAME = s.INDEX_NAME
                    AND s2.SEQ_IN_INDEX > 1
            )
        GROUP BY s.TABLE_SCHEMA, s.TABLE_NAME, s.COLUMN_NAME
    ) uq
        ON uq.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND uq.TABLE_NAME = c.TABLE_NAME
        AND uq.COLUMN_NAME = c.COLUMN_NAME
    LEFT JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE fk
        ON fk.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND fk.TABLE_NAME = c.TABLE_NAME
        AND fk.COLUMN_NAME = c.COLUMN_NAME
        AND fk.REFERENCED_TABLE_NAME IS NOT NULL
    WHERE c.TABLE_SCHEMA = ?
"#;

/// MySQL/MariaDB connection backed by an sqlx pool.
pub struct MysqlConnection {
    pool: MySqlPool,
    schema: String,
}

impl MysqlConnection {
    /// Open a pool and verify it with `SELECT 1`.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let ssl_mode = SslMode::parse(&config.ssl_mode)?;

        let options = MySqlConnectOptions::new()
            .host(&config.host)
            .port(config.effective_port())
            .database(&config.database)
            .username(&config.user)
            .password(&config.password)
            .ssl_mode(ssl_mode.mysql());

        let pool = MySqlPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(POOL_CONNECTION_TIMEOUT)
            .connect_with(options)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MySQL pool"))?;

        sqlx::query("SELECT 1")
            .fetch_one(&pool)
            .await
            .map_err(|e| MigrateError::pool(e, "testing MySQL connection"))?;

        info!(
            "Connected to MySQL: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            schema: config.effective_schema(),
        })
    }

    async fn introspect(&self, table: Option<&str>) -> Result<Vec<RawRow>> {
        let mut sql = INTROSPECTION_QUERY.to_string();
        if table.is_some() {
            sql.push_str("    AND c.TABLE_NAME = ?\n");
        }
        sql.push_str("    ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION");

        let mut query = sqlx::query(&sql).bind(&self.schema);
        if let Some(name) = table {
            query = query.bind(name);
        }
        let rows: Vec<MySqlRow> = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| MigrateError::introspection(e, 0))?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

/// Decode one row into a JSON map. Cells that are neither text, integer
/// nor boolean become null.
fn row_to_json(row: &MySqlRow) -> RawRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), cell(row, i)))
        .collect()
}

fn cell(row: &MySqlRow, i: usize) -> Value {
    let is_null = row.try_get_raw(i).map(|r| r.is_null()).unwrap_or(true);
    if is_null {
        return Value::Null;
    }
    if let Ok(s) = row.try_get::<String, _>(i) {
        return Value::String(s);
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<u64, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<i32, _>(i) {
        return Value::from(v);
    }
    if let Ok(v) = row.try_get::<bool, _>(i) {
        return Value::Bool(v);
    }
    if let Ok(bytes) = row.try_get::<Vec<u8>, _>(i) {
        return Value::String(String::from_utf8_lossy(&bytes).into_owned());
    }
    Value::Null
}

#[async_trait]
impl StatementExecutor for MysqlConnection {
    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn execute(&self, sql: &str) -> std::result::Result<u64, DriverError> {
        let result = sqlx::raw_sql(sql).execute(&self.pool).await?;
        Ok(result.rows_affected())
    }

    async fn query(&self, sql: &str) -> std::result::Result<Vec<RawRow>, DriverError> {
        let rows = sqlx::raw_sql(sql).fetch_all(&self.pool).await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

#[async_trait]
impl SchemaIntrospector for MysqlConnection {
    fn db_type(&self) -> &str {
        "mysql"
    }

    async fn fetch_rows(&self) -> Result<Vec<RawRow>> {
        self.introspect(None).await
    }

    async fn fetch_table_rows(&self, table: &str) -> Result<Vec<RawRow>> {
        self.introspect(Some(table)).await
    }
}
