//! SQL Server connection: Tiberius clients pooled with bb8.

use std::time::Duration;

use async_trait::async_trait;
use bb8::{Pool, PooledConnection};
use serde_json::Value;
use tiberius::{AuthMethod, Client, Config, EncryptionLevel, Query, Row};
use tokio::net::TcpStream;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::core::traits::{SchemaIntrospector, StatementExecutor};
use crate::error::{DriverError, MigrateError, Result};
use crate::schema_cache::RawRow;

/// Maximum TDS packet size.
const TDS_MAX_PACKET_SIZE: u32 = 32767;

/// Connection pool timeouts.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);
const POOL_IDLE_TIMEOUT: Duration = Duration::from_secs(300);
const POOL_MAX_LIFETIME: Duration = Duration::from_secs(1800);
const TCP_KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// One row per (table, column). Key membership, the default and
/// single-column unique constraint names and identity come from the
/// catalog views; every column is CAST so the row decodes without
/// per-type handling.
const INTROSPECTION_QUERY: &str = r#"
    SELECT
        CAST(c.TABLE_SCHEMA AS NVARCHAR(128)) AS ts,
        CAST(c.TABLE_NAME AS NVARCHAR(128)) AS tn,
        CAST(c.COLUMN_NAME AS NVARCHAR(128)) AS cn,
        CAST(c.ORDINAL_POSITION AS INT) AS op,
        CAST(c.DATA_TYPE AS NVARCHAR(128)) AS dt,
        CASE WHEN c.IS_NULLABLE = 'YES' THEN 1 ELSE 0 END AS nrqd,
        CAST(c.COLUMN_DEFAULT AS NVARCHAR(4000)) AS cdf,
        CAST(c.CHARACTER_MAXIMUM_LENGTH AS INT) AS clen,
        CAST(c.NUMERIC_PRECISION AS INT) AS np,
        CAST(c.NUMERIC_SCALE AS INT) AS ns,
        CAST(COLUMNPROPERTY(o.object_id, c.COLUMN_NAME, 'IsIdentity') AS INT) AS is_identity,
        CAST(dc.name AS NVARCHAR(128)) AS default_constraint_name,
        CAST(pk.CONSTRAINT_NAME AS NVARCHAR(128)) AS pk_constraint_name,
        CAST(pk.ORDINAL_POSITION AS INT) AS pk_ordinal,
        CAST(CASE WHEN uq.CONSTRAINT_NAME IS NOT NULL THEN 'UNI' END AS NVARCHAR(3)) AS ck,
        CAST(uq.CONSTRAINT_NAME AS NVARCHAR(128)) AS unique_constraint_name,
        CAST(fk.name AS NVARCHAR(128)) AS constraint_name,
        CAST(OBJECT_SCHEMA_NAME(fkc.referenced_object_id) AS NVARCHAR(128)) AS rts,
        CAST(OBJECT_NAME(fkc.referenced_object_id) AS NVARCHAR(128)) AS rtn,
        CAST(COL_NAME(fkc.referenced_object_id, fkc.referenced_column_id) AS NVARCHAR(128)) AS rcn
    FROM INFORMATION_SCHEMA.COLUMNS c
    JOIN sys.objects o
        ON o.object_id = OBJECT_ID(QUOTENAME(c.TABLE_SCHEMA) + '.' + QUOTENAME(c.TABLE_NAME))
        AND o.type = 'U'
    LEFT JOIN sys.default_constraints dc
        ON dc.parent_object_id = o.object_id
        AND dc.parent_column_id = COLUMNPROPERTY(o.object_id, c.COLUMN_NAME, 'ColumnId')
    LEFT JOIN (
        SELECT kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.COLUMN_NAME, kcu.CONSTRAINT_NAME, kcu.ORDINAL_POSITION
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
            AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
        WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
    ) pk
        ON pk.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND pk.TABLE_NAME = c.TABLE_NAME
        AND pk.COLUMN_NAME = c.COLUMN_NAME
    LEFT JOIN (
        SELECT kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.COLUMN_NAME, MIN(kcu.CONSTRAINT_NAME) AS CONSTRAINT_NAME
        FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
        JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE kcu
            ON kcu.CONSTRAINT_SCHEMA = tc.CONSTRAINT_SCHEMA
            AND kcu.CONSTRAINT_NAME = tc.CONSTRAINT_NAME
        WHERE tc.CONSTRAINT_TYPE = 'UNIQUE'
            AND (
                SELECT COUNT(*)
                FROM INFORMATION_SCHEMA.KEY_COLUMN_USAGE k2
                WHERE k2.CONSTRAINT_SCHEMA = kcu.CONSTRAINT_SCHEMA
                    AND k2.CONSTRAINT_NAME = kcu.CONSTRAINT_NAME
            ) = 1
        GROUP BY kcu.TABLE_SCHEMA, kcu.TABLE_NAME, kcu.COLUMN_NAME
    ) uq
        ON uq.TABLE_SCHEMA = c.TABLE_SCHEMA
        AND uq.TABLE_NAME = c.TABLE_NAME
        AND uq.COLUMN_NAME = c.COLUMN_NAME
    LEFT JOIN sys.foreign_key_columns fkc
        ON fkc.parent_object_id = o.object_id
        AND fkc.parent_column_id = COLUMNPROPERTY(o.object_id, c.COLUMN_NAME, 'ColumnId')
    LEFT JOIN sys.foreign_keys fk
        ON fk.object_id = fkc.constraint_object_id
    WHERE c.TABLE_SCHEMA = @P1
"#;

/// Connection manager for bb8 pool with Tiberius.
#[derive(Clone)]
pub struct TiberiusConnectionManager {
    config: ConnectionConfig,
}

impl TiberiusConnectionManager {
    pub fn new(config: ConnectionConfig) -> Self {
        Self { config }
    }

    fn build_config(&self) -> Config {
        let mut config = Config::new();
        config.host(&self.config.host);
        config.port(self.config.effective_port());
        config.database(&self.config.database);
        config.authentication(AuthMethod::sql_server(
            &self.config.user,
            &self.config.password,
        ));

        if self.config.encrypt {
            if self.config.trust_server_cert {
                config.trust_cert();
            }
            config.encryption(EncryptionLevel::Required);
        } else {
            config.encryption(EncryptionLevel::NotSupported);
        }

        config.packet_size(TDS_MAX_PACKET_SIZE);
        config
    }
}

fn io_error(e: std::io::Error, context: &str) -> tiberius::error::Error {
    tiberius::error::Error::Io {
        kind: e.kind(),
        message: format!("{}: {}", context, e),
    }
}

#[async_trait]
impl bb8::ManageConnection for TiberiusConnectionManager {
    type Connection = Client<Compat<TcpStream>>;
    type Error = tiberius::error::Error;

    async fn connect(&self) -> std::result::Result<Self::Connection, Self::Error> {
        let config = self.build_config();
        let tcp = TcpStream::connect(config.get_addr())
            .await
            .map_err(|e| io_error(e, "connecting"))?;
        tcp.set_nodelay(true).ok();

        let std_tcp = tcp
            .into_std()
            .map_err(|e| io_error(e, "detaching socket"))?;
        let socket = socket2::Socket::from(std_tcp);
        let keepalive = socket2::TcpKeepalive::new()
            .with_time(TCP_KEEPALIVE_INTERVAL)
            .with_interval(TCP_KEEPALIVE_INTERVAL);
        if let Err(e) = socket.set_tcp_keepalive(&keepalive) {
            warn!("Failed to set TCP keepalive on MSSQL connection: {}", e);
        }

        let std_tcp: std::net::TcpStream = socket.into();
        std_tcp.set_nonblocking(true).ok();
        let tcp = TcpStream::from_std(std_tcp).map_err(|e| io_error(e, "converting socket"))?;

        Client::connect(config, tcp.compat_write()).await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> std::result::Result<(), Self::Error> {
        conn.simple_query("SELECT 1").await?.into_row().await?;
        Ok(())
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        false
    }
}

/// SQL Server connection pool.
pub struct MssqlConnection {
    pool: Pool<TiberiusConnectionManager>,
    schema: String,
}

impl MssqlConnection {
    /// Build the pool and test one connection.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let manager = TiberiusConnectionManager::new(config.clone());
        let pool = Pool::builder()
            .max_size(config.max_connections)
            .min_idle(Some(1))
            .connection_timeout(POOL_CONNECTION_TIMEOUT)
            .idle_timeout(Some(POOL_IDLE_TIMEOUT))
            .max_lifetime(Some(POOL_MAX_LIFETIME))
            .test_on_check_out(true)
            .build(manager)
            .await
            .map_err(|e| MigrateError::pool(e, "creating MSSQL pool"))?;

        {
            let mut conn = pool
                .get()
                .await
                .map_err(|e| MigrateError::pool(e, "testing MSSQL connection"))?;
            conn.simple_query("SELECT 1")
                .await
                .map_err(|e| MigrateError::pool(e, "testing MSSQL connection"))?
                .into_row()
                .await
                .map_err(|e| MigrateError::pool(e, "testing MSSQL connection"))?;
        }

        info!(
            "Connected to MSSQL: {}:{}/{} (pool_size={})",
            config.host,
            config.effective_port(),
            config.database,
            config.max_connections
        );

        Ok(Self {
            pool,
            schema: config.effective_schema(),
        })
    }

    async fn get_conn(&self) -> Result<PooledConnection<'_, TiberiusConnectionManager>> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting MSSQL connection"))
    }

    async fn introspect(&self, table: Option<&str>) -> Result<Vec<RawRow>> {
        let mut sql = INTROSPECTION_QUERY.to_string();
        if table.is_some() {
            sql.push_str("    AND c.TABLE_NAME = @P2\n");
        }
        sql.push_str("    ORDER BY c.TABLE_NAME, c.ORDINAL_POSITION");

        let mut conn = self.get_conn().await?;
        let mut query = Query::new(sql);
        query.bind(self.schema.as_str());
        if let Some(name) = table {
            query.bind(name);
        }

        let rows = query
            .query(&mut *conn)
            .await
            .map_err(|e| MigrateError::introspection(e, 0))?
            .into_first_result()
            .await
            .map_err(|e| MigrateError::introspection(e, 0))?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

fn row_to_json(row: &Row) -> RawRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(i, col)| (col.name().to_string(), cell(row, i)))
        .collect()
}

/// Decode one cell. `try_get` fails on a type mismatch, so each supported
/// type is tried in turn.
fn cell(row: &Row, i: usize) -> Value {
    if let Ok(v) = row.try_get::<&str, _>(i) {
        return v.map_or(Value::Null, |s| Value::String(s.to_string()));
    }
    if let Ok(v) = row.try_get::<i32, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<i64, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<i16, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<u8, _>(i) {
        return v.map_or(Value::Null, Value::from);
    }
    if let Ok(v) = row.try_get::<bool, _>(i) {
        return v.map_or(Value::Null, Value::Bool);
    }
    Value::Null
}

#[async_trait]
impl StatementExecutor for MssqlConnection {
    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn execute(&self, sql: &str) -> std::result::Result<u64, DriverError> {
        let mut conn = self.get_conn().await?;
        let result = conn.execute(sql, &[]).await?;
        Ok(result.total())
    }

    async fn query(&self, sql: &str) -> std::result::Result<Vec<RawRow>, DriverError> {
        let mut conn = self.get_conn().await?;
        let rows = conn.simple_query(sql).await?.into_first_result().await?;
        Ok(rows.iter().map(row_to_json).collect())
    }
}

#[async_trait]
impl SchemaIntrospector for MssqlConnection {
    fn db_type(&self) -> &str {
        "mssql"
    }

    async fn fetch_rows(&self) -> Result<Vec<RawRow>> {
        self.introspect(None).await
    }

    async fn fetch_table_rows(&self, table: &str) -> Result<Vec<RawRow>> {
        self.introspect(Some(table)).await
    }
}
