//! PostgreSQL connection: tokio-postgres clients pooled with deadpool.

use std::time::Duration;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use serde_json::Value;
use tokio_postgres::{Config as PgConfig, SimpleQueryMessage};
use tracing::{info, warn};

use crate::config::ConnectionConfig;
use crate::core::traits::{SchemaIntrospector, StatementExecutor};
use crate::drivers::common::TlsBuilder;
use crate::error::{DriverError, MigrateError, Result};
use crate::schema_cache::RawRow;

/// Connection timeout.
const POOL_CONNECTION_TIMEOUT: Duration = Duration::from_secs(30);

/// One row per (table, column). Every column is cast to text; the cache
/// decodes numbers and flags from strings. Sequence defaults of serial
/// columns are reported as identity rather than as a default.
const INTROSPECTION_QUERY: &str = r#"
    SELECT
        c.table_schema::text AS ts,
        c.table_name::text AS tn,
        c.column_name::text AS cn,
        c.ordinal_position::text AS op,
        c.data_type::text AS dt,
        c.is_nullable::text AS nrqd,
        CASE WHEN c.column_default LIKE 'nextval(%' THEN NULL
             ELSE c.column_default END::text AS cdf,
        c.character_maximum_length::text AS clen,
        c.numeric_precision::text AS np,
        c.numeric_scale::text AS ns,
        CASE WHEN c.is_identity = 'YES' OR c.column_default LIKE 'nextval(%'
             THEN '1' ELSE '0' END AS is_identity,
        pk.constraint_name::text AS pk_constraint_name,
        pk.ordinal_position::text AS pk_ordinal,
        CASE WHEN uq.column_name IS NOT NULL THEN 'UNI' END AS ck,
        uq.constraint_name::text AS unique_constraint_name,
        fk.constraint_name::text AS constraint_name,
        fk.ref_schema::text AS rts,
        fk.ref_table::text AS rtn,
        fk.ref_column::text AS rcn
    FROM information_schema.columns c
    JOIN information_schema.tables t
        ON t.table_schema = c.table_schema
        AND t.table_name = c.table_name
        AND t.table_type = 'BASE TABLE'
    LEFT JOIN (
        SELECT kcu.table_schema, kcu.table_name, kcu.column_name,
               kcu.constraint_name, kcu.ordinal_position
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON kcu.constraint_schema = tc.constraint_schema
            AND kcu.constraint_name = tc.constraint_name
        WHERE tc.constraint_type = 'PRIMARY KEY'
    ) pk
        ON pk.table_schema = c.table_schema
        AND pk.table_name = c.table_name
        AND pk.column_name = c.column_name
    LEFT JOIN (
        SELECT kcu.table_schema, kcu.table_name, kcu.column_name,
               MIN(kcu.constraint_name) AS constraint_name
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON kcu.constraint_schema = tc.constraint_schema
            AND kcu.constraint_name = tc.constraint_name
        WHERE tc.constraint_type = 'UNIQUE'
            AND (
                SELECT count(*)
                FROM information_schema.key_column_usage k2
                WHERE k2.constraint_schema = kcu.constraint_schema
                    AND k2.constraint_name = kcu.constraint_name
            ) = 1
        GROUP BY kcu.table_schema, kcu.table_name, kcu.column_name
    ) uq
        ON uq.table_schema = c.table_schema
        AND uq.table_name = c.table_name
        AND uq.column_name = c.column_name
    LEFT JOIN (
        SELECT kcu.table_schema, kcu.table_name, kcu.column_name, kcu.constraint_name,
               ccu.table_schema AS ref_schema, ccu.table_name AS ref_table,
               ccu.column_name AS ref_column
        FROM information_schema.table_constraints tc
        JOIN information_schema.key_column_usage kcu
            ON kcu.constraint_schema = tc.constraint_schema
            AND kcu.constraint_name = tc.constraint_name
        JOIN information_schema.constraint_column_usage ccu
            ON ccu.constraint_schema = tc.constraint_schema
            AND ccu.constraint_name = tc.constraint_name
        WHERE tc.constraint_type = 'FOREIGN KEY'
    ) fk
        ON fk.table_schema = c.table_schema
        AND fk.table_name = c.table_name
        AND fk.column_name = c.column_name
    WHERE c.table_schema = $1
"#;

/// PostgreSQL connection pool.
pub struct PostgresConnection {
    pool: Pool,
    schema: String,
}

impl PostgresConnection {
    /// Build the pool (with TLS unless `ssl_mode` is disable) and test it.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        let mut pg_config = PgConfig::new();
        pg_config.host(&config.host);
        pg_config.port(config.effective_port());
        pg_config.dbname(&config.database);
        pg_config.user(&config.user);
        pg_config.password(&config.password);

        pg_config.keepalives(true);
        pg_config.keepalives_idle(Duration::from_secs(30));
        pg_config.connect_timeout(POOL_CONNECTION_TIMEOUT);

        let mgr_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let max_size = config.max_connections as usize;

        let pool = match TlsBuilder::parse(&config.ssl_mode)?.build()? {
            None => {
                warn!("PostgreSQL TLS is disabled. Credentials will be transmitted in plaintext.");
                let mgr = Manager::from_config(pg_config, tokio_postgres::NoTls, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_size)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?
            }
            Some(tls_connector) => {
                let mgr = Manager::from_config(pg_config, tls_connector, mgr_config);
                Pool::builder(mgr)
                    .max_size(max_size)
                    .build()
                    .map_err(|e| MigrateError::pool(e, "creating PostgreSQL pool"))?
            }
        };

        let client = pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL connection"))?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| MigrateError::pool(e, "testing PostgreSQL connection"))?;

        info!(
            "Connected to PostgreSQL: {}:{}/{}",
            config.host,
            config.effective_port(),
            config.database
        );

        Ok(Self {
            pool,
            schema: config.effective_schema(),
        })
    }

    async fn get_client(&self) -> Result<Object> {
        self.pool
            .get()
            .await
            .map_err(|e| MigrateError::pool(e, "getting PostgreSQL connection"))
    }

    async fn introspect(&self, table: Option<&str>) -> Result<Vec<RawRow>> {
        let mut sql = INTROSPECTION_QUERY.to_string();
        if table.is_some() {
            sql.push_str("    AND c.table_name = $2\n");
        }
        sql.push_str("    ORDER BY c.table_name, c.ordinal_position");

        let client = self.get_client().await?;
        let rows = match table {
            Some(name) => client.query(&sql, &[&self.schema, &name]).await,
            None => client.query(&sql, &[&self.schema]).await,
        }
        .map_err(|e| MigrateError::introspection(e, 0))?;

        Ok(rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, col)| {
                        let value = row
                            .try_get::<_, Option<String>>(i)
                            .ok()
                            .flatten()
                            .map_or(Value::Null, Value::String);
                        (col.name().to_string(), value)
                    })
                    .collect()
            })
            .collect())
    }
}

#[async_trait]
impl StatementExecutor for PostgresConnection {
    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn execute(&self, sql: &str) -> std::result::Result<u64, DriverError> {
        let client = self.get_client().await?;
        client.batch_execute(sql).await?;
        Ok(0)
    }

    /// Runs over the simple query protocol, so every cell arrives as text.
    async fn query(&self, sql: &str) -> std::result::Result<Vec<RawRow>, DriverError> {
        let client = self.get_client().await?;
        let messages = client.simple_query(sql).await?;
        Ok(messages
            .iter()
            .filter_map(|message| match message {
                SimpleQueryMessage::Row(row) => Some(
                    row.columns()
                        .iter()
                        .enumerate()
                        .map(|(i, col)| {
                            let value = row
                                .get(i)
                                .map_or(Value::Null, |s| Value::String(s.to_string()));
                            (col.name().to_string(), value)
                        })
                        .collect(),
                ),
                _ => None,
            })
            .collect())
    }
}

#[async_trait]
impl SchemaIntrospector for PostgresConnection {
    fn db_type(&self) -> &str {
        "postgres"
    }

    async fn fetch_rows(&self) -> Result<Vec<RawRow>> {
        self.introspect(None).await
    }

    async fn fetch_table_rows(&self, table: &str) -> Result<Vec<RawRow>> {
        self.introspect(Some(table)).await
    }
}
