//! Database driver implementations.
//!
//! Each driver provides a [`Dialect`] (DDL grammar) and a connection type
//! implementing [`StatementExecutor`] and [`SchemaIntrospector`]:
//!
//! - [`mysql`]: MySQL/MariaDB via sqlx
//! - [`mssql`]: Microsoft SQL Server via Tiberius and bb8
//! - [`postgres`]: PostgreSQL via tokio-postgres and deadpool
//! - [`common`]: shared TLS configuration
//!
//! # Static dispatch
//!
//! [`DialectImpl`] and [`ConnectionImpl`] are enums over the drivers. The
//! compiler takes `&dyn Dialect`, but callers that pick a dialect from
//! configuration hold the enum and avoid boxing.

pub mod common;
pub mod mssql;
pub mod mysql;
pub mod postgres;

pub use common::{SslMode, TlsBuilder};
pub use mssql::{MssqlConnection, MssqlDialect};
pub use mysql::{MysqlConnection, MysqlDialect};
pub use postgres::{PostgresConnection, PostgresDialect};

use async_trait::async_trait;

use crate::compiler::DdlOp;
use crate::config::ConnectionConfig;
use crate::core::schema::{ColumnSpec, TableRef, TableSpec};
use crate::core::traits::{Dialect, SchemaIntrospector, StatementExecutor};
use crate::dialect::{CanonicalCategory, IntegerBounds};
use crate::error::{DriverError, MigrateError, Result};
use crate::schema_cache::RawRow;

/// Enum-based static dispatch for dialects.
#[derive(Debug, Clone)]
pub enum DialectImpl {
    Mysql(MysqlDialect),
    Mssql(MssqlDialect),
    Postgres(PostgresDialect),
}

macro_rules! dispatch {
    ($self:ident, $d:ident => $call:expr) => {
        match $self {
            DialectImpl::Mysql($d) => $call,
            DialectImpl::Mssql($d) => $call,
            DialectImpl::Postgres($d) => $call,
        }
    };
}

impl Dialect for DialectImpl {
    fn name(&self) -> &str {
        dispatch!(self, d => d.name())
    }

    fn quote_ident(&self, name: &str) -> Result<String> {
        dispatch!(self, d => d.quote_ident(name))
    }

    fn qualify_table(&self, table: &TableRef) -> Result<String> {
        dispatch!(self, d => d.qualify_table(table))
    }

    fn quote_string(&self, value: &str, column: &ColumnSpec) -> String {
        dispatch!(self, d => d.quote_string(value, column))
    }

    fn fallback_literal(&self, value: &str) -> String {
        dispatch!(self, d => d.fallback_literal(value))
    }

    fn supports_category(&self, category: CanonicalCategory) -> bool {
        dispatch!(self, d => d.supports_category(category))
    }

    fn is_length_eligible(&self, column: &ColumnSpec) -> bool {
        dispatch!(self, d => d.is_length_eligible(column))
    }

    fn identity_clause(&self) -> &str {
        dispatch!(self, d => d.identity_clause())
    }

    fn integer_bounds(&self, native_type: &str) -> Option<IntegerBounds> {
        dispatch!(self, d => d.integer_bounds(native_type))
    }

    fn render(&self, table: &TableRef, op: &DdlOp) -> Result<String> {
        dispatch!(self, d => d.render(table, op))
    }

    fn max_length_keyword(&self) -> Option<&str> {
        dispatch!(self, d => d.max_length_keyword())
    }

    fn supports_unsigned(&self) -> bool {
        dispatch!(self, d => d.supports_unsigned())
    }

    fn default_constraint_name(&self, table: &str, column: &str) -> Option<String> {
        dispatch!(self, d => d.default_constraint_name(table, column))
    }

    fn unique_constraint_name(&self, table: &str, column: &str) -> String {
        dispatch!(self, d => d.unique_constraint_name(table, column))
    }

    fn primary_key_name(&self, table: &str) -> Option<String> {
        dispatch!(self, d => d.primary_key_name(table))
    }

    fn drops_constraints_before_column(&self) -> bool {
        dispatch!(self, d => d.drops_constraints_before_column())
    }

    fn default_requires_drop_before_replace(&self) -> bool {
        dispatch!(self, d => d.default_requires_drop_before_replace())
    }

    fn replaces_primary_key_in_one_statement(&self) -> bool {
        dispatch!(self, d => d.replaces_primary_key_in_one_statement())
    }

    fn supports_identity_change(&self) -> bool {
        dispatch!(self, d => d.supports_identity_change())
    }

    fn validate_table(&self, table: &TableSpec) -> Result<()> {
        dispatch!(self, d => d.validate_table(table))
    }

    fn default_clause(&self, table: &TableRef, column: &ColumnSpec) -> Result<Option<String>> {
        dispatch!(self, d => d.default_clause(table, column))
    }
}

impl DialectImpl {
    /// Create a dialect implementation from a database type string.
    ///
    /// # Errors
    ///
    /// Returns an error if the database type is not recognized.
    pub fn from_db_type(db_type: &str) -> Result<Self> {
        match db_type.to_lowercase().as_str() {
            "mysql" | "mariadb" => Ok(DialectImpl::Mysql(MysqlDialect::new())),
            "mssql" | "sqlserver" => Ok(DialectImpl::Mssql(MssqlDialect::new())),
            "postgres" | "postgresql" | "pg" => Ok(DialectImpl::Postgres(PostgresDialect::new())),
            other => Err(MigrateError::Config(format!(
                "Unknown database type: '{}'. Supported types: mysql, mssql, postgres",
                other
            ))),
        }
    }
}

/// Live connection for any supported engine.
pub enum ConnectionImpl {
    Mysql(MysqlConnection),
    Mssql(MssqlConnection),
    Postgres(PostgresConnection),
}

impl ConnectionImpl {
    /// Connect using the configured engine type.
    pub async fn connect(config: &ConnectionConfig) -> Result<Self> {
        match DialectImpl::from_db_type(&config.r#type)? {
            DialectImpl::Mysql(_) => Ok(ConnectionImpl::Mysql(MysqlConnection::connect(config).await?)),
            DialectImpl::Mssql(_) => Ok(ConnectionImpl::Mssql(MssqlConnection::connect(config).await?)),
            DialectImpl::Postgres(_) => Ok(ConnectionImpl::Postgres(
                PostgresConnection::connect(config).await?,
            )),
        }
    }

    /// Dialect matching this connection.
    pub fn dialect(&self) -> DialectImpl {
        match self {
            ConnectionImpl::Mysql(_) => DialectImpl::Mysql(MysqlDialect::new()),
            ConnectionImpl::Mssql(_) => DialectImpl::Mssql(MssqlDialect::new()),
            ConnectionImpl::Postgres(_) => DialectImpl::Postgres(PostgresDialect::new()),
        }
    }
}

#[async_trait]
impl StatementExecutor for ConnectionImpl {
    fn db_type(&self) -> &str {
        match self {
            ConnectionImpl::Mysql(c) => StatementExecutor::db_type(c),
            ConnectionImpl::Mssql(c) => StatementExecutor::db_type(c),
            ConnectionImpl::Postgres(c) => StatementExecutor::db_type(c),
        }
    }

    async fn execute(&self, sql: &str) -> std::result::Result<u64, DriverError> {
        match self {
            ConnectionImpl::Mysql(c) => c.execute(sql).await,
            ConnectionImpl::Mssql(c) => c.execute(sql).await,
            ConnectionImpl::Postgres(c) => c.execute(sql).await,
        }
    }

    async fn query(&self, sql: &str) -> std::result::Result<Vec<RawRow>, DriverError> {
        match self {
            ConnectionImpl::Mysql(c) => c.query(sql).await,
            ConnectionImpl::Mssql(c) => c.query(sql).await,
            ConnectionImpl::Postgres(c) => c.query(sql).await,
        }
    }
}

#[async_trait]
impl SchemaIntrospector for ConnectionImpl {
    fn db_type(&self) -> &str {
        match self {
            ConnectionImpl::Mysql(c) => SchemaIntrospector::db_type(c),
            ConnectionImpl::Mssql(c) => SchemaIntrospector::db_type(c),
            ConnectionImpl::Postgres(c) => SchemaIntrospector::db_type(c),
        }
    }

    async fn fetch_rows(&self) -> Result<Vec<RawRow>> {
        match self {
            ConnectionImpl::Mysql(c) => c.fetch_rows().await,
            ConnectionImpl::Mssql(c) => c.fetch_rows().await,
            ConnectionImpl::Postgres(c) => c.fetch_rows().await,
        }
    }

    async fn fetch_table_rows(&self, table: &str) -> Result<Vec<RawRow>> {
        match self {
            ConnectionImpl::Mysql(c) => c.fetch_table_rows(table).await,
            ConnectionImpl::Mssql(c) => c.fetch_table_rows(table).await,
            ConnectionImpl::Postgres(c) => c.fetch_table_rows(table).await,
        }
    }
}
