//! Configuration type definitions.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Root configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Live database the migrations run against.
    pub connection: ConnectionConfig,

    /// Where applied migrations are recorded.
    #[serde(default)]
    pub journal: JournalConfig,
}

/// Database connection configuration.
#[derive(Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Database type: mysql, mariadb, mssql, sqlserver, postgres or pg.
    pub r#type: String,

    /// Database host.
    pub host: String,

    /// Database port (default depends on type).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,

    /// Database name.
    pub database: String,

    /// Username.
    pub user: String,

    /// Password.
    #[serde(default)]
    pub password: String,

    /// Schema to introspect and migrate (default: dbo, public, or the
    /// database name for MySQL).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    /// Encrypt SQL Server connections (default: true).
    #[serde(default = "default_true")]
    pub encrypt: bool,

    /// Trust the SQL Server certificate without validation (default: false).
    #[serde(default)]
    pub trust_server_cert: bool,

    /// TLS mode for MySQL and PostgreSQL: disable, require, verify-full
    /// (default: disable).
    #[serde(default = "default_ssl_mode")]
    pub ssl_mode: String,

    /// Pool size (default: 4).
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

impl ConnectionConfig {
    /// Canonical dialect name for the configured type.
    pub fn dialect_name(&self) -> &'static str {
        match self.r#type.to_lowercase().as_str() {
            "mssql" | "sqlserver" => "mssql",
            "postgres" | "postgresql" | "pg" => "postgres",
            _ => "mysql",
        }
    }

    /// Configured port, or the engine's default.
    pub fn effective_port(&self) -> u16 {
        self.port.unwrap_or(match self.dialect_name() {
            "mssql" => 1433,
            "postgres" => 5432,
            _ => 3306,
        })
    }

    /// Configured schema, or the engine's default.
    pub fn effective_schema(&self) -> String {
        match &self.schema {
            Some(schema) => schema.clone(),
            None => match self.dialect_name() {
                "mssql" => "dbo".to_string(),
                "postgres" => "public".to_string(),
                _ => self.database.clone(),
            },
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("type", &self.r#type)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("user", &self.user)
            .field("password", &"[REDACTED]")
            .field("schema", &self.schema)
            .field("encrypt", &self.encrypt)
            .field("trust_server_cert", &self.trust_server_cert)
            .field("ssl_mode", &self.ssl_mode)
            .field("max_connections", &self.max_connections)
            .finish()
    }
}

/// Journal storage backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalBackendKind {
    /// JSON file on disk.
    File,
    /// Table in the migrated database.
    Database,
    /// No journal.
    #[default]
    None,
}

/// Migration journal configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JournalConfig {
    #[serde(default)]
    pub backend: JournalBackendKind,

    /// Journal file (required for the file backend).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Journal table (database backend).
    #[serde(default = "default_journal_table")]
    pub table: String,
}

impl Default for JournalConfig {
    fn default() -> Self {
        Self {
            backend: JournalBackendKind::None,
            path: None,
            table: default_journal_table(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_ssl_mode() -> String {
    "disable".to_string()
}

fn default_max_connections() -> u32 {
    4
}

fn default_journal_table() -> String {
    "_schema_migrations".to_string()
}
