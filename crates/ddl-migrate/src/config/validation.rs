//! Configuration validation.

use super::{Config, JournalBackendKind};
use crate::error::{MigrateError, Result};

const KNOWN_TYPES: &[&str] = &[
    "mysql",
    "mariadb",
    "mssql",
    "sqlserver",
    "postgres",
    "postgresql",
    "pg",
];

const SSL_MODES: &[&str] = &["disable", "require", "verify-full"];

/// Validate the configuration.
pub fn validate(config: &Config) -> Result<()> {
    let conn = &config.connection;

    if !KNOWN_TYPES.contains(&conn.r#type.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "connection.type must be one of {}, got '{}'",
            KNOWN_TYPES.join(", "),
            conn.r#type
        )));
    }
    if conn.host.is_empty() {
        return Err(MigrateError::Config("connection.host is required".into()));
    }
    if conn.database.is_empty() {
        return Err(MigrateError::Config("connection.database is required".into()));
    }
    if conn.user.is_empty() {
        return Err(MigrateError::Config("connection.user is required".into()));
    }
    if let Some(0) = conn.port {
        return Err(MigrateError::Config(
            "connection.port must be greater than 0".into(),
        ));
    }
    if conn.max_connections == 0 {
        return Err(MigrateError::Config(
            "connection.max_connections must be at least 1".into(),
        ));
    }
    if !SSL_MODES.contains(&conn.ssl_mode.to_lowercase().as_str()) {
        return Err(MigrateError::Config(format!(
            "connection.ssl_mode must be one of {}, got '{}'",
            SSL_MODES.join(", "),
            conn.ssl_mode
        )));
    }

    match config.journal.backend {
        JournalBackendKind::File if config.journal.path.is_none() => {
            return Err(MigrateError::Config(
                "journal.path is required when journal.backend is 'file'".into(),
            ));
        }
        JournalBackendKind::Database if config.journal.table.is_empty() => {
            return Err(MigrateError::Config(
                "journal.table is required when journal.backend is 'database'".into(),
            ));
        }
        _ => {}
    }

    Ok(())
}
