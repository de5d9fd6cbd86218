//! Error types for the migration library.

use thiserror::Error;

use crate::compiler::Statement;
use crate::dialect::CanonicalCategory;

/// Boxed native driver error carried by execution failures.
pub type DriverError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for compilation, introspection and execution.
#[derive(Error, Debug)]
pub enum MigrateError {
    /// Configuration error (invalid YAML, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Identifier rejected by validation before quoting
    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    /// The bulk introspection query failed; the cache holds what was read so far
    #[error("Introspection failed after {tables_loaded} table(s): {message}")]
    Introspection {
        message: String,
        tables_loaded: usize,
    },

    /// A canonical category has no mapping in the active dialect
    #[error("Unmapped type: {category} has no {dialect} mapping (column {table}.{column})")]
    UnmappedType {
        dialect: String,
        table: String,
        column: String,
        category: CanonicalCategory,
    },

    /// The requested table shape is malformed
    #[error("Invalid table spec for {table}: {message}")]
    InvalidSpec { table: String, message: String },

    /// The dialect has no primitive for the requested change
    #[error("{dialect} cannot {message} (column {table}.{column})")]
    Unsupported {
        dialect: String,
        table: String,
        column: String,
        message: String,
    },

    /// A DDL statement was rejected by the database
    #[error("{dialect} rejected statement on {table} after {elapsed_ms}ms: {statement}")]
    ConstraintConflict {
        dialect: String,
        table: String,
        statement: String,
        elapsed_ms: u128,
        #[source]
        source: DriverError,
    },

    /// An up-sequence failed part way; the caller owns compensation
    #[error(
        "Partial migration of {table}: {applied} of {total} statement(s) applied before failure{}",
        render_down(.down_statements)
    )]
    PartialMigration {
        table: String,
        last_successful: usize,
        applied: usize,
        total: usize,
        down_statements: Vec<Statement>,
        #[source]
        source: Box<MigrateError>,
    },

    /// Migration journal read/write failure
    #[error("Journal error: {0}")]
    Journal(String),

    /// Connection pool error with context
    #[error("Pool error: {message}\n  Context: {context}")]
    Pool { message: String, context: String },

    /// IO error (file operations)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML serialization/deserialization error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

fn render_down(down: &[Statement]) -> String {
    if down.is_empty() {
        return String::new();
    }
    let mut out = String::from("\n  Down sequence:");
    for stmt in down {
        out.push_str("\n    ");
        out.push_str(&stmt.sql);
        out.push(';');
    }
    out
}

impl MigrateError {
    /// Create a Pool error with context about where it occurred
    pub fn pool(message: impl ToString, context: impl Into<String>) -> Self {
        MigrateError::Pool {
            message: message.to_string(),
            context: context.into(),
        }
    }

    /// Create an InvalidSpec error
    pub fn invalid_spec(table: impl Into<String>, message: impl Into<String>) -> Self {
        MigrateError::InvalidSpec {
            table: table.into(),
            message: message.into(),
        }
    }

    /// Create an Introspection error
    pub fn introspection(message: impl ToString, tables_loaded: usize) -> Self {
        MigrateError::Introspection {
            message: message.to_string(),
            tables_loaded,
        }
    }

    /// Process exit code for the CLI.
    pub fn exit_code(&self) -> u8 {
        match self {
            MigrateError::Config(_) | MigrateError::Yaml(_) => 2,
            MigrateError::InvalidIdentifier(_)
            | MigrateError::InvalidSpec { .. }
            | MigrateError::UnmappedType { .. }
            | MigrateError::Unsupported { .. } => 3,
            MigrateError::Introspection { .. } | MigrateError::Pool { .. } => 4,
            MigrateError::ConstraintConflict { .. } => 5,
            MigrateError::PartialMigration { .. } => 6,
            MigrateError::Journal(_) | MigrateError::Io(_) | MigrateError::Json(_) => 1,
        }
    }

    /// Format error with full details including error chain
    pub fn format_detailed(&self) -> String {
        let mut output = format!("Error: {}\n", self);

        let mut source = std::error::Error::source(self);
        let mut depth = 1;
        while let Some(err) = source {
            output.push_str(&format!("\nCaused by:\n  {}: {}", depth, err));
            source = err.source();
            depth += 1;
        }

        output
    }
}

/// Result type alias for migration operations.
pub type Result<T> = std::result::Result<T, MigrateError>;
