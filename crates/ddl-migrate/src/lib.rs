//! # ddl-migrate
//!
//! Reversible schema-migration DDL compiler for MySQL, SQL Server and
//! PostgreSQL.
//!
//! Given a table's current shape and a desired shape, the library produces
//! the statements that migrate the table forward and the statements that
//! restore it, rendered for one SQL dialect:
//!
//! - **Schema cache** built from one bulk introspection query
//! - **Change model** classifying each column as added, deleted, renamed or modified
//! - **Pure compiler** producing up and down statement sequences
//! - **Migrator** executing a sequence statement by statement, with a
//!   journal of applied up/down pairs
//!
//! ## Example
//!
//! ```rust,no_run
//! use ddl_migrate::{ColumnSpec, Config, MigrationRequest, Migrator};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = Config::load("config.yaml")?;
//!     let migrator = Migrator::connect(&config).await?;
//!     let request = MigrationRequest::new(
//!         "users",
//!         vec![
//!             ColumnSpec::new("id", "int").primary(),
//!             ColumnSpec::new("age", "int").not_null().with_default("0"),
//!         ],
//!     );
//!     let result = migrator.request_migration(&request).await?;
//!     for statement in &result.down_statements {
//!         println!("{};", statement);
//!     }
//!     Ok(())
//! }
//! ```

pub mod changes;
pub mod compiler;
pub mod config;
pub mod core;
pub mod dialect;
pub mod drivers;
pub mod error;
pub mod journal;
pub mod migrator;
pub mod schema_cache;

// Re-exports for convenient access
pub use changes::{diff, ChangeFlags, ColumnChange};
pub use compiler::{Compiler, DdlOp, MigrationResult, Statement};
pub use config::{Config, ConnectionConfig, JournalConfig};
pub use crate::core::schema::{ColumnSpec, TableRef, TableSpec};
pub use crate::core::traits::{Dialect, SchemaIntrospector, StatementExecutor};
pub use dialect::{classify, CanonicalCategory, IntegerBounds};
pub use drivers::{ConnectionImpl, DialectImpl};
pub use error::{MigrateError, Result};
pub use journal::{JournalBackend, JournalRecord, JournalStatus};
pub use migrator::{MigrationRequest, Migrator};
pub use schema_cache::SchemaCache;
