//! PostgreSQL driver.
//!
//! - [`PostgresDialect`]: DDL syntax strategy
//! - [`PostgresConnection`]: tokio-postgres clients pooled with deadpool

mod connection;
mod dialect;

pub use connection::PostgresConnection;
pub use dialect::PostgresDialect;
