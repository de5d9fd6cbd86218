//! MySQL/MariaDB driver.
//!
//! - [`MysqlDialect`]: DDL syntax strategy
//! - [`MysqlConnection`]: sqlx pool implementing statement execution and
//!   introspection
//!
//! # Supported Versions
//!
//! - MySQL 5.7+, 8.0+
//! - MariaDB 10.2+

mod connection;
mod dialect;

pub use connection::MysqlConnection;
pub use dialect::MysqlDialect;
