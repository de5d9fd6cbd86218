//! Microsoft SQL Server driver.
//!
//! - [`MssqlDialect`]: DDL syntax strategy
//! - [`MssqlConnection`]: Tiberius clients pooled with bb8

mod connection;
mod dialect;

pub use connection::{MssqlConnection, TiberiusConnectionManager};
pub use dialect::MssqlDialect;
