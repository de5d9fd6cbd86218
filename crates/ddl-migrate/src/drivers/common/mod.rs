//! Utilities shared across database drivers.
//!
//! - [`tls`]: TLS configuration for MySQL and PostgreSQL connections

pub mod tls;

pub use tls::{SslMode, TlsBuilder};
