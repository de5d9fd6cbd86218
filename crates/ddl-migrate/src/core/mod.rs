//! Core abstractions shared by the compiler, the cache and the drivers.
//!
//! - [`schema`]: table and column shapes
//! - [`identifier`]: the single identifier and literal escaping routine
//! - [`traits`]: the [`Dialect`] strategy and the execution/introspection seams
//!
//! # Design Patterns
//!
//! - **Strategy**: `Dialect` implementations are injected into one compiler
//! - **Template Method**: provided `Dialect` methods hold the shared rules

pub mod identifier;
pub mod schema;
pub mod traits;

pub use schema::{ColumnSpec, ForeignKey, Index, TableRef, TableSpec};
pub use traits::{Dialect, SchemaIntrospector, StatementExecutor};
