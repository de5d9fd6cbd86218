//! Dialect-independent type reasoning.
//!
//! - [`canonical`]: native type name to [`CanonicalCategory`]
//! - [`bounds`]: integer ranges and row-count estimation
//!
//! The per-engine [`Dialect`](crate::core::traits::Dialect) implementations
//! live under `drivers/`.

pub mod bounds;
mod canonical;

pub use bounds::{estimate_max_rows, max_value, IntegerBounds, DEFAULT_ROW_CAP};
pub use canonical::{base_type_name, classify, CanonicalCategory};
