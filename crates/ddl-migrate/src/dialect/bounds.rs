//! Integer bounds and row-count estimation.
//!
//! These tables are not used by the compiler. Synthetic-data generators use
//! them to stay within a column's range, and [`estimate_max_rows`] uses them
//! to cap how many distinct rows a table's keys can hold.

use serde::{Deserialize, Serialize};

use crate::core::schema::{ColumnSpec, TableSpec};
use crate::core::traits::Dialect;
use crate::dialect::CanonicalCategory;

/// Largest representable value of an integer type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegerBounds {
    pub signed_max: u64,
    pub unsigned_max: u64,
}

impl IntegerBounds {
    pub const fn new(signed_max: u64, unsigned_max: u64) -> Self {
        Self {
            signed_max,
            unsigned_max,
        }
    }

    pub fn max_for(&self, unsigned: bool) -> u64 {
        if unsigned {
            self.unsigned_max
        } else {
            self.signed_max
        }
    }
}

pub const TINYINT: IntegerBounds = IntegerBounds::new(i8::MAX as u64, u8::MAX as u64);
pub const SMALLINT: IntegerBounds = IntegerBounds::new(i16::MAX as u64, u16::MAX as u64);
pub const MEDIUMINT: IntegerBounds = IntegerBounds::new(8_388_607, 16_777_215);
pub const INT: IntegerBounds = IntegerBounds::new(i32::MAX as u64, u32::MAX as u64);
pub const BIGINT: IntegerBounds = IntegerBounds::new(i64::MAX as u64, u64::MAX);

/// Row cap when no key narrows it further.
pub const DEFAULT_ROW_CAP: u64 = 10_000;

/// Rows a string key shorter than 3 characters can reasonably hold.
const SHORT_STRING_KEY_ROWS: u64 = 500;

/// Rows a unique string column shorter than 2 characters can hold.
const TINY_UNIQUE_STRING_ROWS: u64 = 25;

/// Maximum value a column may hold, if it is an integer.
pub fn max_value(dialect: &dyn Dialect, column: &ColumnSpec) -> Option<u64> {
    dialect
        .integer_bounds(&column.native_type)
        .map(|b| b.max_for(column.unsigned))
}

fn key_limit(dialect: &dyn Dialect, column: &ColumnSpec, string_len: i64, string_rows: u64) -> Option<u64> {
    match column.category() {
        CanonicalCategory::Integer => max_value(dialect, column),
        CanonicalCategory::String => match column.length {
            Some(n) if n > 0 && n < string_len => Some(string_rows),
            _ => None,
        },
        _ => None,
    }
}

/// Upper bound on distinct rows the table's keys allow, capped at `cap`.
///
/// Considers the primary-key columns (integer range, or very short string
/// keys) and unique columns (integer range, or single-character strings).
pub fn estimate_max_rows(dialect: &dyn Dialect, table: &TableSpec, cap: u64) -> u64 {
    let mut limit = cap;

    for col in table.live_columns() {
        let bound = if col.primary_key {
            key_limit(dialect, col, 3, SHORT_STRING_KEY_ROWS)
        } else if col.unique {
            key_limit(dialect, col, 2, TINY_UNIQUE_STRING_ROWS)
        } else {
            None
        };
        if let Some(b) = bound {
            limit = limit.min(b);
        }
    }

    limit
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::DialectImpl;

    fn mysql() -> DialectImpl {
        DialectImpl::from_db_type("mysql").unwrap()
    }

    #[test]
    fn test_bigint_bounds_are_powers_of_two() {
        assert_eq!(BIGINT.signed_max, 9_223_372_036_854_775_807);
        assert_eq!(BIGINT.unsigned_max, 18_446_744_073_709_551_615);
        assert_eq!(INT.max_for(true), 4_294_967_295);
        assert_eq!(TINYINT.max_for(false), 127);
    }

    #[test]
    fn test_max_value_respects_unsigned() {
        let d = mysql();
        let signed = ColumnSpec::new("n", "tinyint");
        let unsigned = ColumnSpec::new("n", "tinyint").unsigned();
        assert_eq!(max_value(&d, &signed), Some(127));
        assert_eq!(max_value(&d, &unsigned), Some(255));
        assert_eq!(max_value(&d, &ColumnSpec::new("n", "varchar")), None);
    }

    #[test]
    fn test_estimate_uses_smallest_key_range() {
        let d = mysql();
        let table = TableSpec::new(None, "t").with_columns(vec![
            ColumnSpec::new("id", "tinyint").primary(),
            ColumnSpec::new("name", "varchar").with_length(100),
        ]);
        assert_eq!(estimate_max_rows(&d, &table, DEFAULT_ROW_CAP), 127);
    }

    #[test]
    fn test_estimate_short_string_keys() {
        let d = mysql();
        let table = TableSpec::new(None, "t").with_columns(vec![
            ColumnSpec::new("code", "char").with_length(2).primary(),
            ColumnSpec::new("flag", "char").with_length(1).unique(),
        ]);
        assert_eq!(estimate_max_rows(&d, &table, DEFAULT_ROW_CAP), 25);
    }

    #[test]
    fn test_estimate_without_keys_is_cap() {
        let d = mysql();
        let table = TableSpec::new(None, "t")
            .with_columns(vec![ColumnSpec::new("note", "text")]);
        assert_eq!(estimate_max_rows(&d, &table, 1_000), 1_000);
    }
}
