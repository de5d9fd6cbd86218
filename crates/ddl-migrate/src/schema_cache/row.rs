//! Introspection row decoding.
//!
//! Drivers return loosely-typed rows: key case varies by driver, booleans
//! arrive as `true`, `1` or `"YES"`, and numbers sometimes arrive as strings.
//! Everything is normalized here so the cache only sees typed fields.

use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::core::schema::ColumnSpec;
use crate::dialect::{base_type_name, classify, CanonicalCategory};

/// One raw introspection row, keyed by column alias.
pub type RawRow = serde_json::Map<String, Value>;

/// Lower-case every key of a raw row.
pub fn lowercase_keys(row: RawRow) -> RawRow {
    row.into_iter()
        .map(|(k, v)| (k.to_lowercase(), v))
        .collect()
}

/// Typed view of one (table, column) row.
///
/// Field names follow INFORMATION_SCHEMA; the aliases are the short names
/// used by compact introspection queries.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntrospectionRow {
    #[serde(alias = "tn")]
    pub table_name: String,

    #[serde(default, alias = "ts", deserialize_with = "lenient_string")]
    pub table_schema: Option<String>,

    #[serde(alias = "cn")]
    pub column_name: String,

    #[serde(default, alias = "op", deserialize_with = "lenient_i64")]
    pub ordinal_position: Option<i64>,

    #[serde(default, alias = "dt", deserialize_with = "lenient_string")]
    pub data_type: Option<String>,

    #[serde(default, alias = "ct", deserialize_with = "lenient_string")]
    pub column_type: Option<String>,

    #[serde(default, alias = "nrqd", deserialize_with = "lenient_bool")]
    pub is_nullable: Option<bool>,

    /// PRI, UNI or MUL.
    #[serde(default, alias = "ck", deserialize_with = "lenient_string")]
    pub column_key: Option<String>,

    #[serde(default, alias = "ext", deserialize_with = "lenient_string")]
    pub extra: Option<String>,

    #[serde(default, alias = "cdf", deserialize_with = "lenient_string")]
    pub column_default: Option<String>,

    #[serde(default, alias = "clen", deserialize_with = "lenient_i64")]
    pub character_maximum_length: Option<i64>,

    #[serde(default, alias = "np", deserialize_with = "lenient_i64")]
    pub numeric_precision: Option<i64>,

    #[serde(default, alias = "ns", deserialize_with = "lenient_i64")]
    pub numeric_scale: Option<i64>,

    #[serde(default, alias = "rtn", deserialize_with = "lenient_string")]
    pub referenced_table_name: Option<String>,

    #[serde(default, alias = "rts", deserialize_with = "lenient_string")]
    pub referenced_table_schema: Option<String>,

    #[serde(default, alias = "rcn", deserialize_with = "lenient_string")]
    pub referenced_column_name: Option<String>,

    /// Foreign-key constraint name.
    #[serde(default, deserialize_with = "lenient_string")]
    pub constraint_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub default_constraint_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub pk_constraint_name: Option<String>,

    /// Single-column unique constraint (unique index on MySQL).
    #[serde(default, alias = "uqn", deserialize_with = "lenient_string")]
    pub unique_constraint_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_i64")]
    pub pk_ordinal: Option<i64>,

    #[serde(default, deserialize_with = "lenient_string")]
    pub index_name: Option<String>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub non_unique: Option<bool>,

    #[serde(default, deserialize_with = "lenient_bool")]
    pub is_identity: Option<bool>,
}

impl IntrospectionRow {
    pub fn is_primary(&self) -> bool {
        self.pk_ordinal.is_some()
            || self
                .column_key
                .as_deref()
                .is_some_and(|k| k.eq_ignore_ascii_case("PRI"))
    }

    pub fn is_unique(&self) -> bool {
        self.column_key
            .as_deref()
            .is_some_and(|k| k.eq_ignore_ascii_case("UNI"))
    }

    pub fn is_auto_increment(&self) -> bool {
        self.is_identity.unwrap_or(false)
            || self
                .extra
                .as_deref()
                .is_some_and(|e| e.to_lowercase().contains("auto_increment"))
    }

    /// Native type to declare: the full column type for enum/set (the value
    /// list is part of the type), the bare data type otherwise.
    pub fn native_type(&self) -> String {
        let data_type = self.data_type.as_deref().unwrap_or_default();
        let column_type = self.column_type.as_deref().unwrap_or_default();
        if data_type.is_empty() {
            return base_type_name(column_type);
        }
        if classify(data_type) == CanonicalCategory::Enum && !column_type.is_empty() {
            return column_type.to_string();
        }
        data_type.to_string()
    }

    /// Column shape described by this row, without key membership.
    pub fn to_column(&self) -> ColumnSpec {
        let native = self.native_type();
        let base = base_type_name(&native);
        let category = classify(&native);

        let mut col = ColumnSpec::new(self.column_name.clone(), native);

        // Lengths only matter where a suffix is declared.
        if matches!(
            category,
            CanonicalCategory::String | CanonicalCategory::Bit | CanonicalCategory::Blob
        ) {
            col.length = self.character_maximum_length.filter(|n| *n != 0).map(|n| {
                if n > i64::from(i32::MAX) {
                    -1
                } else {
                    n
                }
            });
        }
        if base == "decimal" || base == "numeric" {
            col.precision = self.numeric_precision.and_then(|p| u32::try_from(p).ok());
            col.scale = self.numeric_scale.and_then(|s| u32::try_from(s).ok());
        }

        col.nullable = self.is_nullable.unwrap_or(true);
        col.auto_increment = self.is_auto_increment();
        col.unsigned = self
            .column_type
            .as_deref()
            .is_some_and(|t| t.to_lowercase().contains("unsigned"));
        col.default_expression = self.column_default.as_deref().and_then(normalize_default);
        col.default_constraint = self.default_constraint_name.clone();
        if self.is_unique() {
            col.unique_constraint = self.unique_constraint_name.clone();
        }
        col
    }
}

/// Normalize an introspected default to the raw form callers write.
///
/// - redundant outer parentheses are removed: `((0))` becomes `0`
/// - a single quoted literal is unquoted: `N'it''s'` becomes `it's`
/// - a PostgreSQL cast on a literal is dropped: `'a'::character varying`
/// - `NULL` means no default
pub fn normalize_default(raw: &str) -> Option<String> {
    let mut s = raw.trim();
    while s.len() >= 2 && s.starts_with('(') && s.ends_with(')') && wrapped(s) {
        s = s[1..s.len() - 1].trim();
    }
    if s.is_empty() || s.eq_ignore_ascii_case("null") {
        return None;
    }

    let literal = match s.find("::") {
        Some(pos) if s[..pos].ends_with('\'') => &s[..pos],
        _ => s,
    };
    let literal = literal
        .strip_prefix('N')
        .filter(|rest| rest.starts_with('\''))
        .unwrap_or(literal);

    if literal.len() >= 2 && literal.starts_with('\'') && literal.ends_with('\'') {
        let inner = &literal[1..literal.len() - 1];
        if !inner.replace("''", "").contains('\'') {
            return Some(inner.replace("''", "'"));
        }
    }
    Some(s.to_string())
}

/// The first character's parenthesis closes at the last character.
fn wrapped(s: &str) -> bool {
    let mut depth = 0i32;
    for (i, c) in s.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth == 0 && i != s.len() - 1 {
                    return false;
                }
            }
            _ => {}
        }
    }
    depth == 0
}

fn lenient_bool<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<bool>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.and_then(|v| match v {
        Value::Bool(b) => Some(b),
        Value::Number(n) => n.as_i64().map(|i| i != 0),
        Value::String(s) => match s.trim().to_uppercase().as_str() {
            "YES" | "Y" | "TRUE" | "1" => Some(true),
            "NO" | "N" | "FALSE" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }))
}

fn lenient_i64<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.and_then(|v| match v {
        Value::Number(n) => n.as_i64().or_else(|| n.as_u64().map(|u| u.min(i64::MAX as u64) as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }))
}

fn lenient_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    let value = Option::<Value>::deserialize(d)?;
    Ok(value.and_then(|v| match v {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn decode(value: Value) -> IntrospectionRow {
        let Value::Object(map) = value else {
            panic!("not an object")
        };
        serde_json::from_value(Value::Object(lowercase_keys(map))).unwrap()
    }

    #[test]
    fn test_short_aliases_and_mixed_case_keys() {
        let row = decode(json!({
            "TN": "users", "CN": "age", "DT": "int", "CT": "int(11) unsigned",
            "nrqd": "YES", "ck": "", "cdf": 0, "extra_field": "ignored"
        }));
        assert_eq!(row.table_name, "users");
        assert_eq!(row.column_name, "age");
        assert_eq!(row.is_nullable, Some(true));
        assert_eq!(row.column_default.as_deref(), Some("0"));

        let col = row.to_column();
        assert_eq!(col.native_type, "int");
        assert!(col.unsigned);
        assert_eq!(col.default_expression.as_deref(), Some("0"));
    }

    #[test]
    fn test_descriptive_names_and_numeric_strings() {
        let row = decode(json!({
            "table_name": "t", "column_name": "price", "data_type": "decimal",
            "numeric_precision": "10", "numeric_scale": 2, "is_nullable": 0
        }));
        let col = row.to_column();
        assert_eq!(col.precision, Some(10));
        assert_eq!(col.scale, Some(2));
        assert!(!col.nullable);
    }

    #[test]
    fn test_integer_precision_is_not_recorded() {
        let row = decode(json!({
            "tn": "t", "cn": "n", "dt": "int", "np": 10, "ns": 0
        }));
        let col = row.to_column();
        assert_eq!(col.precision, None);
        assert_eq!(col.length, None);
    }

    #[test]
    fn test_enum_keeps_value_list() {
        let row = decode(json!({
            "tn": "t", "cn": "mood", "dt": "enum", "ct": "enum('a','b')"
        }));
        assert_eq!(row.native_type(), "enum('a','b')");
    }

    #[test]
    fn test_max_length_becomes_minus_one() {
        let row = decode(json!({
            "tn": "t", "cn": "body", "dt": "nvarchar", "clen": -1
        }));
        assert_eq!(row.to_column().length, Some(-1));
        let row = decode(json!({
            "tn": "t", "cn": "blob", "dt": "varbinary", "clen": 4294967295u64
        }));
        assert_eq!(row.to_column().length, Some(-1));
    }

    #[test]
    fn test_key_markers() {
        let row = decode(json!({"tn": "t", "cn": "id", "dt": "int", "ck": "PRI", "ext": "auto_increment"}));
        assert!(row.is_primary());
        assert!(row.is_auto_increment());
        let row = decode(json!({"tn": "t", "cn": "id", "dt": "int", "is_identity": 1, "pk_ordinal": 1}));
        assert!(row.is_primary());
        assert!(row.is_auto_increment());
        let row = decode(json!({"tn": "t", "cn": "code", "dt": "int", "ck": "UNI"}));
        assert!(row.is_unique());
    }

    #[test]
    fn test_unique_constraint_name_kept_on_unique_column() {
        let row = decode(json!({
            "tn": "users", "cn": "email", "dt": "varchar", "ck": "UNI",
            "unique_constraint_name": "UQ__users__AB6E6164"
        }));
        assert_eq!(
            row.to_column().unique_constraint.as_deref(),
            Some("UQ__users__AB6E6164")
        );

        let row = decode(json!({"tn": "t", "cn": "a", "dt": "int", "uqn": "ux_a"}));
        assert_eq!(row.to_column().unique_constraint, None);
    }

    #[test]
    fn test_normalize_default() {
        assert_eq!(normalize_default("((0))").as_deref(), Some("0"));
        assert_eq!(normalize_default("(getdate())").as_deref(), Some("getdate()"));
        assert_eq!(normalize_default("(N'it''s')").as_deref(), Some("it's"));
        assert_eq!(normalize_default("'hello'").as_deref(), Some("hello"));
        assert_eq!(
            normalize_default("'a'::character varying").as_deref(),
            Some("a")
        );
        assert_eq!(normalize_default("(1)+(2)").as_deref(), Some("(1)+(2)"));
        assert_eq!(normalize_default("'a' + 'b'").as_deref(), Some("'a' + 'b'"));
        assert_eq!(normalize_default("NULL"), None);
        assert_eq!(normalize_default("  "), None);
        assert_eq!(normalize_default("CURRENT_TIMESTAMP").as_deref(), Some("CURRENT_TIMESTAMP"));
    }
}
