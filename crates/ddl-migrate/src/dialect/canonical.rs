//! Canonical type categories and the native-type classifier.
//!
//! Every dialect-native type string (`"varchar(255)"`, `"int(11) unsigned"`,
//! `"datetime2"`) is bucketed into one [`CanonicalCategory`]. The compiler
//! uses the category to decide default-literal quoting and length
//! eligibility; bounds lookup and synthetic-data tooling use it to reason
//! about columns without knowing the dialect.
//!
//! Classification is a pure function of the type string:
//!
//! 1. Lower-case, drop any `(...)` argument list and the `unsigned`,
//!    `signed` and `zerofill` modifiers.
//! 2. Exact match of the remaining base name against each category list.
//! 3. Ordered substring scan over the same lists; first hit wins.
//! 4. Otherwise [`CanonicalCategory::Other`].
//!
//! The exact pass keeps short tokens from stealing longer names during the
//! scan: `point` contains `int` and `tinytext` contains `text`, but both
//! resolve by exact name first.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Dialect-independent bucket a native type name falls into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalCategory {
    String,
    Integer,
    Float,
    Date,
    Enum,
    Year,
    Bit,
    Boolean,
    Blob,
    Text,
    Geometry,
    Point,
    #[serde(rename = "linestring")]
    LineString,
    Polygon,
    #[serde(rename = "multipoint")]
    MultiPoint,
    #[serde(rename = "multilinestring")]
    MultiLineString,
    #[serde(rename = "multipolygon")]
    MultiPolygon,
    Json,
    Other,
}

impl CanonicalCategory {
    /// Every category, in classification order.
    pub const ALL: [CanonicalCategory; 19] = [
        CanonicalCategory::String,
        CanonicalCategory::Integer,
        CanonicalCategory::Float,
        CanonicalCategory::Date,
        CanonicalCategory::Enum,
        CanonicalCategory::Year,
        CanonicalCategory::Bit,
        CanonicalCategory::Boolean,
        CanonicalCategory::Blob,
        CanonicalCategory::Text,
        CanonicalCategory::Geometry,
        CanonicalCategory::Point,
        CanonicalCategory::LineString,
        CanonicalCategory::Polygon,
        CanonicalCategory::MultiPoint,
        CanonicalCategory::MultiLineString,
        CanonicalCategory::MultiPolygon,
        CanonicalCategory::Json,
        CanonicalCategory::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CanonicalCategory::String => "string",
            CanonicalCategory::Integer => "integer",
            CanonicalCategory::Float => "float",
            CanonicalCategory::Date => "date",
            CanonicalCategory::Enum => "enum",
            CanonicalCategory::Year => "year",
            CanonicalCategory::Bit => "bit",
            CanonicalCategory::Boolean => "boolean",
            CanonicalCategory::Blob => "blob",
            CanonicalCategory::Text => "text",
            CanonicalCategory::Geometry => "geometry",
            CanonicalCategory::Point => "point",
            CanonicalCategory::LineString => "linestring",
            CanonicalCategory::Polygon => "polygon",
            CanonicalCategory::MultiPoint => "multipoint",
            CanonicalCategory::MultiLineString => "multilinestring",
            CanonicalCategory::MultiPolygon => "multipolygon",
            CanonicalCategory::Json => "json",
            CanonicalCategory::Other => "other",
        }
    }

    /// Integer, float and boolean defaults are emitted without quotes.
    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            CanonicalCategory::Integer | CanonicalCategory::Float | CanonicalCategory::Boolean
        )
    }

    /// Character data whose defaults are always quoted.
    pub fn is_character(&self) -> bool {
        matches!(self, CanonicalCategory::String | CanonicalCategory::Text)
    }

    /// Geometry and its specialised shapes.
    pub fn is_spatial(&self) -> bool {
        matches!(
            self,
            CanonicalCategory::Geometry
                | CanonicalCategory::Point
                | CanonicalCategory::LineString
                | CanonicalCategory::Polygon
                | CanonicalCategory::MultiPoint
                | CanonicalCategory::MultiLineString
                | CanonicalCategory::MultiPolygon
        )
    }
}

impl fmt::Display for CanonicalCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const STRING_TYPES: &[&str] = &[
    "varchar",
    "char",
    "nvarchar",
    "nchar",
    "character varying",
    "character",
    "varchar2",
    "nvarchar2",
    "uniqueidentifier",
    "uuid",
    "citext",
];

const INTEGER_TYPES: &[&str] = &[
    "tinyint",
    "smallint",
    "mediumint",
    "int",
    "integer",
    "bigint",
    "int2",
    "int4",
    "int8",
    "serial",
    "smallserial",
    "bigserial",
];

const FLOAT_TYPES: &[&str] = &[
    "float",
    "double",
    "double precision",
    "decimal",
    "numeric",
    "real",
    "float4",
    "float8",
    "money",
    "smallmoney",
];

const DATE_TYPES: &[&str] = &[
    "date",
    "datetime",
    "datetime2",
    "datetimeoffset",
    "smalldatetime",
    "timestamp",
    "timestamptz",
    "timestamp with time zone",
    "timestamp without time zone",
    "time",
    "timetz",
    "interval",
];

const ENUM_TYPES: &[&str] = &["enum", "set"];

const YEAR_TYPES: &[&str] = &["year"];

const BIT_TYPES: &[&str] = &["bit", "bit varying", "varbit"];

const BOOLEAN_TYPES: &[&str] = &["bool", "boolean"];

const BLOB_TYPES: &[&str] = &[
    "blob",
    "tinyblob",
    "mediumblob",
    "longblob",
    "binary",
    "varbinary",
    "image",
    "bytea",
];

const TEXT_TYPES: &[&str] = &[
    "text",
    "tinytext",
    "mediumtext",
    "longtext",
    "ntext",
    "xml",
];

const GEOMETRY_TYPES: &[&str] = &["geometry", "geography", "geometrycollection"];
const POINT_TYPES: &[&str] = &["point"];
const LINESTRING_TYPES: &[&str] = &["linestring"];
const POLYGON_TYPES: &[&str] = &["polygon"];
const MULTIPOINT_TYPES: &[&str] = &["multipoint"];
const MULTILINESTRING_TYPES: &[&str] = &["multilinestring"];
const MULTIPOLYGON_TYPES: &[&str] = &["multipolygon"];

const JSON_TYPES: &[&str] = &["json", "jsonb"];

/// Category name lists in classification order.
const CATEGORY_NAMES: &[(CanonicalCategory, &[&str])] = &[
    (CanonicalCategory::String, STRING_TYPES),
    (CanonicalCategory::Integer, INTEGER_TYPES),
    (CanonicalCategory::Float, FLOAT_TYPES),
    (CanonicalCategory::Date, DATE_TYPES),
    (CanonicalCategory::Enum, ENUM_TYPES),
    (CanonicalCategory::Year, YEAR_TYPES),
    (CanonicalCategory::Bit, BIT_TYPES),
    (CanonicalCategory::Boolean, BOOLEAN_TYPES),
    (CanonicalCategory::Blob, BLOB_TYPES),
    (CanonicalCategory::Text, TEXT_TYPES),
    (CanonicalCategory::Geometry, GEOMETRY_TYPES),
    (CanonicalCategory::Point, POINT_TYPES),
    (CanonicalCategory::LineString, LINESTRING_TYPES),
    (CanonicalCategory::Polygon, POLYGON_TYPES),
    (CanonicalCategory::MultiPoint, MULTIPOINT_TYPES),
    (CanonicalCategory::MultiLineString, MULTILINESTRING_TYPES),
    (CanonicalCategory::MultiPolygon, MULTIPOLYGON_TYPES),
    (CanonicalCategory::Json, JSON_TYPES),
];

/// Reduce a native type string to its lower-cased base name.
///
/// `"INT(11) UNSIGNED ZEROFILL"` becomes `"int"`,
/// `"timestamp(6) with time zone"` becomes `"timestamp with time zone"`.
pub fn base_type_name(native_type: &str) -> String {
    let lower = native_type.trim().to_lowercase();

    let mut without_args = String::with_capacity(lower.len());
    let mut depth = 0usize;
    for c in lower.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ if depth == 0 => without_args.push(c),
            _ => {}
        }
    }

    without_args
        .split_whitespace()
        .filter(|word| !matches!(*word, "unsigned" | "signed" | "zerofill"))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Classify a dialect-native type name into its canonical category.
pub fn classify(native_type: &str) -> CanonicalCategory {
    let base = base_type_name(native_type);
    if base.is_empty() {
        return CanonicalCategory::Other;
    }

    for (category, names) in CATEGORY_NAMES {
        if names.contains(&base.as_str()) {
            return *category;
        }
    }

    // Qualified names such as `interval day to second` take the category
    // of their leading word before any substring match.
    let leading = base.split_whitespace().next().unwrap_or_default();
    for (category, names) in CATEGORY_NAMES {
        if names.contains(&leading) {
            return *category;
        }
    }

    for (category, names) in CATEGORY_NAMES {
        if names.iter().any(|name| base.contains(name)) {
            return *category;
        }
    }

    CanonicalCategory::Other
}
