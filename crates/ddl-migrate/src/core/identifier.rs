//! Centralized identifier and literal escaping for generated DDL.
//!
//! Every identifier and every literal that ends up inside a compiled statement
//! goes through this module. Statements are executed as raw SQL with no
//! parameter binding, so table names, column names, constraint names and
//! default values supplied by callers are the injection surface.
//!
//! # Security
//!
//! Identifiers cannot be bound as parameters in DDL. To embed them safely we:
//! 1. Validate identifiers for suspicious patterns (null bytes, excessive length)
//! 2. Apply database-specific quoting (brackets, double quotes, backticks)
//! 3. Escape the quote character inside the name
//!
//! Default expressions that a dialect passes through unquoted (numbers,
//! function calls such as `getdate()`) are screened by
//! [`validate_default_expression`] before they are embedded.

use crate::error::{MigrateError, Result};

/// Maximum identifier length (conservative limit across databases).
/// - PostgreSQL: 63 bytes
/// - SQL Server: 128 characters
/// - MySQL: 64 characters
const MAX_IDENTIFIER_LENGTH: usize = 128;

/// Validate an identifier for security issues.
///
/// Rejects:
/// - Empty identifiers
/// - Identifiers containing null bytes (injection vector)
/// - Identifiers exceeding maximum length
pub fn validate_identifier(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(MigrateError::InvalidIdentifier(
            "identifier cannot be empty".to_string(),
        ));
    }

    if name.contains('\0') {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: identifier contains null byte (possible injection attempt): {:?}",
            name
        )));
    }

    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: identifier exceeds maximum length of {} bytes (got {} bytes): {:?}",
            MAX_IDENTIFIER_LENGTH,
            name.len(),
            name
        )));
    }

    Ok(())
}

/// Quote a PostgreSQL identifier.
///
/// ```ignore
/// assert_eq!(quote_pg("users")?, "\"users\"");
/// assert_eq!(quote_pg("table\"name")?, "\"table\"\"name\"");
/// ```
pub fn quote_pg(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("\"{}\"", name.replace('"', "\"\"")))
}

/// Quote a MySQL identifier using backticks.
///
/// ```ignore
/// assert_eq!(quote_mysql("users")?, "`users`");
/// assert_eq!(quote_mysql("table`name")?, "`table``name`");
/// ```
pub fn quote_mysql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("`{}`", name.replace('`', "``")))
}

/// Quote a SQL Server identifier using brackets.
///
/// ```ignore
/// assert_eq!(quote_mssql("users")?, "[users]");
/// assert_eq!(quote_mssql("table]name")?, "[table]]name]");
/// ```
pub fn quote_mssql(name: &str) -> Result<String> {
    validate_identifier(name)?;
    Ok(format!("[{}]", name.replace(']', "]]")))
}

/// Qualify a PostgreSQL table name with schema.
pub fn qualify_pg(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_pg(schema)?, quote_pg(table)?))
}

/// Qualify a MySQL table name with its database.
pub fn qualify_mysql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mysql(schema)?, quote_mysql(table)?))
}

/// Qualify a SQL Server table name with schema.
pub fn qualify_mssql(schema: &str, table: &str) -> Result<String> {
    Ok(format!("{}.{}", quote_mssql(schema)?, quote_mssql(table)?))
}

/// Quote a standard SQL string literal, doubling embedded single quotes.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Quote a SQL Server national (Unicode) string literal: `N'...'`.
pub fn quote_national_literal(value: &str) -> String {
    format!("N{}", quote_literal(value))
}

/// Quote a MySQL string literal.
///
/// MySQL treats backslash as an escape character in the default SQL mode, so
/// backslashes are escaped as well as single quotes.
pub fn quote_mysql_literal(value: &str) -> String {
    format!("'{}'", value.replace('\\', "\\\\").replace('\'', "''"))
}

/// JSON-style double-quoted literal, used by MySQL for defaults whose
/// category has no dedicated quoting rule.
pub fn json_literal(value: &str) -> String {
    serde_json::Value::String(value.to_string()).to_string()
}

/// Screen a default expression that will be embedded without quoting.
///
/// Defaults such as `0`, `CURRENT_TIMESTAMP` or `(getdate())` are legitimate
/// unquoted SQL. Anything that could terminate the statement or smuggle a
/// second one is rejected.
pub fn validate_default_expression(expression: &str) -> Result<()> {
    validate_sql_fragment("default expression", expression)
}

/// Screen a native type name (`varchar`, `decimal(10,2)`, `enum('a','b')`),
/// which is embedded in DDL as written.
pub fn validate_type_name(native_type: &str) -> Result<()> {
    if native_type.contains('\0') {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: type name contains null byte: {:?}",
            native_type
        )));
    }
    validate_sql_fragment("type name", native_type)
}

/// Reject fragments that could end the statement or start another.
///
/// # Rejected Patterns
///
/// - Semicolons (multiple statement injection)
/// - SQL comments (`--`, `/*`, `*/`)
/// - `EXEC`/`EXECUTE` keywords
/// - Unbalanced quotes or parentheses
fn validate_sql_fragment(what: &str, fragment: &str) -> Result<()> {
    let lower = fragment.to_lowercase();

    if fragment.contains(';') {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: {} contains semicolon (possible injection): {:?}",
            what, fragment
        )));
    }

    if fragment.contains("--") || fragment.contains("/*") || fragment.contains("*/") {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: {} contains SQL comment markers (possible injection): {:?}",
            what, fragment
        )));
    }

    if lower.split(|c: char| !c.is_alphanumeric() && c != '_').any(|word| {
        word == "exec" || word == "execute" || word == "xp_cmdshell" || word == "sp_executesql"
    }) {
        return Err(MigrateError::InvalidIdentifier(format!(
            "SECURITY: {} contains EXEC/EXECUTE keyword (possible injection): {:?}",
            what, fragment
        )));
    }

    if fragment.chars().filter(|c| *c == '\'').count() % 2 != 0 {
        return Err(MigrateError::InvalidIdentifier(format!(
            "{} has an unbalanced quote: {:?}",
            what, fragment
        )));
    }

    let mut depth: i32 = 0;
    for c in fragment.chars() {
        match c {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(MigrateError::InvalidIdentifier(format!(
            "{} has unbalanced parentheses: {:?}",
            what, fragment
        )));
    }

    Ok(())
}
