//! Identifier validation for composed statements.
//!
//! Table and column names are the only caller text ever spliced into SQL by the
//! typed tools. They must match `[A-Za-z_][A-Za-z0-9_]*` and are emitted double-quoted.
//! Values never go through here; they are always bound parameters.

use crate::error::{DbError, DbResult};

/// Longest identifier accepted.
pub const MAX_IDENTIFIER_LEN: usize = 128;

/// Check that `name` is a plain SQL identifier.
///
/// # Examples
///
/// ```
/// use sqlite_tools_mcp::db::identifier::validate_identifier;
///
/// assert!(validate_identifier("items", "table").is_ok());
/// assert!(validate_identifier("items; DROP TABLE x", "table").is_err());
/// ```
pub fn validate_identifier<'a>(name: &'a str, kind: &str) -> DbResult<&'a str> {
    if name.is_empty() {
        return Err(DbError::invalid_input(format!("{} name must not be empty", kind)));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(DbError::invalid_input(format!(
            "{} name exceeds {} characters",
            kind, MAX_IDENTIFIER_LEN
        )));
    }

    let mut chars = name.chars();
    let first_ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
    if !first_ok || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(DbError::invalid_input(format!(
            "Invalid {} name '{}': only letters, digits and '_' are allowed, and it must not start with a digit",
            kind, name
        )));
    }
    Ok(name)
}

/// Validate and double-quote an identifier for use in SQL text.
pub fn quote_identifier(name: &str, kind: &str) -> DbResult<String> {
    validate_identifier(name, kind).map(|n| format!("\"{}\"", n))
}

/// Validate and quote a list of column names, joined with `, `.
pub fn quote_column_list<S: AsRef<str>>(columns: &[S]) -> DbResult<String> {
    if columns.is_empty() {
        return Err(DbError::invalid_input("At least one column is required"));
    }
    let quoted = columns
        .iter()
        .map(|c| quote_identifier(c.as_ref(), "column"))
        .collect::<DbResult<Vec<_>>>()?;
    Ok(quoted.join(", "))
}
