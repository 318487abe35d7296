//! Statement gatekeeper for raw, caller-supplied SQL.
//!
//! This is a syntactic allow-list/deny-list filter, not a parser. A statement is
//! accepted for an operation class when, after trimming and stripping one trailing
//! `;`, its lower-cased text:
//! - is not empty,
//! - starts with one of the class's permitted keywords,
//! - contains none of `attach`, `detach`, `pragma`, `--`, `/*`,
//! - contains no further `;`.
//!
//! The SQLite driver runs every statement of a multi-statement string, so a
//! leftover `;` is always a rejection.
//!
//! Known gaps: matching is plain substring matching. Denied words inside string
//! literals or identifiers (`'-- note'`, `attached_at`) are rejected too, and nothing
//! here understands nested constructs. In particular a leading `with` does not make
//! a statement a query: SQLite accepts `WITH x AS (...) DELETE FROM t` (and INSERT,
//! UPDATE, REPLACE) and this filter accepts it as read-only. `sqlite_run_sql` closes
//! that gap by running on a read-only handle, not by a stricter check here.

use crate::error::{DbError, DbResult};

/// Leading keywords for read-only query tools.
pub const READ_ONLY_KEYWORDS: &[&str] = &["select", "with"];

/// Leading keywords for the DDL tool.
pub const DDL_KEYWORDS: &[&str] = &["create", "drop", "alter", "reindex"];

/// Substrings denied anywhere in the statement, with the rule name reported on rejection.
const DENIED_PATTERNS: &[(&str, &str)] = &[
    ("attach", "attach"),
    ("detach", "detach"),
    ("pragma", "pragma"),
    ("--", "line_comment"),
    ("/*", "block_comment"),
];

/// Trim whitespace and strip a single trailing statement terminator.
///
/// The returned slice is what gets executed; only comparisons are lower-cased.
pub fn normalize(sql: &str) -> &str {
    let trimmed = sql.trim();
    match trimmed.strip_suffix(';') {
        Some(rest) => rest.trim_end(),
        None => trimmed,
    }
}

/// Validate `sql` against a set of permitted leading keywords.
///
/// Returns the normalized statement text on success.
///
/// # Examples
///
/// ```
/// use sqlite_tools_mcp::tools::sql_validator::{validate_statement, READ_ONLY_KEYWORDS};
///
/// assert_eq!(
///     validate_statement("  SELECT * FROM items; ", READ_ONLY_KEYWORDS).unwrap(),
///     "SELECT * FROM items"
/// );
/// assert!(validate_statement("DELETE FROM items", READ_ONLY_KEYWORDS).is_err());
/// assert!(validate_statement("SELECT 1 -- hi", READ_ONLY_KEYWORDS).is_err());
/// ```
pub fn validate_statement<'a>(sql: &'a str, allowed: &[&str]) -> DbResult<&'a str> {
    let statement = normalize(sql);
    if statement.is_empty() {
        return Err(DbError::rejected("empty", "SQL statement is empty"));
    }

    let lowered = statement.to_lowercase();
    if !allowed.iter().any(|kw| lowered.starts_with(kw)) {
        let expected = allowed
            .iter()
            .map(|kw| kw.to_uppercase())
            .collect::<Vec<_>>()
            .join(", ");
        return Err(DbError::rejected(
            "leading_keyword",
            format!("Statement must start with one of: {}", expected),
        ));
    }

    check_denied(&lowered)?;
    Ok(statement)
}

/// Validate a read-only query (`SELECT` or `WITH ... SELECT`).
pub fn validate_read_only(sql: &str) -> DbResult<&str> {
    validate_statement(sql, READ_ONLY_KEYWORDS)
}

/// Validate a schema statement (`CREATE`, `DROP`, `ALTER`, `REINDEX`).
pub fn validate_ddl(sql: &str) -> DbResult<&str> {
    validate_statement(sql, DDL_KEYWORDS)
}

/// Validate a caller-written predicate fragment such as a `WHERE` body.
///
/// Fragments have no leading keyword but get the same deny-list, so they cannot
/// smuggle a comment, a pragma or a second statement into the composed query.
pub fn validate_fragment(fragment: &str) -> DbResult<&str> {
    let trimmed = fragment.trim();
    if trimmed.is_empty() {
        return Err(DbError::rejected("empty", "Predicate is empty"));
    }
    check_denied(&trimmed.to_lowercase())?;
    Ok(trimmed)
}

fn check_denied(lowered: &str) -> DbResult<()> {
    for (pattern, rule) in DENIED_PATTERNS {
        if lowered.contains(pattern) {
            return Err(DbError::rejected(
                *rule,
                format!("'{}' is not allowed in submitted SQL", pattern),
            ));
        }
    }
    if lowered.contains(';') {
        return Err(DbError::rejected(
            "multiple_statements",
            "Only a single statement is allowed; remove the embedded ';'",
        ));
    }
    Ok(())
}
