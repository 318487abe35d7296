//! Error types for the SQLite tools MCP server.
//!
//! This module defines all error types using `thiserror` for ergonomic error handling.
//! Each error variant provides actionable messages to help AI assistants understand
//! and recover from error conditions.

use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQLite extended result code, e.g. "2067" for a UNIQUE violation
        code: Option<String>,
        suggestion: String,
    },

    #[error("Statement rejected ({rule}): {message}")]
    Rejected { rule: String, message: String },

    #[error("{feature} requires SQLite {required} or newer (found {actual})")]
    Unsupported {
        feature: String,
        required: String,
        actual: String,
    },

    #[error("I/O error on '{path}': {message}")]
    Io { path: String, message: String },

    #[error("Upstream MCP server '{url}' failed: {message}")]
    Upstream { url: String, message: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a database error with an optional result code.
    pub fn database(
        message: impl Into<String>,
        code: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            code,
            suggestion: suggestion.into(),
        }
    }

    /// Create a rejection naming the violated rule.
    pub fn rejected(rule: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Rejected {
            rule: rule.into(),
            message: message.into(),
        }
    }

    /// Create an engine version precondition error.
    pub fn unsupported(
        feature: impl Into<String>,
        required: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::Unsupported {
            feature: feature.into(),
            required: required.into(),
            actual: actual.into(),
        }
    }

    /// Create a filesystem error for the given path.
    pub fn io(path: impl AsRef<Path>, err: impl std::fmt::Display) -> Self {
        Self::Io {
            path: path.as_ref().display().to_string(),
            message: err.to_string(),
        }
    }

    /// Create an upstream proxy error.
    pub fn upstream(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            url: url.into(),
            message: message.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::Rejected { .. } => Some(
                "Submit a single statement without comments, PRAGMA, ATTACH/DETACH or ';' separators",
            ),
            Self::Unsupported { .. } => Some("Upgrade the SQLite library or use another operation"),
            _ => None,
        }
    }

    /// Check if this error is a validation failure raised before touching the database.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidInput { .. } | Self::Rejected { .. } | Self::Unsupported { .. }
        )
    }
}

/// Suggestion for a SQLite primary result code.
fn sqlite_suggestion(code: Option<&str>) -> &'static str {
    let primary = code
        .and_then(|c| c.parse::<i32>().ok())
        .map(|c| c & 0xff);
    match primary {
        Some(5) | Some(6) => "The database is locked by another writer; try again later",
        Some(11) | Some(26) => "The database file looks corrupt; run sqlite_integrity_check or restore a backup",
        Some(19) => "A constraint was violated; check UNIQUE, NOT NULL and FOREIGN KEY columns",
        _ => "Check the SQL syntax and referenced objects",
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the database path and its parent directory",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                let suggestion = sqlite_suggestion(code.as_deref());
                DbError::database(db_err.message(), code, suggestion)
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check that the database file is readable and writable",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check the SQLite library build",
            ),
            sqlx::Error::ColumnNotFound(col) => {
                DbError::invalid_input(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

/// Build suggestion data as JSON value.
fn suggestion_data(suggestion: Option<&str>) -> Option<serde_json::Value> {
    suggestion.map(|s| serde_json::json!({ "suggestion": s }))
}

/// Convert DbError to MCP ErrorData for semantic error categorization.
/// Includes the suggestion field in the `data` object when available.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = suggestion_data(err.suggestion());
        match &err {
            DbError::InvalidInput { .. }
            | DbError::Rejected { .. }
            | DbError::Unsupported { .. } => rmcp::ErrorData::invalid_params(err.to_string(), data),

            DbError::Io { .. } => rmcp::ErrorData::resource_not_found(err.to_string(), data),

            // Engine errors keep their result code in the message
            DbError::Database { message, code, .. } => {
                let msg = match code {
                    Some(code) => format!("{} (SQLite code: {})", message, code),
                    None => message.clone(),
                };
                rmcp::ErrorData::invalid_params(msg, data)
            }

            DbError::Connection { .. }
            | DbError::Upstream { .. }
            | DbError::Timeout { .. }
            | DbError::Internal { .. } => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to open", "Check path");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_rejected_display_names_rule() {
        let err = DbError::rejected("comment", "SQL comments are not allowed");
        assert_eq!(
            err.to_string(),
            "Statement rejected (comment): SQL comments are not allowed"
        );
        assert!(err.is_validation());
    }

    #[test]
    fn test_unsupported_display() {
        let err = DbError::unsupported("RIGHT JOIN", "3.39.0", "3.31.1");
        assert!(err.to_string().contains("3.39.0"));
        assert!(err.to_string().contains("3.31.1"));
    }

    #[test]
    fn test_sqlite_suggestion_uses_primary_code() {
        // SQLITE_CONSTRAINT_UNIQUE = 2067, primary 19
        assert!(sqlite_suggestion(Some("2067")).contains("constraint"));
        assert!(sqlite_suggestion(Some("5")).contains("locked"));
        assert!(sqlite_suggestion(Some("11")).contains("corrupt"));
        assert!(sqlite_suggestion(None).contains("syntax"));
    }

    #[test]
    fn test_invalid_input_maps_to_invalid_params() {
        let mcp_err: rmcp::ErrorData = DbError::invalid_input("bad input").into();
        assert_eq!(mcp_err.code.0, -32602);
    }

    #[test]
    fn test_rejected_maps_to_invalid_params_with_suggestion() {
        let mcp_err: rmcp::ErrorData = DbError::rejected("pragma", "PRAGMA is not allowed").into();
        assert_eq!(mcp_err.code.0, -32602);
        assert!(mcp_err.data.is_some());
    }

    #[test]
    fn test_io_maps_to_resource_not_found() {
        let mcp_err: rmcp::ErrorData = DbError::io("missing.db", "No such file").into();
        assert_eq!(mcp_err.code.0, -32002);
    }

    #[test]
    fn test_upstream_maps_to_internal_error() {
        let mcp_err: rmcp::ErrorData =
            DbError::upstream("http://localhost:8001/mcp", "connection refused").into();
        assert_eq!(mcp_err.code.0, -32603);
    }

    #[test]
    fn test_database_error_includes_code() {
        let err = DbError::database("UNIQUE constraint failed", Some("2067".to_string()), "x");
        let mcp_err: rmcp::ErrorData = err.into();
        assert!(mcp_err.message.contains("2067"));
        let data = mcp_err.data.unwrap();
        assert_eq!(data["suggestion"], "x");
    }
}
