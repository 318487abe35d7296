//! Query-related data models.
//!
//! This module defines parameter values and materialized results shared by every tool
//! that reads rows.

use crate::error::{DbError, DbResult};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// Default row limit for query results.
pub const DEFAULT_ROW_LIMIT: u32 = 100;

/// Maximum allowed row limit.
pub const MAX_ROW_LIMIT: u32 = 10000;

/// One materialized row, keyed by column name in selection order.
pub type JsonRow = serde_json::Map<String, JsonValue>;

/// Clamp a requested row limit into `[1, MAX_ROW_LIMIT]`, defaulting when absent.
pub fn effective_limit(requested: Option<u32>) -> u32 {
    requested
        .unwrap_or(DEFAULT_ROW_LIMIT)
        .clamp(1, MAX_ROW_LIMIT)
}

/// A value bound to a `?` placeholder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum QueryParam {
    /// NULL value
    Null,
    /// Boolean value (stored by SQLite as 0/1)
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Floating point value
    Float(f64),
    /// String value
    String(String),
}

impl QueryParam {
    /// Check if this parameter is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Get the type name of this parameter for debugging.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
        }
    }

    /// Convert an arbitrary JSON value supplied for a column.
    ///
    /// Arrays and objects are stored as their JSON text, which is how SQLite's JSON
    /// functions expect them.
    pub fn from_json(value: &JsonValue) -> DbResult<Self> {
        Ok(match value {
            JsonValue::Null => Self::Null,
            JsonValue::Bool(b) => Self::Bool(*b),
            JsonValue::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Self::Int(i)
                } else if let Some(f) = n.as_f64() {
                    Self::Float(f)
                } else {
                    return Err(DbError::invalid_input(format!(
                        "Number {} does not fit a SQLite INTEGER or REAL",
                        n
                    )));
                }
            }
            JsonValue::String(s) => Self::String(s.clone()),
            JsonValue::Array(_) | JsonValue::Object(_) => Self::String(value.to_string()),
        })
    }
}

/// Rows read by one statement.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueryResult {
    /// Column names in selection order
    pub columns: Vec<String>,
    pub rows: Vec<JsonRow>,
    /// True when more rows than the limit were available
    pub truncated: bool,
    pub execution_time_ms: u64,
}

impl QueryResult {
    /// Get the number of rows in the result.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }
}

/// Outcome of a statement that returns no rows.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ExecuteResult {
    pub rows_affected: u64,
    pub last_insert_id: i64,
    pub execution_time_ms: u64,
}
