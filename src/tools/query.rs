//! Read-only query tool.
//!
//! This module implements `sqlite_run_sql`. The statement must pass the read-only
//! gatekeeper before a connection is opened, and it then runs on a read-only
//! handle, so a data-changing statement that slips past the gatekeeper still fails.

use crate::db::{ConnectionScope, ScopeMode};
use crate::db::executor;
use crate::error::DbResult;
use crate::models::{MAX_ROW_LIMIT, QueryParam, QueryResult, effective_limit};
use crate::tools::format::{OutputFormat, format_as_markdown, format_as_table};
use crate::tools::sql_validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

fn default_decode_binary() -> bool {
    true
}

/// Input for the run_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RunSqlInput {
    /// A single SELECT (or WITH ... SELECT) statement. Comments, PRAGMA, ATTACH/DETACH and ';' separators are rejected. Runs on a read-only connection: writes fail, including WITH ... INSERT/UPDATE/DELETE.
    pub query: String,
    /// Positional parameters for `?` placeholders
    #[serde(default)]
    pub params: Vec<QueryParam>,
    /// Maximum rows to return. Default: 100, clamped to 1..=10000
    #[serde(default)]
    pub limit: Option<u32>,
    /// Output format: "json" returns structured data, "table" returns ASCII table, "markdown" returns markdown table
    #[serde(default)]
    pub format: OutputFormat,
    /// If true (default), BLOB values that are valid UTF-8 are returned as text; otherwise base64.
    #[serde(default = "default_decode_binary")]
    pub decode_binary: bool,
}

/// Output from the run_sql tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RunSqlOutput {
    /// Column names in selection order. Empty if format is table/markdown.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<String>,
    /// Result rows as column-name keyed maps. Empty if format is table/markdown.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub rows: Vec<serde_json::Map<String, JsonValue>>,
    /// Pre-formatted output when format is table or markdown
    #[serde(skip_serializing_if = "Option::is_none")]
    pub formatted: Option<String>,
    /// True if more rows were available than the limit
    pub truncated: bool,
    /// Number of rows returned
    pub row_count: usize,
    /// Query execution time in milliseconds
    pub execution_time_ms: u64,
    /// Set when the requested limit was adjusted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

impl RunSqlOutput {
    /// Shape a result for the requested format.
    pub fn from_result(result: QueryResult, format: OutputFormat, warning: Option<String>) -> Self {
        let row_count = result.rows.len();
        let truncated = result.truncated;
        let execution_time_ms = result.execution_time_ms;

        let formatted = match format {
            OutputFormat::Json => None,
            OutputFormat::Table => Some(format_as_table(
                &result.columns,
                &result.rows,
                truncated,
                execution_time_ms,
            )),
            OutputFormat::Markdown => Some(format_as_markdown(
                &result.columns,
                &result.rows,
                truncated,
            )),
        };

        let (columns, rows) = if formatted.is_some() {
            (Vec::new(), Vec::new())
        } else {
            (result.columns, result.rows)
        };

        Self {
            columns,
            rows,
            formatted,
            truncated,
            row_count,
            execution_time_ms,
            warning,
        }
    }
}

fn limit_warning(requested: Option<u32>) -> Option<String> {
    match requested {
        Some(0) => Some("Requested limit 0 raised to 1.".to_string()),
        Some(n) if n > MAX_ROW_LIMIT => Some(format!(
            "Requested limit {} exceeds maximum allowed ({}). Results capped to {} rows.",
            n, MAX_ROW_LIMIT, MAX_ROW_LIMIT
        )),
        _ => None,
    }
}

/// Handler for read-only queries.
pub struct QueryToolHandler {
    scope: ConnectionScope,
}

impl QueryToolHandler {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    /// Handle the run_sql tool call.
    pub async fn run_sql(&self, input: RunSqlInput) -> DbResult<RunSqlOutput> {
        let sql = sql_validator::validate_read_only(&input.query)?.to_string();
        let limit = effective_limit(input.limit);
        let warning = limit_warning(input.limit);
        let decode_binary = input.decode_binary;
        let params = input.params;

        let result = self
            .scope
            .run_with(ScopeMode::ReadOnly, move |conn| {
                Box::pin(async move {
                    executor::fetch_rows(conn, &sql, &params, limit, decode_binary).await
                })
            })
            .await?;

        info!(
            row_count = result.rows.len(),
            truncated = result.truncated,
            execution_time_ms = result.execution_time_ms,
            "Query executed"
        );

        Ok(RunSqlOutput::from_result(result, input.format, warning))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_sql_input_defaults() {
        let input: RunSqlInput = serde_json::from_str(r#"{"query": "SELECT 1"}"#).unwrap();
        assert!(input.params.is_empty());
        assert!(input.limit.is_none());
        assert_eq!(input.format, OutputFormat::Json);
        assert!(input.decode_binary);
    }

    #[test]
    fn test_run_sql_input_full() {
        let json = r#"{
            "query": "SELECT * FROM items WHERE price > ?",
            "params": [5.0],
            "limit": 10,
            "format": "markdown",
            "decode_binary": false
        }"#;
        let input: RunSqlInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.params, vec![QueryParam::Float(5.0)]);
        assert_eq!(input.format, OutputFormat::Markdown);
        assert!(!input.decode_binary);
    }

    #[test]
    fn test_limit_warning() {
        assert!(limit_warning(None).is_none());
        assert!(limit_warning(Some(50)).is_none());
        assert!(limit_warning(Some(0)).is_some());
        assert!(limit_warning(Some(20000)).unwrap().contains("10000"));
    }

    #[test]
    fn test_output_table_format_hides_rows() {
        let mut row = serde_json::Map::new();
        row.insert("id".to_string(), JsonValue::Number(1.into()));
        let result = QueryResult {
            columns: vec!["id".to_string()],
            rows: vec![row],
            truncated: false,
            execution_time_ms: 3,
        };

        let output = RunSqlOutput::from_result(result, OutputFormat::Table, None);
        assert!(output.rows.is_empty());
        assert_eq!(output.row_count, 1);
        let json = serde_json::to_string(&output).unwrap();
        assert!(json.contains("\"formatted\""));
        assert!(!json.contains("\"rows\""));
    }
}
