//! Statement execution on a scoped SQLite handle.
//!
//! This module provides:
//! - Parameterized queries
//! - Row limits (enforced via streaming - only fetches needed rows)
//! - Write execution with affected-row and rowid reporting
//!
//! Every function borrows the handle owned by the enclosing
//! [`ConnectionScope`](crate::db::ConnectionScope); none of them commit or close.

use crate::db::params::bind_all;
use crate::db::types::{column_names, decode_column, row_to_json};
use crate::error::DbResult;
use crate::models::{ExecuteResult, QueryParam, QueryResult};
use futures_util::StreamExt;
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteConnection;
use sqlx::{Column, Executor};
use std::time::Instant;
use tracing::debug;

/// Run a row-returning statement and materialize at most `limit` rows.
///
/// One extra row is pulled from the stream to detect truncation; nothing past
/// that is ever read from the engine.
pub async fn fetch_rows(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[QueryParam],
    limit: u32,
    decode_binary: bool,
) -> DbResult<QueryResult> {
    let start = Instant::now();
    let fetch_limit = limit as usize + 1;

    let fetched = bind_all(sqlx::query(sql), params)
        .fetch(&mut *conn)
        .take(fetch_limit)
        .collect::<Vec<_>>()
        .await;
    let mut rows = fetched.into_iter().collect::<Result<Vec<_>, _>>()?;

    let truncated = rows.len() > limit as usize;
    rows.truncate(limit as usize);

    let columns = match rows.first() {
        Some(row) => column_names(row),
        None => describe_columns(conn, sql).await?,
    };
    let rows = rows.iter().map(|r| row_to_json(r, decode_binary)).collect();
    let execution_time_ms = start.elapsed().as_millis() as u64;

    debug!(
        limit = limit,
        truncated = truncated,
        execution_time_ms = execution_time_ms,
        "Fetched rows"
    );

    Ok(QueryResult {
        columns,
        rows,
        truncated,
        execution_time_ms,
    })
}

/// Run a row-returning statement and materialize every row.
pub async fn fetch_all(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[QueryParam],
    decode_binary: bool,
) -> DbResult<QueryResult> {
    let start = Instant::now();
    let rows = bind_all(sqlx::query(sql), params)
        .fetch_all(&mut *conn)
        .await?;

    let columns = match rows.first() {
        Some(row) => column_names(row),
        None => describe_columns(conn, sql).await?,
    };

    Ok(QueryResult {
        columns,
        rows: rows.iter().map(|r| row_to_json(r, decode_binary)).collect(),
        truncated: false,
        execution_time_ms: start.elapsed().as_millis() as u64,
    })
}

/// Column names of a statement without running it, for empty result sets.
pub(crate) async fn describe_columns(conn: &mut SqliteConnection, sql: &str) -> DbResult<Vec<String>> {
    let described = (&mut *conn).describe(sql).await?;
    Ok(described
        .columns()
        .iter()
        .map(|c| c.name().to_string())
        .collect())
}

/// Run a statement that returns a single value (first column of the first row).
///
/// Returns JSON null when the statement yields no rows.
pub async fn fetch_value(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<JsonValue> {
    let row = bind_all(sqlx::query(sql), params)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row
        .map(|r| decode_column(&r, 0, true))
        .unwrap_or(JsonValue::Null))
}

/// Run a statement that returns no rows.
pub async fn execute(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[QueryParam],
) -> DbResult<ExecuteResult> {
    let start = Instant::now();
    let result = bind_all(sqlx::query(sql), params)
        .execute(&mut *conn)
        .await?;
    let execution_time_ms = start.elapsed().as_millis() as u64;

    debug!(
        rows_affected = result.rows_affected(),
        execution_time_ms = execution_time_ms,
        "Statement executed"
    );

    Ok(ExecuteResult {
        rows_affected: result.rows_affected(),
        last_insert_id: result.last_insert_rowid(),
        execution_time_ms,
    })
}
