//! Typed write tools.
//!
//! This module implements `sqlite_insert`, `sqlite_update`, `sqlite_delete` and
//! `sqlite_upsert`. Table and column names are validated identifiers; every value
//! is a bound parameter.

use crate::db::identifier::{quote_column_list, quote_identifier};
use crate::db::version::{UPSERT_MIN, engine_version};
use crate::db::{ConnectionScope, executor};
use crate::error::{DbError, DbResult};
use crate::models::{ExecuteResult, QueryParam};
use crate::tools::predicate::Predicate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Column values keyed by column name.
pub type ColumnValues = serde_json::Map<String, JsonValue>;

/// Input for the insert tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct InsertInput {
    pub table: String,
    /// Column name to value. Empty inserts a row of defaults.
    #[serde(default)]
    pub values: ColumnValues,
}

/// Input for the update tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpdateInput {
    pub table: String,
    /// Columns to set
    pub values: ColumnValues,
    /// Filter such as `id = ?`. Comments, PRAGMA, ATTACH/DETACH and ';' are rejected.
    #[serde(default)]
    pub where_clause: Option<String>,
    /// Values for the `?` placeholders in where_clause
    #[serde(default)]
    pub where_params: Vec<QueryParam>,
    /// Must be true to update every row when where_clause is omitted
    #[serde(default)]
    pub allow_all_rows: bool,
}

/// Input for the delete tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DeleteInput {
    pub table: String,
    /// Filter such as `price < ?`. Comments, PRAGMA, ATTACH/DETACH and ';' are rejected.
    #[serde(default)]
    pub where_clause: Option<String>,
    /// Values for the `?` placeholders in where_clause
    #[serde(default)]
    pub where_params: Vec<QueryParam>,
    /// Must be true to delete every row when where_clause is omitted
    #[serde(default)]
    pub allow_all_rows: bool,
}

/// Input for the upsert tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct UpsertInput {
    pub table: String,
    /// Column name to value for the row to insert or update
    pub values: ColumnValues,
    /// Columns of the UNIQUE or PRIMARY KEY constraint that detects the conflict
    pub conflict_columns: Vec<String>,
}

/// Output from the write tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WriteOutput {
    pub rows_affected: u64,
    /// Rowid of the last inserted row (insert and upsert only)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_insert_id: Option<i64>,
    pub execution_time_ms: u64,
}

impl WriteOutput {
    fn updated(result: ExecuteResult) -> Self {
        Self {
            rows_affected: result.rows_affected,
            last_insert_id: None,
            execution_time_ms: result.execution_time_ms,
        }
    }

    fn inserted(result: ExecuteResult) -> Self {
        Self {
            last_insert_id: Some(result.last_insert_id),
            ..Self::updated(result)
        }
    }
}

/// Split a value map into validated column names and bound parameters.
fn split_values(values: &ColumnValues) -> DbResult<(Vec<String>, Vec<QueryParam>)> {
    let columns: Vec<String> = values.keys().cloned().collect();
    let params = values
        .values()
        .map(QueryParam::from_json)
        .collect::<DbResult<Vec<_>>>()?;
    Ok((columns, params))
}

fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

/// Compose an INSERT for the given values.
pub fn build_insert(table: &str, values: &ColumnValues) -> DbResult<(String, Vec<QueryParam>)> {
    let table_sql = quote_identifier(table, "table")?;
    if values.is_empty() {
        return Ok((format!("INSERT INTO {} DEFAULT VALUES", table_sql), Vec::new()));
    }
    let (columns, params) = split_values(values)?;
    let sql = format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_sql,
        quote_column_list(&columns)?,
        placeholders(columns.len())
    );
    Ok((sql, params))
}

/// Compose an UPDATE; SET values bind before the predicate's values.
pub fn build_update(
    table: &str,
    values: &ColumnValues,
    predicate: Predicate,
) -> DbResult<(String, Vec<QueryParam>)> {
    if values.is_empty() {
        return Err(DbError::invalid_input("values must name at least one column"));
    }
    let (columns, mut params) = split_values(values)?;
    let assignments = columns
        .iter()
        .map(|c| quote_identifier(c, "column").map(|q| format!("{} = ?", q)))
        .collect::<DbResult<Vec<_>>>()?
        .join(", ");

    let sql = format!(
        "UPDATE {} SET {}{}",
        quote_identifier(table, "table")?,
        assignments,
        predicate.sql
    );
    params.extend(predicate.params);
    Ok((sql, params))
}

/// Compose a DELETE.
pub fn build_delete(table: &str, predicate: Predicate) -> DbResult<(String, Vec<QueryParam>)> {
    let sql = format!(
        "DELETE FROM {}{}",
        quote_identifier(table, "table")?,
        predicate.sql
    );
    Ok((sql, predicate.params))
}

/// Compose `INSERT ... ON CONFLICT (...) DO UPDATE SET col = excluded.col`.
///
/// When every supplied column is a conflict column there is nothing to update and
/// the statement becomes `DO NOTHING`.
pub fn build_upsert(
    table: &str,
    values: &ColumnValues,
    conflict_columns: &[String],
) -> DbResult<(String, Vec<QueryParam>)> {
    if values.is_empty() {
        return Err(DbError::invalid_input("values must name at least one column"));
    }
    if conflict_columns.is_empty() {
        return Err(DbError::invalid_input("conflict_columns must not be empty"));
    }
    if let Some(missing) = conflict_columns.iter().find(|c| !values.contains_key(*c)) {
        return Err(DbError::invalid_input(format!(
            "Conflict column '{}' must also appear in values",
            missing
        )));
    }

    let (insert_sql, params) = build_insert(table, values)?;
    let updates = values
        .keys()
        .filter(|c| !conflict_columns.contains(c))
        .map(|c| quote_identifier(c, "column").map(|q| format!("{} = excluded.{}", q, q)))
        .collect::<DbResult<Vec<_>>>()?;

    let action = if updates.is_empty() {
        "DO NOTHING".to_string()
    } else {
        format!("DO UPDATE SET {}", updates.join(", "))
    };
    let sql = format!(
        "{} ON CONFLICT ({}) {}",
        insert_sql,
        quote_column_list(conflict_columns)?,
        action
    );
    Ok((sql, params))
}

/// Refuse an unfiltered UPDATE/DELETE unless the caller asked for it.
fn require_filter(predicate: &Predicate, allow_all_rows: bool, operation: &str) -> DbResult<()> {
    if !predicate.is_filtered() && !allow_all_rows {
        return Err(DbError::invalid_input(format!(
            "{} without where_clause affects every row; set allow_all_rows to true to confirm",
            operation
        )));
    }
    Ok(())
}

/// Handler for typed write tools.
pub struct WriteToolHandler {
    scope: ConnectionScope,
}

impl WriteToolHandler {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    async fn run_statement(&self, sql: String, params: Vec<QueryParam>) -> DbResult<ExecuteResult> {
        self.scope
            .run(move |conn| Box::pin(async move { executor::execute(conn, &sql, &params).await }))
            .await
    }

    pub async fn insert(&self, input: InsertInput) -> DbResult<WriteOutput> {
        let (sql, params) = build_insert(&input.table, &input.values)?;
        let result = self.run_statement(sql, params).await?;

        info!(
            table = %input.table,
            rows_affected = result.rows_affected,
            last_insert_id = result.last_insert_id,
            "Row inserted"
        );
        Ok(WriteOutput::inserted(result))
    }

    pub async fn update(&self, input: UpdateInput) -> DbResult<WriteOutput> {
        let predicate = Predicate::build(input.where_clause.as_deref(), input.where_params)?;
        require_filter(&predicate, input.allow_all_rows, "UPDATE")?;
        let (sql, params) = build_update(&input.table, &input.values, predicate)?;
        let result = self.run_statement(sql, params).await?;

        info!(table = %input.table, rows_affected = result.rows_affected, "Rows updated");
        Ok(WriteOutput::updated(result))
    }

    pub async fn delete(&self, input: DeleteInput) -> DbResult<WriteOutput> {
        let predicate = Predicate::build(input.where_clause.as_deref(), input.where_params)?;
        require_filter(&predicate, input.allow_all_rows, "DELETE")?;
        let (sql, params) = build_delete(&input.table, predicate)?;
        let result = self.run_statement(sql, params).await?;

        info!(table = %input.table, rows_affected = result.rows_affected, "Rows deleted");
        Ok(WriteOutput::updated(result))
    }

    pub async fn upsert(&self, input: UpsertInput) -> DbResult<WriteOutput> {
        let (sql, params) = build_upsert(&input.table, &input.values, &input.conflict_columns)?;
        let result = self
            .scope
            .run(move |conn| {
                Box::pin(async move {
                    engine_version(conn).await?.require("UPSERT", UPSERT_MIN)?;
                    executor::execute(conn, &sql, &params).await
                })
            })
            .await?;

        info!(table = %input.table, rows_affected = result.rows_affected, "Row upserted");
        Ok(WriteOutput::inserted(result))
    }
}
