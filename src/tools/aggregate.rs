//! Counting, aggregation and join helpers.
//!
//! This module implements `sqlite_count_rows`, `sqlite_aggregate` and `sqlite_join`.
//! Statements are composed from validated identifiers and a closed set of
//! keywords; only the optional `where_clause` is caller text.

use crate::db::identifier::quote_identifier;
use crate::db::version::{OUTER_JOIN_MIN, engine_version};
use crate::db::{ConnectionScope, executor};
use crate::error::{DbError, DbResult};
use crate::models::{JsonRow, QueryParam, effective_limit};
use crate::tools::predicate::Predicate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::info;

/// Input for the count_rows tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct CountRowsInput {
    pub table: String,
    /// Optional filter such as `price > ?`
    #[serde(default)]
    pub where_clause: Option<String>,
    /// Values for the `?` placeholders in where_clause
    #[serde(default)]
    pub where_params: Vec<QueryParam>,
}

/// Output from the count_rows tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CountRowsOutput {
    pub count: i64,
}

/// Aggregate function applied by the aggregate tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum AggregateOp {
    Sum,
    Avg,
    Min,
    Max,
    Count,
}

impl AggregateOp {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Sum => "SUM",
            Self::Avg => "AVG",
            Self::Min => "MIN",
            Self::Max => "MAX",
            Self::Count => "COUNT",
        }
    }
}

/// Input for the aggregate tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct AggregateInput {
    pub table: String,
    /// Column to aggregate. `*` is accepted for COUNT.
    pub column: String,
    /// SUM, AVG, MIN, MAX or COUNT
    pub operation: AggregateOp,
    #[serde(default)]
    pub where_clause: Option<String>,
    #[serde(default)]
    pub where_params: Vec<QueryParam>,
    /// Group by these columns and return one row per group
    #[serde(default)]
    pub group_by: Vec<String>,
}

/// Output from the aggregate tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct AggregateOutput {
    pub operation: AggregateOp,
    /// The aggregate when group_by is empty. NULL when no rows matched (except COUNT).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<JsonValue>,
    /// One row per group, with the group columns and `value`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub groups: Option<Vec<JsonRow>>,
}

/// SQL join type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum JoinType {
    #[default]
    #[serde(rename = "INNER")]
    Inner,
    #[serde(rename = "LEFT")]
    Left,
    #[serde(rename = "RIGHT")]
    Right,
    #[serde(rename = "FULL OUTER", alias = "FULL")]
    FullOuter,
}

impl JoinType {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Inner => "INNER JOIN",
            Self::Left => "LEFT JOIN",
            Self::Right => "RIGHT JOIN",
            Self::FullOuter => "FULL OUTER JOIN",
        }
    }

    /// RIGHT and FULL OUTER joins arrived in SQLite 3.39.0.
    pub fn needs_outer_join_support(self) -> bool {
        matches!(self, Self::Right | Self::FullOuter)
    }
}

/// Input for the join tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct JoinInput {
    pub left_table: String,
    pub right_table: String,
    /// Join column on the left table
    pub left_column: String,
    /// Join column on the right table
    pub right_column: String,
    /// INNER (default), LEFT, RIGHT or FULL OUTER
    #[serde(default)]
    pub join_type: JoinType,
    /// Columns to select, plain or `table.column`. Default: all columns.
    #[serde(default)]
    pub columns: Option<Vec<String>>,
    /// Maximum rows to return. Default: 100, clamped to 1..=10000
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Output from the join tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct JoinOutput {
    pub columns: Vec<String>,
    pub rows: Vec<JsonRow>,
    pub row_count: usize,
    pub truncated: bool,
    pub execution_time_ms: u64,
}

/// Compose `SELECT COUNT(*)`.
pub fn build_count(table: &str, predicate: Predicate) -> DbResult<(String, Vec<QueryParam>)> {
    let sql = format!(
        "SELECT COUNT(*) FROM {}{}",
        quote_identifier(table, "table")?,
        predicate.sql
    );
    Ok((sql, predicate.params))
}

/// Compose an aggregate, grouped when `group_by` is non-empty.
pub fn build_aggregate(
    table: &str,
    column: &str,
    op: AggregateOp,
    group_by: &[String],
    predicate: Predicate,
) -> DbResult<(String, Vec<QueryParam>)> {
    let target = if column == "*" {
        if op != AggregateOp::Count {
            return Err(DbError::invalid_input("'*' is only valid with COUNT"));
        }
        "*".to_string()
    } else {
        quote_identifier(column, "column")?
    };
    let table_sql = quote_identifier(table, "table")?;
    let aggregate = format!("{}({}) AS \"value\"", op.as_sql(), target);

    let sql = if group_by.is_empty() {
        format!("SELECT {} FROM {}{}", aggregate, table_sql, predicate.sql)
    } else {
        let groups = group_by
            .iter()
            .map(|g| quote_identifier(g, "column"))
            .collect::<DbResult<Vec<_>>>()?
            .join(", ");
        format!(
            "SELECT {}, {} FROM {}{} GROUP BY {} ORDER BY {}",
            groups, aggregate, table_sql, predicate.sql, groups, groups
        )
    };
    Ok((sql, predicate.params))
}

/// Quote a select-list entry: `col` or `table.col`.
fn quote_select_column(spec: &str) -> DbResult<String> {
    match spec.split_once('.') {
        Some((table, column)) => Ok(format!(
            "{}.{}",
            quote_identifier(table, "table")?,
            quote_identifier(column, "column")?
        )),
        None => quote_identifier(spec, "column"),
    }
}

/// Compose the join statement. The row limit is applied by the executor.
pub fn build_join(input: &JoinInput) -> DbResult<String> {
    let left = quote_identifier(&input.left_table, "table")?;
    let right = quote_identifier(&input.right_table, "table")?;
    let left_col = quote_identifier(&input.left_column, "column")?;
    let right_col = quote_identifier(&input.right_column, "column")?;

    let select = match input.columns.as_deref() {
        None | Some([]) => "*".to_string(),
        Some(columns) => columns
            .iter()
            .map(|c| quote_select_column(c.trim()))
            .collect::<DbResult<Vec<_>>>()?
            .join(", "),
    };

    Ok(format!(
        "SELECT {} FROM {} {} {} ON {}.{} = {}.{}",
        select,
        left,
        input.join_type.as_sql(),
        right,
        left,
        left_col,
        right,
        right_col
    ))
}

/// Handler for aggregate tools.
pub struct AggregateToolHandler {
    scope: ConnectionScope,
}

impl AggregateToolHandler {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    pub async fn count_rows(&self, input: CountRowsInput) -> DbResult<CountRowsOutput> {
        let predicate = Predicate::build(input.where_clause.as_deref(), input.where_params)?;
        let (sql, params) = build_count(&input.table, predicate)?;

        let value = self
            .scope
            .run(move |conn| Box::pin(async move { executor::fetch_value(conn, &sql, &params).await }))
            .await?;
        let count = value
            .as_i64()
            .ok_or_else(|| DbError::internal(format!("COUNT(*) returned {}", value)))?;

        info!(table = %input.table, count = count, "Counted rows");
        Ok(CountRowsOutput { count })
    }

    pub async fn aggregate(&self, input: AggregateInput) -> DbResult<AggregateOutput> {
        let predicate = Predicate::build(input.where_clause.as_deref(), input.where_params)?;
        let (sql, params) = build_aggregate(
            &input.table,
            input.column.trim(),
            input.operation,
            &input.group_by,
            predicate,
        )?;
        let grouped = !input.group_by.is_empty();
        let operation = input.operation;

        let output = self
            .scope
            .run(move |conn| {
                Box::pin(async move {
                    if grouped {
                        let result = executor::fetch_all(conn, &sql, &params, true).await?;
                        Ok(AggregateOutput {
                            operation,
                            value: None,
                            groups: Some(result.rows),
                        })
                    } else {
                        let value = executor::fetch_value(conn, &sql, &params).await?;
                        Ok(AggregateOutput {
                            operation,
                            value: Some(value),
                            groups: None,
                        })
                    }
                })
            })
            .await?;

        info!(
            table = %input.table,
            column = %input.column,
            operation = operation.as_sql(),
            "Aggregate computed"
        );
        Ok(output)
    }

    pub async fn join(&self, input: JoinInput) -> DbResult<JoinOutput> {
        let sql = build_join(&input)?;
        let limit = effective_limit(input.limit);
        let join_type = input.join_type;

        let result = self
            .scope
            .run(move |conn| {
                Box::pin(async move {
                    if join_type.needs_outer_join_support() {
                        engine_version(conn)
                            .await?
                            .require(join_type.as_sql(), OUTER_JOIN_MIN)?;
                    }
                    executor::fetch_rows(conn, &sql, &[], limit, true).await
                })
            })
            .await?;

        info!(
            left_table = %input.left_table,
            right_table = %input.right_table,
            join_type = join_type.as_sql(),
            row_count = result.rows.len(),
            "Join executed"
        );
        Ok(JoinOutput {
            row_count: result.rows.len(),
            columns: result.columns,
            rows: result.rows,
            truncated: result.truncated,
            execution_time_ms: result.execution_time_ms,
        })
    }
}
