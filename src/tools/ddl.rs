//! Schema change tools.
//!
//! `sqlite_execute_ddl` runs caller-written CREATE/DROP/ALTER/REINDEX statements
//! after the DDL gatekeeper. `sqlite_drop_column` composes its own statement from
//! validated identifiers.

use crate::db::identifier::quote_identifier;
use crate::db::version::{DROP_COLUMN_MIN, engine_version};
use crate::db::{ConnectionScope, SchemaInspector, executor};
use crate::error::{DbError, DbResult};
use crate::tools::sql_validator;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for the execute_ddl tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteDdlInput {
    /// A single CREATE, DROP, ALTER or REINDEX statement
    pub sql: String,
}

/// Output from the execute_ddl tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExecuteDdlOutput {
    pub status: String,
    pub rows_affected: u64,
    pub execution_time_ms: u64,
}

/// Input for the drop_column tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct DropColumnInput {
    pub table: String,
    pub column: String,
}

/// Output from the drop_column tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DropColumnOutput {
    pub status: String,
    pub table: String,
    pub column: String,
}

/// Handler for schema change tools.
pub struct DdlToolHandler {
    scope: ConnectionScope,
}

impl DdlToolHandler {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    pub async fn execute_ddl(&self, input: ExecuteDdlInput) -> DbResult<ExecuteDdlOutput> {
        let sql = sql_validator::validate_ddl(&input.sql)?.to_string();

        let result = self
            .scope
            .run(move |conn| Box::pin(async move { executor::execute(conn, &sql, &[]).await }))
            .await?;

        info!(
            rows_affected = result.rows_affected,
            execution_time_ms = result.execution_time_ms,
            "DDL executed"
        );
        Ok(ExecuteDdlOutput {
            status: "ok".to_string(),
            rows_affected: result.rows_affected,
            execution_time_ms: result.execution_time_ms,
        })
    }

    pub async fn drop_column(&self, input: DropColumnInput) -> DbResult<DropColumnOutput> {
        let table_sql = quote_identifier(&input.table, "table")?;
        let column_sql = quote_identifier(&input.column, "column")?;
        let sql = format!("ALTER TABLE {} DROP COLUMN {}", table_sql, column_sql);
        let (table, column) = (input.table.clone(), input.column.clone());

        self.scope
            .run(move |conn| {
                Box::pin(async move {
                    engine_version(conn)
                        .await?
                        .require("ALTER TABLE ... DROP COLUMN", DROP_COLUMN_MIN)?;

                    let schema = SchemaInspector::describe_table(conn, &table).await?;
                    if schema.column(&column).is_none() {
                        return Err(DbError::invalid_input(format!(
                            "Column '{}' not found in table '{}'",
                            column, table
                        )));
                    }
                    executor::execute(conn, &sql, &[]).await?;
                    Ok(())
                })
            })
            .await?;

        info!(table = %input.table, column = %input.column, "Column dropped");
        Ok(DropColumnOutput {
            status: "ok".to_string(),
            table: input.table,
            column: input.column,
        })
    }
}
