//! Schema introspection tools.
//!
//! This module implements `sqlite_list_tables` and `sqlite_describe_schema`.

use crate::db::identifier::validate_identifier;
use crate::db::{ConnectionScope, SchemaInspector};
use crate::error::DbResult;
use crate::models::{TableInfo, TableSchema};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Input for the list_tables tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct ListTablesInput {
    /// Include views in the result. Default: false
    #[serde(default)]
    pub include_views: bool,
}

/// Output from the list_tables tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ListTablesOutput {
    /// Tables (and views, when requested) ordered by name
    pub tables: Vec<TableInfo>,
    pub count: usize,
}

/// Input for the describe_schema tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct DescribeSchemaInput {
    /// Table to describe. Omit to describe every table.
    #[serde(default)]
    pub table: Option<String>,
}

/// Output from the describe_schema tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct DescribeSchemaOutput {
    pub tables: Vec<TableSchema>,
}

/// Handler for schema tools.
pub struct SchemaToolHandler {
    scope: ConnectionScope,
}

impl SchemaToolHandler {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    pub async fn list_tables(&self, input: ListTablesInput) -> DbResult<ListTablesOutput> {
        let include_views = input.include_views;
        let tables = self
            .scope
            .run(move |conn| {
                Box::pin(async move { SchemaInspector::list_tables(conn, include_views).await })
            })
            .await?;

        info!(count = tables.len(), include_views = include_views, "Listed tables");
        Ok(ListTablesOutput {
            count: tables.len(),
            tables,
        })
    }

    pub async fn describe_schema(
        &self,
        input: DescribeSchemaInput,
    ) -> DbResult<DescribeSchemaOutput> {
        let table = match input.table {
            Some(t) => Some(validate_identifier(t.trim(), "table")?.to_string()),
            None => None,
        };

        let tables = self
            .scope
            .run(move |conn| {
                Box::pin(async move {
                    match table {
                        Some(name) => Ok(vec![SchemaInspector::describe_table(conn, &name).await?]),
                        None => SchemaInspector::describe_all(conn).await,
                    }
                })
            })
            .await?;

        info!(count = tables.len(), "Described schema");
        Ok(DescribeSchemaOutput { tables })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_list_tables_input_defaults() {
        let input: ListTablesInput = serde_json::from_str("{}").unwrap();
        assert!(!input.include_views);
    }

    #[test]
    fn test_describe_schema_input_optional_table() {
        let input: DescribeSchemaInput = serde_json::from_str("{}").unwrap();
        assert!(input.table.is_none());
        let input: DescribeSchemaInput = serde_json::from_str(r#"{"table": "items"}"#).unwrap();
        assert_eq!(input.table.as_deref(), Some("items"));
    }

    #[tokio::test]
    async fn test_describe_schema_rejects_bad_name_without_connecting() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("never.db");
        let handler = SchemaToolHandler::new(ConnectionScope::new(crate::db::ScopeSettings::new(&path)));

        let result = handler
            .describe_schema(DescribeSchemaInput {
                table: Some("items; DROP TABLE x".to_string()),
            })
            .await;
        assert!(result.is_err());
        assert!(!path.exists());
    }
}
