//! MCP service implementation using rmcp.
//!
//! This module defines the AggregateService struct with every SQLite tool and the
//! two passthrough tools exposed via the MCP protocol using the rmcp framework's
//! macros. Tool names keep the `sqlite_` and `mcp_proxy_` prefixes.

use crate::config::Config;
use crate::db::ConnectionScope;
use crate::tools::aggregate::{
    AggregateInput, AggregateOutput, AggregateToolHandler, CountRowsInput, CountRowsOutput,
    JoinInput, JoinOutput,
};
use crate::tools::ddl::{
    DdlToolHandler, DropColumnInput, DropColumnOutput, ExecuteDdlInput, ExecuteDdlOutput,
};
use crate::tools::demo::{InitDemoOutput, init_demo};
use crate::tools::maintenance::{
    BackupInput, BackupOutput, IntegrityCheckOutput, MaintenanceToolHandler, RestoreInput,
    RestoreOutput, StatusOutput,
};
use crate::tools::proxy::{
    ProxyCallToolInput, ProxyCallToolOutput, ProxyListToolsInput, ProxyListToolsOutput,
    ProxyToolHandler,
};
use crate::tools::query::{QueryToolHandler, RunSqlInput, RunSqlOutput};
use crate::tools::schema::{
    DescribeSchemaInput, DescribeSchemaOutput, ListTablesInput, ListTablesOutput,
    SchemaToolHandler,
};
use crate::tools::transfer::{
    ExportInput, ExportOutput, ImportInput, ImportOutput, TransferToolHandler,
};
use crate::tools::write::{
    DeleteInput, InsertInput, UpdateInput, UpsertInput, WriteOutput, WriteToolHandler,
};
use rmcp::Json;
use rmcp::{
    ErrorData as McpError, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::time::Duration;

#[derive(Clone)]
pub struct AggregateService {
    /// Opens a fresh handle for every tool call
    scope: ConnectionScope,
    /// Deadline for a whole upstream exchange in the proxy tools
    proxy_timeout: Duration,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl AggregateService {
    /// Create a service bound to one database file.
    pub fn new(scope: ConnectionScope, proxy_timeout: Duration) -> Self {
        Self {
            scope,
            proxy_timeout,
            tool_router: Self::tool_router(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(
            ConnectionScope::new(config.scope_settings()),
            config.proxy_timeout_duration(),
        )
    }

    pub fn scope(&self) -> &ConnectionScope {
        &self.scope
    }
}

#[tool_router]
impl AggregateService {
    #[tool(
        description = "Create the demo table `items(id, name UNIQUE, price)` and seed it with two rows.\nSafe to call repeatedly: existing rows are left alone."
    )]
    async fn sqlite_init_demo(&self) -> Result<Json<InitDemoOutput>, McpError> {
        init_demo(&self.scope).await.map(Json).map_err(McpError::from)
    }

    #[tool(description = "List tables in the database, optionally including views.")]
    async fn sqlite_list_tables(
        &self,
        Parameters(input): Parameters<ListTablesInput>,
    ) -> Result<Json<ListTablesOutput>, McpError> {
        SchemaToolHandler::new(self.scope.clone())
            .list_tables(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Run one read-only SELECT (or WITH ... SELECT) statement and return rows.\nComments, PRAGMA, ATTACH/DETACH and multiple statements are rejected.\nRuns on a read-only connection, so writes fail.\nSupports `?` parameters. Output format: json (default), table, or markdown."
    )]
    async fn sqlite_run_sql(
        &self,
        Parameters(input): Parameters<RunSqlInput>,
    ) -> Result<Json<RunSqlOutput>, McpError> {
        QueryToolHandler::new(self.scope.clone())
            .run_sql(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Run one CREATE, DROP, ALTER or REINDEX statement.\nComments, PRAGMA, ATTACH/DETACH and multiple statements are rejected."
    )]
    async fn sqlite_execute_ddl(
        &self,
        Parameters(input): Parameters<ExecuteDdlInput>,
    ) -> Result<Json<ExecuteDdlOutput>, McpError> {
        DdlToolHandler::new(self.scope.clone())
            .execute_ddl(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Describe one table, or every table when `table` is omitted.\nReturns columns, primary key, indexes, foreign keys and the CREATE statement."
    )]
    async fn sqlite_describe_schema(
        &self,
        Parameters(input): Parameters<DescribeSchemaInput>,
    ) -> Result<Json<DescribeSchemaOutput>, McpError> {
        SchemaToolHandler::new(self.scope.clone())
            .describe_schema(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Insert one row. `values` maps column names to values.")]
    async fn sqlite_insert(
        &self,
        Parameters(input): Parameters<InsertInput>,
    ) -> Result<Json<WriteOutput>, McpError> {
        WriteToolHandler::new(self.scope.clone())
            .insert(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Update rows matching `where_clause` (with `?` values in `where_params`).\nUpdating every row requires `allow_all_rows: true`."
    )]
    async fn sqlite_update(
        &self,
        Parameters(input): Parameters<UpdateInput>,
    ) -> Result<Json<WriteOutput>, McpError> {
        WriteToolHandler::new(self.scope.clone())
            .update(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Delete rows matching `where_clause` (with `?` values in `where_params`).\nDeleting every row requires `allow_all_rows: true`."
    )]
    async fn sqlite_delete(
        &self,
        Parameters(input): Parameters<DeleteInput>,
    ) -> Result<Json<WriteOutput>, McpError> {
        WriteToolHandler::new(self.scope.clone())
            .delete(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Insert a row, or update it when it collides on `conflict_columns` (a UNIQUE or PRIMARY KEY constraint).\nRequires SQLite 3.24.0 or later."
    )]
    async fn sqlite_upsert(
        &self,
        Parameters(input): Parameters<UpsertInput>,
    ) -> Result<Json<WriteOutput>, McpError> {
        WriteToolHandler::new(self.scope.clone())
            .upsert(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Count rows in a table, optionally filtered by `where_clause`.")]
    async fn sqlite_count_rows(
        &self,
        Parameters(input): Parameters<CountRowsInput>,
    ) -> Result<Json<CountRowsOutput>, McpError> {
        AggregateToolHandler::new(self.scope.clone())
            .count_rows(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Compute SUM, AVG, MIN, MAX or COUNT over a column.\nReturns a single `value`, or one row per group when `group_by` is given."
    )]
    async fn sqlite_aggregate(
        &self,
        Parameters(input): Parameters<AggregateInput>,
    ) -> Result<Json<AggregateOutput>, McpError> {
        AggregateToolHandler::new(self.scope.clone())
            .aggregate(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Join two tables on one column each.\njoin_type: INNER (default), LEFT, RIGHT or FULL OUTER (RIGHT and FULL OUTER need SQLite 3.39.0)."
    )]
    async fn sqlite_join(
        &self,
        Parameters(input): Parameters<JoinInput>,
    ) -> Result<Json<JoinOutput>, McpError> {
        AggregateToolHandler::new(self.scope.clone())
            .join(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Drop a column from a table. Requires SQLite 3.35.0 or later.")]
    async fn sqlite_drop_column(
        &self,
        Parameters(input): Parameters<DropColumnInput>,
    ) -> Result<Json<DropColumnOutput>, McpError> {
        DdlToolHandler::new(self.scope.clone())
            .drop_column(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Write a consistent copy of the database with VACUUM INTO.\nDefault destination: `<db>.backup-<UTC timestamp>.db`. The destination must not exist."
    )]
    async fn sqlite_backup(
        &self,
        Parameters(input): Parameters<BackupInput>,
    ) -> Result<Json<BackupOutput>, McpError> {
        MaintenanceToolHandler::new(self.scope.clone())
            .backup(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Replace the database with a backup file.\nThe backup is checked before anything is touched; a failed copy puts the previous database back."
    )]
    async fn sqlite_restore(
        &self,
        Parameters(input): Parameters<RestoreInput>,
    ) -> Result<Json<RestoreOutput>, McpError> {
        MaintenanceToolHandler::new(self.scope.clone())
            .restore(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Rebuild the database file and reclaim free space.")]
    async fn sqlite_vacuum(&self) -> Result<Json<StatusOutput>, McpError> {
        MaintenanceToolHandler::new(self.scope.clone())
            .vacuum()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Refresh query planner statistics.")]
    async fn sqlite_analyze(&self) -> Result<Json<StatusOutput>, McpError> {
        MaintenanceToolHandler::new(self.scope.clone())
            .analyze()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Run PRAGMA integrity_check and report the result.")]
    async fn sqlite_integrity_check(&self) -> Result<Json<IntegrityCheckOutput>, McpError> {
        MaintenanceToolHandler::new(self.scope.clone())
            .integrity_check()
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Export a table (optionally filtered) to a CSV file with a header row.\nNULL is written as `null_value` (default \\N); empty strings stay empty fields."
    )]
    async fn sqlite_export_csv(
        &self,
        Parameters(input): Parameters<ExportInput>,
    ) -> Result<Json<ExportOutput>, McpError> {
        TransferToolHandler::new(self.scope.clone())
            .export_csv(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Export a table (optionally filtered) to a JSON array of objects.")]
    async fn sqlite_export_json(
        &self,
        Parameters(input): Parameters<ExportInput>,
    ) -> Result<Json<ExportOutput>, McpError> {
        TransferToolHandler::new(self.scope.clone())
            .export_json(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Import a CSV file with a header row into an existing table.\nFields equal to `null_value` (default \\N) become NULL; set it to \"\" to read empty fields as NULL. All rows are inserted in one transaction."
    )]
    async fn sqlite_import_csv(
        &self,
        Parameters(input): Parameters<ImportInput>,
    ) -> Result<Json<ImportOutput>, McpError> {
        TransferToolHandler::new(self.scope.clone())
            .import_csv(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "Import a JSON array of objects into an existing table.\nAll rows are inserted in one transaction."
    )]
    async fn sqlite_import_json(
        &self,
        Parameters(input): Parameters<ImportInput>,
    ) -> Result<Json<ImportOutput>, McpError> {
        TransferToolHandler::new(self.scope.clone())
            .import_json(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(
        description = "List tools on another MCP server.\n`server_url` must be its streamable HTTP endpoint, e.g. http://localhost:8001/mcp."
    )]
    async fn mcp_proxy_list_tools(
        &self,
        Parameters(input): Parameters<ProxyListToolsInput>,
    ) -> Result<Json<ProxyListToolsOutput>, McpError> {
        ProxyToolHandler::new(self.proxy_timeout)
            .list_tools(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }

    #[tool(description = "Call a tool on another MCP server and return its result.")]
    async fn mcp_proxy_call_tool(
        &self,
        Parameters(input): Parameters<ProxyCallToolInput>,
    ) -> Result<Json<ProxyCallToolOutput>, McpError> {
        ProxyToolHandler::new(self.proxy_timeout)
            .call_tool(input)
            .await
            .map(Json)
            .map_err(McpError::from)
    }
}

#[tool_handler]
impl ServerHandler for AggregateService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sqlite-tools-mcp".to_owned(),
                title: Some("SQLite Tools MCP".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "Tools for one local SQLite database file.\n\
                \n\
                ## Workflow\n\
                1. Call `sqlite_list_tables` or `sqlite_describe_schema` to see what exists\n\
                2. Read with `sqlite_run_sql`, `sqlite_count_rows`, `sqlite_aggregate` or `sqlite_join`\n\
                3. Write with `sqlite_insert`, `sqlite_update`, `sqlite_delete` or `sqlite_upsert`\n\
                \n\
                ## Rules\n\
                - `sqlite_run_sql` accepts one SELECT/WITH statement; `sqlite_execute_ddl` one CREATE/DROP/ALTER/REINDEX\n\
                - Comments, PRAGMA, ATTACH/DETACH and `;` separators are rejected everywhere, including `where_clause`\n\
                - Pass values through `?` placeholders and `params`/`where_params`, never inline\n\
                - Each call runs in its own transaction; there is no multi-call transaction\n\
                \n\
                ## Other MCP servers\n\
                `mcp_proxy_list_tools` and `mcp_proxy_call_tool` reach any streamable HTTP MCP server."
                    .to_string(),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScopeSettings;

    fn create_test_service(dir: &tempfile::TempDir) -> AggregateService {
        let scope = ConnectionScope::new(ScopeSettings::new(dir.path().join("svc.db")));
        AggregateService::new(scope, Duration::from_secs(5))
    }

    #[test]
    fn test_server_info() {
        let dir = tempfile::TempDir::new().unwrap();
        let info = create_test_service(&dir).get_info();
        assert_eq!(info.server_info.name, "sqlite-tools-mcp");
        assert!(info.capabilities.tools.is_some());
    }

    #[test]
    fn test_every_tool_is_registered() {
        let dir = tempfile::TempDir::new().unwrap();
        let service = create_test_service(&dir);
        let mut names: Vec<String> = service
            .tool_router
            .list_all()
            .into_iter()
            .map(|t| t.name.to_string())
            .collect();
        names.sort();

        let mut expected = vec![
            "sqlite_init_demo",
            "sqlite_list_tables",
            "sqlite_run_sql",
            "sqlite_execute_ddl",
            "sqlite_describe_schema",
            "sqlite_insert",
            "sqlite_update",
            "sqlite_delete",
            "sqlite_upsert",
            "sqlite_count_rows",
            "sqlite_aggregate",
            "sqlite_join",
            "sqlite_drop_column",
            "sqlite_backup",
            "sqlite_restore",
            "sqlite_vacuum",
            "sqlite_analyze",
            "sqlite_integrity_check",
            "sqlite_export_csv",
            "sqlite_export_json",
            "sqlite_import_csv",
            "sqlite_import_json",
            "mcp_proxy_list_tools",
            "mcp_proxy_call_tool",
        ];
        expected.sort();
        assert_eq!(names, expected);
    }

    #[test]
    fn test_service_does_not_open_database() {
        let dir = tempfile::TempDir::new().unwrap();
        let service = create_test_service(&dir);
        assert_eq!(service.scope().open_handles(), 0);
        assert!(!dir.path().join("svc.db").exists());
    }
}
