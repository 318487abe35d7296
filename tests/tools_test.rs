//! End-to-end tests of the typed tools against a temporary database file.

use serde_json::json;
use sqlite_tools_mcp::db::{ConnectionScope, ScopeSettings};
use sqlite_tools_mcp::error::DbError;
use sqlite_tools_mcp::models::QueryParam;
use sqlite_tools_mcp::tools::aggregate::{
    AggregateInput, AggregateOp, AggregateToolHandler, CountRowsInput, JoinInput, JoinType,
};
use sqlite_tools_mcp::tools::ddl::{DdlToolHandler, ExecuteDdlInput};
use sqlite_tools_mcp::tools::demo::init_demo;
use sqlite_tools_mcp::tools::format::OutputFormat;
use sqlite_tools_mcp::tools::query::{QueryToolHandler, RunSqlInput};
use sqlite_tools_mcp::tools::schema::{DescribeSchemaInput, ListTablesInput, SchemaToolHandler};
use sqlite_tools_mcp::tools::write::{
    ColumnValues, DeleteInput, InsertInput, UpdateInput, UpsertInput, WriteToolHandler,
};
use tempfile::TempDir;

async fn demo_scope(dir: &TempDir) -> ConnectionScope {
    let scope = ConnectionScope::new(ScopeSettings::new(dir.path().join("demo.db")));
    init_demo(&scope).await.unwrap();
    scope
}

fn values(v: serde_json::Value) -> ColumnValues {
    v.as_object().unwrap().clone()
}

fn count_input(where_clause: Option<&str>, where_params: Vec<QueryParam>) -> CountRowsInput {
    CountRowsInput {
        table: "items".into(),
        where_clause: where_clause.map(String::from),
        where_params,
    }
}

fn run_sql(query: &str) -> RunSqlInput {
    RunSqlInput {
        query: query.to_string(),
        params: vec![],
        limit: None,
        format: OutputFormat::Json,
        decode_binary: true,
    }
}

async fn count(scope: &ConnectionScope) -> i64 {
    AggregateToolHandler::new(scope.clone())
        .count_rows(count_input(None, vec![]))
        .await
        .unwrap()
        .count
}

#[tokio::test]
async fn test_init_demo_is_idempotent() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let second = init_demo(&scope).await.unwrap();
    assert_eq!(second.status, "ok");
    assert_eq!(second.inserted, 0);

    let out = QueryToolHandler::new(scope.clone())
        .run_sql(run_sql("SELECT name, price FROM items ORDER BY name"))
        .await
        .unwrap();
    assert_eq!(out.row_count, 2);
    assert_eq!(out.rows[0]["name"], json!("gizmo"));
    assert_eq!(out.rows[1]["name"], json!("widget"));
    assert_eq!(out.rows[1]["price"], json!(9.99));
}

#[tokio::test]
async fn test_sum_of_demo_prices() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;

    let out = AggregateToolHandler::new(scope)
        .aggregate(AggregateInput {
            table: "items".into(),
            column: "price".into(),
            operation: AggregateOp::Sum,
            where_clause: None,
            where_params: vec![],
            group_by: vec![],
        })
        .await
        .unwrap();

    let value = out.value.and_then(|v| v.as_f64()).unwrap();
    assert!((value - 24.94).abs() < 1e-9, "got {}", value);
}

#[tokio::test]
async fn test_aggregate_grouped_and_filtered() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let handler = AggregateToolHandler::new(scope);

    let out = handler
        .aggregate(AggregateInput {
            table: "items".into(),
            column: "*".into(),
            operation: AggregateOp::Count,
            where_clause: Some("price > ?".into()),
            where_params: vec![QueryParam::Float(10.0)],
            group_by: vec!["name".into()],
        })
        .await
        .unwrap();

    let groups = out.groups.unwrap();
    assert_eq!(groups.len(), 1);
    assert_eq!(groups[0]["name"], json!("gizmo"));
    assert_eq!(groups[0]["value"], json!(1));

    let max = handler
        .aggregate(AggregateInput {
            table: "items".into(),
            column: "price".into(),
            operation: AggregateOp::Max,
            where_clause: Some("price > ?".into()),
            where_params: vec![QueryParam::Float(100.0)],
            group_by: vec![],
        })
        .await
        .unwrap();
    assert_eq!(max.value, Some(serde_json::Value::Null));
}

#[tokio::test]
async fn test_insert_adds_exactly_one_row() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let before = count(&scope).await;

    let out = WriteToolHandler::new(scope.clone())
        .insert(InsertInput {
            table: "items".into(),
            values: values(json!({"name": "foo", "price": 1.0})),
        })
        .await
        .unwrap();
    assert_eq!(out.rows_affected, 1);
    assert!(out.last_insert_id.is_some());
    assert_eq!(count(&scope).await, before + 1);
}

#[tokio::test]
async fn test_insert_constraint_violation_is_database_error() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;

    let err = WriteToolHandler::new(scope.clone())
        .insert(InsertInput {
            table: "items".into(),
            values: values(json!({"name": "widget", "price": 1.0})),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Database { .. }), "{:?}", err);
    assert_eq!(count(&scope).await, 2);
}

#[tokio::test]
async fn test_update_and_delete_need_a_filter() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let writer = WriteToolHandler::new(scope.clone());

    let unfiltered = writer
        .delete(DeleteInput {
            table: "items".into(),
            where_clause: None,
            where_params: vec![],
            allow_all_rows: false,
        })
        .await;
    assert!(unfiltered.is_err());
    assert_eq!(count(&scope).await, 2);

    let updated = writer
        .update(UpdateInput {
            table: "items".into(),
            values: values(json!({"price": 10.5})),
            where_clause: Some("name = ?".into()),
            where_params: vec![QueryParam::String("widget".into())],
            allow_all_rows: false,
        })
        .await
        .unwrap();
    assert_eq!(updated.rows_affected, 1);

    let deleted = writer
        .delete(DeleteInput {
            table: "items".into(),
            where_clause: Some("price > ?".into()),
            where_params: vec![QueryParam::Float(10.0)],
            allow_all_rows: false,
        })
        .await
        .unwrap();
    assert_eq!(deleted.rows_affected, 2);

    let none_left = writer
        .delete(DeleteInput {
            table: "items".into(),
            where_clause: None,
            where_params: vec![],
            allow_all_rows: true,
        })
        .await
        .unwrap();
    assert_eq!(none_left.rows_affected, 0);
}

#[tokio::test]
async fn test_where_clause_injection_rejected() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;

    let err = AggregateToolHandler::new(scope.clone())
        .count_rows(count_input(Some("1=1; DROP TABLE items"), vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Rejected { .. }));
    assert_eq!(count(&scope).await, 2);
}

#[tokio::test]
async fn test_upsert_updates_on_conflict() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let writer = WriteToolHandler::new(scope.clone());

    writer
        .upsert(UpsertInput {
            table: "items".into(),
            values: values(json!({"name": "widget", "price": 11.0})),
            conflict_columns: vec!["name".into()],
        })
        .await
        .unwrap();
    writer
        .upsert(UpsertInput {
            table: "items".into(),
            values: values(json!({"name": "doohickey", "price": 3.0})),
            conflict_columns: vec!["name".into()],
        })
        .await
        .unwrap();

    assert_eq!(count(&scope).await, 3);
    let out = QueryToolHandler::new(scope)
        .run_sql(RunSqlInput {
            params: vec![QueryParam::String("widget".into())],
            ..run_sql("SELECT price FROM items WHERE name = ?")
        })
        .await
        .unwrap();
    assert_eq!(out.rows[0]["price"], json!(11.0));
}

#[tokio::test]
async fn test_join_and_outer_join() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    DdlToolHandler::new(scope.clone())
        .execute_ddl(ExecuteDdlInput {
            sql: "CREATE TABLE orders (id INTEGER PRIMARY KEY, item_id INTEGER REFERENCES items(id), qty INTEGER)".into(),
        })
        .await
        .unwrap();
    WriteToolHandler::new(scope.clone())
        .insert(InsertInput {
            table: "orders".into(),
            values: values(json!({"item_id": 1, "qty": 3})),
        })
        .await
        .unwrap();

    let handler = AggregateToolHandler::new(scope);
    let inner = handler
        .join(JoinInput {
            left_table: "orders".into(),
            right_table: "items".into(),
            left_column: "item_id".into(),
            right_column: "id".into(),
            join_type: JoinType::Inner,
            columns: Some(vec!["items.name".into(), "orders.qty".into()]),
            limit: None,
        })
        .await
        .unwrap();
    assert_eq!(inner.row_count, 1);
    assert_eq!(inner.columns, vec!["name".to_string(), "qty".to_string()]);
    assert_eq!(inner.rows[0]["name"], json!("widget"));

    // Depends on the linked SQLite: either both items come back or the version is refused
    let right = handler
        .join(JoinInput {
            left_table: "orders".into(),
            right_table: "items".into(),
            left_column: "item_id".into(),
            right_column: "id".into(),
            join_type: JoinType::Right,
            columns: Some(vec!["items.name".into(), "orders.qty".into()]),
            limit: Some(10),
        })
        .await;
    match right {
        Ok(out) => assert_eq!(out.row_count, 2),
        Err(e) => assert!(matches!(e, DbError::Unsupported { .. }), "{:?}", e),
    }
}

#[tokio::test]
async fn test_run_sql_rejects_stacked_statement_and_keeps_table() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let handler = QueryToolHandler::new(scope.clone());

    let err = handler
        .run_sql(run_sql("SELECT 1; DROP TABLE items"))
        .await
        .unwrap_err();
    assert!(matches!(err, DbError::Rejected { .. }));
    assert_eq!(count(&scope).await, 2);
}

#[tokio::test]
async fn test_run_sql_cte_prefixed_writes_fail_and_change_nothing() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let handler = QueryToolHandler::new(scope.clone());

    for sql in [
        "WITH x AS (SELECT 1) DELETE FROM items",
        "WITH x AS (SELECT 1) UPDATE items SET price = 0",
        "WITH x AS (SELECT 'evil', 0.0) INSERT INTO items (name, price) SELECT * FROM x",
    ] {
        let err = handler.run_sql(run_sql(sql)).await.unwrap_err();
        assert!(matches!(err, DbError::Database { .. }), "{}: {:?}", sql, err);
    }

    assert_eq!(count(&scope).await, 2);
    let out = handler
        .run_sql(run_sql("SELECT SUM(price) AS total FROM items"))
        .await
        .unwrap();
    let total = out.rows[0]["total"].as_f64().unwrap();
    assert!((total - 24.94).abs() < 1e-9);
    assert_eq!(scope.open_handles(), 0);
}

#[tokio::test]
async fn test_run_sql_limit_and_table_format() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let handler = QueryToolHandler::new(scope);

    let out = handler
        .run_sql(RunSqlInput {
            limit: Some(1),
            ..run_sql("SELECT name FROM items ORDER BY id")
        })
        .await
        .unwrap();
    assert_eq!(out.row_count, 1);
    assert!(out.truncated);

    let out = handler
        .run_sql(RunSqlInput {
            format: OutputFormat::Table,
            ..run_sql("SELECT name FROM items ORDER BY id")
        })
        .await
        .unwrap();
    assert!(out.rows.is_empty());
    assert!(out.formatted.unwrap().contains("| widget |"));
}

#[tokio::test]
async fn test_list_and_describe_schema() {
    let dir = TempDir::new().unwrap();
    let scope = demo_scope(&dir).await;
    let handler = SchemaToolHandler::new(scope);

    let tables = handler
        .list_tables(ListTablesInput::default())
        .await
        .unwrap();
    assert_eq!(tables.count, 1);
    assert_eq!(tables.tables[0].name, "items");

    let schema = handler
        .describe_schema(DescribeSchemaInput {
            table: Some("items".into()),
        })
        .await
        .unwrap();
    let items = &schema.tables[0];
    assert_eq!(items.primary_key, vec!["id".to_string()]);
    assert_eq!(items.column_names(), vec!["id", "name", "price"]);
    assert!(items.indexes.iter().any(|i| i.is_unique));

    let missing = handler
        .describe_schema(DescribeSchemaInput {
            table: Some("nope".into()),
        })
        .await;
    assert!(missing.is_err());
}
