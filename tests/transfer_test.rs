//! Export then import through CSV and JSON reproduces the original rows.

use serde_json::Value as JsonValue;
use sqlite_tools_mcp::db::{ConnectionScope, ScopeSettings};
use sqlite_tools_mcp::models::{JsonRow, QueryParam};
use sqlite_tools_mcp::tools::ddl::{DdlToolHandler, ExecuteDdlInput};
use sqlite_tools_mcp::tools::format::OutputFormat;
use sqlite_tools_mcp::tools::query::{QueryToolHandler, RunSqlInput};
use sqlite_tools_mcp::tools::transfer::{ExportInput, ImportInput, TransferToolHandler};
use std::collections::BTreeSet;
use tempfile::TempDir;

const SHAPE: &str =
    "(id INTEGER PRIMARY KEY, name TEXT, price REAL, qty INTEGER, note TEXT, code TEXT NOT NULL)";

async fn setup(dir: &TempDir) -> ConnectionScope {
    let scope = ConnectionScope::new(ScopeSettings::new(dir.path().join("transfer.db")));
    let ddl = DdlToolHandler::new(scope.clone());
    for table in ["source", "from_csv", "from_json"] {
        ddl.execute_ddl(ExecuteDdlInput {
            sql: format!("CREATE TABLE {} {}", table, SHAPE),
        })
        .await
        .unwrap();
    }

    scope
        .run(|conn| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO source (name, price, qty, note, code) VALUES \
                     ('widget', 9.99, 3, 'plain', 'W1'), \
                     ('gizmo', 14.95, NULL, 'has, comma', ''), \
                     ('thing \"quoted\"', NULL, 0, NULL, 'T'), \
                     ('ünïcödé', 0.5, -7, 'line\nbreak', ''), \
                     ('', NULL, NULL, '', 'E')",
                )
                .execute(conn)
                .await?;
                Ok(())
            })
        })
        .await
        .unwrap();
    scope
}

/// Rows of `table` as a set of canonical JSON strings.
async fn row_set(scope: &ConnectionScope, table: &str) -> BTreeSet<String> {
    let out = QueryToolHandler::new(scope.clone())
        .run_sql(RunSqlInput {
            query: format!("SELECT * FROM {}", table),
            params: vec![],
            limit: Some(1000),
            format: OutputFormat::Json,
            decode_binary: true,
        })
        .await
        .unwrap();
    out.rows
        .iter()
        .map(|r: &JsonRow| JsonValue::Object(r.clone()).to_string())
        .collect()
}

#[tokio::test]
async fn test_csv_round_trip() {
    let dir = TempDir::new().unwrap();
    let scope = setup(&dir).await;
    let handler = TransferToolHandler::new(scope.clone());
    let file = dir.path().join("source.csv");

    let exported = handler
        .export_csv(ExportInput {
            table: "source".into(),
            path: file.display().to_string(),
            where_clause: None,
            where_params: vec![],
            null_value: None,
        })
        .await
        .unwrap();
    assert_eq!(exported.row_count, 5);

    let imported = handler
        .import_csv(ImportInput {
            table: "from_csv".into(),
            path: file.display().to_string(),
            null_value: None,
        })
        .await
        .unwrap();
    assert_eq!(imported.row_count, 5);

    assert_eq!(row_set(&scope, "source").await, row_set(&scope, "from_csv").await);
}

#[tokio::test]
async fn test_json_round_trip() {
    let dir = TempDir::new().unwrap();
    let scope = setup(&dir).await;
    let handler = TransferToolHandler::new(scope.clone());
    let file = dir.path().join("source.json");

    handler
        .export_json(ExportInput {
            table: "source".into(),
            path: file.display().to_string(),
            where_clause: None,
            where_params: vec![],
            null_value: None,
        })
        .await
        .unwrap();

    let imported = handler
        .import_json(ImportInput {
            table: "from_json".into(),
            path: file.display().to_string(),
            null_value: None,
        })
        .await
        .unwrap();
    assert_eq!(imported.row_count, 5);

    assert_eq!(row_set(&scope, "source").await, row_set(&scope, "from_json").await);
}

#[tokio::test]
async fn test_export_unknown_table_writes_nothing() {
    let dir = TempDir::new().unwrap();
    let scope = setup(&dir).await;
    let file = dir.path().join("ghost.csv");

    let result = TransferToolHandler::new(scope)
        .export_csv(ExportInput {
            table: "ghost".into(),
            path: file.display().to_string(),
            where_clause: None,
            where_params: vec![],
            null_value: None,
        })
        .await;
    assert!(result.is_err());
    assert!(!file.exists());
}

#[tokio::test]
async fn test_csv_keeps_empty_strings_apart_from_null() {
    let dir = TempDir::new().unwrap();
    let scope = setup(&dir).await;
    let handler = TransferToolHandler::new(scope.clone());
    let file = dir.path().join("empties.csv");

    handler
        .export_csv(ExportInput {
            table: "source".into(),
            path: file.display().to_string(),
            where_clause: Some("code = ?".into()),
            where_params: vec![QueryParam::String(String::new())],
            null_value: None,
        })
        .await
        .unwrap();
    let text = std::fs::read_to_string(&file).unwrap();
    assert!(text.contains(",\\N,"), "{}", text);

    let imported = handler
        .import_csv(ImportInput {
            table: "from_csv".into(),
            path: file.display().to_string(),
            null_value: None,
        })
        .await
        .unwrap();
    assert_eq!(imported.row_count, 2);

    let out = QueryToolHandler::new(scope)
        .run_sql(RunSqlInput {
            query: "SELECT COUNT(*) AS n FROM from_csv WHERE code = '' AND qty IS NULL".into(),
            params: vec![],
            limit: None,
            format: OutputFormat::Json,
            decode_binary: true,
        })
        .await
        .unwrap();
    assert_eq!(out.rows[0]["n"], serde_json::json!(1));
}

#[tokio::test]
async fn test_csv_import_with_empty_null_value() {
    let dir = TempDir::new().unwrap();
    let scope = setup(&dir).await;
    let file = dir.path().join("foreign.csv");
    std::fs::write(&file, "name,price,code
bolt,,B
").unwrap();

    TransferToolHandler::new(scope.clone())
        .import_csv(ImportInput {
            table: "from_csv".into(),
            path: file.display().to_string(),
            null_value: Some(String::new()),
        })
        .await
        .unwrap();

    let out = QueryToolHandler::new(scope)
        .run_sql(RunSqlInput {
            query: "SELECT price FROM from_csv WHERE name = 'bolt'".into(),
            params: vec![],
            limit: None,
            format: OutputFormat::Json,
            decode_binary: true,
        })
        .await
        .unwrap();
    assert_eq!(out.rows[0]["price"], JsonValue::Null);
}
