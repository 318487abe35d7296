//! CSV and JSON import/export tools.
//!
//! This module implements `sqlite_export_csv`, `sqlite_export_json`,
//! `sqlite_import_csv` and `sqlite_import_json`. Both directions stream: exports
//! write rows as the engine yields them, imports insert rows as the file is parsed,
//! all inside one scope so an import is all-or-nothing.

use crate::db::identifier::quote_identifier;
use crate::db::transfer::{self, DEFAULT_NULL_VALUE, RowReader, TransferFormat};
use crate::db::{ConnectionScope, SchemaInspector};
use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use crate::tools::predicate::Predicate;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Input for the export tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExportInput {
    pub table: String,
    /// Destination file. Overwritten if it exists.
    pub path: String,
    /// Optional filter such as `price > ?`
    #[serde(default)]
    pub where_clause: Option<String>,
    /// Values for the `?` placeholders in where_clause
    #[serde(default)]
    pub where_params: Vec<QueryParam>,
    /// CSV only: field written for NULL. Default: \N
    #[serde(default)]
    pub null_value: Option<String>,
}

/// Output from the export tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ExportOutput {
    pub path: String,
    pub row_count: u64,
}

/// Input for the import tools.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ImportInput {
    /// Existing table to insert into
    pub table: String,
    /// Source file
    pub path: String,
    /// CSV only: field read as NULL. Default: \N. Use "" to treat empty fields as NULL.
    #[serde(default)]
    pub null_value: Option<String>,
}

/// Output from the import tools.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct ImportOutput {
    pub row_count: u64,
}

fn non_empty_path(path: &str) -> DbResult<PathBuf> {
    let path = path.trim();
    if path.is_empty() {
        return Err(DbError::invalid_input("path must not be empty"));
    }
    Ok(PathBuf::from(path))
}

fn table_not_found(table: &str) -> DbError {
    DbError::invalid_input(format!("Table '{}' not found", table))
}

/// Handler for import/export tools.
pub struct TransferToolHandler {
    scope: ConnectionScope,
}

impl TransferToolHandler {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    pub async fn export_csv(&self, input: ExportInput) -> DbResult<ExportOutput> {
        self.export(input, TransferFormat::Csv).await
    }

    pub async fn export_json(&self, input: ExportInput) -> DbResult<ExportOutput> {
        self.export(input, TransferFormat::Json).await
    }

    pub async fn import_csv(&self, input: ImportInput) -> DbResult<ImportOutput> {
        self.import(input, TransferFormat::Csv).await
    }

    pub async fn import_json(&self, input: ImportInput) -> DbResult<ImportOutput> {
        self.import(input, TransferFormat::Json).await
    }

    async fn export(&self, input: ExportInput, format: TransferFormat) -> DbResult<ExportOutput> {
        let path = non_empty_path(&input.path)?;
        let table_sql = quote_identifier(&input.table, "table")?;
        let predicate = Predicate::build(input.where_clause.as_deref(), input.where_params)?;
        let sql = format!("SELECT * FROM {}{}", table_sql, predicate.sql);
        let params = predicate.params;
        let null_value = input
            .null_value
            .unwrap_or_else(|| DEFAULT_NULL_VALUE.to_string());
        let table = input.table.clone();
        let dest = path.clone();

        let row_count = self
            .scope
            .run(move |conn| {
                Box::pin(async move {
                    if !SchemaInspector::table_exists(conn, &table).await? {
                        return Err(table_not_found(&table));
                    }
                    transfer::export_query(conn, &sql, &params, format, &null_value, &dest).await
                })
            })
            .await?;

        info!(
            table = %input.table,
            path = %path.display(),
            format = format.name(),
            row_count = row_count,
            "Table exported"
        );
        Ok(ExportOutput {
            path: path.display().to_string(),
            row_count,
        })
    }

    async fn import(&self, input: ImportInput, format: TransferFormat) -> DbResult<ImportOutput> {
        let path = non_empty_path(&input.path)?;
        quote_identifier(&input.table, "table")?;
        let null_value = input.null_value.as_deref().unwrap_or(DEFAULT_NULL_VALUE);

        let reader = RowReader::open(&path, format, null_value).await?;
        let table = input.table.clone();

        let row_count = self
            .scope
            .run(move |conn| {
                Box::pin(async move {
                    if !SchemaInspector::table_exists(conn, &table).await? {
                        return Err(table_not_found(&table));
                    }
                    transfer::insert_rows(conn, &table, reader).await
                })
            })
            .await?;

        info!(
            table = %input.table,
            path = %path.display(),
            format = format.name(),
            row_count = row_count,
            "File imported"
        );
        Ok(ImportOutput { row_count })
    }
}
