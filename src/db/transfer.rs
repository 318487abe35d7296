//! Streaming CSV and JSON transfer between a table and a file.
//!
//! Exports pull rows from the engine one at a time and write them to a sibling
//! temporary, which is renamed over the destination once the last row is out.
//! Imports parse the file on a blocking task and hand rows over a bounded channel,
//! so neither side ever holds the whole table.
//!
//! CSV has no NULL of its own. NULL is written as a marker field (`\N` unless the
//! caller picks another) and only that exact field reads back as NULL; an empty
//! field is the empty string. Every other CSV field is bound as text and converted
//! by the column's affinity on insert. JSON keeps types as they are.

use crate::db::backup::sidecar_path;
use crate::db::executor::describe_columns;
use crate::db::identifier::{quote_column_list, quote_identifier};
use crate::db::params::bind_all;
use crate::db::types::{column_names, json_to_csv_field, row_to_json};
use crate::error::{DbError, DbResult};
use crate::models::{JsonRow, QueryParam};
use futures_util::TryStreamExt;
use serde::de::{DeserializeSeed, Error as _, SeqAccess, Visitor};
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteConnection;
use std::fmt;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::debug;

/// CSV field standing for NULL when the caller does not choose one.
pub const DEFAULT_NULL_VALUE: &str = "\\N";

/// Rows in flight between the file parser and the inserting scope.
const CHANNEL_ROWS: usize = 256;

/// Encoded bytes buffered before a write to the export file.
const FLUSH_BYTES: usize = 64 * 1024;

/// File format of a transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferFormat {
    Csv,
    Json,
}

impl TransferFormat {
    pub fn name(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Json => "json",
        }
    }
}

/// One decoded row of an import file.
#[derive(Debug, Clone, PartialEq)]
pub struct ImportRow {
    pub columns: Arc<[String]>,
    pub values: Vec<QueryParam>,
}

fn csv_error(err: csv::Error) -> DbError {
    DbError::invalid_input(format!("CSV error: {}", err))
}

/// Incremental encoder for one export file.
enum RowEncoder {
    Csv {
        wtr: csv::Writer<Vec<u8>>,
        columns: Vec<String>,
        null_value: String,
    },
    Json {
        buf: Vec<u8>,
        rows: u64,
    },
}

impl RowEncoder {
    fn new(format: TransferFormat, null_value: &str) -> Self {
        match format {
            TransferFormat::Csv => Self::Csv {
                wtr: csv::Writer::from_writer(Vec::new()),
                columns: Vec::new(),
                null_value: null_value.to_string(),
            },
            TransferFormat::Json => Self::Json {
                buf: Vec::new(),
                rows: 0,
            },
        }
    }

    fn begin(&mut self, header: Vec<String>) -> DbResult<()> {
        match self {
            Self::Csv { wtr, columns, .. } => {
                wtr.write_record(&header).map_err(csv_error)?;
                *columns = header;
            }
            Self::Json { buf, .. } => buf.push(b'['),
        }
        Ok(())
    }

    fn push(&mut self, row: &JsonRow) -> DbResult<()> {
        match self {
            Self::Csv {
                wtr,
                columns,
                null_value,
            } => {
                let record = columns.iter().map(|c| match row.get(c) {
                    None | Some(JsonValue::Null) => null_value.clone(),
                    Some(value) => json_to_csv_field(value),
                });
                wtr.write_record(record).map_err(csv_error)?;
            }
            Self::Json { buf, rows } => {
                if *rows > 0 {
                    buf.push(b',');
                }
                buf.extend_from_slice(b"\n  ");
                serde_json::to_writer(&mut *buf, row)
                    .map_err(|e| DbError::internal(format!("Failed to encode JSON: {}", e)))?;
                *rows += 1;
            }
        }
        Ok(())
    }

    fn end(&mut self) {
        if let Self::Json { buf, rows } = self {
            if *rows > 0 {
                buf.push(b'\n');
            }
            buf.extend_from_slice(b"]\n");
        }
    }

    fn pending(&self) -> usize {
        match self {
            Self::Csv { wtr, .. } => wtr.get_ref().len(),
            Self::Json { buf, .. } => buf.len(),
        }
    }

    /// Hand over everything encoded so far.
    fn take(&mut self) -> DbResult<Vec<u8>> {
        match self {
            Self::Csv { wtr, .. } => {
                let done = std::mem::replace(wtr, csv::Writer::from_writer(Vec::new()));
                done.into_inner()
                    .map_err(|e| DbError::internal(format!("Failed to finish CSV output: {}", e)))
            }
            Self::Json { buf, .. } => Ok(std::mem::take(buf)),
        }
    }
}

struct ExportFile<'a> {
    file: tokio::fs::File,
    path: &'a Path,
    encoder: RowEncoder,
}

impl<'a> ExportFile<'a> {
    async fn create(path: &'a Path, format: TransferFormat, null_value: &str) -> DbResult<Self> {
        let file = tokio::fs::File::create(path)
            .await
            .map_err(|e| DbError::io(path, e))?;
        Ok(Self {
            file,
            path,
            encoder: RowEncoder::new(format, null_value),
        })
    }

    async fn flush_pending(&mut self) -> DbResult<()> {
        let bytes = self.encoder.take()?;
        self.file
            .write_all(&bytes)
            .await
            .map_err(|e| DbError::io(self.path, e))
    }

    async fn finish(mut self) -> DbResult<()> {
        self.encoder.end();
        self.flush_pending().await?;
        self.file
            .flush()
            .await
            .map_err(|e| DbError::io(self.path, e))
    }
}

/// Stream the rows of `sql` into `dest`, returning the number of rows written.
///
/// `dest` only appears once every row has been written; on error it is left as
/// it was.
pub async fn export_query(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[QueryParam],
    format: TransferFormat,
    null_value: &str,
    dest: &Path,
) -> DbResult<u64> {
    let temp = sidecar_path(dest, &format!(".export-{}.tmp", uuid::Uuid::new_v4()));

    let written = match write_rows(conn, sql, params, format, null_value, &temp).await {
        Ok(count) => tokio::fs::rename(&temp, dest)
            .await
            .map(|_| count)
            .map_err(|e| DbError::io(dest, e)),
        Err(e) => Err(e),
    };
    if written.is_err() {
        if let Err(rm) = tokio::fs::remove_file(&temp).await {
            debug!(path = %temp.display(), error = %rm, "Could not remove export temporary");
        }
    }
    written
}

async fn write_rows(
    conn: &mut SqliteConnection,
    sql: &str,
    params: &[QueryParam],
    format: TransferFormat,
    null_value: &str,
    path: &Path,
) -> DbResult<u64> {
    let mut out = ExportFile::create(path, format, null_value).await?;
    let mut count: u64 = 0;

    {
        let mut rows = bind_all(sqlx::query(sql), params).fetch(&mut *conn);
        while let Some(row) = rows.try_next().await? {
            if count == 0 {
                out.encoder.begin(column_names(&row))?;
            }
            out.encoder.push(&row_to_json(&row, false))?;
            count += 1;
            if out.encoder.pending() >= FLUSH_BYTES {
                out.flush_pending().await?;
            }
        }
    }

    if count == 0 {
        out.encoder.begin(describe_columns(conn, sql).await?)?;
    }
    out.finish().await?;
    Ok(count)
}

/// Rows of an import file, parsed on a blocking task as they are consumed.
pub struct RowReader {
    rx: mpsc::Receiver<DbResult<ImportRow>>,
    task: JoinHandle<()>,
}

impl RowReader {
    /// Open `path` and start parsing it. A missing or unreadable file fails here,
    /// before any database work.
    pub async fn open(path: &Path, format: TransferFormat, null_value: &str) -> DbResult<Self> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| DbError::io(path, e))?
            .into_std()
            .await;

        let (tx, rx) = mpsc::channel(CHANNEL_ROWS);
        let null_value = null_value.to_string();
        let task = tokio::task::spawn_blocking(move || {
            let reader = std::io::BufReader::new(file);
            let parsed = match format {
                TransferFormat::Csv => read_csv(reader, &null_value, &tx),
                TransferFormat::Json => read_json(reader, &tx),
            };
            if let Err(e) = parsed {
                // Receiver may be gone already; nothing left to report to
                let _ = tx.blocking_send(Err(e));
            }
        });

        Ok(Self { rx, task })
    }

    pub async fn next(&mut self) -> Option<DbResult<ImportRow>> {
        self.rx.recv().await
    }

    /// Wait for the parser task after the last row.
    pub async fn finish(self) -> DbResult<()> {
        drop(self.rx);
        self.task
            .await
            .map_err(|e| DbError::internal(format!("Import reader failed: {}", e)))
    }
}

type RowSender = mpsc::Sender<DbResult<ImportRow>>;

fn read_csv(reader: impl Read, null_value: &str, tx: &RowSender) -> DbResult<()> {
    let mut rdr = csv::Reader::from_reader(reader);
    let columns: Arc<[String]> = rdr
        .headers()
        .map_err(csv_error)?
        .iter()
        .map(|h| h.trim().to_string())
        .collect();
    if columns.is_empty() || columns.iter().all(|c| c.is_empty()) {
        return Err(DbError::invalid_input("CSV file has no header row"));
    }

    for record in rdr.records() {
        let record = record.map_err(csv_error)?;
        let values = record
            .iter()
            .map(|field| {
                if field == null_value {
                    QueryParam::Null
                } else {
                    QueryParam::String(field.to_string())
                }
            })
            .collect();
        let row = ImportRow {
            columns: columns.clone(),
            values,
        };
        if tx.blocking_send(Ok(row)).is_err() {
            return Ok(());
        }
    }
    Ok(())
}

fn read_json(reader: impl Read, tx: &RowSender) -> DbResult<()> {
    let invalid = |e: serde_json::Error| DbError::invalid_input(format!("Invalid JSON: {}", e));
    let mut de = serde_json::Deserializer::from_reader(reader);
    let finished = JsonRows { tx }.deserialize(&mut de).map_err(invalid)?;
    if finished {
        de.end().map_err(invalid)?;
    }
    Ok(())
}

fn json_object_to_row(index: usize, item: JsonValue) -> DbResult<ImportRow> {
    let JsonValue::Object(obj) = item else {
        return Err(DbError::invalid_input(format!(
            "Element {} of the JSON array is not an object",
            index
        )));
    };
    let columns: Arc<[String]> = obj.keys().cloned().collect();
    let values = obj
        .values()
        .map(QueryParam::from_json)
        .collect::<DbResult<Vec<_>>>()?;
    Ok(ImportRow { columns, values })
}

/// Sends each element of a top-level JSON array as it is parsed. Yields `false`
/// when the receiver hung up before the end of the array.
struct JsonRows<'a> {
    tx: &'a RowSender,
}

impl<'de> DeserializeSeed<'de> for JsonRows<'_> {
    type Value = bool;

    fn deserialize<D>(self, deserializer: D) -> Result<bool, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        deserializer.deserialize_seq(self)
    }
}

impl<'de> Visitor<'de> for JsonRows<'_> {
    type Value = bool;

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("an array of objects")
    }

    fn visit_seq<A>(self, mut seq: A) -> Result<bool, A::Error>
    where
        A: SeqAccess<'de>,
    {
        let mut index = 0;
        while let Some(item) = seq.next_element::<JsonValue>()? {
            let row = json_object_to_row(index, item).map_err(A::Error::custom)?;
            if self.tx.blocking_send(Ok(row)).is_err() {
                return Ok(false);
            }
            index += 1;
        }
        Ok(true)
    }
}

fn insert_sql(table_sql: &str, columns: &[String]) -> DbResult<String> {
    if columns.is_empty() {
        return Ok(format!("INSERT INTO {} DEFAULT VALUES", table_sql));
    }
    Ok(format!(
        "INSERT INTO {} ({}) VALUES ({})",
        table_sql,
        quote_column_list(columns)?,
        vec!["?"; columns.len()].join(", ")
    ))
}

/// Insert every row `reader` yields into `table`, returning the number inserted.
///
/// Runs on the caller's handle, so the whole file commits or rolls back with the
/// enclosing scope. Rows keep their file order.
pub async fn insert_rows(
    conn: &mut SqliteConnection,
    table: &str,
    mut reader: RowReader,
) -> DbResult<u64> {
    let table_sql = quote_identifier(table, "table")?;
    let mut columns: Option<Arc<[String]>> = None;
    let mut sql = String::new();
    let mut inserted = 0;
    let mut line = 0;

    while let Some(row) = reader.next().await {
        let row = row?;
        line += 1;
        if row.values.len() != row.columns.len() {
            return Err(DbError::invalid_input(format!(
                "Row {} has {} values but {} columns were declared",
                line,
                row.values.len(),
                row.columns.len()
            )));
        }
        if columns.as_ref() != Some(&row.columns) {
            sql = insert_sql(&table_sql, &row.columns)?;
            columns = Some(row.columns.clone());
        }
        inserted += bind_all(sqlx::query(&sql), &row.values)
            .execute(&mut *conn)
            .await?
            .rows_affected();
    }

    reader.finish().await?;
    Ok(inserted)
}
