//! SQLite value to JSON mapping.
//!
//! SQLite is dynamically typed: the declared column type is only an affinity hint and
//! a single column can hold values of every storage class. Decoding therefore follows
//! the storage class of each individual value, not the declared type.

use crate::models::JsonRow;
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Row, TypeInfo, ValueRef};

/// Runtime storage class of a single value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageClass {
    Null,
    Integer,
    Real,
    Text,
    Blob,
}

impl StorageClass {
    /// Classify the type name sqlx reports for a value.
    pub fn from_type_name(name: &str) -> Self {
        match name.to_ascii_uppercase().as_str() {
            "NULL" => Self::Null,
            "INTEGER" | "INT" | "INT8" | "BIGINT" | "BOOLEAN" => Self::Integer,
            "REAL" | "FLOAT" | "DOUBLE" | "NUMERIC" => Self::Real,
            "BLOB" => Self::Blob,
            _ => Self::Text,
        }
    }
}

/// Decode binary data to JSON value.
///
/// If `decode_binary` is true, attempts to decode as UTF-8 text first.
/// Falls back to base64 encoding if not valid UTF-8 or if `decode_binary` is false.
pub fn decode_binary_value(bytes: &[u8], decode_binary: bool) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    if decode_binary {
        if let Ok(s) = std::str::from_utf8(bytes) {
            return JsonValue::String(s.to_string());
        }
    }
    JsonValue::String(STANDARD.encode(bytes))
}

/// Map a float to JSON; NaN and infinities have no JSON number form.
pub fn float_to_json(v: f64) -> JsonValue {
    serde_json::Number::from_f64(v)
        .map(JsonValue::Number)
        .unwrap_or_else(|| JsonValue::String(v.to_string()))
}

/// Column names of a row, in selection order.
pub fn column_names(row: &SqliteRow) -> Vec<String> {
    row.columns().iter().map(|c| c.name().to_string()).collect()
}

/// Convert a row into a JSON map keyed by column name.
pub fn row_to_json(row: &SqliteRow, decode_binary: bool) -> JsonRow {
    row.columns()
        .iter()
        .enumerate()
        .map(|(idx, col)| (col.name().to_string(), decode_column(row, idx, decode_binary)))
        .collect()
}

/// Decode one column of a row by the value's storage class.
pub fn decode_column(row: &SqliteRow, idx: usize, decode_binary: bool) -> JsonValue {
    let class = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => StorageClass::Null,
        Ok(raw) => StorageClass::from_type_name(raw.type_info().name()),
        Err(e) => {
            tracing::warn!(column = idx, error = %e, "Failed to read column value");
            return JsonValue::Null;
        }
    };

    let decoded = match class {
        StorageClass::Null => return JsonValue::Null,
        StorageClass::Integer => row
            .try_get_unchecked::<i64, _>(idx)
            .map(|v| JsonValue::Number(v.into())),
        StorageClass::Real => row.try_get_unchecked::<f64, _>(idx).map(float_to_json),
        StorageClass::Text => row
            .try_get_unchecked::<String, _>(idx)
            .map(JsonValue::String),
        StorageClass::Blob => row
            .try_get_unchecked::<Vec<u8>, _>(idx)
            .map(|v| decode_binary_value(&v, decode_binary)),
    };

    decoded.unwrap_or_else(|e| {
        tracing::warn!(column = idx, storage_class = ?class, error = %e, "Failed to decode column");
        JsonValue::Null
    })
}

/// Render a JSON cell as CSV text. NULL becomes the empty field.
pub fn json_to_csv_field(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => String::new(),
        JsonValue::Bool(b) => if *b { "1" } else { "0" }.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}
