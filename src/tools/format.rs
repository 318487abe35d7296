//! Output formatting utilities for MCP tools.
//!
//! Shared by every tool that can return rows as a pre-rendered text table.

use crate::models::JsonRow;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use unicode_width::UnicodeWidthStr;

/// Output format for row results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// JSON format (default)
    #[default]
    Json,
    /// ASCII table format (like the sqlite3 shell in `.mode table`)
    Table,
    /// Markdown table format
    Markdown,
}

/// Format bytes as human-readable size string.
///
/// Uses binary units (1 kB = 1024 bytes) via the `humansize` WINDOWS preset.
///
/// # Examples
///
/// ```
/// use sqlite_tools_mcp::tools::format::format_size;
///
/// assert_eq!(format_size(512), "512 B");
/// assert_eq!(format_size(1024), "1 kB");
/// assert_eq!(format_size(1048576), "1 MB");
/// ```
pub fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::WINDOWS)
}

pub fn format_value(value: &JsonValue) -> String {
    match value {
        JsonValue::Null => "NULL".to_string(),
        JsonValue::Bool(b) => b.to_string(),
        JsonValue::Number(n) => n.to_string(),
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Render rows as a boxed ASCII table. Numbers are right-aligned.
pub fn format_as_table(
    columns: &[String],
    rows: &[JsonRow],
    truncated: bool,
    execution_time_ms: u64,
) -> String {
    if columns.is_empty() {
        return "Empty set".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.width()).collect();
    for row in rows {
        for (i, col) in columns.iter().enumerate() {
            if let Some(value) = row.get(col) {
                widths[i] = widths[i].max(format_value(value).width());
            }
        }
    }

    let separator: String = widths
        .iter()
        .map(|w| format!("+{}", "-".repeat(w + 2)))
        .collect::<String>()
        + "+\n";

    let mut output = separator.clone();
    for (col, w) in columns.iter().zip(&widths) {
        output.push_str(&format!("| {} ", pad(col, *w, Align::Center)));
    }
    output.push_str("|\n");
    output.push_str(&separator);

    for row in rows {
        for (col, w) in columns.iter().zip(&widths) {
            let value = row.get(col).unwrap_or(&JsonValue::Null);
            let align = if value.is_number() {
                Align::Right
            } else {
                Align::Left
            };
            output.push_str(&format!("| {} ", pad(&format_value(value), *w, align)));
        }
        output.push_str("|\n");
    }
    output.push_str(&separator);

    let row_text = if rows.len() == 1 { "row" } else { "rows" };
    let truncated_text = if truncated { " (truncated)" } else { "" };
    output.push_str(&format!(
        "{} {} in set{} ({:.2} sec)\n",
        rows.len(),
        row_text,
        truncated_text,
        execution_time_ms as f64 / 1000.0
    ));
    output
}

/// Render rows as a Markdown table. `|` inside values is escaped.
pub fn format_as_markdown(columns: &[String], rows: &[JsonRow], truncated: bool) -> String {
    if columns.is_empty() {
        return "*Empty set*".to_string();
    }

    let mut output: String = columns
        .iter()
        .map(|c| format!("| {} ", escape_markdown(c)))
        .collect::<String>()
        + "|\n";
    output.push_str(&(columns.iter().map(|_| "|---").collect::<String>() + "|\n"));

    for row in rows {
        let line: String = columns
            .iter()
            .map(|col| {
                let value = row.get(col).unwrap_or(&JsonValue::Null);
                format!("| {} ", escape_markdown(&format_value(value)))
            })
            .collect();
        output.push_str(&line);
        output.push_str("|\n");
    }

    let truncated_text = if truncated { " *(truncated)*" } else { "" };
    output.push_str(&format!("\n*{} rows*{}", rows.len(), truncated_text));
    output
}

#[derive(Clone, Copy)]
enum Align {
    Left,
    Right,
    Center,
}

/// Pad by display width; `format!` width counts chars, which misaligns CJK and emoji.
fn pad(s: &str, width: usize, align: Align) -> String {
    let fill = width.saturating_sub(s.width());
    match align {
        Align::Left => format!("{}{}", s, " ".repeat(fill)),
        Align::Right => format!("{}{}", " ".repeat(fill), s),
        Align::Center => {
            let left = fill / 2;
            format!("{}{}{}", " ".repeat(left), s, " ".repeat(fill - left))
        }
    }
}

fn escape_markdown(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn sample() -> (Vec<String>, Vec<JsonRow>) {
        let columns = vec!["name".to_string(), "price".to_string()];
        let mut row = JsonRow::new();
        row.insert("name".into(), json!("widget"));
        row.insert("price".into(), json!(9.99));
        (columns, vec![row])
    }

    #[test]
    fn test_table_format() {
        let (columns, rows) = sample();
        let out = format_as_table(&columns, &rows, false, 12);
        assert!(out.starts_with("+--------+-------+\n"));
        assert!(out.contains("|  name  | price |"));
        assert!(out.contains("| widget |  9.99 |"));
        assert!(out.ends_with("1 row in set (0.01 sec)\n"));
    }

    #[test]
    fn test_table_pads_by_display_width() {
        let columns = vec!["名前".to_string()];
        let mut row = JsonRow::new();
        row.insert("名前".into(), json!("a"));
        let out = format_as_table(&columns, &[row], true, 0);
        assert!(out.contains("| 名前 |"));
        assert!(out.contains("| a    |"));
        assert!(out.contains("(truncated)"));
    }

    #[test]
    fn test_markdown_format_escapes_pipes() {
        let columns = vec!["v".to_string()];
        let mut row = JsonRow::new();
        row.insert("v".into(), json!("a|b"));
        let out = format_as_markdown(&columns, &[row], false);
        assert_eq!(out, "| v |\n|---|\n| a\\|b |\n\n*1 rows*");
    }

    #[test]
    fn test_empty_columns() {
        assert_eq!(format_as_table(&[], &[], false, 0), "Empty set");
        assert_eq!(format_as_markdown(&[], &[], false), "*Empty set*");
    }

    #[test]
    fn test_format_value_null() {
        assert_eq!(format_value(&JsonValue::Null), "NULL");
        assert_eq!(format_value(&json!([1, 2])), "[1,2]");
    }
}
