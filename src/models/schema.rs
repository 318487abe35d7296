//! Schema-related data models.
//!
//! This module defines types returned by SQLite schema introspection.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableInfo {
    pub name: String,
    pub table_type: TableType,
}

impl TableInfo {
    /// Create a new table info.
    pub fn new(name: impl Into<String>, table_type: TableType) -> Self {
        Self {
            name: name.into(),
            table_type,
        }
    }
}

/// Type of schema object listed in `sqlite_master`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum TableType {
    Table,
    View,
}

impl TableType {
    /// Parse the `type` column of `sqlite_master`.
    pub fn parse(s: &str) -> Self {
        if s.eq_ignore_ascii_case("view") {
            Self::View
        } else {
            Self::Table
        }
    }
}

impl std::fmt::Display for TableType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Table => write!(f, "table"),
            Self::View => write!(f, "view"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<ColumnDefinition>,
    pub primary_key: Vec<String>,
    pub foreign_keys: Vec<ForeignKey>,
    pub indexes: Vec<IndexInfo>,
    /// Original `CREATE` statement from `sqlite_master`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_sql: Option<String>,
}

impl TableSchema {
    /// Create a new table schema.
    pub fn new(table_name: impl Into<String>) -> Self {
        Self {
            table_name: table_name.into(),
            columns: Vec::new(),
            primary_key: Vec::new(),
            foreign_keys: Vec::new(),
            indexes: Vec::new(),
            create_sql: None,
        }
    }

    /// Add a column definition.
    pub fn with_column(mut self, column: ColumnDefinition) -> Self {
        self.columns.push(column);
        self
    }

    /// Look up a column by name, ignoring ASCII case like SQLite does.
    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Names of all columns, in declaration order.
    pub fn column_names(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ColumnDefinition {
    pub name: String,
    /// Declared type as written in the `CREATE TABLE` (may be empty)
    pub data_type: String,
    pub nullable: bool,
    /// Default value with a JSON type matching the column affinity
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_value: Option<serde_json::Value>,
    pub is_primary_key: bool,
}

impl ColumnDefinition {
    /// Create a new column definition.
    pub fn new(name: impl Into<String>, data_type: impl Into<String>, nullable: bool) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable,
            default_value: None,
            is_primary_key: false,
        }
    }

    /// Set whether this is a primary key column.
    pub fn with_primary_key(mut self, is_pk: bool) -> Self {
        self.is_primary_key = is_pk;
        self
    }

    /// Set the default value from the `dflt_value` text, typed by the column's affinity.
    pub fn with_default_str(mut self, default_str: &str) -> Self {
        self.default_value = Some(parse_default_value(default_str, &self.data_type));
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ForeignKey {
    pub column: String,
    pub references_table: String,
    /// `None` when the reference targets the parent's primary key implicitly
    pub references_column: Option<String>,
    pub on_delete: ForeignKeyAction,
    pub on_update: ForeignKeyAction,
}

impl ForeignKey {
    /// Create a new foreign key.
    pub fn new(
        column: impl Into<String>,
        references_table: impl Into<String>,
        references_column: Option<String>,
    ) -> Self {
        Self {
            column: column.into(),
            references_table: references_table.into(),
            references_column,
            on_delete: ForeignKeyAction::NoAction,
            on_update: ForeignKeyAction::NoAction,
        }
    }

    pub fn with_on_delete(mut self, action: ForeignKeyAction) -> Self {
        self.on_delete = action;
        self
    }

    pub fn with_on_update(mut self, action: ForeignKeyAction) -> Self {
        self.on_update = action;
        self
    }
}

/// Foreign key referential action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ForeignKeyAction {
    #[default]
    NoAction,
    Restrict,
    Cascade,
    SetNull,
    SetDefault,
}

impl ForeignKeyAction {
    /// Parse the action text reported by `pragma_foreign_key_list`.
    pub fn parse(s: &str) -> Self {
        match s.to_uppercase().as_str() {
            "CASCADE" => Self::Cascade,
            "SET NULL" => Self::SetNull,
            "SET DEFAULT" => Self::SetDefault,
            "RESTRICT" => Self::Restrict,
            _ => Self::NoAction,
        }
    }
}

impl std::fmt::Display for ForeignKeyAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoAction => write!(f, "NO ACTION"),
            Self::Restrict => write!(f, "RESTRICT"),
            Self::Cascade => write!(f, "CASCADE"),
            Self::SetNull => write!(f, "SET NULL"),
            Self::SetDefault => write!(f, "SET DEFAULT"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct IndexInfo {
    pub name: String,
    pub columns: Vec<String>,
    pub is_unique: bool,
    /// True for the automatic index behind a PRIMARY KEY constraint
    pub is_primary: bool,
}

impl IndexInfo {
    pub fn new(name: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            name: name.into(),
            columns,
            is_unique: false,
            is_primary: false,
        }
    }

    pub fn with_unique(mut self, is_unique: bool) -> Self {
        self.is_unique = is_unique;
        self
    }

    pub fn with_primary(mut self, is_primary: bool) -> Self {
        self.is_primary = is_primary;
        if is_primary {
            self.is_unique = true;
        }
        self
    }
}

/// Type a `dflt_value` string using SQLite's column affinity rules.
///
/// - INTEGER affinity (type contains "INT") → JSON number when it parses
/// - REAL affinity ("REAL", "FLOA", "DOUB") → JSON number when it parses
/// - quoted literals (`'abc'`) → the unquoted string
/// - everything else, including expressions like `CURRENT_TIMESTAMP` → string as written
pub fn parse_default_value(default_str: &str, data_type: &str) -> serde_json::Value {
    let upper = data_type.to_uppercase();

    if upper.contains("INT") {
        if let Ok(n) = default_str.parse::<i64>() {
            return serde_json::Value::Number(n.into());
        }
    }

    if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
        if let Some(num) = default_str
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
        {
            return serde_json::Value::Number(num);
        }
    }

    if default_str.len() >= 2 && default_str.starts_with('\'') && default_str.ends_with('\'') {
        let inner = &default_str[1..default_str.len() - 1];
        return serde_json::Value::String(inner.replace("''", "'"));
    }

    if default_str.eq_ignore_ascii_case("null") {
        return serde_json::Value::Null;
    }

    serde_json::Value::String(default_str.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_type_parsing() {
        assert_eq!(TableType::parse("table"), TableType::Table);
        assert_eq!(TableType::parse("view"), TableType::View);
        assert_eq!(TableType::parse("VIEW"), TableType::View);
    }

    #[test]
    fn test_table_schema_column_lookup() {
        let schema = TableSchema::new("items")
            .with_column(ColumnDefinition::new("id", "INTEGER", false).with_primary_key(true))
            .with_column(ColumnDefinition::new("Name", "TEXT", true));

        assert!(schema.column("name").is_some());
        assert!(schema.column("missing").is_none());
        assert_eq!(schema.column_names(), vec!["id", "Name"]);
    }

    #[test]
    fn test_foreign_key_action_parsing() {
        assert_eq!(ForeignKeyAction::parse("CASCADE"), ForeignKeyAction::Cascade);
        assert_eq!(ForeignKeyAction::parse("set null"), ForeignKeyAction::SetNull);
        assert_eq!(ForeignKeyAction::parse("NO ACTION"), ForeignKeyAction::NoAction);
    }

    #[test]
    fn test_index_info_primary_implies_unique() {
        let index = IndexInfo::new("sqlite_autoindex_items_1", vec!["name".to_string()])
            .with_primary(true);
        assert!(index.is_unique);
    }

    #[test]
    fn test_parse_default_value_by_affinity() {
        assert_eq!(parse_default_value("42", "INTEGER"), serde_json::json!(42));
        assert_eq!(parse_default_value("1.5", "REAL"), serde_json::json!(1.5));
        assert_eq!(parse_default_value("'it''s'", "TEXT"), serde_json::json!("it's"));
        assert_eq!(parse_default_value("NULL", "TEXT"), serde_json::Value::Null);
        assert_eq!(
            parse_default_value("CURRENT_TIMESTAMP", "TEXT"),
            serde_json::json!("CURRENT_TIMESTAMP")
        );
        // non-numeric default on an integer column stays text
        assert_eq!(parse_default_value("abc", "INT"), serde_json::json!("abc"));
    }
}
