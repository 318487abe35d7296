//! Data models for the SQLite tools MCP server.
//!
//! This module re-exports all model types used throughout the application.

pub mod query;
pub mod schema;

pub use query::{
    DEFAULT_ROW_LIMIT, ExecuteResult, JsonRow, MAX_ROW_LIMIT, QueryParam, QueryResult,
    effective_limit,
};
pub use schema::{
    ColumnDefinition, ForeignKey, ForeignKeyAction, IndexInfo, TableInfo, TableSchema, TableType,
};
