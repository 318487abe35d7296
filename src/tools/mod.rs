//! MCP tool implementations.
//!
//! - `query`: read-only SQL (`sqlite_run_sql`)
//! - `ddl`: schema changes and column drops
//! - `schema`: table listing and description
//! - `write`: typed insert/update/delete/upsert
//! - `aggregate`: count, aggregate and join helpers
//! - `transfer`: CSV and JSON import/export
//! - `maintenance`: backup, restore, vacuum, analyze, integrity check
//! - `demo`: demo table seeding
//! - `proxy`: passthrough to another MCP server
//! - `sql_validator`: the statement gatekeeper for caller-written SQL

pub mod aggregate;
pub mod ddl;
pub mod demo;
pub mod format;
pub mod maintenance;
pub mod predicate;
pub mod proxy;
pub mod query;
pub mod schema;
pub mod sql_validator;
pub mod transfer;
pub mod write;

pub use aggregate::AggregateToolHandler;
pub use ddl::DdlToolHandler;
pub use maintenance::MaintenanceToolHandler;
pub use proxy::ProxyToolHandler;
pub use query::{QueryToolHandler, RunSqlInput, RunSqlOutput};
pub use schema::SchemaToolHandler;
pub use transfer::TransferToolHandler;
pub use write::WriteToolHandler;
