//! SQLite Tools MCP Server Library
//!
//! MCP (Model Context Protocol) tools over one local SQLite database file, plus
//! passthrough tools for other MCP servers. Every tool call runs on its own
//! short-lived connection.

pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use error::DbError;
pub use mcp::AggregateService;
