//! MCP protocol integration.
//!
//! `service` exposes the tools as an rmcp server; `upstream` is the rmcp client
//! used by the passthrough tools.

pub mod service;
pub mod upstream;

pub use service::AggregateService;
