//! Database layer.
//!
//! This module provides:
//! - The per-call connection scope (`scope`)
//! - Identifier validation for composed statements (`identifier`)
//! - Statement execution and row materialization (`executor`, `types`, `params`)
//! - Schema introspection (`schema`)
//! - Backup, restore and maintenance (`backup`)
//! - CSV/JSON encoding for import and export (`transfer`)
//! - Library version preconditions (`version`)

pub mod backup;
pub mod executor;
pub mod identifier;
pub mod params;
pub mod schema;
pub mod scope;
pub mod transfer;
pub mod types;
pub mod version;

pub use schema::SchemaInspector;
pub use scope::{ConnectionScope, ScopeMode, ScopeSettings};
pub use version::SqliteVersion;
