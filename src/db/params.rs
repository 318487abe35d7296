//! Parameter binding utilities for SQLite queries.
//!
//! Every caller-supplied value reaches the engine through these helpers, never through
//! string formatting.

use crate::models::QueryParam;
use sqlx::Sqlite;
use sqlx::sqlite::SqliteArguments;

pub(crate) type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

/// Bind a parameter to a SQLite query.
pub(crate) fn bind_sqlite_param<'q>(query: SqliteQuery<'q>, param: &'q QueryParam) -> SqliteQuery<'q> {
    match param {
        QueryParam::Null => query.bind(None::<String>),
        QueryParam::Bool(v) => query.bind(*v),
        QueryParam::Int(v) => query.bind(*v),
        QueryParam::Float(v) => query.bind(*v),
        QueryParam::String(v) => query.bind(v.as_str()),
    }
}

/// Bind every parameter in order.
pub(crate) fn bind_all<'q>(mut query: SqliteQuery<'q>, params: &'q [QueryParam]) -> SqliteQuery<'q> {
    for param in params {
        query = bind_sqlite_param(query, param);
    }
    query
}
