//! Caller-written `WHERE` fragments for the typed tools.

use crate::error::{DbError, DbResult};
use crate::models::QueryParam;
use crate::tools::sql_validator::validate_fragment;

/// A validated `WHERE` clause and the values for its `?` placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    /// `" WHERE (...)"`, or empty when no filter was given
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl Predicate {
    /// Build from optional caller text and its parameters.
    ///
    /// Blank text counts as no filter. Parameters without a filter are rejected
    /// rather than silently dropped.
    pub fn build(clause: Option<&str>, params: Vec<QueryParam>) -> DbResult<Self> {
        match clause.map(str::trim).filter(|c| !c.is_empty()) {
            Some(fragment) => {
                let fragment = validate_fragment(fragment)?;
                Ok(Self {
                    sql: format!(" WHERE ({})", fragment),
                    params,
                })
            }
            None if params.is_empty() => Ok(Self::default()),
            None => Err(DbError::invalid_input(
                "where_params were given without a where_clause",
            )),
        }
    }

    /// Whether a filter is present.
    pub fn is_filtered(&self) -> bool {
        !self.sql.is_empty()
    }
}
