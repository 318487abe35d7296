//! SQLite library version checks.
//!
//! Some tools rely on syntax newer than what older system libraries ship. The version
//! is read from the live handle with `sqlite_version()` so the check matches the
//! library actually linked.

use crate::error::{DbError, DbResult};
use sqlx::sqlite::SqliteConnection;
use std::fmt;

/// `ALTER TABLE ... DROP COLUMN`
pub const DROP_COLUMN_MIN: SqliteVersion = SqliteVersion::new(3, 35, 0);

/// `RIGHT JOIN` and `FULL OUTER JOIN`
pub const OUTER_JOIN_MIN: SqliteVersion = SqliteVersion::new(3, 39, 0);

/// `INSERT ... ON CONFLICT ... DO UPDATE`
pub const UPSERT_MIN: SqliteVersion = SqliteVersion::new(3, 24, 0);

/// `VACUUM INTO`
pub const VACUUM_INTO_MIN: SqliteVersion = SqliteVersion::new(3, 27, 0);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SqliteVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl SqliteVersion {
    pub const fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// Parse `"3.45.1"`. Missing trailing parts count as zero.
    pub fn parse(s: &str) -> DbResult<Self> {
        let mut parts = s.trim().split('.').map(|p| p.parse::<u32>());
        let mut next = |required: bool| match parts.next() {
            Some(Ok(n)) => Ok(n),
            None if !required => Ok(0),
            _ => Err(DbError::internal(format!("Unrecognized SQLite version '{}'", s))),
        };
        Ok(Self::new(next(true)?, next(false)?, next(false)?))
    }

    /// Fail with [`DbError::Unsupported`] when this version is older than `min`.
    pub fn require(self, feature: &str, min: SqliteVersion) -> DbResult<()> {
        if self < min {
            return Err(DbError::unsupported(feature, min.to_string(), self.to_string()));
        }
        Ok(())
    }
}

impl fmt::Display for SqliteVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Read the version of the SQLite library behind this handle.
pub async fn engine_version(conn: &mut SqliteConnection) -> DbResult<SqliteVersion> {
    let text: String = sqlx::query_scalar("SELECT sqlite_version()")
        .fetch_one(&mut *conn)
        .await?;
    SqliteVersion::parse(&text)
}
