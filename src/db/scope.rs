//! Per-call connection scope.
//!
//! Every tool call runs inside exactly one [`ConnectionScope::run`]: a fresh
//! SQLite handle is opened, configured, handed to the body, then committed or
//! rolled back and closed. Handles are never pooled or shared between calls.
//!
//! Exit rules:
//! - body returns `Ok` → `COMMIT` (a no-op when nothing was written)
//! - body returns `Err`, or `COMMIT` fails → `ROLLBACK`, errors from the rollback are dropped
//! - always → close the handle, errors from the close are dropped
//!
//! The error handed back to the caller is always the one that triggered the
//! exit, never a secondary rollback or close failure.

use crate::error::DbResult;
use futures_util::future::BoxFuture;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection};
use sqlx::{ConnectOptions, Connection};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tracing::debug;

/// Lock wait applied both when opening and as the per-statement busy timeout.
pub const DEFAULT_BUSY_TIMEOUT: Duration = Duration::from_secs(30);

/// Pragmas that may be refused by the engine or filesystem (e.g. WAL on a network share).
/// Read-only handles skip them.
const BEST_EFFORT_PRAGMAS: &[&str] = &["PRAGMA journal_mode=WAL", "PRAGMA synchronous=NORMAL"];

/// Where and how scopes connect.
#[derive(Debug, Clone)]
pub struct ScopeSettings {
    path: PathBuf,
    busy_timeout: Duration,
}

impl ScopeSettings {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
        }
    }

    pub fn with_busy_timeout(mut self, busy_timeout: Duration) -> Self {
        self.busy_timeout = busy_timeout;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn busy_timeout(&self) -> Duration {
        self.busy_timeout
    }
}

/// How the body's statements are grouped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScopeMode {
    /// Wrap the body in `BEGIN` / `COMMIT`, rolling back on error.
    #[default]
    Transactional,
    /// No explicit transaction. Needed for `VACUUM`, `VACUUM INTO` and WAL checkpoints,
    /// which SQLite refuses inside a transaction.
    Autocommit,
    /// Handle opened with `SQLITE_OPEN_READONLY`; any write fails in the engine
    /// with `SQLITE_READONLY`. The file must already exist.
    ReadOnly,
}

/// Opens one configured handle per call and guarantees its cleanup.
#[derive(Debug, Clone)]
pub struct ConnectionScope {
    settings: ScopeSettings,
    open_handles: Arc<AtomicUsize>,
}

/// Decrements the live-handle counter even if the body panics.
struct HandleGuard(Arc<AtomicUsize>);

impl Drop for HandleGuard {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ConnectionScope {
    pub fn new(settings: ScopeSettings) -> Self {
        Self {
            settings,
            open_handles: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn settings(&self) -> &ScopeSettings {
        &self.settings
    }

    /// Database file this scope connects to.
    pub fn path(&self) -> &Path {
        self.settings.path()
    }

    /// Number of handles currently open through this scope (and its clones).
    pub fn open_handles(&self) -> usize {
        self.open_handles.load(Ordering::SeqCst)
    }

    /// Run `body` inside a transaction on a fresh handle.
    ///
    /// ```ignore
    /// let name = input.name.clone();
    /// scope.run(move |conn| Box::pin(async move {
    ///     sqlx::query("INSERT INTO items(name) VALUES (?)").bind(name).execute(conn).await?;
    ///     Ok(())
    /// })).await?;
    /// ```
    pub async fn run<T, F>(&self, body: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        self.run_with(ScopeMode::Transactional, body).await
    }

    /// Run `body` on a fresh handle using the given mode.
    pub async fn run_with<T, F>(&self, mode: ScopeMode, body: F) -> DbResult<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>> + Send,
    {
        let mut conn = self.open(mode).await?;
        self.open_handles.fetch_add(1, Ordering::SeqCst);
        let _guard = HandleGuard(self.open_handles.clone());

        let outcome = drive(&mut conn, mode, body).await;

        if let Err(e) = conn.close().await {
            debug!(error = %e, "Ignoring error while closing SQLite handle");
        }
        outcome
    }

    async fn open(&self, mode: ScopeMode) -> DbResult<SqliteConnection> {
        let read_only = mode == ScopeMode::ReadOnly;
        debug!(
            path = %self.settings.path.display(),
            busy_timeout_secs = self.settings.busy_timeout.as_secs(),
            read_only = read_only,
            "Opening SQLite handle"
        );

        let mut options = SqliteConnectOptions::new()
            .filename(&self.settings.path)
            .foreign_keys(true)
            .busy_timeout(self.settings.busy_timeout);
        if read_only {
            options = options.read_only(true);
        } else {
            options = options.create_if_missing(true).read_only(false);
        }
        let mut conn = options.connect().await?;

        if read_only {
            return Ok(conn);
        }

        for pragma in BEST_EFFORT_PRAGMAS {
            if let Err(e) = sqlx::query(*pragma).execute(&mut conn).await {
                debug!(pragma = *pragma, error = %e, "Pragma refused; continuing without it");
            }
        }

        Ok(conn)
    }
}

async fn drive<T, F>(conn: &mut SqliteConnection, mode: ScopeMode, body: F) -> DbResult<T>
where
    F: for<'c> FnOnce(&'c mut SqliteConnection) -> BoxFuture<'c, DbResult<T>>,
{
    let transactional = mode == ScopeMode::Transactional;
    if transactional {
        sqlx::query("BEGIN").execute(&mut *conn).await?;
    }

    match body(&mut *conn).await {
        Ok(value) if transactional => match sqlx::query("COMMIT").execute(&mut *conn).await {
            Ok(_) => Ok(value),
            Err(e) => {
                rollback(conn).await;
                Err(e.into())
            }
        },
        Ok(value) => Ok(value),
        Err(e) => {
            if transactional {
                rollback(conn).await;
            }
            Err(e)
        }
    }
}

async fn rollback(conn: &mut SqliteConnection) {
    // SQLite may already have rolled back on its own (e.g. after SQLITE_FULL)
    if let Err(e) = sqlx::query("ROLLBACK").execute(&mut *conn).await {
        debug!(error = %e, "Ignoring error while rolling back");
    }
}
