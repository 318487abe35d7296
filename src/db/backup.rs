//! Backup, restore and maintenance of the database file.
//!
//! Backups are taken with `VACUUM INTO`, which writes a consistent, compacted copy
//! while other readers continue. Restore replaces the live file by copying, keeping
//! a sibling temporary so a failed copy can be undone.

use crate::db::scope::{ConnectionScope, ScopeMode};
use crate::db::version::{VACUUM_INTO_MIN, engine_version};
use crate::error::{DbError, DbResult};
use chrono::Utc;
use futures_util::future::BoxFuture;
use serde::Serialize;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info, warn};

/// First 16 bytes of every SQLite 3 database file.
const SQLITE_HEADER: &[u8; 16] = b"SQLite format 3\0";

/// Result of a completed backup.
#[derive(Debug, Clone, Serialize)]
pub struct BackupInfo {
    pub path: PathBuf,
    pub size_bytes: u64,
}

/// Result of `PRAGMA integrity_check`.
#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub ok: bool,
    pub messages: Vec<String>,
}

/// `<db>` with `suffix` appended to the file name (e.g. `-wal`).
pub fn sidecar_path(db_path: &Path, suffix: &str) -> PathBuf {
    let mut name = OsString::from(db_path.as_os_str());
    name.push(suffix);
    PathBuf::from(name)
}

/// Default backup destination: `<db>.backup-<UTC timestamp>.db`.
pub fn default_backup_path(db_path: &Path) -> PathBuf {
    let stamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    sidecar_path(db_path, &format!(".backup-{}.db", stamp))
}

/// Write a consistent copy of the database to `dest` (or the default path).
pub async fn backup(scope: &ConnectionScope, dest: Option<PathBuf>) -> DbResult<BackupInfo> {
    let dest = dest.unwrap_or_else(|| default_backup_path(scope.path()));

    if tokio::fs::try_exists(&dest).await.unwrap_or(false) {
        return Err(DbError::invalid_input(format!(
            "Backup destination '{}' already exists",
            dest.display()
        )));
    }
    if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
        if !parent.is_dir() {
            return Err(DbError::io(parent, "Backup directory does not exist"));
        }
    }

    let target = dest.to_string_lossy().into_owned();
    scope
        .run_with(ScopeMode::Autocommit, move |conn| {
            Box::pin(async move {
                engine_version(conn).await?.require("VACUUM INTO", VACUUM_INTO_MIN)?;
                sqlx::query("VACUUM INTO ?").bind(target).execute(conn).await?;
                Ok(())
            })
        })
        .await?;

    let size_bytes = tokio::fs::metadata(&dest)
        .await
        .map_err(|e| DbError::io(&dest, e))?
        .len();

    info!(path = %dest.display(), size_bytes = size_bytes, "Backup written");
    Ok(BackupInfo {
        path: dest,
        size_bytes,
    })
}

/// Check that `path` is a regular file starting with the SQLite header.
async fn check_backup_file(path: &Path) -> DbResult<()> {
    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|e| DbError::io(path, e))?;
    if !meta.is_file() {
        return Err(DbError::io(path, "Backup path is not a regular file"));
    }

    let mut header = [0u8; 16];
    let mut file = tokio::fs::File::open(path)
        .await
        .map_err(|e| DbError::io(path, e))?;
    let read = file
        .read_exact(&mut header)
        .await
        .map_err(|e| DbError::io(path, e));
    if read.is_err() || &header != SQLITE_HEADER {
        return Err(DbError::invalid_input(format!(
            "'{}' is not a SQLite database file",
            path.display()
        )));
    }
    Ok(())
}

/// Copies one file over another; the backup-to-live step of a restore.
type CopyFn = for<'a> fn(&'a Path, &'a Path) -> BoxFuture<'a, std::io::Result<u64>>;

fn copy_file<'a>(from: &'a Path, to: &'a Path) -> BoxFuture<'a, std::io::Result<u64>> {
    Box::pin(tokio::fs::copy(from, to))
}

/// Replace the live database with the contents of `backup_path`.
///
/// Nothing is touched unless the backup exists, is a regular file and carries the
/// SQLite header. On a failed copy the previous contents are put back.
pub async fn restore(scope: &ConnectionScope, backup_path: &Path) -> DbResult<()> {
    check_backup_file(backup_path).await?;

    let live = scope.path().to_path_buf();
    if let (Ok(a), Ok(b)) = (backup_path.canonicalize(), live.canonicalize()) {
        if a == b {
            return Err(DbError::invalid_input(
                "Backup path is the live database file",
            ));
        }
    }

    let live_exists = tokio::fs::try_exists(&live)
        .await
        .map_err(|e| DbError::io(&live, e))?;
    if live_exists {
        // Fold the WAL into the main file so the safety copy is complete
        scope
            .run_with(ScopeMode::Autocommit, |conn| {
                Box::pin(async move {
                    sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
                        .execute(conn)
                        .await?;
                    Ok(())
                })
            })
            .await?;
    }

    replace_live(&live, backup_path, live_exists, copy_file).await?;

    for suffix in ["-wal", "-shm"] {
        let stale = sidecar_path(&live, suffix);
        if let Err(e) = tokio::fs::remove_file(&stale).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %stale.display(), error = %e, "Could not remove stale sidecar file");
            }
        }
    }

    info!(from = %backup_path.display(), to = %live.display(), "Database restored");
    Ok(())
}

/// Copy the backup over `live`, keeping a sibling temporary of the old contents
/// until the copy has succeeded. The temporary never outlives the call.
async fn replace_live(
    live: &Path,
    backup_path: &Path,
    live_exists: bool,
    copy_backup: CopyFn,
) -> DbResult<()> {
    if !live_exists {
        if let Err(e) = copy_backup(backup_path, live).await {
            if let Err(rm) = tokio::fs::remove_file(live).await {
                debug!(path = %live.display(), error = %rm, "Could not remove partial restore");
            }
            return Err(DbError::io(backup_path, e));
        }
        return Ok(());
    }

    let temp = sidecar_path(live, &format!(".restore-{}.tmp", uuid::Uuid::new_v4()));
    let outcome = swap_in(live, backup_path, &temp, copy_backup).await;

    if let Err(e) = tokio::fs::remove_file(&temp).await {
        debug!(path = %temp.display(), error = %e, "Could not remove restore temporary");
    }
    outcome
}

async fn swap_in(
    live: &Path,
    backup_path: &Path,
    temp: &Path,
    copy_backup: CopyFn,
) -> DbResult<()> {
    tokio::fs::copy(live, temp)
        .await
        .map_err(|e| DbError::io(live, e))?;

    if let Err(e) = copy_backup(backup_path, live).await {
        warn!(error = %e, "Restore copy failed; putting the previous database back");
        if let Err(undo) = tokio::fs::copy(temp, live).await {
            warn!(error = %undo, "Could not put the previous database back");
        }
        return Err(DbError::io(backup_path, e));
    }
    Ok(())
}

/// Rebuild the database file, reclaiming free pages.
pub async fn vacuum(scope: &ConnectionScope) -> DbResult<()> {
    scope
        .run_with(ScopeMode::Autocommit, |conn| {
            Box::pin(async move {
                sqlx::query("VACUUM").execute(conn).await?;
                Ok(())
            })
        })
        .await
}

/// Refresh the query planner's statistics.
pub async fn analyze(scope: &ConnectionScope) -> DbResult<()> {
    scope
        .run(|conn| {
            Box::pin(async move {
                sqlx::query("ANALYZE").execute(conn).await?;
                Ok(())
            })
        })
        .await
}

/// Run `PRAGMA integrity_check`.
pub async fn integrity_check(scope: &ConnectionScope) -> DbResult<IntegrityReport> {
    let messages: Vec<String> = scope
        .run(|conn| {
            Box::pin(async move {
                Ok(sqlx::query_scalar::<_, String>("PRAGMA integrity_check")
                    .fetch_all(conn)
                    .await?)
            })
        })
        .await?;

    let ok = messages.len() == 1 && messages[0] == "ok";
    Ok(IntegrityReport { ok, messages })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScopeSettings;
    use tempfile::TempDir;

    async fn seeded(dir: &TempDir) -> ConnectionScope {
        let scope = ConnectionScope::new(ScopeSettings::new(dir.path().join("live.db")));
        scope
            .run(|conn| {
                Box::pin(async move {
                    sqlx::query("CREATE TABLE t (v INTEGER)").execute(&mut *conn).await?;
                    sqlx::query("INSERT INTO t VALUES (1), (2)").execute(&mut *conn).await?;
                    Ok(())
                })
            })
            .await
            .unwrap();
        scope
    }

    async fn count(scope: &ConnectionScope) -> i64 {
        scope
            .run(|conn| {
                Box::pin(async move {
                    Ok(sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM t")
                        .fetch_one(conn)
                        .await?)
                })
            })
            .await
            .unwrap()
    }

    #[test]
    fn test_sidecar_and_default_paths() {
        let db = Path::new("/data/app.db");
        assert_eq!(sidecar_path(db, "-wal"), PathBuf::from("/data/app.db-wal"));
        let backup = default_backup_path(db);
        let name = backup.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("app.db.backup-") && name.ends_with("Z.db"), "{}", name);
    }

    #[tokio::test]
    async fn test_backup_then_restore() {
        let dir = TempDir::new().unwrap();
        let scope = seeded(&dir).await;
        let dest = dir.path().join("snap.db");

        let info = backup(&scope, Some(dest.clone())).await.unwrap();
        assert!(info.size_bytes > 0);

        scope
            .run(|conn| {
                Box::pin(async move {
                    sqlx::query("DELETE FROM t").execute(conn).await?;
                    Ok(())
                })
            })
            .await
            .unwrap();
        assert_eq!(count(&scope).await, 0);

        restore(&scope, &dest).await.unwrap();
        assert_eq!(count(&scope).await, 2);
    }

    #[tokio::test]
    async fn test_backup_refuses_existing_destination() {
        let dir = TempDir::new().unwrap();
        let scope = seeded(&dir).await;
        let dest = dir.path().join("exists.db");
        std::fs::write(&dest, b"x").unwrap();
        assert!(backup(&scope, Some(dest)).await.is_err());
    }

    #[tokio::test]
    async fn test_restore_rejects_non_sqlite_file() {
        let dir = TempDir::new().unwrap();
        let scope = seeded(&dir).await;
        let bogus = dir.path().join("bogus.db");
        std::fs::write(&bogus, b"definitely not a database").unwrap();

        let err = restore(&scope, &bogus).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidInput { .. }));
        assert_eq!(count(&scope).await, 2);
    }

    fn torn_copy<'a>(_from: &'a Path, to: &'a Path) -> BoxFuture<'a, std::io::Result<u64>> {
        Box::pin(async move {
            tokio::fs::write(to, b"half a database").await?;
            Err(std::io::Error::other("device full"))
        })
    }

    fn restore_leftovers(dir: &TempDir) -> Vec<String> {
        std::fs::read_dir(dir.path())
            .unwrap()
            .filter_map(|e| e.ok())
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.contains(".restore-"))
            .collect()
    }

    #[tokio::test]
    async fn test_failed_copy_puts_previous_database_back() {
        let dir = TempDir::new().unwrap();
        let scope = seeded(&dir).await;
        let dest = dir.path().join("snap.db");
        backup(&scope, Some(dest.clone())).await.unwrap();
        vacuum(&scope).await.unwrap();

        let live = scope.path().to_path_buf();
        let before = std::fs::read(&live).unwrap();

        let err = replace_live(&live, &dest, true, torn_copy).await.unwrap_err();
        assert!(matches!(err, DbError::Io { .. }), "{:?}", err);
        assert_eq!(std::fs::read(&live).unwrap(), before);
        assert!(restore_leftovers(&dir).is_empty());
        assert_eq!(count(&scope).await, 2);
    }

    #[tokio::test]
    async fn test_failed_copy_without_live_file_leaves_nothing() {
        let dir = TempDir::new().unwrap();
        let scope = seeded(&dir).await;
        let dest = dir.path().join("snap.db");
        backup(&scope, Some(dest.clone())).await.unwrap();

        let missing = dir.path().join("fresh.db");
        assert!(replace_live(&missing, &dest, false, torn_copy).await.is_err());
        assert!(!missing.exists());
    }

    #[tokio::test]
    async fn test_restore_into_missing_database() {
        let dir = TempDir::new().unwrap();
        let scope = seeded(&dir).await;
        let dest = dir.path().join("snap.db");
        backup(&scope, Some(dest.clone())).await.unwrap();

        let fresh = ConnectionScope::new(ScopeSettings::new(dir.path().join("fresh.db")));
        restore(&fresh, &dest).await.unwrap();
        assert_eq!(count(&fresh).await, 2);
        assert!(restore_leftovers(&dir).is_empty());
    }

    #[tokio::test]
    async fn test_maintenance_operations() {
        let dir = TempDir::new().unwrap();
        let scope = seeded(&dir).await;
        vacuum(&scope).await.unwrap();
        analyze(&scope).await.unwrap();
        let report = integrity_check(&scope).await.unwrap();
        assert!(report.ok);
        assert_eq!(report.messages, vec!["ok"]);
        assert_eq!(scope.open_handles(), 0);
    }
}
