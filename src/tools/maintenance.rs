//! Backup, restore and housekeeping tools.

use crate::db::{ConnectionScope, backup};
use crate::error::DbResult;
use crate::tools::format::format_size;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::info;

/// Input for the backup tool.
#[derive(Debug, Clone, Default, Deserialize, JsonSchema)]
pub struct BackupInput {
    /// Destination file. Must not exist. Default: `<db>.backup-<UTC timestamp>.db`
    #[serde(default)]
    pub path: Option<String>,
}

/// Output from the backup tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct BackupOutput {
    pub path: String,
    pub size_bytes: u64,
    /// Human-readable size
    pub size_formatted: String,
}

/// Input for the restore tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct RestoreInput {
    /// Backup file to restore from
    pub path: String,
}

/// Output from the restore tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct RestoreOutput {
    pub status: String,
    pub restored_from: String,
}

/// Output from vacuum and analyze.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct StatusOutput {
    pub status: String,
}

impl StatusOutput {
    pub fn ok() -> Self {
        Self {
            status: "ok".to_string(),
        }
    }
}

/// Output from the integrity_check tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct IntegrityCheckOutput {
    /// True when SQLite reported exactly "ok"
    pub ok: bool,
    pub messages: Vec<String>,
}

/// Handler for maintenance tools.
pub struct MaintenanceToolHandler {
    scope: ConnectionScope,
}

impl MaintenanceToolHandler {
    pub fn new(scope: ConnectionScope) -> Self {
        Self { scope }
    }

    pub async fn backup(&self, input: BackupInput) -> DbResult<BackupOutput> {
        let dest = input
            .path
            .map(|p| p.trim().to_string())
            .filter(|p| !p.is_empty())
            .map(PathBuf::from);
        let info = backup::backup(&self.scope, dest).await?;
        Ok(BackupOutput {
            path: info.path.display().to_string(),
            size_bytes: info.size_bytes,
            size_formatted: format_size(info.size_bytes),
        })
    }

    pub async fn restore(&self, input: RestoreInput) -> DbResult<RestoreOutput> {
        let path = PathBuf::from(input.path.trim());
        backup::restore(&self.scope, &path).await?;
        Ok(RestoreOutput {
            status: "ok".to_string(),
            restored_from: path.display().to_string(),
        })
    }

    pub async fn vacuum(&self) -> DbResult<StatusOutput> {
        backup::vacuum(&self.scope).await?;
        info!("Database vacuumed");
        Ok(StatusOutput::ok())
    }

    pub async fn analyze(&self) -> DbResult<StatusOutput> {
        backup::analyze(&self.scope).await?;
        info!("Database analyzed");
        Ok(StatusOutput::ok())
    }

    pub async fn integrity_check(&self) -> DbResult<IntegrityCheckOutput> {
        let report = backup::integrity_check(&self.scope).await?;
        info!(ok = report.ok, messages = report.messages.len(), "Integrity checked");
        Ok(IntegrityCheckOutput {
            ok: report.ok,
            messages: report.messages,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScopeSettings;
    use crate::error::DbError;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_backup_reports_formatted_size() {
        let dir = TempDir::new().unwrap();
        let handler =
            MaintenanceToolHandler::new(ConnectionScope::new(ScopeSettings::new(dir.path().join("m.db"))));
        handler.vacuum().await.unwrap();

        let dest = dir.path().join("copy.db");
        let out = handler
            .backup(BackupInput {
                path: Some(dest.display().to_string()),
            })
            .await
            .unwrap();
        assert!(dest.exists());
        assert_eq!(out.size_formatted, format_size(out.size_bytes));
    }

    #[tokio::test]
    async fn test_restore_missing_file() {
        let dir = TempDir::new().unwrap();
        let handler =
            MaintenanceToolHandler::new(ConnectionScope::new(ScopeSettings::new(dir.path().join("m.db"))));
        let err = handler
            .restore(RestoreInput {
                path: dir.path().join("nope.db").display().to_string(),
            })
            .await
            .unwrap_err();
        assert!(matches!(err, DbError::Io { .. }));
    }

    #[tokio::test]
    async fn test_integrity_check_fresh_db() {
        let dir = TempDir::new().unwrap();
        let handler =
            MaintenanceToolHandler::new(ConnectionScope::new(ScopeSettings::new(dir.path().join("m.db"))));
        let out = handler.integrity_check().await.unwrap();
        assert!(out.ok);
        assert_eq!(out.messages, vec!["ok".to_string()]);
        assert_eq!(handler.analyze().await.unwrap().status, "ok");
    }
}
