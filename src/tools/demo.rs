//! Demo table seeding.

use crate::db::{ConnectionScope, executor};
use crate::error::DbResult;
use crate::models::QueryParam;
use schemars::JsonSchema;
use serde::Serialize;
use tracing::info;

const CREATE_ITEMS: &str =
    "CREATE TABLE IF NOT EXISTS items (id INTEGER PRIMARY KEY, name TEXT UNIQUE, price REAL)";

const INSERT_ITEM: &str = "INSERT OR IGNORE INTO items (name, price) VALUES (?, ?)";

/// Rows seeded into `items`.
pub const DEMO_ITEMS: &[(&str, f64)] = &[("widget", 9.99), ("gizmo", 14.95)];

/// Output from the init_demo tool.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct InitDemoOutput {
    pub status: String,
    /// Rows actually inserted by this call (0 when already seeded)
    pub inserted: u64,
}

/// Create and seed the `items` table. Safe to call repeatedly.
pub async fn init_demo(scope: &ConnectionScope) -> DbResult<InitDemoOutput> {
    let inserted = scope
        .run(|conn| {
            Box::pin(async move {
                executor::execute(conn, CREATE_ITEMS, &[]).await?;
                let mut inserted = 0;
                for (name, price) in DEMO_ITEMS {
                    let params = [QueryParam::String(name.to_string()), QueryParam::Float(*price)];
                    inserted += executor::execute(conn, INSERT_ITEM, &params)
                        .await?
                        .rows_affected;
                }
                Ok(inserted)
            })
        })
        .await?;

    info!(inserted = inserted, "Demo table ready");
    Ok(InitDemoOutput {
        status: "ok".to_string(),
        inserted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::ScopeSettings;

    #[tokio::test]
    async fn test_second_call_inserts_nothing() {
        let dir = tempfile::TempDir::new().unwrap();
        let scope = ConnectionScope::new(ScopeSettings::new(dir.path().join("demo.db")));

        assert_eq!(init_demo(&scope).await.unwrap().inserted, 2);
        assert_eq!(init_demo(&scope).await.unwrap().inserted, 0);
    }
}
