//! Schema introspection module.
//!
//! Reads `sqlite_master` and the table-valued pragma functions
//! (`pragma_table_info`, `pragma_foreign_key_list`, `pragma_index_list`,
//! `pragma_index_info`). Table names are bound as parameters, so nothing here
//! interpolates caller text into SQL.

use crate::error::{DbError, DbResult};
use crate::models::{
    ColumnDefinition, ForeignKey, ForeignKeyAction, IndexInfo, TableInfo, TableSchema, TableType,
};
use sqlx::Row;
use sqlx::sqlite::SqliteConnection;
use tracing::debug;

mod queries {
    pub const LIST_TABLES_WITH_VIEWS: &str = r#"
        SELECT name, type FROM sqlite_master
        WHERE type IN ('table', 'view')
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const LIST_TABLES_NO_VIEWS: &str = r#"
        SELECT name, type FROM sqlite_master
        WHERE type = 'table'
        AND name NOT LIKE 'sqlite_%'
        ORDER BY name
        "#;

    pub const CREATE_SQL: &str =
        "SELECT sql FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?";

    pub const TABLE_INFO: &str =
        "SELECT name, type, \"notnull\", dflt_value, pk FROM pragma_table_info(?) ORDER BY cid";

    pub const FOREIGN_KEYS: &str = "SELECT * FROM pragma_foreign_key_list(?) ORDER BY id, seq";

    pub const INDEX_LIST: &str = "SELECT name, \"unique\", origin FROM pragma_index_list(?)";

    pub const INDEX_COLUMNS: &str = "SELECT name FROM pragma_index_info(?) ORDER BY seqno";
}

/// Schema inspector for the scoped database.
pub struct SchemaInspector;

impl SchemaInspector {
    /// List user tables (and optionally views), skipping SQLite's internal objects.
    pub async fn list_tables(
        conn: &mut SqliteConnection,
        include_views: bool,
    ) -> DbResult<Vec<TableInfo>> {
        let query = if include_views {
            queries::LIST_TABLES_WITH_VIEWS
        } else {
            queries::LIST_TABLES_NO_VIEWS
        };

        let rows = sqlx::query(query).fetch_all(&mut *conn).await?;
        let tables: Vec<TableInfo> = rows
            .iter()
            .map(|row| {
                let name: String = row.get("name");
                let type_str: String = row.get("type");
                TableInfo::new(name, TableType::parse(&type_str))
            })
            .collect();

        debug!(count = tables.len(), "Listed SQLite tables");
        Ok(tables)
    }

    /// Whether a table or view with this exact name exists.
    pub async fn table_exists(conn: &mut SqliteConnection, table_name: &str) -> DbResult<bool> {
        Ok(sqlx::query(queries::CREATE_SQL)
            .bind(table_name)
            .fetch_optional(&mut *conn)
            .await?
            .is_some())
    }

    /// Columns, keys, indexes and the original `CREATE` text of one table.
    pub async fn describe_table(
        conn: &mut SqliteConnection,
        table_name: &str,
    ) -> DbResult<TableSchema> {
        let columns = fetch_columns(conn, table_name).await?;
        if columns.is_empty() {
            return Err(DbError::invalid_input(format!(
                "Table '{}' not found",
                table_name
            )));
        }

        let primary_key = columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.clone())
            .collect();
        let foreign_keys = fetch_foreign_keys(conn, table_name).await?;
        let indexes = fetch_indexes(conn, table_name).await?;
        let create_sql: Option<String> = sqlx::query_scalar(queries::CREATE_SQL)
            .bind(table_name)
            .fetch_optional(&mut *conn)
            .await?
            .flatten();

        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
            primary_key,
            foreign_keys,
            indexes,
            create_sql,
        })
    }

    /// Describe every user table.
    pub async fn describe_all(conn: &mut SqliteConnection) -> DbResult<Vec<TableSchema>> {
        let tables = Self::list_tables(conn, false).await?;
        let mut schemas = Vec::with_capacity(tables.len());
        for table in tables {
            schemas.push(Self::describe_table(conn, &table.name).await?);
        }
        Ok(schemas)
    }
}

async fn fetch_columns(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> DbResult<Vec<ColumnDefinition>> {
    let rows = sqlx::query(queries::TABLE_INFO)
        .bind(table_name)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let name: String = row.get("name");
            let data_type: String = row.try_get("type").unwrap_or_default();
            let notnull: i64 = row.get("notnull");
            let default_value: Option<String> = row.try_get("dflt_value").ok().flatten();
            let pk: i64 = row.get("pk");

            let mut col =
                ColumnDefinition::new(name, data_type, notnull == 0).with_primary_key(pk > 0);
            if let Some(ref def) = default_value {
                col = col.with_default_str(def);
            }
            col
        })
        .collect())
}

async fn fetch_foreign_keys(
    conn: &mut SqliteConnection,
    table_name: &str,
) -> DbResult<Vec<ForeignKey>> {
    let rows = sqlx::query(queries::FOREIGN_KEYS)
        .bind(table_name)
        .fetch_all(&mut *conn)
        .await?;

    Ok(rows
        .iter()
        .map(|row| {
            let column: String = row.get("from");
            let ref_table: String = row.get("table");
            let ref_column: Option<String> = row.try_get("to").ok().flatten();
            let on_delete: String = row.try_get("on_delete").unwrap_or_default();
            let on_update: String = row.try_get("on_update").unwrap_or_default();

            ForeignKey::new(column, ref_table, ref_column)
                .with_on_delete(ForeignKeyAction::parse(&on_delete))
                .with_on_update(ForeignKeyAction::parse(&on_update))
        })
        .collect())
}

async fn fetch_indexes(conn: &mut SqliteConnection, table_name: &str) -> DbResult<Vec<IndexInfo>> {
    let idx_list = sqlx::query(queries::INDEX_LIST)
        .bind(table_name)
        .fetch_all(&mut *conn)
        .await?;

    let mut indexes = Vec::with_capacity(idx_list.len());
    for idx_row in &idx_list {
        let name: String = idx_row.get("name");
        let is_unique: i64 = idx_row.get("unique");
        let origin: String = idx_row.try_get("origin").unwrap_or_default();

        // Expression index columns have no name
        let columns: Vec<String> = sqlx::query_scalar::<_, Option<String>>(queries::INDEX_COLUMNS)
            .bind(&name)
            .fetch_all(&mut *conn)
            .await?
            .into_iter()
            .map(|c| c.unwrap_or_else(|| "<expr>".to_string()))
            .collect();

        indexes.push(
            IndexInfo::new(name, columns)
                .with_unique(is_unique != 0)
                .with_primary(origin == "pk"),
        );
    }
    Ok(indexes)
}
