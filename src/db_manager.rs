use std::path::{Path, PathBuf};

use rusqlite::{params, params_from_iter, Connection, OptionalExtension};

use crate::protocol::{CatalogItem, ItemKind};

/// Kinds this daemon tracks for metadata freshness. Rows of other kinds may
/// exist in a shared catalog database but are never selected.
pub const REFRESHABLE_ITEM_KINDS: [ItemKind; 6] = [
    ItemKind::Movie,
    ItemKind::Series,
    ItemKind::Season,
    ItemKind::Episode,
    ItemKind::Album,
    ItemKind::MusicVideo,
];

pub struct DbManager {
    conn: Connection,
}

impl DbManager {
    pub fn new(database_path_override: &str) -> Result<Self, rusqlite::Error> {
        Self::open_at(&Self::resolve_database_path(database_path_override))
    }

    /// Resolves the configured database path, falling back to the platform
    /// data directory when no override is set.
    pub fn resolve_database_path(database_path_override: &str) -> PathBuf {
        if !database_path_override.trim().is_empty() {
            return PathBuf::from(database_path_override.trim());
        }

        let data_dir = dirs::data_dir()
            .expect("Could not find data directory")
            .join("metafresh");

        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).expect("Could not create data directory");
        }

        data_dir.join("catalog.db")
    }

    pub fn open_at(db_path: &Path) -> Result<Self, rusqlite::Error> {
        let conn = Connection::open(db_path)?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, rusqlite::Error> {
        let conn = Connection::open_in_memory()?;
        let db_manager = Self { conn };
        db_manager.initialize_schema()?;
        Ok(db_manager)
    }

    /// Runs arbitrary SQL against the catalog, bypassing the typed API.
    /// Lets tests seed malformed rows or break the schema.
    #[cfg(test)]
    pub fn execute_raw(&self, sql: &str) -> Result<usize, rusqlite::Error> {
        self.conn.execute(sql, [])
    }

    fn initialize_schema(&self) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS catalog_items (
                id TEXT PRIMARY KEY,
                kind TEXT NOT NULL,
                title TEXT NOT NULL,
                premiere_unix_ms INTEGER,
                last_refreshed_unix_ms INTEGER NOT NULL DEFAULT 0
            )",
            [],
        )?;

        self.conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_catalog_items_kind_premiere
                ON catalog_items (kind, premiere_unix_ms)",
            [],
        )?;
        Ok(())
    }

    /// Upserts one catalog entry. Used by whatever populates the catalog;
    /// the refresh path itself never inserts rows.
    pub fn upsert_item(&self, item: &CatalogItem) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "INSERT INTO catalog_items (id, kind, title, premiere_unix_ms, last_refreshed_unix_ms)
                VALUES (?1, ?2, ?3, ?4, ?5)
                ON CONFLICT(id) DO UPDATE SET
                    kind = excluded.kind,
                    title = excluded.title,
                    premiere_unix_ms = excluded.premiere_unix_ms",
            params![
                item.id,
                item.kind.as_str(),
                item.title,
                item.premiere_unix_ms,
                item.last_refreshed_unix_ms
            ],
        )?;
        Ok(())
    }

    pub fn remove_item(&self, id: &str) -> Result<(), rusqlite::Error> {
        self.conn
            .execute("DELETE FROM catalog_items WHERE id = ?1", params![id])?;
        Ok(())
    }

    pub fn get_item(&self, id: &str) -> Result<Option<CatalogItem>, rusqlite::Error> {
        self.conn
            .query_row(
                "SELECT id, kind, title, premiere_unix_ms, last_refreshed_unix_ms
                    FROM catalog_items WHERE id = ?1",
                params![id],
                Self::row_to_item,
            )
            .optional()
    }

    /// Queries tracked-kind items with an optional premiere-date window.
    ///
    /// `min_premiere_unix_ms` is inclusive, `max_premiere_unix_ms` exclusive.
    /// When both bounds are `None` the query matches every tracked item,
    /// including rows with no premiere date at all.
    pub fn query_items(
        &self,
        kinds: &[ItemKind],
        min_premiere_unix_ms: Option<i64>,
        max_premiere_unix_ms: Option<i64>,
    ) -> Result<Vec<CatalogItem>, rusqlite::Error> {
        let kind_placeholders = (1..=kinds.len())
            .map(|index| format!("?{index}"))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!(
            "SELECT id, kind, title, premiere_unix_ms, last_refreshed_unix_ms
                FROM catalog_items WHERE kind IN ({kind_placeholders})"
        );

        let mut bound_values: Vec<rusqlite::types::Value> = kinds
            .iter()
            .map(|kind| rusqlite::types::Value::from(kind.as_str().to_string()))
            .collect();
        if let Some(min_premiere) = min_premiere_unix_ms {
            bound_values.push(rusqlite::types::Value::from(min_premiere));
            sql.push_str(&format!(
                " AND premiere_unix_ms IS NOT NULL AND premiere_unix_ms >= ?{}",
                bound_values.len()
            ));
        }
        if let Some(max_premiere) = max_premiere_unix_ms {
            bound_values.push(rusqlite::types::Value::from(max_premiere));
            sql.push_str(&format!(
                " AND premiere_unix_ms IS NOT NULL AND premiere_unix_ms < ?{}",
                bound_values.len()
            ));
        }
        sql.push_str(" ORDER BY premiere_unix_ms DESC, id ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let item_iter = stmt.query_map(params_from_iter(bound_values), Self::row_to_item)?;

        let mut items = Vec::new();
        for item in item_iter {
            items.push(item?);
        }
        Ok(items)
    }

    /// Stamps a successful refresh. Called by the refresh engine only.
    pub fn mark_item_refreshed(
        &self,
        id: &str,
        refreshed_unix_ms: i64,
    ) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE catalog_items SET last_refreshed_unix_ms = ?1 WHERE id = ?2",
            params![refreshed_unix_ms, id],
        )?;
        Ok(())
    }

    /// Replaces the display metadata for one item after a full forced refresh.
    pub fn replace_item_metadata(&self, id: &str, title: &str) -> Result<(), rusqlite::Error> {
        self.conn.execute(
            "UPDATE catalog_items SET title = ?1 WHERE id = ?2",
            params![title, id],
        )?;
        Ok(())
    }

    pub fn item_count(&self) -> Result<i64, rusqlite::Error> {
        self.conn
            .query_row("SELECT COUNT(*) FROM catalog_items", [], |row| row.get(0))
    }

    fn row_to_item(row: &rusqlite::Row<'_>) -> Result<CatalogItem, rusqlite::Error> {
        let kind_key: String = row.get(1)?;
        let kind = ItemKind::from_storage_key(&kind_key).ok_or_else(|| {
            rusqlite::Error::FromSqlConversionFailure(
                1,
                rusqlite::types::Type::Text,
                format!("unknown catalog item kind '{kind_key}'").into(),
            )
        })?;
        Ok(CatalogItem {
            id: row.get(0)?,
            kind,
            title: row.get(2)?,
            premiere_unix_ms: row.get(3)?,
            last_refreshed_unix_ms: row.get(4)?,
        })
    }
}
