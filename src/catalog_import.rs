//! Catalog feed ingestion.
//!
//! An external scanner owns the catalog contents; it drops a JSON feed next
//! to the database and this module applies it at startup. Entries marked
//! deleted are removed, everything else is upserted. Refresh stamps are
//! never touched here.

use std::path::Path;

use log::{info, warn};

use crate::db_manager::DbManager;
use crate::protocol::{CatalogItem, ItemKind};

pub const CATALOG_FEED_FILE_NAME: &str = "catalog.feed.json";

/// One entry of the scanner feed.
#[derive(Debug, Clone, serde::Deserialize)]
pub struct CatalogFeedEntry {
    pub id: String,
    pub kind: ItemKind,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub premiere_unix_ms: Option<i64>,
    #[serde(default)]
    pub deleted: bool,
}

/// Applies one parsed feed to the catalog index.
///
/// Returns (upserted, removed). Malformed rows were already rejected during
/// parsing; storage failures abort the whole import.
pub fn apply_feed(
    db_manager: &DbManager,
    entries: &[CatalogFeedEntry],
) -> Result<(usize, usize), rusqlite::Error> {
    let mut upserted = 0usize;
    let mut removed = 0usize;

    for entry in entries {
        if entry.deleted {
            db_manager.remove_item(&entry.id)?;
            removed += 1;
            continue;
        }
        db_manager.upsert_item(&CatalogItem {
            id: entry.id.clone(),
            kind: entry.kind,
            title: entry.title.clone(),
            premiere_unix_ms: entry.premiere_unix_ms,
            last_refreshed_unix_ms: 0,
        })?;
        upserted += 1;
    }

    Ok((upserted, removed))
}

/// Ingests the scanner feed file when present, then deletes it.
pub fn ingest_feed_file(db_manager: &DbManager, feed_path: &Path) {
    let feed_text = match std::fs::read_to_string(feed_path) {
        Ok(text) => text,
        Err(_) => return,
    };

    let entries: Vec<CatalogFeedEntry> = match serde_json::from_str(&feed_text) {
        Ok(entries) => entries,
        Err(err) => {
            warn!(
                "Ignoring malformed catalog feed {}: {}",
                feed_path.display(),
                err
            );
            return;
        }
    };

    match apply_feed(db_manager, &entries) {
        Ok((upserted, removed)) => {
            let total = db_manager.item_count().unwrap_or(-1);
            info!(
                "Catalog feed applied: {} upserted, {} removed, {} item(s) tracked",
                upserted, removed, total
            );
            if let Err(err) = std::fs::remove_file(feed_path) {
                warn!(
                    "Failed to remove consumed catalog feed {}: {}",
                    feed_path.display(),
                    err
                );
            }
        }
        Err(err) => {
            warn!(
                "Failed to apply catalog feed {}: {}",
                feed_path.display(),
                err
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{apply_feed, CatalogFeedEntry};
    use crate::db_manager::DbManager;
    use crate::protocol::ItemKind;

    #[test]
    fn test_apply_feed_upserts_and_removes() {
        let db = DbManager::open_in_memory().expect("in-memory catalog should open");
        let feed_json = r#"[
            {"id": "m1", "kind": "movie", "title": "First", "premiere_unix_ms": 1000},
            {"id": "e1", "kind": "episode", "title": "Pilot"},
            {"id": "m1", "kind": "movie", "title": "First (Remastered)", "premiere_unix_ms": 1000},
            {"id": "e1", "kind": "episode", "deleted": true}
        ]"#;
        let entries: Vec<CatalogFeedEntry> =
            serde_json::from_str(feed_json).expect("feed should parse");

        let (upserted, removed) = apply_feed(&db, &entries).expect("feed should apply");
        assert_eq!(upserted, 3);
        assert_eq!(removed, 1);
        assert_eq!(db.item_count().expect("count should succeed"), 1);

        let item = db
            .get_item("m1")
            .expect("lookup should succeed")
            .expect("item should exist");
        assert_eq!(item.title, "First (Remastered)");
        assert_eq!(item.kind, ItemKind::Movie);
    }

    #[test]
    fn test_feed_entries_default_optional_fields() {
        let entries: Vec<CatalogFeedEntry> =
            serde_json::from_str(r#"[{"id": "a1", "kind": "album"}]"#)
                .expect("feed should parse");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].title.is_empty());
        assert_eq!(entries[0].premiere_unix_ms, None);
        assert!(!entries[0].deleted);
    }
}
