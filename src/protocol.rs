//! Event-bus protocol shared by all runtime components.
//!
//! This module defines all message payloads exchanged between the scheduler,
//! the refresh task manager, and configuration handlers.

use crate::config::Config;

/// Top-level envelope for all bus traffic.
#[derive(Debug, Clone)]
pub enum Message {
    Refresh(RefreshMessage),
    Config(ConfigMessage),
    Shutdown,
}

/// Catalog entry kinds tracked for metadata freshness.
///
/// Items of any other kind are never selected for refresh.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Deserialize, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemKind {
    Movie,
    Series,
    Season,
    Episode,
    Album,
    MusicVideo,
}

impl ItemKind {
    /// Stable storage key used in the catalog index.
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Movie => "movie",
            ItemKind::Series => "series",
            ItemKind::Season => "season",
            ItemKind::Episode => "episode",
            ItemKind::Album => "album",
            ItemKind::MusicVideo => "music_video",
        }
    }

    pub fn from_storage_key(key: &str) -> Option<Self> {
        match key {
            "movie" => Some(ItemKind::Movie),
            "series" => Some(ItemKind::Series),
            "season" => Some(ItemKind::Season),
            "episode" => Some(ItemKind::Episode),
            "album" => Some(ItemKind::Album),
            "music_video" => Some(ItemKind::MusicVideo),
            _ => None,
        }
    }
}

/// One catalog entry as read from the catalog index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Stable item id.
    pub id: String,
    /// Entry kind.
    pub kind: ItemKind,
    /// Display title.
    pub title: String,
    /// Premiere date in unix milliseconds, when known.
    pub premiere_unix_ms: Option<i64>,
    /// Timestamp of the most recent successful metadata refresh,
    /// in unix milliseconds. Advanced only by the refresh engine.
    pub last_refreshed_unix_ms: i64,
}

/// Refresh-domain commands and run lifecycle notifications.
#[derive(Debug, Clone)]
pub enum RefreshMessage {
    /// Start one refresh pass if none is in flight on the manager thread.
    TriggerRun,
    /// Request cooperative cancellation of the in-flight run.
    CancelRun,
    RunStarted {
        run_id: String,
        due_items: usize,
    },
    RunProgress {
        run_id: String,
        percent: f64,
    },
    RunCompleted {
        run_id: String,
        refreshed: usize,
        failed: usize,
    },
    RunCancelled {
        run_id: String,
        refreshed: usize,
    },
    RunFailed {
        run_id: String,
        error: String,
    },
}

/// Runtime configuration updates.
#[derive(Debug, Clone)]
pub enum ConfigMessage {
    ConfigChanged(Config),
}
