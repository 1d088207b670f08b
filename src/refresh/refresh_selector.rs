//! Staleness-tiered selection of catalog items due for a metadata refresh.
//!
//! Tiers are ordered most-recent-release first: new releases are re-checked
//! far more often than back-catalog items because their metadata is the most
//! volatile. A windowless fallback tier guarantees every tracked item is
//! revisited within the configured maximum interval, whatever its age.

use std::collections::HashSet;

use log::{debug, info};

use crate::config::RefreshConfig;
use crate::db_manager::{DbManager, REFRESHABLE_ITEM_KINDS};
use crate::protocol::CatalogItem;

const DAY_MS: f64 = 86_400_000.0;

/// One age window paired with a staleness interval.
///
/// Window bounds are day offsets relative to `now`: the floor is the oldest
/// admitted premiere (inclusive), the ceiling the newest (exclusive). A
/// negative ceiling admits premieres slightly in the future. `None` on both
/// bounds matches every item, including those with no premiere date.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RefreshTier {
    pub premiere_floor_days_ago: Option<f64>,
    pub premiere_ceiling_days_ago: Option<f64>,
    pub staleness_interval_days: f64,
}

/// Ordered tier list plus the per-run item cap.
#[derive(Debug, Clone, PartialEq)]
pub struct TierSchedule {
    tiers: Vec<RefreshTier>,
    max_item_number: usize,
}

impl TierSchedule {
    /// Builds the tier ladder from configured intervals.
    ///
    /// The day tier's window extends one day into the future so pre-release
    /// and timezone-early premiere listings are still captured by the
    /// highest-priority tier. The final tier is the windowless fallback.
    pub fn from_config(refresh_config: &RefreshConfig) -> Self {
        let tiers = vec![
            RefreshTier {
                premiere_floor_days_ago: Some(1.0),
                premiere_ceiling_days_ago: Some(-1.0),
                staleness_interval_days: refresh_config.interval_releases_of_the_day_days,
            },
            RefreshTier {
                premiere_floor_days_ago: Some(7.0),
                premiere_ceiling_days_ago: Some(1.0),
                staleness_interval_days: refresh_config.interval_releases_of_the_week_days,
            },
            RefreshTier {
                premiere_floor_days_ago: Some(30.0),
                premiere_ceiling_days_ago: Some(7.0),
                staleness_interval_days: refresh_config.interval_releases_of_the_month_days,
            },
            RefreshTier {
                premiere_floor_days_ago: Some(365.0),
                premiere_ceiling_days_ago: Some(30.0),
                staleness_interval_days: refresh_config.interval_releases_of_the_year_days,
            },
            RefreshTier {
                premiere_floor_days_ago: None,
                premiere_ceiling_days_ago: None,
                staleness_interval_days: refresh_config.max_interval_days,
            },
        ];

        Self {
            tiers,
            max_item_number: refresh_config.max_item_number as usize,
        }
    }

    pub fn tiers(&self) -> &[RefreshTier] {
        &self.tiers
    }

    pub fn max_item_number(&self) -> usize {
        self.max_item_number
    }
}

fn days_ago_to_unix_ms(now_unix_ms: i64, days_ago: f64) -> i64 {
    now_unix_ms - (days_ago * DAY_MS).round() as i64
}

/// Merges one tier's matches into the accumulated selection, deduplicating by
/// item id and preserving first-capture order. Returns true once the cap is
/// reached; the accumulated selection is then truncated to exactly the cap.
pub(crate) fn merge_tier_matches(
    selected: &mut Vec<CatalogItem>,
    seen_ids: &mut HashSet<String>,
    tier_matches: Vec<CatalogItem>,
    max_item_number: usize,
) -> bool {
    for item in tier_matches {
        if seen_ids.insert(item.id.clone()) {
            selected.push(item);
        }
    }
    if max_item_number > 0 && selected.len() >= max_item_number {
        selected.truncate(max_item_number);
        return true;
    }
    false
}

/// Selects the ordered, deduplicated, capped set of items due for refresh.
///
/// `now_unix_ms` is snapshotted once by the caller so every tier window is
/// computed against the same instant. Pure read path: any catalog query
/// failure aborts the whole selection. Order within one tier is whatever the
/// catalog query returns and carries no guarantee.
pub fn select_items_due(
    db_manager: &DbManager,
    now_unix_ms: i64,
    schedule: &TierSchedule,
) -> Result<Vec<CatalogItem>, rusqlite::Error> {
    let mut selected: Vec<CatalogItem> = Vec::new();
    let mut seen_ids: HashSet<String> = HashSet::new();

    for tier in schedule.tiers() {
        let min_premiere_unix_ms = tier
            .premiere_floor_days_ago
            .map(|days_ago| days_ago_to_unix_ms(now_unix_ms, days_ago));
        let max_premiere_unix_ms = tier
            .premiere_ceiling_days_ago
            .map(|days_ago| days_ago_to_unix_ms(now_unix_ms, days_ago));
        let refreshed_before_unix_ms =
            days_ago_to_unix_ms(now_unix_ms, tier.staleness_interval_days);

        let tier_matches: Vec<CatalogItem> = db_manager
            .query_items(
                &REFRESHABLE_ITEM_KINDS,
                min_premiere_unix_ms,
                max_premiere_unix_ms,
            )?
            .into_iter()
            .filter(|item| item.last_refreshed_unix_ms <= refreshed_before_unix_ms)
            .collect();

        debug!(
            "Tier window floor={:?} ceiling={:?}: {} stale item(s)",
            tier.premiere_floor_days_ago,
            tier.premiere_ceiling_days_ago,
            tier_matches.len()
        );

        if merge_tier_matches(
            &mut selected,
            &mut seen_ids,
            tier_matches,
            schedule.max_item_number(),
        ) {
            info!(
                "Selection capped at {} item(s); lower tiers skipped",
                selected.len()
            );
            return Ok(selected);
        }
    }

    info!("Found {} item(s) due for refresh", selected.len());
    Ok(selected)
}

#[cfg(test)]
mod tests {
    use std::collections::HashSet;

    use super::{merge_tier_matches, select_items_due, TierSchedule, DAY_MS};
    use crate::config::RefreshConfig;
    use crate::db_manager::DbManager;
    use crate::protocol::{CatalogItem, ItemKind};

    const NOW_UNIX_MS: i64 = 1_700_000_000_000;

    fn hours_ms(hours: f64) -> i64 {
        (hours * 3_600_000.0) as i64
    }

    fn days_ms(days: f64) -> i64 {
        (days * DAY_MS) as i64
    }

    fn catalog_item(id: &str, premiere_unix_ms: Option<i64>, last_refreshed_unix_ms: i64) -> CatalogItem {
        CatalogItem {
            id: id.to_string(),
            kind: ItemKind::Movie,
            title: format!("Title {id}"),
            premiere_unix_ms,
            last_refreshed_unix_ms,
        }
    }

    fn seeded_db(items: &[CatalogItem]) -> DbManager {
        let db = DbManager::open_in_memory().expect("in-memory catalog should open");
        for item in items {
            db.upsert_item(item).expect("seed upsert should succeed");
        }
        db
    }

    fn default_schedule() -> TierSchedule {
        TierSchedule::from_config(&RefreshConfig::default())
    }

    fn capped_schedule(max_item_number: u32) -> TierSchedule {
        TierSchedule::from_config(&RefreshConfig {
            max_item_number,
            ..RefreshConfig::default()
        })
    }

    #[test]
    fn test_day_tier_selects_recent_release_not_refreshed_within_three_hours() {
        // Premiered 2 hours ago, last refreshed 4 hours ago.
        let db = seeded_db(&[catalog_item(
            "fresh-release",
            Some(NOW_UNIX_MS - hours_ms(2.0)),
            NOW_UNIX_MS - hours_ms(4.0),
        )]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "fresh-release");
    }

    #[test]
    fn test_recently_refreshed_recent_release_is_not_selected() {
        // Premiered 2 hours ago, refreshed 1 hour ago: inside the day-tier
        // interval and far from the fallback interval, so excluded entirely.
        let db = seeded_db(&[catalog_item(
            "fresh-release",
            Some(NOW_UNIX_MS - hours_ms(2.0)),
            NOW_UNIX_MS - hours_ms(1.0),
        )]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        assert!(selected.is_empty());
    }

    #[test]
    fn test_day_tier_admits_slightly_future_premiere_dates() {
        let db = seeded_db(&[catalog_item(
            "pre-release",
            Some(NOW_UNIX_MS + hours_ms(12.0)),
            NOW_UNIX_MS - hours_ms(4.0),
        )]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "pre-release");
    }

    #[test]
    fn test_week_tier_uses_one_day_interval() {
        let three_days_ago = NOW_UNIX_MS - days_ms(3.0);
        let db = seeded_db(&[
            catalog_item("due", Some(three_days_ago), NOW_UNIX_MS - days_ms(2.0)),
            catalog_item("not-due", Some(three_days_ago), NOW_UNIX_MS - hours_ms(12.0)),
        ]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        let ids: Vec<&str> = selected.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["due"]);
    }

    #[test]
    fn test_each_item_appears_at_most_once() {
        // A premiere right at the week/month boundary plus an ancient refresh
        // stamp makes the item eligible for a window tier and the fallback.
        let db = seeded_db(&[catalog_item(
            "boundary",
            Some(NOW_UNIX_MS - days_ms(7.0)),
            NOW_UNIX_MS - days_ms(400.0),
        )]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_cap_reached_in_day_tier_skips_lower_tiers() {
        let mut items = Vec::new();
        for index in 0..8 {
            items.push(catalog_item(
                &format!("day-{index}"),
                Some(NOW_UNIX_MS - hours_ms(2.0)),
                NOW_UNIX_MS - hours_ms(6.0),
            ));
        }
        // Month-tier item that is also long overdue; must never appear.
        items.push(catalog_item(
            "month-item",
            Some(NOW_UNIX_MS - days_ms(14.0)),
            NOW_UNIX_MS - days_ms(200.0),
        ));
        let db = seeded_db(&items);

        let selected = select_items_due(&db, NOW_UNIX_MS, &capped_schedule(5))
            .expect("selection should succeed");
        assert_eq!(selected.len(), 5);
        assert!(selected.iter().all(|item| item.id.starts_with("day-")));
    }

    #[test]
    fn test_cap_exactness_across_tiers() {
        let db = seeded_db(&[
            catalog_item(
                "day-a",
                Some(NOW_UNIX_MS - hours_ms(2.0)),
                NOW_UNIX_MS - hours_ms(6.0),
            ),
            catalog_item(
                "week-a",
                Some(NOW_UNIX_MS - days_ms(3.0)),
                NOW_UNIX_MS - days_ms(2.0),
            ),
            catalog_item(
                "week-b",
                Some(NOW_UNIX_MS - days_ms(4.0)),
                NOW_UNIX_MS - days_ms(2.0),
            ),
        ]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &capped_schedule(2))
            .expect("selection should succeed");
        assert_eq!(selected.len(), 2);
        // Day-tier capture always precedes week-tier capture.
        assert_eq!(selected[0].id, "day-a");
        assert!(selected[1].id.starts_with("week-"));
    }

    #[test]
    fn test_fallback_tier_selects_undated_item_past_max_interval() {
        let db = seeded_db(&[catalog_item(
            "undated",
            None,
            NOW_UNIX_MS - days_ms(100.0),
        )]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "undated");
    }

    #[test]
    fn test_fallback_liveness_regardless_of_premiere_age() {
        // Old item outside every window tier's staleness reach but past the
        // 90-day fallback interval.
        let db = seeded_db(&[catalog_item(
            "back-catalog",
            Some(NOW_UNIX_MS - days_ms(4_000.0)),
            NOW_UNIX_MS - days_ms(91.0),
        )]);

        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "back-catalog");
    }

    #[test]
    fn test_empty_catalog_selects_nothing() {
        let db = seeded_db(&[]);
        let selected = select_items_due(&db, NOW_UNIX_MS, &default_schedule())
            .expect("selection should succeed");
        assert!(selected.is_empty());
    }

    #[test]
    fn test_merge_tier_matches_dedups_and_reports_cap() {
        let mut selected = Vec::new();
        let mut seen_ids = HashSet::new();

        let first_tier = vec![
            catalog_item("a", None, 0),
            catalog_item("b", None, 0),
        ];
        assert!(!merge_tier_matches(
            &mut selected,
            &mut seen_ids,
            first_tier,
            3
        ));

        let second_tier = vec![
            catalog_item("b", None, 0),
            catalog_item("c", None, 0),
            catalog_item("d", None, 0),
        ];
        assert!(merge_tier_matches(
            &mut selected,
            &mut seen_ids,
            second_tier,
            3
        ));

        let ids: Vec<&str> = selected.iter().map(|item| item.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_merge_tier_matches_unbounded_when_cap_is_zero() {
        let mut selected = Vec::new();
        let mut seen_ids = HashSet::new();
        let matches: Vec<CatalogItem> = (0..50)
            .map(|index| catalog_item(&format!("item-{index}"), None, 0))
            .collect();

        assert!(!merge_tier_matches(&mut selected, &mut seen_ids, matches, 0));
        assert_eq!(selected.len(), 50);
    }

    #[test]
    fn test_schedule_orders_tiers_most_recent_first() {
        let schedule = default_schedule();
        let tiers = schedule.tiers();
        assert_eq!(tiers.len(), 5);
        assert_eq!(tiers[0].premiere_ceiling_days_ago, Some(-1.0));
        assert_eq!(tiers[1].premiere_floor_days_ago, Some(7.0));
        assert_eq!(tiers[2].premiere_floor_days_ago, Some(30.0));
        assert_eq!(tiers[3].premiere_floor_days_ago, Some(365.0));
        assert_eq!(tiers[4].premiere_floor_days_ago, None);
        assert_eq!(tiers[4].premiere_ceiling_days_ago, None);
    }
}
