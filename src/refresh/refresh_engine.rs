//! Metadata refresh delegation boundary.
//!
//! The runner hands each due item to an [`ItemRefresher`]; the provider-backed
//! implementation fetches replacement metadata over HTTP and stamps the item's
//! last-refreshed time in the catalog index.

use std::num::NonZeroU32;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use governor::state::NotKeyed;
use governor::{Quota, RateLimiter};
use log::debug;
use serde_json::Value;

use crate::config::ProviderConfig;
use crate::db_manager::DbManager;
use crate::protocol::CatalogItem;

const METAFRESH_USER_AGENT: &str = "metafresh/0.1.0 (catalog metadata refresh)";
const LIMITER_WAIT_SLICE: Duration = Duration::from_millis(25);

/// Performs a full forced metadata refresh for one catalog item.
///
/// A refresh replaces existing metadata rather than merging into it. Errors
/// are per-item: the runner logs them and moves on to the next item.
pub trait ItemRefresher {
    fn refresh_item(&mut self, item: &CatalogItem) -> Result<(), String>;
}

/// Refresh engine backed by an HTTP metadata provider.
pub struct ProviderRefreshEngine {
    db_manager: DbManager,
    endpoint: String,
    request_timeout: Duration,
    provider_limiter:
        RateLimiter<NotKeyed, governor::state::InMemoryState, governor::clock::DefaultClock>,
    http_client: ureq::Agent,
}

impl ProviderRefreshEngine {
    pub fn new(provider_config: &ProviderConfig, db_manager: DbManager) -> Self {
        let http_client = ureq::AgentBuilder::new()
            .timeout_connect(Duration::from_secs(5))
            .build();
        let spacing = Duration::from_millis(u64::from(provider_config.min_request_spacing_ms.max(1)));

        Self {
            db_manager,
            endpoint: provider_config.endpoint.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_millis(u64::from(provider_config.request_timeout_ms)),
            provider_limiter: RateLimiter::direct(
                Quota::with_period(spacing)
                    .expect("valid limiter period")
                    .allow_burst(NonZeroU32::new(1).expect("non-zero limiter burst")),
            ),
            http_client,
        }
    }

    fn now_unix_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0)
    }

    fn wait_for_request_slot(&self) {
        while self.provider_limiter.check().is_err() {
            std::thread::sleep(LIMITER_WAIT_SLICE);
        }
    }

    fn metadata_url(&self, item: &CatalogItem) -> String {
        format!(
            "{}/metadata/{}/{}?mode=replace",
            self.endpoint,
            item.kind.as_str(),
            urlencoding::encode(&item.id)
        )
    }

    fn fetch_replacement_metadata(&self, item: &CatalogItem) -> Result<Value, String> {
        let url = self.metadata_url(item);
        self.wait_for_request_slot();
        let response = self
            .http_client
            .get(&url)
            .set("User-Agent", METAFRESH_USER_AGENT)
            .set("Accept", "application/json")
            .timeout(self.request_timeout)
            .call()
            .map_err(|error| format!("Provider request failed: {error}"))?;
        response
            .into_json::<Value>()
            .map_err(|error| format!("Provider returned unreadable metadata: {error}"))
    }
}

impl ItemRefresher for ProviderRefreshEngine {
    fn refresh_item(&mut self, item: &CatalogItem) -> Result<(), String> {
        if self.endpoint.is_empty() {
            return Err("provider endpoint not configured".to_string());
        }

        let metadata = self.fetch_replacement_metadata(item)?;
        let replacement_title = metadata["title"]
            .as_str()
            .map(str::trim)
            .filter(|title| !title.is_empty())
            .unwrap_or(item.title.as_str());

        self.db_manager
            .replace_item_metadata(&item.id, replacement_title)
            .map_err(|error| format!("Failed to write metadata for {}: {error}", item.id))?;
        self.db_manager
            .mark_item_refreshed(&item.id, Self::now_unix_ms())
            .map_err(|error| format!("Failed to stamp refresh for {}: {error}", item.id))?;

        debug!(
            "Refreshed metadata for item {} ({})",
            item.id,
            item.kind.as_str()
        );
        Ok(())
    }
}
