//! Persistent daemon configuration model and defaults.

/// Root configuration persisted to `config.toml`.
#[derive(Debug, Clone, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Config {
    /// Staleness tier intervals and run bounds.
    #[serde(default)]
    pub refresh: RefreshConfig,
    /// Periodic run trigger behavior.
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    /// Metadata provider endpoint and pacing.
    #[serde(default)]
    pub provider: ProviderConfig,
    /// Catalog index storage location.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Staleness intervals per release-age tier, all measured in days.
///
/// An item is due for a tier when its premiere date falls inside the tier's
/// age window and its last refresh is older than the tier's interval.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct RefreshConfig {
    /// Interval for items premiered within the last day (default: 3 hours).
    #[serde(default = "default_interval_releases_of_the_day_days")]
    pub interval_releases_of_the_day_days: f64,
    /// Interval for items premiered 1–7 days ago.
    #[serde(default = "default_interval_releases_of_the_week_days")]
    pub interval_releases_of_the_week_days: f64,
    /// Interval for items premiered 7–30 days ago.
    #[serde(default = "default_interval_releases_of_the_month_days")]
    pub interval_releases_of_the_month_days: f64,
    /// Interval for items premiered 30–365 days ago.
    #[serde(default = "default_interval_releases_of_the_year_days")]
    pub interval_releases_of_the_year_days: f64,
    /// Backstop interval applied to items of any age, including items with
    /// no known premiere date.
    #[serde(default = "default_max_interval_days")]
    pub max_interval_days: f64,
    /// Hard cap on items selected per run. 0 means unbounded.
    #[serde(default)]
    pub max_item_number: u32,
}

/// Periodic trigger preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct SchedulerConfig {
    #[serde(default = "default_run_interval_minutes")]
    pub run_interval_minutes: u32,
    #[serde(default)]
    pub run_on_startup: bool,
}

/// Metadata provider connection preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct ProviderConfig {
    /// Base URL of the metadata provider. Empty disables actual fetches;
    /// each item refresh then fails in isolation and is retried on a later run.
    #[serde(default)]
    pub endpoint: String,
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u32,
    /// Minimum spacing between provider requests.
    #[serde(default = "default_min_request_spacing_ms")]
    pub min_request_spacing_ms: u32,
}

/// Catalog index storage preferences.
#[derive(Debug, Clone, PartialEq, serde::Deserialize, serde::Serialize, Default)]
pub struct CatalogConfig {
    /// Explicit database path. Empty means the platform data directory.
    #[serde(default)]
    pub database_path: String,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            interval_releases_of_the_day_days: default_interval_releases_of_the_day_days(),
            interval_releases_of_the_week_days: default_interval_releases_of_the_week_days(),
            interval_releases_of_the_month_days: default_interval_releases_of_the_month_days(),
            interval_releases_of_the_year_days: default_interval_releases_of_the_year_days(),
            max_interval_days: default_max_interval_days(),
            max_item_number: 0,
        }
    }
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            run_interval_minutes: default_run_interval_minutes(),
            run_on_startup: false,
        }
    }
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            request_timeout_ms: default_request_timeout_ms(),
            min_request_spacing_ms: default_min_request_spacing_ms(),
        }
    }
}

fn default_interval_releases_of_the_day_days() -> f64 {
    0.125
}

fn default_interval_releases_of_the_week_days() -> f64 {
    1.0
}

fn default_interval_releases_of_the_month_days() -> f64 {
    7.0
}

fn default_interval_releases_of_the_year_days() -> f64 {
    30.0
}

fn default_max_interval_days() -> f64 {
    90.0
}

fn default_run_interval_minutes() -> u32 {
    60
}

fn default_request_timeout_ms() -> u32 {
    10_000
}

fn default_min_request_spacing_ms() -> u32 {
    250
}

/// Clamps nonsensical values loaded from user-edited config files.
pub fn sanitize_config(config: Config) -> Config {
    let clamped_day = config
        .refresh
        .interval_releases_of_the_day_days
        .clamp(0.01, 1.0);
    let clamped_week = config
        .refresh
        .interval_releases_of_the_week_days
        .clamp(clamped_day, 7.0);
    let clamped_month = config
        .refresh
        .interval_releases_of_the_month_days
        .clamp(clamped_week, 30.0);
    let clamped_year = config
        .refresh
        .interval_releases_of_the_year_days
        .clamp(clamped_month, 365.0);
    let clamped_max = config.refresh.max_interval_days.max(clamped_year);
    let clamped_run_interval = config.scheduler.run_interval_minutes.max(1);
    let clamped_timeout = config.provider.request_timeout_ms.clamp(500, 120_000);

    Config {
        refresh: RefreshConfig {
            interval_releases_of_the_day_days: clamped_day,
            interval_releases_of_the_week_days: clamped_week,
            interval_releases_of_the_month_days: clamped_month,
            interval_releases_of_the_year_days: clamped_year,
            max_interval_days: clamped_max,
            max_item_number: config.refresh.max_item_number,
        },
        scheduler: SchedulerConfig {
            run_interval_minutes: clamped_run_interval,
            run_on_startup: config.scheduler.run_on_startup,
        },
        provider: ProviderConfig {
            endpoint: config.provider.endpoint.trim().to_string(),
            request_timeout_ms: clamped_timeout,
            min_request_spacing_ms: config.provider.min_request_spacing_ms.max(1),
        },
        catalog: config.catalog,
    }
}

#[cfg(test)]
mod tests {
    use super::{sanitize_config, Config, RefreshConfig, SchedulerConfig};

    #[test]
    fn test_default_config_has_expected_tier_intervals() {
        let config = Config::default();

        assert!((config.refresh.interval_releases_of_the_day_days - 0.125).abs() < f64::EPSILON);
        assert!((config.refresh.interval_releases_of_the_week_days - 1.0).abs() < f64::EPSILON);
        assert!((config.refresh.interval_releases_of_the_month_days - 7.0).abs() < f64::EPSILON);
        assert!((config.refresh.interval_releases_of_the_year_days - 30.0).abs() < f64::EPSILON);
        assert!((config.refresh.max_interval_days - 90.0).abs() < f64::EPSILON);
        assert_eq!(config.refresh.max_item_number, 0);

        assert_eq!(config.scheduler.run_interval_minutes, 60);
        assert!(!config.scheduler.run_on_startup);

        assert!(config.provider.endpoint.is_empty());
        assert_eq!(config.provider.request_timeout_ms, 10_000);
        assert_eq!(config.provider.min_request_spacing_ms, 250);
        assert!(config.catalog.database_path.is_empty());
    }

    #[test]
    fn test_partial_config_deserialization_fills_defaults() {
        let partial_config_toml = r#"
[refresh]
max_item_number = 500

[provider]
endpoint = "https://metadata.example.org/api"
"#;

        let parsed: Config = toml::from_str(partial_config_toml).expect("config should parse");
        assert_eq!(parsed.refresh.max_item_number, 500);
        assert!((parsed.refresh.interval_releases_of_the_day_days - 0.125).abs() < f64::EPSILON);
        assert!((parsed.refresh.max_interval_days - 90.0).abs() < f64::EPSILON);
        assert_eq!(parsed.provider.endpoint, "https://metadata.example.org/api");
        assert_eq!(parsed.provider.request_timeout_ms, 10_000);
        assert_eq!(parsed.scheduler, SchedulerConfig::default());
    }

    #[test]
    fn test_empty_config_deserializes_to_defaults() {
        let parsed: Config = toml::from_str("").expect("config should parse");
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_sanitize_config_orders_tier_intervals() {
        let input = Config {
            refresh: RefreshConfig {
                interval_releases_of_the_day_days: 5.0,
                interval_releases_of_the_week_days: 0.5,
                interval_releases_of_the_month_days: 0.5,
                interval_releases_of_the_year_days: 0.5,
                max_interval_days: 0.5,
                max_item_number: 10,
            },
            ..Config::default()
        };

        let sanitized = sanitize_config(input);
        assert!(
            sanitized.refresh.interval_releases_of_the_day_days
                <= sanitized.refresh.interval_releases_of_the_week_days
        );
        assert!(
            sanitized.refresh.interval_releases_of_the_week_days
                <= sanitized.refresh.interval_releases_of_the_month_days
        );
        assert!(
            sanitized.refresh.interval_releases_of_the_month_days
                <= sanitized.refresh.interval_releases_of_the_year_days
        );
        assert!(
            sanitized.refresh.interval_releases_of_the_year_days
                <= sanitized.refresh.max_interval_days
        );
        assert_eq!(sanitized.refresh.max_item_number, 10);
    }

    #[test]
    fn test_sanitize_config_clamps_scheduler_and_provider_limits() {
        let mut input = Config::default();
        input.scheduler.run_interval_minutes = 0;
        input.provider.request_timeout_ms = 1;
        input.provider.min_request_spacing_ms = 0;
        input.provider.endpoint = "  https://metadata.example.org/api  ".to_string();

        let sanitized = sanitize_config(input);
        assert_eq!(sanitized.scheduler.run_interval_minutes, 1);
        assert_eq!(sanitized.provider.request_timeout_ms, 500);
        assert_eq!(sanitized.provider.min_request_spacing_ms, 1);
        assert_eq!(sanitized.provider.endpoint, "https://metadata.example.org/api");
    }

    #[test]
    fn test_system_config_template_matches_default_values() {
        let parsed: Config = toml::from_str(include_str!("../config/config.system.toml"))
            .expect("system config template should parse");
        assert_eq!(parsed, Config::default());
    }
}
