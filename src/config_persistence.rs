use std::path::Path;

use log::warn;
use toml_edit::{value, DocumentMut, Item, Table};

use crate::config::Config;

fn set_table_value_preserving_decor(table: &mut Table, key: &str, item: Item) {
    let existing_value_decor = table
        .get(key)
        .and_then(|current| current.as_value().map(|value| value.decor().clone()));
    table[key] = item;
    if let Some(existing_value_decor) = existing_value_decor {
        if let Some(next_value) = table[key].as_value_mut() {
            *next_value.decor_mut() = existing_value_decor;
        }
    }
}

fn set_table_scalar_if_changed<T, F>(
    table: &mut Table,
    key: &str,
    previous_value: T,
    next_value: T,
    to_item: F,
) where
    T: PartialEq + Copy,
    F: FnOnce(T) -> Item,
{
    if table.contains_key(key) && previous_value == next_value {
        return;
    }
    set_table_value_preserving_decor(table, key, to_item(next_value));
}

fn ensure_section_table(document: &mut DocumentMut, key: &str) {
    let root = document.as_table_mut();
    let should_replace = !matches!(root.get(key), Some(item) if item.is_table());
    if should_replace {
        root.insert(key, Item::Table(Table::new()));
    }
}

fn write_config_to_document(document: &mut DocumentMut, previous: &Config, config: &Config) {
    ensure_section_table(document, "refresh");
    ensure_section_table(document, "scheduler");
    ensure_section_table(document, "provider");
    ensure_section_table(document, "catalog");

    {
        let refresh = document["refresh"]
            .as_table_mut()
            .expect("refresh should be a table");
        set_table_scalar_if_changed(
            refresh,
            "interval_releases_of_the_day_days",
            previous.refresh.interval_releases_of_the_day_days,
            config.refresh.interval_releases_of_the_day_days,
            value,
        );
        set_table_scalar_if_changed(
            refresh,
            "interval_releases_of_the_week_days",
            previous.refresh.interval_releases_of_the_week_days,
            config.refresh.interval_releases_of_the_week_days,
            value,
        );
        set_table_scalar_if_changed(
            refresh,
            "interval_releases_of_the_month_days",
            previous.refresh.interval_releases_of_the_month_days,
            config.refresh.interval_releases_of_the_month_days,
            value,
        );
        set_table_scalar_if_changed(
            refresh,
            "interval_releases_of_the_year_days",
            previous.refresh.interval_releases_of_the_year_days,
            config.refresh.interval_releases_of_the_year_days,
            value,
        );
        set_table_scalar_if_changed(
            refresh,
            "max_interval_days",
            previous.refresh.max_interval_days,
            config.refresh.max_interval_days,
            value,
        );
        set_table_scalar_if_changed(
            refresh,
            "max_item_number",
            i64::from(previous.refresh.max_item_number),
            i64::from(config.refresh.max_item_number),
            value,
        );
    }

    {
        let scheduler = document["scheduler"]
            .as_table_mut()
            .expect("scheduler should be a table");
        set_table_scalar_if_changed(
            scheduler,
            "run_interval_minutes",
            i64::from(previous.scheduler.run_interval_minutes),
            i64::from(config.scheduler.run_interval_minutes),
            value,
        );
        set_table_scalar_if_changed(
            scheduler,
            "run_on_startup",
            previous.scheduler.run_on_startup,
            config.scheduler.run_on_startup,
            value,
        );
    }

    {
        let provider = document["provider"]
            .as_table_mut()
            .expect("provider should be a table");
        if !provider.contains_key("endpoint")
            || previous.provider.endpoint != config.provider.endpoint
        {
            set_table_value_preserving_decor(
                provider,
                "endpoint",
                value(config.provider.endpoint.clone()),
            );
        }
        set_table_scalar_if_changed(
            provider,
            "request_timeout_ms",
            i64::from(previous.provider.request_timeout_ms),
            i64::from(config.provider.request_timeout_ms),
            value,
        );
        set_table_scalar_if_changed(
            provider,
            "min_request_spacing_ms",
            i64::from(previous.provider.min_request_spacing_ms),
            i64::from(config.provider.min_request_spacing_ms),
            value,
        );
    }

    {
        let catalog = document["catalog"]
            .as_table_mut()
            .expect("catalog should be a table");
        if !catalog.contains_key("database_path")
            || previous.catalog.database_path != config.catalog.database_path
        {
            set_table_value_preserving_decor(
                catalog,
                "database_path",
                value(config.catalog.database_path.clone()),
            );
        }
    }
}

pub fn serialize_config_with_preserved_comments(
    existing_text: &str,
    config: &Config,
) -> Result<String, String> {
    let previous = toml::from_str::<Config>(existing_text)
        .map_err(|err| format!("failed to parse existing config as Config: {}", err))?;
    let mut document = existing_text
        .parse::<DocumentMut>()
        .map_err(|err| format!("failed to parse existing config as TOML document: {}", err))?;
    write_config_to_document(&mut document, &previous, config);
    Ok(document.to_string())
}

pub fn persist_config_file(config: &Config, path: &Path) {
    let existing_text = std::fs::read_to_string(path).ok();
    let config_text = if let Some(existing_text) = existing_text {
        match serialize_config_with_preserved_comments(&existing_text, config) {
            Ok(updated_text) => Some(updated_text),
            Err(err) => {
                warn!(
                    "Failed to preserve config comments for {} ({}). Falling back to plain serialization.",
                    path.display(),
                    err
                );
                toml::to_string(config).ok()
            }
        }
    } else {
        toml::to_string(config).ok()
    };

    let Some(config_text) = config_text else {
        log::error!("Failed to serialize config for {}", path.display());
        return;
    };

    if let Err(err) = std::fs::write(path, config_text) {
        log::error!("Failed to persist config to {}: {}", path.display(), err);
    }
}

pub fn system_config_template_text() -> &'static str {
    include_str!("../config/config.system.toml")
}

pub fn load_config_file(path: &Path) -> Config {
    let config_content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            warn!(
                "Failed to read config file {}. Using built-in defaults. error={}",
                path.display(),
                err
            );
            return Config::default();
        }
    };

    match toml::from_str::<Config>(&config_content) {
        Ok(config) => config,
        Err(err) => {
            warn!(
                "Failed to parse config file {}. Using built-in defaults. error={}",
                path.display(),
                err
            );
            Config::default()
        }
    }
}
