//! Runtime configuration reload.
//!
//! Polls the config file and publishes `ConfigChanged` on the bus when an
//! edit produces a different effective configuration. Consumers apply the
//! update at their own pace; the refresh manager rebuilds its tier schedule
//! before the next run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use log::info;
use tokio::sync::broadcast::Sender;

use crate::config::{sanitize_config, Config};
use crate::config_persistence::load_config_file;
use crate::protocol::{ConfigMessage, Message};

const CONFIG_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Reloads the config file and returns it when it differs from `last_config`.
///
/// Unreadable or unparsable files fall back to defaults inside
/// `load_config_file`, so a broken edit shows up as a change to defaults
/// rather than being ignored.
fn reload_if_changed(config_path: &Path, last_config: &Config) -> Option<Config> {
    let next_config = sanitize_config(load_config_file(config_path));
    if &next_config == last_config {
        None
    } else {
        Some(next_config)
    }
}

/// Blocking poll loop. Returns when the bus has no receivers left.
pub fn run_config_watcher(
    bus_producer: Sender<Message>,
    config_path: PathBuf,
    initial_config: Config,
) {
    let mut last_config = initial_config;
    loop {
        std::thread::sleep(CONFIG_POLL_INTERVAL);
        if let Some(next_config) = reload_if_changed(&config_path, &last_config) {
            info!(
                "Configuration change detected in {}; applying new settings",
                config_path.display()
            );
            last_config = next_config.clone();
            if bus_producer
                .send(Message::Config(ConfigMessage::ConfigChanged(next_config)))
                .is_err()
            {
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::reload_if_changed;
    use crate::config::Config;

    #[test]
    fn test_reload_detects_changed_file_once() {
        let config_path = std::env::temp_dir().join(format!(
            "metafresh-watcher-{}.toml",
            uuid::Uuid::new_v4()
        ));
        std::fs::write(&config_path, "[refresh]\nmax_item_number = 9\n")
            .expect("config fixture should write");

        let reloaded = reload_if_changed(&config_path, &Config::default())
            .expect("edited file should reload");
        assert_eq!(reloaded.refresh.max_item_number, 9);
        assert!((reloaded.refresh.max_interval_days - 90.0).abs() < f64::EPSILON);

        // Unchanged file produces no further updates.
        assert!(reload_if_changed(&config_path, &reloaded).is_none());

        std::fs::remove_file(&config_path).expect("config fixture should clean up");
    }
}
