mod app_bootstrap;
mod catalog_import;
mod config;
mod config_watcher;
mod config_persistence;
mod db_manager;
mod protocol;
mod refresh;
mod scheduler;

use std::path::PathBuf;

use log::info;
use tokio::sync::broadcast;

use crate::app_bootstrap::services::{spawn_background_services, BackgroundServicesConfig};
use crate::config::sanitize_config;
use crate::protocol::Message;

const BUS_CAPACITY: usize = 256;

fn config_file_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .expect("Could not find config directory")
        .join("metafresh");

    if !config_dir.exists() {
        std::fs::create_dir_all(&config_dir).expect("Could not create config directory");
    }

    config_dir.join("config.toml")
}

fn main() {
    colog::init();

    let config_path = config_file_path();
    if !config_path.exists() {
        if let Err(err) =
            std::fs::write(&config_path, config_persistence::system_config_template_text())
        {
            log::error!(
                "Failed to seed config template at {}: {}",
                config_path.display(),
                err
            );
        }
    }

    let config = sanitize_config(config_persistence::load_config_file(&config_path));
    config_persistence::persist_config_file(&config, &config_path);
    info!("Loaded configuration from {}", config_path.display());

    let (bus_sender, _bus_keepalive) = broadcast::channel::<Message>(BUS_CAPACITY);

    spawn_background_services(BackgroundServicesConfig {
        bus_sender: bus_sender.clone(),
        initial_config: config.clone(),
        config_path,
    });

    // The main thread is the trigger loop; it runs until the process exits.
    scheduler::run_interval_trigger(bus_sender, config.scheduler);
}
