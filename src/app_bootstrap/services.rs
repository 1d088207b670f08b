use std::{any::Any, path::PathBuf, thread};

use tokio::sync::broadcast;

use crate::{
    catalog_import,
    config::Config,
    config_watcher,
    db_manager::DbManager,
    protocol::Message,
    refresh::refresh_engine::ProviderRefreshEngine,
    refresh::refresh_task_manager::RefreshTaskManager,
};

pub struct BackgroundServicesConfig {
    pub bus_sender: broadcast::Sender<Message>,
    pub initial_config: Config,
    pub config_path: PathBuf,
}

fn panic_payload_to_string(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "non-string panic payload".to_string()
}

pub fn spawn_background_services(config: BackgroundServicesConfig) {
    let BackgroundServicesConfig {
        bus_sender,
        initial_config,
        config_path,
    } = config;

    let watcher_bus_sender = bus_sender.clone();
    let watcher_config = initial_config.clone();
    thread::spawn(move || {
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            config_watcher::run_config_watcher(watcher_bus_sender, config_path, watcher_config);
        }));
        if let Err(payload) = run_result {
            log::error!(
                "Config watcher thread terminated due to panic: {}",
                panic_payload_to_string(payload.as_ref())
            );
        }
    });

    let refresh_manager_bus_receiver = bus_sender.subscribe();
    let refresh_manager_bus_sender = bus_sender.clone();
    let refresh_manager_config = initial_config.clone();
    thread::spawn(move || {
        let run_result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let db_manager = DbManager::new(&refresh_manager_config.catalog.database_path)
                .expect("Failed to initialize catalog database");

            let feed_path =
                DbManager::resolve_database_path(&refresh_manager_config.catalog.database_path)
                    .with_file_name(catalog_import::CATALOG_FEED_FILE_NAME);
            catalog_import::ingest_feed_file(&db_manager, &feed_path);

            let engine_db_manager = DbManager::new(&refresh_manager_config.catalog.database_path)
                .expect("Failed to initialize catalog database");
            let engine = ProviderRefreshEngine::new(
                &refresh_manager_config.provider,
                engine_db_manager,
            );
            let mut refresh_manager = RefreshTaskManager::new(
                refresh_manager_bus_receiver,
                refresh_manager_bus_sender,
                db_manager,
                Box::new(engine),
                &refresh_manager_config,
            );
            refresh_manager.run();
        }));
        if let Err(payload) = run_result {
            log::error!(
                "RefreshTaskManager thread terminated due to panic: {}",
                panic_payload_to_string(payload.as_ref())
            );
        }
    });
}
