pub mod refresh_engine;
pub mod refresh_selector;
pub mod refresh_task_manager;
