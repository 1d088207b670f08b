//! Refresh run orchestration runtime component.
//!
//! This manager executes one refresh pass at a time: it selects the items due
//! via the staleness tiers, delegates each to the refresh engine sequentially,
//! publishes fractional progress on the bus, and honors cooperative
//! cancellation between items.

use std::time::{SystemTime, UNIX_EPOCH};

use log::{debug, info, warn};
use tokio::sync::broadcast::{
    error::{RecvError, TryRecvError},
    Receiver, Sender,
};
use uuid::Uuid;

use crate::config::Config;
use crate::db_manager::DbManager;
use crate::protocol::{CatalogItem, ConfigMessage, Message, RefreshMessage};
use crate::refresh::refresh_engine::ItemRefresher;
use crate::refresh::refresh_selector::{select_items_due, TierSchedule};

/// Result of one driven refresh pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct RefreshPassOutcome {
    pub refreshed: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Drives the per-item refresh loop over an already-selected set.
///
/// Progress runs 5 → 100: the caller reports 0 before selection. Each item
/// advances progress by `95 / n` whether its refresh succeeded or not; a
/// single item's failure never aborts the pass. Cancellation is checked once
/// per item, before delegation; on cancellation the pass ends without the
/// final 100 report.
pub(crate) fn drive_refresh_pass(
    due_items: &[CatalogItem],
    refresher: &mut dyn ItemRefresher,
    progress: &mut dyn FnMut(f64),
    cancel_requested: &mut dyn FnMut() -> bool,
) -> RefreshPassOutcome {
    progress(5.0);

    let mut outcome = RefreshPassOutcome {
        refreshed: 0,
        failed: 0,
        cancelled: false,
    };

    if due_items.is_empty() {
        progress(100.0);
        return outcome;
    }

    let increment = 95.0 / due_items.len() as f64;
    let mut current_progress = 5.0;

    for item in due_items {
        if cancel_requested() {
            outcome.cancelled = true;
            return outcome;
        }

        debug!(
            "Refreshing metadata for item {}: {} ({})",
            item.id,
            item.title,
            item.kind.as_str()
        );
        match refresher.refresh_item(item) {
            Ok(()) => outcome.refreshed += 1,
            Err(error) => {
                warn!("Refresh failed for item {}: {}", item.id, error);
                outcome.failed += 1;
            }
        }

        current_progress += increment;
        progress(current_progress);
    }

    progress(100.0);
    outcome
}

/// Coordinates scheduled refresh passes over the catalog index.
pub struct RefreshTaskManager {
    bus_consumer: Receiver<Message>,
    bus_producer: Sender<Message>,
    db_manager: DbManager,
    engine: Box<dyn ItemRefresher + Send>,
    schedule: TierSchedule,
    shutdown_requested: bool,
}

impl RefreshTaskManager {
    /// Creates a refresh manager bound to bus channels, storage, and engine.
    pub fn new(
        bus_consumer: Receiver<Message>,
        bus_producer: Sender<Message>,
        db_manager: DbManager,
        engine: Box<dyn ItemRefresher + Send>,
        initial_config: &Config,
    ) -> Self {
        Self {
            bus_consumer,
            bus_producer,
            db_manager,
            engine,
            schedule: TierSchedule::from_config(&initial_config.refresh),
            shutdown_requested: false,
        }
    }

    fn now_unix_ms() -> i64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_millis() as i64)
            .unwrap_or(0)
    }

    fn execute_run(&mut self) {
        let run_id = Uuid::new_v4().to_string();
        info!("Refresh run {run_id}: checking for items to refresh");
        let _ = self.bus_producer.send(Message::Refresh(RefreshMessage::RunProgress {
            run_id: run_id.clone(),
            percent: 0.0,
        }));

        let now_unix_ms = Self::now_unix_ms();
        let due_items = match select_items_due(&self.db_manager, now_unix_ms, &self.schedule) {
            Ok(items) => items,
            Err(error) => {
                log::error!("Refresh run {run_id} aborted: catalog query failed: {error}");
                let _ = self.bus_producer.send(Message::Refresh(RefreshMessage::RunFailed {
                    run_id,
                    error: error.to_string(),
                }));
                return;
            }
        };

        info!("Refresh run {run_id}: found {} item(s) to refresh", due_items.len());
        let _ = self.bus_producer.send(Message::Refresh(RefreshMessage::RunStarted {
            run_id: run_id.clone(),
            due_items: due_items.len(),
        }));

        let mut cancel_seen = false;
        let mut shutdown_seen = false;
        let mut config_seen: Option<Config> = None;
        let outcome;
        {
            let bus_consumer = &mut self.bus_consumer;
            let bus_producer = &self.bus_producer;
            let progress_run_id = run_id.clone();
            let mut report_progress = |percent: f64| {
                let _ = bus_producer.send(Message::Refresh(RefreshMessage::RunProgress {
                    run_id: progress_run_id.clone(),
                    percent,
                }));
            };
            let mut cancel_requested = || {
                loop {
                    match bus_consumer.try_recv() {
                        Ok(Message::Refresh(RefreshMessage::CancelRun)) => cancel_seen = true,
                        Ok(Message::Shutdown) => {
                            cancel_seen = true;
                            shutdown_seen = true;
                        }
                        Ok(Message::Refresh(RefreshMessage::TriggerRun)) => {
                            debug!("Refresh run already in flight; ignoring trigger");
                        }
                        Ok(Message::Config(ConfigMessage::ConfigChanged(config))) => {
                            config_seen = Some(config);
                        }
                        Ok(_) => {}
                        Err(TryRecvError::Empty) => break,
                        Err(TryRecvError::Lagged(skipped)) => {
                            warn!("RefreshTaskManager lagged on control bus, skipped {skipped} message(s)");
                        }
                        Err(TryRecvError::Closed) => break,
                    }
                }
                cancel_seen
            };

            outcome = drive_refresh_pass(
                &due_items,
                self.engine.as_mut(),
                &mut report_progress,
                &mut cancel_requested,
            );
        }
        self.shutdown_requested = shutdown_seen;
        if let Some(config) = config_seen {
            // A config update that arrived mid-run governs the next run.
            self.schedule = TierSchedule::from_config(&config.refresh);
        }

        if outcome.cancelled {
            info!(
                "Refresh run {run_id} cancelled after {} item(s)",
                outcome.refreshed + outcome.failed
            );
            let _ = self.bus_producer.send(Message::Refresh(RefreshMessage::RunCancelled {
                run_id,
                refreshed: outcome.refreshed,
            }));
            return;
        }

        info!(
            "Refresh run {run_id} completed: {} refreshed, {} failed",
            outcome.refreshed, outcome.failed
        );
        let _ = self.bus_producer.send(Message::Refresh(RefreshMessage::RunCompleted {
            run_id,
            refreshed: outcome.refreshed,
            failed: outcome.failed,
        }));
    }

    /// Starts the blocking event loop for refresh run orchestration.
    pub fn run(&mut self) {
        loop {
            match self.bus_consumer.blocking_recv() {
                Ok(Message::Refresh(RefreshMessage::TriggerRun)) => {
                    self.execute_run();
                    if self.shutdown_requested {
                        break;
                    }
                }
                Ok(Message::Refresh(RefreshMessage::CancelRun)) => {
                    debug!("Cancel requested with no refresh run in flight");
                }
                Ok(Message::Config(ConfigMessage::ConfigChanged(config))) => {
                    self.schedule = TierSchedule::from_config(&config.refresh);
                }
                Ok(Message::Shutdown) => break,
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    log::warn!(
                        "RefreshTaskManager lagged on control bus, skipped {} message(s)",
                        skipped
                    );
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}
