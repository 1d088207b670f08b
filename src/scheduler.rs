//! Interval trigger publishing refresh runs on the bus.

use std::time::Duration;

use log::{debug, info};
use tokio::sync::broadcast::Sender;

use crate::config::SchedulerConfig;
use crate::protocol::{Message, RefreshMessage};

/// Publishes `TriggerRun` on a fixed interval until the bus closes.
///
/// Overlap between runs is not this thread's concern: the refresh manager
/// processes triggers one at a time and drops triggers that arrive while a
/// run is in flight.
pub fn run_interval_trigger(bus_producer: Sender<Message>, scheduler_config: SchedulerConfig) {
    let interval = Duration::from_secs(u64::from(scheduler_config.run_interval_minutes.max(1)) * 60);
    info!(
        "Refresh scheduler started, triggering every {} minute(s)",
        scheduler_config.run_interval_minutes.max(1)
    );

    if scheduler_config.run_on_startup {
        if bus_producer
            .send(Message::Refresh(RefreshMessage::TriggerRun))
            .is_err()
        {
            return;
        }
    }

    loop {
        std::thread::sleep(interval);
        debug!("Refresh scheduler interval elapsed");
        if bus_producer
            .send(Message::Refresh(RefreshMessage::TriggerRun))
            .is_err()
        {
            // All receivers are gone; the daemon is shutting down.
            return;
        }
    }
}
