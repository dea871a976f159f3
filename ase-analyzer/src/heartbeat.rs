//! Periodic heartbeat
//!
//! Logs a fixed line on every tick. It collects, evicts and frees nothing.

use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::info;

pub const HEARTBEAT_MESSAGE: &str = "Heartbeat: analyzer alive";

/// Spawn the heartbeat; the first line is logged one `period` after start
pub fn spawn_heartbeat(period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        // First tick completes immediately
        interval.tick().await;
        loop {
            interval.tick().await;
            info!("{}", HEARTBEAT_MESSAGE);
        }
    })
}
