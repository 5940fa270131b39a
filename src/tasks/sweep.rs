//! Partial Write Sweep Task
//!
//! Background task that periodically removes temporary cache files left
//! behind by writes that never completed (for example after a crash).

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::DiskCache;

/// Spawns a background task that periodically sweeps abandoned partial writes.
///
/// Only files older than `max_age` are removed, so a write still in progress
/// is never touched as long as `max_age` exceeds the fetch timeout.
///
/// # Arguments
/// * `store` - The disk cache to sweep
/// * `interval_secs` - Interval in seconds between sweeps
/// * `max_age` - Minimum age of a partial file before it is removed
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during graceful shutdown.
pub fn spawn_sweep_task(
    store: Arc<DiskCache>,
    interval_secs: u64,
    max_age: Duration,
) -> JoinHandle<()> {
    let interval = Duration::from_secs(interval_secs.max(1));

    tokio::spawn(async move {
        info!(
            "Starting partial sweep task with interval of {} seconds",
            interval.as_secs()
        );

        loop {
            // Sleep for the configured interval
            tokio::time::sleep(interval).await;

            match store.sweep_partials(max_age).await {
                Ok(0) => debug!("Partial sweep: nothing to remove"),
                Ok(removed) => info!("Partial sweep: removed {} abandoned writes", removed),
                Err(e) => warn!(error = %e, "Partial sweep failed"),
            }
        }
    })
}
