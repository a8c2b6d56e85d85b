//! Stale Entry Sweep
//!
//! Background task that periodically drops entries which expired longer
//! ago than the stale window. Entries inside the window are kept so they
//! can still be served when upstream fails.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::proxy::SharedStore;

/// Spawns a background task that periodically sweeps dead cache entries.
///
/// # Arguments
/// * `cache` - shared reference to the cache store
/// * `cleanup_interval_secs` - Interval in seconds between sweeps
///
/// # Returns
/// A JoinHandle for the spawned task, aborted during graceful shutdown.
pub fn spawn_cleanup_task(cache: SharedStore, cleanup_interval_secs: u64) -> JoinHandle<()> {
    let interval = Duration::from_secs(cleanup_interval_secs);

    tokio::spawn(async move {
        info!(
            interval_secs = cleanup_interval_secs,
            "Starting stale entry sweep task"
        );

        loop {
            tokio::time::sleep(interval).await;

            let (removed, remaining, bytes) = {
                let mut cache_guard = cache.write().await;
                let removed = cache_guard.cleanup_expired();
                (removed, cache_guard.len(), cache_guard.total_bytes())
            };

            if removed > 0 {
                info!(removed, remaining, bytes, "Swept dead cache entries");
            } else {
                debug!(remaining, bytes, "Sweep found no dead entries");
            }
        }
    })
}
