//! Memory Optimizer Task
//!
//! Background task that periodically runs memory optimization: expired
//! entries are purged, cold entries evicted down to the target usage and
//! large raw entries quantized.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::cache::OptimizationReport;
use crate::tasks::SharedStore;

/// Removals or quantizations performed per lock acquisition.
pub const OPTIMIZE_BATCH_SIZE: usize = 64;

/// Spawns a background task that periodically optimizes the store.
///
/// The interval is re-read from the store's configuration before every
/// sleep, so updates apply from the next cycle on.
///
/// # Returns
/// A JoinHandle for the spawned task, which can be used to abort the task
/// during shutdown.
///
/// # Example
/// ```ignore
/// let store = Arc::new(RwLock::new(CacheStore::new(CacheConfig::default())));
/// let handle = spawn_optimizer_task(store.clone());
/// // Later, during shutdown:
/// handle.abort();
/// ```
pub fn spawn_optimizer_task(store: SharedStore) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting memory optimizer task");

        loop {
            let interval = {
                let guard = store.read().await;
                Duration::from_millis(guard.config().optimization_interval_millis.max(1))
            };
            tokio::time::sleep(interval).await;

            let report = run_optimization_pass(&store).await;
            if report.is_noop() {
                debug!("Memory optimizer: nothing to do");
            } else {
                info!(
                    evicted = report.entries_evicted,
                    expired = report.expired_removed,
                    freed = report.memory_freed,
                    quantized = report.quantizations_applied,
                    "Memory optimizer pass complete"
                );
            }
        }
    })
}

/// Runs one full optimization pass in batches of [`OPTIMIZE_BATCH_SIZE`],
/// releasing the write lock and yielding between batches.
pub async fn run_optimization_pass(store: &SharedStore) -> OptimizationReport {
    let mut report = OptimizationReport::default();
    loop {
        let (batch, more) = {
            let mut guard = store.write().await;
            guard.optimize_batch(OPTIMIZE_BATCH_SIZE)
        };
        report.merge(batch);
        if !more {
            return report;
        }
        tokio::task::yield_now().await;
    }
}
