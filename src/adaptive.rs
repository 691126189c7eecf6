//! Adaptive Cache Handle
//!
//! [`AdaptiveCache`] is the shareable, async entry point. It owns one
//! [`CacheStore`] behind a `tokio::sync::RwLock`, the observer registry and
//! the handles of its background tasks.
//!
//! Writes convert and quantize the value before taking the lock; reads copy
//! the stored payload under the lock and decode it after releasing it.

use std::sync::{Arc, Mutex, MutexGuard};

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::cache::{
    prepare_write, CacheStore, EntryMetadata, MemoryPressure, MetricsSnapshot, OptimizationReport,
    StatisticsExport, StatisticsExporter,
};
use crate::config::{CacheConfig, ConfigUpdate};
use crate::error::Result;
use crate::observer::{CacheObserver, ObserverRegistry, SubscriptionId};
use crate::tasks::{
    run_optimization_pass, spawn_monitor_task, spawn_optimizer_task, SharedObservers, SharedStore,
};

// == Adaptive Cache ==
/// Thread-safe adaptive cache.
///
/// # Example
/// ```ignore
/// let cache = AdaptiveCache::new(CacheConfig::default());
/// cache.start().await;
/// cache.set("fp", &json!({"scores": [0.1, 0.2, 0.3, 0.4]}), None).await;
/// let value = cache.get("fp").await;
/// cache.destroy().await;
/// ```
#[derive(Debug)]
pub struct AdaptiveCache {
    store: SharedStore,
    observers: SharedObservers,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl AdaptiveCache {
    /// Creates a cache without spawning background tasks.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            store: Arc::new(RwLock::new(CacheStore::new(config))),
            observers: Arc::new(RwLock::new(ObserverRegistry::new())),
            tasks: Mutex::new(Vec::new()),
        }
    }

    // == Lifecycle ==
    /// Spawns the optimizer and, when monitoring is enabled, the monitor.
    ///
    /// Must be called inside a tokio runtime. Does nothing if the tasks are
    /// already running.
    pub async fn start(&self) {
        let monitoring = self.store.read().await.config().monitoring.enabled;

        let mut tasks = self.task_handles();
        if !tasks.is_empty() {
            debug!("Background tasks already running");
            return;
        }

        tasks.push(spawn_optimizer_task(self.store.clone()));
        if monitoring {
            tasks.push(spawn_monitor_task(self.store.clone(), self.observers.clone()));
        }
        info!(tasks = tasks.len(), "Adaptive cache background tasks started");
    }

    /// Stops background tasks and drops all entries and observers.
    ///
    /// Safe to call more than once. Counters are kept.
    pub async fn destroy(&self) {
        let handles: Vec<_> = self.task_handles().drain(..).collect();
        let stopped = handles.len();
        for handle in handles {
            handle.abort();
        }

        self.store.write().await.clear();
        self.observers.write().await.clear();
        info!(stopped, "Adaptive cache destroyed");
    }

    /// Returns true while background tasks are registered.
    pub fn is_running(&self) -> bool {
        !self.task_handles().is_empty()
    }

    // == Set ==
    /// Stores a value. Returns false if the key is invalid, the value cannot
    /// be serialized or no capacity can be made.
    pub async fn set<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl_millis: Option<u64>,
    ) -> bool {
        match self.try_set(key, value, ttl_millis).await {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Write rejected");
                false
            }
        }
    }

    /// Like [`set`](Self::set) but reports why a write was rejected.
    pub async fn try_set<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl_millis: Option<u64>,
    ) -> Result<()> {
        let config = self.store.read().await.configuration();

        let prepared = match prepare_write(&config, key, value, ttl_millis) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.store.write().await.record_rejected_write();
                return Err(e);
            }
        };

        self.store.write().await.commit_write(prepared)
    }

    // == Get ==
    /// Returns a copy of the value, or `None` on a miss or expiry.
    pub async fn get(&self, key: &str) -> Option<Value> {
        let payload = self.store.write().await.lookup(key)?;
        Some(payload.to_value())
    }

    /// Returns the value deserialized into `T`.
    ///
    /// A value that does not fit `T` yields `None` but still counts as a hit.
    pub async fn get_as<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let value = self.get(key).await?;
        match serde_json::from_value(value) {
            Ok(typed) => Some(typed),
            Err(e) => {
                debug!(key, error = %e, "Cached value has a different shape");
                None
            }
        }
    }

    pub async fn has(&self, key: &str) -> bool {
        self.store.read().await.has(key)
    }

    /// Removes an entry. Returns true if one was present.
    pub async fn delete(&self, key: &str) -> bool {
        self.store.write().await.delete(key)
    }

    pub async fn entry_metadata(&self, key: &str) -> Option<EntryMetadata> {
        self.store.read().await.entry_metadata(key)
    }

    // == Introspection ==
    pub async fn metrics(&self) -> MetricsSnapshot {
        self.store.read().await.metrics()
    }

    pub async fn memory_pressure(&self) -> MemoryPressure {
        self.store.read().await.memory_pressure()
    }

    /// Probability in `[0, 1]` that the key will be hit.
    pub async fn predict_hit(&self, key: &str) -> f64 {
        self.store.read().await.predict_hit(key)
    }

    pub async fn len(&self) -> usize {
        self.store.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.store.read().await.is_empty()
    }

    // == Optimize ==
    /// Runs a full optimization pass in bounded batches.
    pub async fn optimize_memory(&self) -> OptimizationReport {
        run_optimization_pass(&self.store).await
    }

    // == Configuration ==
    pub async fn configuration(&self) -> CacheConfig {
        self.store.read().await.configuration()
    }

    /// Applies a partial update. On error nothing changes.
    pub async fn update_configuration(&self, update: &ConfigUpdate) -> Result<CacheConfig> {
        self.store.write().await.update_configuration(update)
    }

    pub async fn export_statistics(&self) -> StatisticsExport {
        StatisticsExporter::export(&*self.store.read().await)
    }

    // == Observers ==
    pub async fn subscribe(&self, observer: Arc<dyn CacheObserver>) -> SubscriptionId {
        self.observers.write().await.subscribe(observer)
    }

    /// Returns true if the subscription existed.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.observers.write().await.unsubscribe(id)
    }

    fn task_handles(&self) -> MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.tasks.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for AdaptiveCache {
    fn drop(&mut self) {
        for handle in self.task_handles().drain(..) {
            handle.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use serde_json::json;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Report {
        title: String,
        score: u32,
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let cache = AdaptiveCache::new(CacheConfig::default());

        assert!(cache.set("key", &json!({"a": 1}), None).await);
        assert_eq!(cache.get("key").await, Some(json!({"a": 1})));
        assert!(cache.has("key").await);
        assert_eq!(cache.len().await, 1);
    }

    #[tokio::test]
    async fn test_get_as_typed() {
        let cache = AdaptiveCache::new(CacheConfig::default());
        let report = Report {
            title: "weekly".to_string(),
            score: 7,
        };

        cache.set("report", &report, None).await;

        assert_eq!(cache.get_as::<Report>("report").await, Some(report));
        assert_eq!(cache.get_as::<Vec<u32>>("report").await, None);
        assert_eq!(cache.metrics().await.hits, 2);
    }

    #[tokio::test]
    async fn test_invalid_key_counts_rejected_write() {
        let cache = AdaptiveCache::new(CacheConfig::default());

        assert!(!cache.set("", "value", None).await);
        assert!(cache.is_empty().await);
        let metrics = cache.metrics().await;
        assert_eq!(metrics.rejected_writes, 1);
        assert_eq!(metrics.writes, 0);
    }

    #[tokio::test]
    async fn test_delete() {
        let cache = AdaptiveCache::new(CacheConfig::default());
        cache.set("key", "value", None).await;

        assert!(cache.delete("key").await);
        assert!(!cache.delete("key").await);
        assert_eq!(cache.get("key").await, None);
    }

    #[tokio::test]
    async fn test_start_is_idempotent() {
        let cache = AdaptiveCache::new(CacheConfig::default());

        cache.start().await;
        cache.start().await;
        assert_eq!(cache.task_handles().len(), 2);

        cache.destroy().await;
        assert!(!cache.is_running());
    }

    #[tokio::test]
    async fn test_start_without_monitoring() {
        let mut config = CacheConfig::default();
        config.monitoring.enabled = false;
        let cache = AdaptiveCache::new(config);

        cache.start().await;
        assert_eq!(cache.task_handles().len(), 1);
    }

    #[tokio::test]
    async fn test_destroy_clears_entries_and_is_repeatable() {
        let cache = AdaptiveCache::new(CacheConfig::default());
        cache.start().await;
        cache.set("key", "value", None).await;

        cache.destroy().await;
        cache.destroy().await;

        assert!(cache.is_empty().await);
        assert!(!cache.is_running());
    }

    #[tokio::test]
    async fn test_concurrent_writers() {
        let cache = Arc::new(AdaptiveCache::new(CacheConfig::default()));

        let mut handles = Vec::new();
        for worker in 0..8 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move {
                for i in 0..25 {
                    cache.set(&format!("w{worker}-{i}"), &json!([i, i + 1]), None).await;
                }
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(cache.len().await, 200);
        assert_eq!(cache.metrics().await.writes, 200);
    }
}
