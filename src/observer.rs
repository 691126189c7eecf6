//! Observer Module
//!
//! Pull-based metrics can also be pushed in-process: observers registered on
//! an [`AdaptiveCache`](crate::AdaptiveCache) receive periodic metric
//! snapshots and threshold alerts from the monitor task.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::MetricsSnapshot;
use crate::config::AlertThresholds;

/// Requests needed before a low hit rate is reported.
pub const MIN_REQUESTS_FOR_HIT_RATE_ALERT: u64 = 10;

// == Cache Observer ==
/// Receives cache events. Both callbacks default to no-ops.
///
/// Callbacks run on the monitor task and should return quickly.
pub trait CacheObserver: Send + Sync {
    fn on_alert(&self, _alert: &Alert) {}

    fn on_metrics_update(&self, _snapshot: &MetricsSnapshot) {}
}

/// Handle returned by `subscribe`, used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

// == Alert ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum AlertKind {
    LowHitRate,
    HighMemoryUsage,
    HighEvictionRate,
}

impl fmt::Display for AlertKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AlertKind::LowHitRate => write!(f, "low hit rate"),
            AlertKind::HighMemoryUsage => write!(f, "high memory usage"),
            AlertKind::HighEvictionRate => write!(f, "high eviction rate"),
        }
    }
}

/// A breached threshold.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Alert {
    pub kind: AlertKind,
    pub value: f64,
    pub threshold: f64,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for Alert {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {:.3} (threshold {:.3})",
            self.kind, self.value, self.threshold
        )
    }
}

// == Evaluate Alerts ==
/// Checks a snapshot against the thresholds.
///
/// - hit rate below `hit_rate`, once at least
///   [`MIN_REQUESTS_FOR_HIT_RATE_ALERT`] requests were made
/// - memory usage fraction above `memory_usage_pct`
/// - evictions per write above `eviction_rate`
pub fn evaluate_alerts(snapshot: &MetricsSnapshot, thresholds: &AlertThresholds) -> Vec<Alert> {
    let now = Utc::now();
    let mut alerts = Vec::new();
    let mut raise = |kind, value, threshold| {
        alerts.push(Alert {
            kind,
            value,
            threshold,
            timestamp: now,
        })
    };

    if snapshot.total_requests >= MIN_REQUESTS_FOR_HIT_RATE_ALERT
        && snapshot.hit_rate < thresholds.hit_rate
    {
        raise(AlertKind::LowHitRate, snapshot.hit_rate, thresholds.hit_rate);
    }

    let usage = snapshot.memory_usage_percentage / 100.0;
    if usage > thresholds.memory_usage_pct {
        raise(AlertKind::HighMemoryUsage, usage, thresholds.memory_usage_pct);
    }

    if snapshot.eviction_rate > thresholds.eviction_rate {
        raise(
            AlertKind::HighEvictionRate,
            snapshot.eviction_rate,
            thresholds.eviction_rate,
        );
    }

    alerts
}

// == Observer Registry ==
/// Subscribed observers, owned by one cache instance.
#[derive(Default)]
pub struct ObserverRegistry {
    next_id: u64,
    observers: Vec<(SubscriptionId, Arc<dyn CacheObserver>)>,
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, observer: Arc<dyn CacheObserver>) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.observers.push((id, observer));
        id
    }

    /// Returns true if the subscription existed.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(existing, _)| *existing != id);
        self.observers.len() != before
    }

    pub fn notify_metrics(&self, snapshot: &MetricsSnapshot) {
        for (_, observer) in &self.observers {
            observer.on_metrics_update(snapshot);
        }
    }

    pub fn notify_alert(&self, alert: &Alert) {
        for (_, observer) in &self.observers {
            observer.on_alert(alert);
        }
    }

    pub fn clear(&mut self) {
        self.observers.clear();
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}

impl fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.observers.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::{MemoryFigures, MetricsCollector};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        alerts: AtomicUsize,
        updates: AtomicUsize,
    }

    impl CacheObserver for Counting {
        fn on_alert(&self, _alert: &Alert) {
            self.alerts.fetch_add(1, Ordering::SeqCst);
        }

        fn on_metrics_update(&self, _snapshot: &MetricsSnapshot) {
            self.updates.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn snapshot(hits: u64, misses: u64, stored: u64, limit: u64) -> MetricsSnapshot {
        let mut metrics = MetricsCollector::new();
        for _ in 0..hits {
            metrics.record_hit();
        }
        for _ in 0..misses {
            metrics.record_miss();
        }
        metrics.snapshot(MemoryFigures {
            entries: 1,
            raw_bytes: stored,
            stored_bytes: stored,
            limit_bytes: limit,
        })
    }

    #[test]
    fn test_no_alerts_when_healthy() {
        let alerts = evaluate_alerts(&snapshot(9, 1, 100, 1000), &AlertThresholds::default());
        assert!(alerts.is_empty());
    }

    #[test]
    fn test_low_hit_rate_needs_enough_requests() {
        let thresholds = AlertThresholds::default();
        assert!(evaluate_alerts(&snapshot(0, 5, 0, 1000), &thresholds).is_empty());

        let alerts = evaluate_alerts(&snapshot(1, 19, 0, 1000), &thresholds);
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::LowHitRate);
        assert_eq!(alerts[0].value, 0.05);
    }

    #[test]
    fn test_high_memory_usage() {
        let alerts = evaluate_alerts(&snapshot(0, 0, 950, 1000), &AlertThresholds::default());
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].kind, AlertKind::HighMemoryUsage);
    }

    #[test]
    fn test_registry_subscribe_and_unsubscribe() {
        let mut registry = ObserverRegistry::new();
        let observer = Arc::new(Counting::default());

        let id = registry.subscribe(observer.clone());
        registry.notify_metrics(&snapshot(1, 0, 0, 1000));
        assert_eq!(observer.updates.load(Ordering::SeqCst), 1);

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.notify_metrics(&snapshot(1, 0, 0, 1000));
        assert_eq!(observer.updates.load(Ordering::SeqCst), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_registry_notifies_alerts() {
        let mut registry = ObserverRegistry::new();
        let first = Arc::new(Counting::default());
        let second = Arc::new(Counting::default());
        registry.subscribe(first.clone());
        registry.subscribe(second.clone());

        for alert in evaluate_alerts(&snapshot(0, 0, 990, 1000), &AlertThresholds::default()) {
            registry.notify_alert(&alert);
        }

        assert_eq!(first.alerts.load(Ordering::SeqCst), 1);
        assert_eq!(second.alerts.load(Ordering::SeqCst), 1);
    }
}
