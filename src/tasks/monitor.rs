//! Metrics Monitor Task
//!
//! Background task that periodically pushes a metrics snapshot to the
//! registered observers and raises alerts for breached thresholds.

use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::observer::{evaluate_alerts, Alert};
use crate::tasks::{SharedObservers, SharedStore};

/// Spawns a background task that notifies observers every
/// `metrics_interval_millis`. Ticks are skipped while monitoring is disabled.
pub fn spawn_monitor_task(store: SharedStore, observers: SharedObservers) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("Starting metrics monitor task");

        loop {
            let interval = {
                let guard = store.read().await;
                Duration::from_millis(guard.config().monitoring.metrics_interval_millis.max(1))
            };
            tokio::time::sleep(interval).await;

            run_monitor_tick(&store, &observers).await;
        }
    })
}

/// Takes one snapshot, notifies observers and returns the raised alerts.
pub async fn run_monitor_tick(store: &SharedStore, observers: &SharedObservers) -> Vec<Alert> {
    let (snapshot, thresholds) = {
        let guard = store.read().await;
        let monitoring = &guard.config().monitoring;
        if !monitoring.enabled {
            return Vec::new();
        }
        (guard.metrics(), monitoring.alert_thresholds.clone())
    };

    let alerts = evaluate_alerts(&snapshot, &thresholds);
    let registry = observers.read().await;
    registry.notify_metrics(&snapshot);
    for alert in &alerts {
        warn!(
            kind = ?alert.kind,
            value = alert.value,
            threshold = alert.threshold,
            "Cache alert: {alert}"
        );
        registry.notify_alert(alert);
    }
    alerts
}
