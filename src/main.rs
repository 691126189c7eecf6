//! Adaptive Cache demo
//!
//! Drives a synthetic artifact workload through an [`AdaptiveCache`] and
//! prints the exported statistics.

use std::env;
use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use adaptive_cache::cache::StatisticsExporter;
use adaptive_cache::{
    fingerprint_with_namespace, AdaptiveCache, Alert, CacheConfig, CacheObserver, MetricsSnapshot,
};

const DEFAULT_WORKLOAD_REQUESTS: usize = 2_000;
/// Distinct requests in the workload; repeats produce hits.
const DISTINCT_REQUESTS: usize = 300;

/// Logs alerts and metric snapshots pushed by the monitor task.
struct LoggingObserver;

impl CacheObserver for LoggingObserver {
    fn on_alert(&self, alert: &Alert) {
        warn!("Alert: {alert}");
    }

    fn on_metrics_update(&self, snapshot: &MetricsSnapshot) {
        info!(
            hit_rate = snapshot.hit_rate,
            entries = snapshot.entry_count,
            memory = snapshot.memory_usage_bytes,
            "Metrics update"
        );
    }
}

/// Main entry point for the demo.
///
/// # Startup Sequence
/// 1. Initialize tracing subscriber for logging
/// 2. Load configuration from environment variables
/// 3. Create the cache and start its background tasks
/// 4. Run the workload until done or Ctrl+C
/// 5. Print statistics and destroy the cache
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Defaults to "info" level, can be overridden with RUST_LOG env var
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "adaptive_cache=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = CacheConfig::from_env();
    info!(
        "Configuration loaded: max_size={}, max_memory_mb={}, default_ttl={}ms, quantization={}",
        config.max_size,
        config.max_memory_mb,
        config.default_ttl_millis,
        config.quantization.quantization_type
    );

    let requests = env::var("WORKLOAD_REQUESTS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(DEFAULT_WORKLOAD_REQUESTS);

    let cache = Arc::new(AdaptiveCache::new(config));
    cache.start().await;
    cache.subscribe(Arc::new(LoggingObserver)).await;

    tokio::select! {
        result = run_workload(cache.clone(), requests) => result?,
        _ = signal::ctrl_c() => {
            info!("Received Ctrl+C, stopping workload");
        }
    }

    let report = cache.optimize_memory().await;
    info!(?report, "Final optimization pass");

    let export = cache.export_statistics().await;
    println!("{}", StatisticsExporter::to_json(&export)?);

    cache.destroy().await;
    info!("Shutdown complete");
    Ok(())
}

/// Issues `requests` lookups over a fixed request set, computing and storing
/// the artifact on every miss.
async fn run_workload(cache: Arc<AdaptiveCache>, requests: usize) -> anyhow::Result<()> {
    for i in 0..requests {
        // Skewed towards low ids so some requests repeat often
        let id = (i * i + 7 * i) % DISTINCT_REQUESTS;
        let request = json!({ "operation": "analyze", "target": format!("image-{id}") });
        let key = fingerprint_with_namespace("analysis", &request)?;

        if cache.get(&key).await.is_none() {
            let artifact = compute_artifact(id);
            cache.set(&key, &artifact, None).await;
        }

        if i % 250 == 0 {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    }

    let metrics = cache.metrics().await;
    info!(
        requests,
        hit_rate = metrics.hit_rate,
        compression_ratio = metrics.compression_ratio,
        "Workload complete"
    );
    Ok(())
}

/// Deterministic stand-in for an expensive analysis result.
fn compute_artifact(id: usize) -> Value {
    let embedding: Vec<f64> = (0..256)
        .map(|j| ((id * 31 + j) as f64 * 0.017).sin())
        .collect();
    let layers: Vec<u64> = (0..8).map(|j| ((id + 1) * (j + 3) * 1_048_576) as u64).collect();

    json!({
        "target": format!("image-{id}"),
        "summary": format!("analysis of image-{id}"),
        "embedding": embedding,
        "layerSizes": layers,
        "ok": id % 7 != 0,
    })
}
