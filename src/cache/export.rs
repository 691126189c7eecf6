//! Statistics export: a serializable, timestamped snapshot of the cache for
//! external monitoring.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::cache::{CacheStore, MemoryPressure};
use crate::config::CacheConfig;

/// Serialized form returned by `export_statistics`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatisticsExport {
    pub timestamp: DateTime<Utc>,
    pub performance: PerformanceSection,
    pub memory: MemorySection,
    pub configuration: CacheConfig,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSection {
    pub hit_rate: f64,
    pub average_access_time_millis: f64,
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub writes: u64,
    pub rejected_writes: u64,
    pub evictions: u64,
    pub eviction_rate: f64,
    pub expirations: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemorySection {
    pub memory_usage_bytes: u64,
    pub memory_limit_bytes: u64,
    pub memory_efficiency: f64,
    pub compression_ratio: f64,
    pub quantizations: u64,
    pub quantization_failures: u64,
    pub entry_count: usize,
    pub pressure: MemoryPressure,
}

pub struct StatisticsExporter;

impl StatisticsExporter {
    /// Builds an export from the store's current state.
    pub fn export(store: &CacheStore) -> StatisticsExport {
        let metrics = store.metrics();

        StatisticsExport {
            timestamp: Utc::now(),
            performance: PerformanceSection {
                hit_rate: metrics.hit_rate,
                average_access_time_millis: metrics.average_access_time_millis,
                hits: metrics.hits,
                misses: metrics.misses,
                total_requests: metrics.total_requests,
                writes: metrics.writes,
                rejected_writes: metrics.rejected_writes,
                evictions: metrics.evictions,
                eviction_rate: metrics.eviction_rate,
                expirations: metrics.expirations,
            },
            memory: MemorySection {
                memory_usage_bytes: metrics.memory_usage_bytes,
                memory_limit_bytes: metrics.memory_limit_bytes,
                memory_efficiency: metrics.memory_efficiency,
                compression_ratio: metrics.compression_ratio,
                quantizations: metrics.quantizations,
                quantization_failures: metrics.quantization_failures,
                entry_count: metrics.entry_count,
                pressure: store.memory_pressure(),
            },
            configuration: store.configuration(),
        }
    }

    /// Serializes an export as pretty-printed JSON.
    pub fn to_json(export: &StatisticsExport) -> serde_json::Result<String> {
        serde_json::to_string_pretty(export)
    }
}
