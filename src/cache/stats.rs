//! Cache Statistics Module
//!
//! Tracks cache performance metrics: request counters, quantization outcomes
//! and a smoothed access latency.

use serde::Serialize;

/// Smoothing factor of the access-time moving average.
pub const ACCESS_TIME_ALPHA: f64 = 0.2;

// == Metrics Collector ==
/// Running counters owned by the store.
#[derive(Debug, Clone, Default)]
pub struct MetricsCollector {
    pub hits: u64,
    pub misses: u64,
    pub writes: u64,
    pub rejected_writes: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub quantizations: u64,
    pub quantization_failures: u64,
    /// Sum of per-entry compression ratios over all quantizations
    compression_ratio_sum: f64,
    /// Exponential moving average of `get` latency, None until the first sample
    average_access_time_ms: Option<f64>,
}

impl MetricsCollector {
    // == Constructor ==
    /// Creates a new collector with all counters at zero.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_hit(&mut self) {
        self.hits += 1;
    }

    pub fn record_miss(&mut self) {
        self.misses += 1;
    }

    pub fn record_write(&mut self) {
        self.writes += 1;
    }

    pub fn record_rejected_write(&mut self) {
        self.rejected_writes += 1;
    }

    pub fn record_delete(&mut self) {
        self.deletes += 1;
    }

    pub fn record_eviction(&mut self) {
        self.evictions += 1;
    }

    pub fn record_expiration(&mut self) {
        self.expirations += 1;
    }

    // == Record Quantization ==
    /// Counts a successful quantization and folds its ratio into the mean.
    pub fn record_quantization(&mut self, compression_ratio: f64) {
        self.quantizations += 1;
        self.compression_ratio_sum += compression_ratio.max(1.0);
    }

    pub fn record_quantization_failure(&mut self) {
        self.quantization_failures += 1;
    }

    // == Record Access Time ==
    /// Folds a latency sample into the moving average.
    ///
    /// ```text
    /// avg' = avg × (1 - α) + sample × α
    /// ```
    ///
    /// The first sample seeds the average.
    pub fn record_access_time(&mut self, sample_ms: f64) {
        self.average_access_time_ms = Some(match self.average_access_time_ms {
            Some(avg) => avg * (1.0 - ACCESS_TIME_ALPHA) + sample_ms * ACCESS_TIME_ALPHA,
            None => sample_ms,
        });
    }

    pub fn total_requests(&self) -> u64 {
        self.hits + self.misses
    }

    // == Hit Rate ==
    /// Returns hits / total requests, or 0.0 if no requests have been made.
    pub fn hit_rate(&self) -> f64 {
        let total = self.total_requests();
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }

    /// Mean compression ratio over all quantizations, 1.0 when none.
    pub fn compression_ratio(&self) -> f64 {
        if self.quantizations == 0 {
            1.0
        } else {
            self.compression_ratio_sum / self.quantizations as f64
        }
    }

    /// Evictions per accepted write, 0.0 when nothing was written.
    pub fn eviction_rate(&self) -> f64 {
        if self.writes == 0 {
            0.0
        } else {
            self.evictions as f64 / self.writes as f64
        }
    }

    pub fn average_access_time_ms(&self) -> f64 {
        self.average_access_time_ms.unwrap_or(0.0)
    }

    // == Snapshot ==
    /// Combines the counters with the live memory figures of the store.
    pub fn snapshot(&self, memory: MemoryFigures) -> MetricsSnapshot {
        let memory_efficiency = if memory.stored_bytes == 0 {
            1.0
        } else {
            (memory.raw_bytes as f64 / memory.stored_bytes as f64).max(1.0)
        };
        let memory_usage_percentage = if memory.limit_bytes == 0 {
            0.0
        } else {
            memory.stored_bytes as f64 / memory.limit_bytes as f64 * 100.0
        };

        MetricsSnapshot {
            hits: self.hits,
            misses: self.misses,
            total_requests: self.total_requests(),
            hit_rate: self.hit_rate(),
            writes: self.writes,
            rejected_writes: self.rejected_writes,
            deletes: self.deletes,
            evictions: self.evictions,
            expirations: self.expirations,
            eviction_rate: self.eviction_rate(),
            quantizations: self.quantizations,
            quantization_failures: self.quantization_failures,
            compression_ratio: self.compression_ratio(),
            average_access_time_millis: self.average_access_time_ms(),
            entry_count: memory.entries,
            memory_usage_bytes: memory.stored_bytes,
            raw_size_bytes: memory.raw_bytes,
            memory_limit_bytes: memory.limit_bytes,
            memory_usage_percentage,
            memory_efficiency,
        }
    }
}

/// Live memory figures reported by the store.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryFigures {
    pub entries: usize,
    pub raw_bytes: u64,
    pub stored_bytes: u64,
    pub limit_bytes: u64,
}

// == Metrics Snapshot ==
/// Point-in-time view of the cache metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub total_requests: u64,
    pub hit_rate: f64,
    pub writes: u64,
    pub rejected_writes: u64,
    pub deletes: u64,
    pub evictions: u64,
    pub expirations: u64,
    pub eviction_rate: f64,
    pub quantizations: u64,
    pub quantization_failures: u64,
    /// Mean raw/stored ratio of quantized entries
    pub compression_ratio: f64,
    pub average_access_time_millis: f64,
    pub entry_count: usize,
    pub memory_usage_bytes: u64,
    pub raw_size_bytes: u64,
    pub memory_limit_bytes: u64,
    pub memory_usage_percentage: f64,
    /// Σ raw size / Σ stored size over live entries
    pub memory_efficiency: f64,
}
