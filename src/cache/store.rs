//! Cache Store Module
//!
//! Main cache engine: owns the entry table, accounts raw and stored bytes,
//! quantizes large values, evicts under capacity and memory pressure and
//! reports every outcome to the metrics collector.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::cache::entry::{current_timestamp_ms, EntryMetadata, StoredValue};
use crate::cache::eviction::{EvictionController, MemoryPressure, OptimizationReport, PressureLevel};
use crate::cache::quantizer::{QuantizationError, QuantizationType, Quantizer};
use crate::cache::stats::{MemoryFigures, MetricsCollector, MetricsSnapshot};
use crate::cache::{CacheEntry, MAX_KEY_LENGTH};
use crate::config::{CacheConfig, ConfigUpdate};
use crate::error::{CacheError, Result};

// == Prepared Write ==
/// A value converted, measured and possibly quantized, ready to be committed.
///
/// Built by [`prepare_write`] without access to the store so the expensive
/// part of a write can run outside the store's lock.
#[derive(Debug, Clone)]
pub struct PreparedWrite {
    key: String,
    payload: StoredValue,
    raw_size: usize,
    ttl_millis: u64,
    /// Type that was tried and could not encode the value
    failed_quantization: Option<QuantizationType>,
}

impl PreparedWrite {
    pub fn stored_size(&self) -> usize {
        match &self.payload {
            StoredValue::Raw(_) => self.raw_size,
            StoredValue::Quantized(q) => q.stored_size.min(self.raw_size),
        }
    }
}

// == Prepare Write ==
/// Validates the key, converts the value and applies set-time quantization.
///
/// # Arguments
/// * `config` - Configuration in effect for this write
/// * `key` - Entry fingerprint, non-empty and at most [`MAX_KEY_LENGTH`] bytes
/// * `value` - Any serializable value
/// * `ttl_millis` - TTL override, `None` uses the configured default
pub fn prepare_write<V: Serialize + ?Sized>(
    config: &CacheConfig,
    key: &str,
    value: &V,
    ttl_millis: Option<u64>,
) -> Result<PreparedWrite> {
    validate_key(key)?;

    let value = serde_json::to_value(value)?;
    let raw_size = serde_json::to_vec(&value)?.len();
    let ttl_millis = ttl_millis.unwrap_or(config.default_ttl_millis);

    let settings = &config.quantization;
    let mut failed_quantization = None;
    let payload = if settings.enabled && raw_size >= settings.size_threshold_bytes {
        let quantizer = Quantizer::for_settings(settings.quantization_type, settings.aggressive);
        match quantizer.quantize(&value, raw_size) {
            Ok(quantized) => StoredValue::Quantized(quantized),
            Err(QuantizationError::Disabled) => StoredValue::Raw(value),
            Err(e) => {
                debug!(key, raw_size, error = %e, "Quantization skipped, storing raw");
                failed_quantization = Some(quantizer.quantization_type());
                StoredValue::Raw(value)
            }
        }
    } else {
        StoredValue::Raw(value)
    };

    Ok(PreparedWrite {
        key: key.to_string(),
        payload,
        raw_size,
        ttl_millis,
        failed_quantization,
    })
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(CacheError::InvalidKey("key must not be empty".to_string()));
    }
    if key.len() > MAX_KEY_LENGTH {
        return Err(CacheError::InvalidKey(format!(
            "key exceeds maximum length of {} bytes",
            MAX_KEY_LENGTH
        )));
    }
    Ok(())
}

// == Cache Store ==
/// Main cache storage with scored eviction, quantization and TTL support.
///
/// The store is a plain single-owner structure; sharing across tasks goes
/// through [`AdaptiveCache`](crate::AdaptiveCache), which serializes
/// mutations behind one lock.
#[derive(Debug)]
pub struct CacheStore {
    /// Key-value storage
    entries: HashMap<String, CacheEntry>,
    /// Performance counters
    metrics: MetricsCollector,
    /// Victim ranking and pressure classification
    eviction: EvictionController,
    config: CacheConfig,
    /// Σ raw size of live entries
    raw_bytes: u64,
    /// Σ stored size of live entries
    stored_bytes: u64,
    /// Monotonic counter ordering writes and reads
    next_seq: u64,
}

impl CacheStore {
    // == Constructor ==
    /// Creates a new CacheStore.
    ///
    /// The configuration is taken as given. A `max_size` of 0 is accepted
    /// and makes every write fail.
    pub fn new(config: CacheConfig) -> Self {
        Self {
            entries: HashMap::new(),
            metrics: MetricsCollector::new(),
            eviction: EvictionController::new(config.eviction.clone()),
            config,
            raw_bytes: 0,
            stored_bytes: 0,
            next_seq: 0,
        }
    }

    // == Set ==
    /// Stores a value, overwriting any previous entry for the key.
    ///
    /// Returns false when the key is invalid, the value cannot be
    /// serialized, or capacity is structurally zero. Eviction pressure never
    /// makes a write fail.
    pub fn set<V: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &V,
        ttl_millis: Option<u64>,
    ) -> bool {
        match self.try_set(key, value, ttl_millis) {
            Ok(()) => true,
            Err(e) => {
                warn!(key, error = %e, "Write rejected");
                false
            }
        }
    }

    /// Fallible form of [`set`](Self::set).
    pub fn try_set<V: Serialize + ?Sized>(
        &mut self,
        key: &str,
        value: &V,
        ttl_millis: Option<u64>,
    ) -> Result<()> {
        let prepared = match prepare_write(&self.config, key, value, ttl_millis) {
            Ok(prepared) => prepared,
            Err(e) => {
                self.record_rejected_write();
                return Err(e);
            }
        };
        self.commit_write(prepared)
    }

    /// Counts a write that failed before reaching the store.
    pub fn record_rejected_write(&mut self) {
        self.metrics.record_rejected_write();
    }

    // == Commit Write ==
    /// Inserts a prepared value, evicting lower-scored entries first when the
    /// write would exceed `max_size` or the memory ceiling.
    ///
    /// A single value larger than the whole ceiling is still stored; the next
    /// optimization pass removes it.
    pub fn commit_write(&mut self, prepared: PreparedWrite) -> Result<()> {
        if self.config.max_size == 0 {
            self.metrics.record_rejected_write();
            return Err(CacheError::CapacityExhausted(
                "maxSize is 0, no entry can be stored".to_string(),
            ));
        }

        let stored_size = prepared.stored_size();
        let PreparedWrite {
            key,
            payload,
            raw_size,
            ttl_millis,
            failed_quantization,
        } = prepared;

        // A re-set always starts from a fresh entry
        self.remove_entry(&key);
        self.make_room(stored_size as u64);

        let mut entry = CacheEntry::new(key.clone(), Value::Null, raw_size, ttl_millis);
        entry.access_seq = self.bump_seq();
        match payload {
            StoredValue::Quantized(quantized) => {
                entry.apply_quantized(quantized);
                self.metrics.record_quantization(entry.compression_ratio());
                debug!(
                    key = %key,
                    raw_size,
                    stored_size = entry.stored_size,
                    "Quantized on write"
                );
            }
            raw => entry.payload = raw,
        }
        if let Some(quantization_type) = failed_quantization {
            entry.mark_quantization_failed(quantization_type);
            self.metrics.record_quantization_failure();
        }

        self.insert_entry(entry);
        self.metrics.record_write();
        Ok(())
    }

    /// Evicts until one more entry of `incoming` bytes fits.
    fn make_room(&mut self, incoming: u64) {
        let limit = self.config.max_memory_bytes();
        let max_size = self.config.max_size;
        let needs_room = |store: &Self| {
            store.entries.len() >= max_size || store.stored_bytes + incoming > limit
        };
        if !needs_room(self) {
            return;
        }

        let now = current_timestamp_ms();
        let victims = self.eviction.rank_victims(self.entries.values(), now);
        for victim in victims {
            if !needs_room(self) {
                break;
            }
            if self.remove_entry(&victim.key).is_some() {
                self.metrics.record_eviction();
                debug!(
                    key = %victim.key,
                    score = victim.score,
                    freed = victim.stored_size,
                    "Evicted entry"
                );
            }
        }
    }

    // == Get ==
    /// Retrieves an owned copy of a value.
    ///
    /// Expired entries are removed and counted as misses.
    pub fn get(&mut self, key: &str) -> Option<Value> {
        self.lookup(key).map(|payload| payload.to_value())
    }

    // == Lookup ==
    /// Returns a copy of the stored payload without decoding it, updating
    /// access metadata and hit/miss counters.
    pub fn lookup(&mut self, key: &str) -> Option<StoredValue> {
        let started = Instant::now();
        let now = current_timestamp_ms();

        let expired = self.entries.get(key).map(|entry| entry.is_expired_at(now));
        match expired {
            None => {
                self.metrics.record_miss();
                None
            }
            Some(true) => {
                self.remove_entry(key);
                self.metrics.record_expiration();
                self.metrics.record_miss();
                debug!(key, "Entry expired on read");
                None
            }
            Some(false) => {
                let seq = self.bump_seq();
                let payload = self.entries.get_mut(key).map(|entry| {
                    entry.touch(now, seq);
                    entry.payload.clone()
                });
                self.metrics.record_hit();
                self.metrics
                    .record_access_time(started.elapsed().as_secs_f64() * 1000.0);
                payload
            }
        }
    }

    // == Has ==
    /// Returns true if a live entry exists. Does not refresh recency.
    pub fn has(&self, key: &str) -> bool {
        let now = current_timestamp_ms();
        self.entries
            .get(key)
            .is_some_and(|entry| !entry.is_expired_at(now))
    }

    // == Delete ==
    /// Removes an entry. Returns true if one was present.
    pub fn delete(&mut self, key: &str) -> bool {
        let removed = self.remove_entry(key).is_some();
        if removed {
            self.metrics.record_delete();
        }
        removed
    }

    /// Returns a copy of an entry's bookkeeping fields.
    pub fn entry_metadata(&self, key: &str) -> Option<EntryMetadata> {
        self.entries.get(key).map(CacheEntry::metadata)
    }

    // == Metrics ==
    /// Returns a metrics snapshot including live memory figures.
    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot(self.memory_figures())
    }

    pub fn memory_figures(&self) -> MemoryFigures {
        MemoryFigures {
            entries: self.entries.len(),
            raw_bytes: self.raw_bytes,
            stored_bytes: self.stored_bytes,
            limit_bytes: self.config.max_memory_bytes(),
        }
    }

    // == Memory Pressure ==
    pub fn memory_pressure(&self) -> MemoryPressure {
        MemoryPressure::classify(self.stored_bytes, self.config.max_memory_bytes())
    }

    // == Predict Hit ==
    /// Heuristic probability that `key` will be read again. Unknown and
    /// expired keys get the cold-start score.
    pub fn predict_hit(&self, key: &str) -> f64 {
        let now = current_timestamp_ms();
        let entry = self
            .entries
            .get(key)
            .filter(|entry| !entry.is_expired_at(now));
        self.eviction.predictor().predict(entry, now)
    }

    // == Configuration ==
    /// Returns a copy of the configuration.
    pub fn configuration(&self) -> CacheConfig {
        self.config.clone()
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// Validates and merges a partial update. On rejection the current
    /// configuration is left untouched.
    pub fn update_configuration(&mut self, update: &ConfigUpdate) -> Result<CacheConfig> {
        let next = match self.config.apply(update) {
            Ok(next) => next,
            Err(e) => {
                warn!(error = %e, "Configuration update rejected");
                return Err(e);
            }
        };

        self.eviction.set_config(next.eviction.clone());
        self.config = next.clone();
        info!(
            max_size = next.max_size,
            max_memory_mb = next.max_memory_mb,
            default_ttl_ms = next.default_ttl_millis,
            "Configuration updated"
        );
        Ok(next)
    }

    // == Optimize Memory ==
    /// Runs a complete optimization pass. See [`optimize_batch`](Self::optimize_batch).
    pub fn optimize_memory(&mut self) -> OptimizationReport {
        let mut report = OptimizationReport::default();
        loop {
            let (batch, more) = self.optimize_batch(usize::MAX);
            report.merge(batch);
            if !more {
                break;
            }
        }
        if !report.is_noop() {
            info!(
                evicted = report.entries_evicted,
                expired = report.expired_removed,
                freed = report.memory_freed,
                quantized = report.quantizations_applied,
                "Memory optimization complete"
            );
        }
        report
    }

    // == Optimize Batch ==
    /// Performs at most `limit` removals or quantization attempts.
    ///
    /// 1. Purge expired entries.
    /// 2. While stored bytes exceed the target fraction of the ceiling or the
    ///    entry count exceeds `max_size`, evict the lowest-scored entry.
    /// 3. Quantize surviving raw entries at or above the size threshold.
    ///
    /// Returns the batch report and whether work may remain. Each step is
    /// recomputed from the current table, so batches can be resumed after
    /// the caller releases and re-acquires the store.
    pub fn optimize_batch(&mut self, limit: usize) -> (OptimizationReport, bool) {
        let mut report = OptimizationReport::default();
        let mut budget = limit;
        let now = current_timestamp_ms();

        // 1. Expired entries
        let expired: Vec<String> = self
            .entries
            .values()
            .filter(|entry| entry.is_expired_at(now))
            .map(|entry| entry.key.clone())
            .collect();
        for key in expired {
            if budget == 0 {
                return (report, true);
            }
            if let Some(entry) = self.remove_entry(&key) {
                self.metrics.record_expiration();
                report.entries_evicted += 1;
                report.expired_removed += 1;
                report.memory_freed += entry.stored_size as u64;
            }
            budget -= 1;
        }

        // 2. Scored eviction down to target
        let target_bytes =
            (self.config.max_memory_bytes() as f64 * self.eviction.target_usage()) as u64;
        let max_size = self.config.max_size;
        let over_target =
            |store: &Self| store.stored_bytes > target_bytes || store.entries.len() > max_size;
        if over_target(self) {
            let victims = self.eviction.rank_victims(self.entries.values(), now);
            for victim in victims {
                if !over_target(self) {
                    break;
                }
                if budget == 0 {
                    return (report, true);
                }
                if self.remove_entry(&victim.key).is_some() {
                    self.metrics.record_eviction();
                    report.entries_evicted += 1;
                    report.memory_freed += victim.stored_size as u64;
                    debug!(
                        key = %victim.key,
                        score = victim.score,
                        freed = victim.stored_size,
                        "Evicted entry under pressure"
                    );
                }
                budget -= 1;
            }
        }

        // 3. Retroactive quantization
        let Some(quantizer) = self.retroactive_quantizer() else {
            return (report, false);
        };
        let threshold = self.config.quantization.size_threshold_bytes;
        let quantization_type = quantizer.quantization_type();
        let candidates: Vec<String> = self
            .entries
            .values()
            .filter(|entry| {
                !entry.is_quantized()
                    && !entry.quantization_failed_with(quantization_type)
                    && entry.raw_size >= threshold
            })
            .map(|entry| entry.key.clone())
            .collect();
        for key in candidates {
            if budget == 0 {
                return (report, true);
            }
            budget -= 1;
            if let Some(freed) = self.quantize_entry(&key, &quantizer) {
                report.quantizations_applied += 1;
                report.memory_freed += freed;
            }
        }

        (report, false)
    }

    /// The quantizer for retroactive passes, None when quantization is off.
    /// High pressure escalates to int8.
    fn retroactive_quantizer(&self) -> Option<Quantizer> {
        let settings = &self.config.quantization;
        if !settings.enabled {
            return None;
        }
        let aggressive =
            settings.aggressive || self.memory_pressure().level >= PressureLevel::High;
        let quantizer = Quantizer::for_settings(settings.quantization_type, aggressive);
        (quantizer.quantization_type() != QuantizationType::None).then_some(quantizer)
    }

    /// Quantizes one raw entry in place. Returns the bytes freed, or None if
    /// the entry was marked as not quantizable with this quantizer's type.
    fn quantize_entry(&mut self, key: &str, quantizer: &Quantizer) -> Option<u64> {
        let entry = self.entries.get_mut(key)?;
        let result = match &entry.payload {
            StoredValue::Raw(value) => quantizer.quantize(value, entry.raw_size),
            StoredValue::Quantized(_) => return None,
        };

        match result {
            Ok(quantized) => {
                let before = entry.stored_size as u64;
                entry.apply_quantized(quantized);
                let after = entry.stored_size as u64;
                let ratio = entry.compression_ratio();
                self.stored_bytes = self.stored_bytes - before + after;
                self.metrics.record_quantization(ratio);
                debug!(key, before, after, "Quantized retroactively");
                Some(before - after)
            }
            Err(e) => {
                entry.mark_quantization_failed(quantizer.quantization_type());
                self.metrics.record_quantization_failure();
                debug!(key, error = %e, "Retroactive quantization skipped");
                None
            }
        }
    }

    // == Clear ==
    /// Drops every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.raw_bytes = 0;
        self.stored_bytes = 0;
    }

    // == Length ==
    /// Returns the current number of entries in the cache.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    // == Is Empty ==
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Σ stored size of live entries.
    pub fn memory_usage_bytes(&self) -> u64 {
        self.stored_bytes
    }

    // == Bookkeeping ==
    fn insert_entry(&mut self, entry: CacheEntry) {
        self.raw_bytes += entry.raw_size as u64;
        self.stored_bytes += entry.stored_size as u64;
        self.entries.insert(entry.key.clone(), entry);
    }

    fn remove_entry(&mut self, key: &str) -> Option<CacheEntry> {
        let entry = self.entries.remove(key)?;
        self.raw_bytes -= entry.raw_size as u64;
        self.stored_bytes -= entry.stored_size as u64;
        Some(entry)
    }

    fn bump_seq(&mut self) -> u64 {
        self.next_seq += 1;
        self.next_seq
    }
}
