//! Cache Entry Module
//!
//! Defines the structure for individual cache entries with TTL support and
//! an optional quantized payload.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use serde_json::Value;

use crate::cache::quantizer::{QuantizationType, Quantizer, QuantizedValue};

// == Stored Value ==
/// Payload of an entry: the raw document or its quantized form.
#[derive(Debug, Clone, PartialEq)]
pub enum StoredValue {
    Raw(Value),
    Quantized(QuantizedValue),
}

impl StoredValue {
    /// Returns an owned copy of the document, decoding if quantized.
    pub fn to_value(&self) -> Value {
        match self {
            StoredValue::Raw(value) => value.clone(),
            StoredValue::Quantized(quantized) => Quantizer::dequantize(quantized),
        }
    }

    pub fn is_quantized(&self) -> bool {
        matches!(self, StoredValue::Quantized(_))
    }
}

// == Entry Metadata ==
/// Read-only copy of an entry's bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EntryMetadata {
    pub raw_size_bytes: usize,
    pub stored_size_bytes: usize,
    pub compression_ratio: f64,
    pub created_at: u64,
    pub last_access_at: u64,
    pub access_count: u64,
    pub ttl_millis: u64,
    pub quantized: bool,
}

// == Cache Entry ==
/// Represents a single cache entry with payload and metadata.
#[derive(Debug, Clone)]
pub struct CacheEntry {
    /// Caller-supplied fingerprint
    pub key: String,
    /// The stored payload
    pub payload: StoredValue,
    /// Compact JSON size before quantization
    pub raw_size: usize,
    /// Size charged against the memory ceiling
    pub stored_size: usize,
    /// Creation timestamp (Unix milliseconds)
    pub created_at: u64,
    /// Last read timestamp (Unix milliseconds)
    pub last_access_at: u64,
    /// Number of reads since creation
    pub access_count: u64,
    /// Effective expiry window in milliseconds
    pub ttl_millis: u64,
    /// Store-wide sequence number of the last write or read, orders recency
    pub access_seq: u64,
    /// Quantization types that were tried on this value and failed
    pub failed_quantizations: Vec<QuantizationType>,
}

impl CacheEntry {
    // == Constructor ==
    /// Creates a fresh entry holding a raw value.
    ///
    /// # Arguments
    /// * `key` - The entry fingerprint
    /// * `value` - The document to store
    /// * `raw_size` - Compact JSON size of `value`
    /// * `ttl_millis` - Expiry window in milliseconds
    pub fn new(key: String, value: Value, raw_size: usize, ttl_millis: u64) -> Self {
        let now = current_timestamp_ms();
        Self {
            key,
            payload: StoredValue::Raw(value),
            raw_size,
            stored_size: raw_size,
            created_at: now,
            last_access_at: now,
            access_count: 0,
            ttl_millis,
            access_seq: 0,
            failed_quantizations: Vec::new(),
        }
    }

    // == Quantize ==
    /// Replaces the payload with its quantized form.
    pub fn apply_quantized(&mut self, quantized: QuantizedValue) {
        self.stored_size = quantized.stored_size.min(self.raw_size);
        self.payload = StoredValue::Quantized(quantized);
    }

    pub fn is_quantized(&self) -> bool {
        self.payload.is_quantized()
    }

    /// Records a failed attempt so passes with the same type skip the entry.
    pub fn mark_quantization_failed(&mut self, quantization_type: QuantizationType) {
        if !self.failed_quantizations.contains(&quantization_type) {
            self.failed_quantizations.push(quantization_type);
        }
    }

    /// True when `quantization_type` already failed on this value.
    pub fn quantization_failed_with(&self, quantization_type: QuantizationType) -> bool {
        self.failed_quantizations.contains(&quantization_type)
    }

    // == Is Expired ==
    /// An entry is expired once strictly more than `ttl_millis` has elapsed
    /// since creation.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now.saturating_sub(self.created_at) > self.ttl_millis
    }

    // == Touch ==
    /// Records a read.
    pub fn touch(&mut self, now: u64, seq: u64) {
        self.last_access_at = now;
        self.access_count += 1;
        self.access_seq = seq;
    }

    /// `raw_size / stored_size`, never below 1.
    pub fn compression_ratio(&self) -> f64 {
        if self.stored_size == 0 {
            return 1.0;
        }
        (self.raw_size as f64 / self.stored_size as f64).max(1.0)
    }

    pub fn metadata(&self) -> EntryMetadata {
        EntryMetadata {
            raw_size_bytes: self.raw_size,
            stored_size_bytes: self.stored_size,
            compression_ratio: self.compression_ratio(),
            created_at: self.created_at,
            last_access_at: self.last_access_at,
            access_count: self.access_count,
            ttl_millis: self.ttl_millis,
            quantized: self.is_quantized(),
        }
    }
}

// == Utility Functions ==
/// Returns current Unix timestamp in milliseconds.
pub fn current_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
