//! Cache Module
//!
//! Provides the in-process adaptive cache engine: TTL expiration, scored
//! eviction under capacity and memory pressure, numeric quantization and
//! hit prediction.

mod entry;
pub mod eviction;
pub mod export;
pub mod predictor;
pub mod quantizer;
mod stats;
mod store;

#[cfg(test)]
mod property_tests;

// Re-export public types
pub use entry::{current_timestamp_ms, CacheEntry, EntryMetadata, StoredValue};
pub use eviction::{
    EvictionCandidate, EvictionController, MemoryPressure, OptimizationReport, PressureLevel,
    RecommendedAction,
};
pub use export::{StatisticsExport, StatisticsExporter};
pub use predictor::PredictionModel;
pub use quantizer::{QuantizationError, QuantizationType, QuantizedValue, Quantizer};
pub use stats::{MemoryFigures, MetricsCollector, MetricsSnapshot};
pub use store::{prepare_write, CacheStore, PreparedWrite};

// == Public Constants ==
/// Maximum allowed key length in bytes
pub const MAX_KEY_LENGTH: usize = 256;
