//! Error types for the adaptive cache
//!
//! Provides unified error handling using thiserror.

use thiserror::Error;

// == Cache Error Enum ==
/// Unified error type for the adaptive cache.
#[derive(Error, Debug)]
pub enum CacheError {
    /// Key is empty or too long
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Value could not be converted into a size-measurable form
    #[error("Serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A configuration update was rejected
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// Capacity is structurally zero, no eviction can make room
    #[error("Capacity exhausted: {0}")]
    CapacityExhausted(String),
}

// == Result Type Alias ==
/// Convenience Result type for the adaptive cache.
pub type Result<T> = std::result::Result<T, CacheError>;
