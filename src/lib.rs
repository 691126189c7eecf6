//! Adaptive Cache - an in-process cache for computed artifacts
//!
//! Keeps values under a hard memory ceiling with numeric quantization,
//! pressure-aware scored eviction and lightweight hit prediction.

pub mod adaptive;
pub mod cache;
pub mod config;
pub mod error;
pub mod fingerprint;
pub mod observer;
pub mod tasks;

pub use adaptive::AdaptiveCache;
pub use cache::{
    MemoryPressure, MetricsSnapshot, OptimizationReport, PressureLevel, QuantizationType,
    RecommendedAction, StatisticsExport,
};
pub use config::{CacheConfig, ConfigUpdate};
pub use error::{CacheError, Result};
pub use fingerprint::{fingerprint, fingerprint_with_namespace};
pub use observer::{Alert, AlertKind, CacheObserver, SubscriptionId};
