//! Configuration Module
//!
//! Holds the cache configuration, loads it from environment variables and
//! validates partial updates applied at runtime.

use std::env;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::cache::QuantizationType;
use crate::error::{CacheError, Result};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

// == Cache Config ==
/// Cache configuration parameters.
///
/// Immutable until replaced through [`CacheConfig::apply`]. All values can be
/// configured via environment variables with sensible defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheConfig {
    /// Maximum number of live entries
    pub max_size: usize,
    /// Memory ceiling for stored bytes, in MiB
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: f64,
    /// Default TTL in milliseconds for entries without explicit TTL
    #[serde(rename = "defaultTTL")]
    pub default_ttl_millis: u64,
    /// Quantization settings
    pub quantization: QuantizationConfig,
    /// Monitoring and alert settings
    pub monitoring: MonitoringConfig,
    /// Eviction scoring settings
    pub eviction: EvictionConfig,
    /// Interval of the background optimizer in milliseconds
    pub optimization_interval_millis: u64,
}

/// Quantization settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuantizationConfig {
    pub enabled: bool,
    #[serde(rename = "type")]
    pub quantization_type: QuantizationType,
    /// Values whose raw size reaches this many bytes are quantized
    pub size_threshold_bytes: usize,
    /// Force int8 regardless of `quantization_type`
    pub aggressive: bool,
}

/// Monitoring settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub metrics_interval_millis: u64,
    pub alert_thresholds: AlertThresholds,
}

/// Alert thresholds, all fractions in `[0, 1]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertThresholds {
    /// Alert when the hit rate drops below this value
    pub hit_rate: f64,
    /// Alert when memory usage exceeds this fraction of the ceiling
    pub memory_usage_pct: f64,
    /// Alert when evictions per write exceed this value
    pub eviction_rate: f64,
}

/// Eviction scoring weights.
///
/// ```text
/// score(entry) = recency_weight × recency_rank + prediction_weight × p_hit
/// ```
///
/// Lowest score is evicted first.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvictionConfig {
    pub recency_weight: f64,
    pub prediction_weight: f64,
    /// Fraction of the memory ceiling an optimization pass evicts down to
    pub target_usage: f64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_size: 1000,
            max_memory_mb: 100.0,
            default_ttl_millis: 3_600_000,
            quantization: QuantizationConfig::default(),
            monitoring: MonitoringConfig::default(),
            eviction: EvictionConfig::default(),
            optimization_interval_millis: 60_000,
        }
    }
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quantization_type: QuantizationType::Int8,
            size_threshold_bytes: 1024,
            aggressive: false,
        }
    }
}

impl Default for MonitoringConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            metrics_interval_millis: 30_000,
            alert_thresholds: AlertThresholds::default(),
        }
    }
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            hit_rate: 0.5,
            memory_usage_pct: 0.9,
            eviction_rate: 0.1,
        }
    }
}

impl Default for EvictionConfig {
    fn default() -> Self {
        Self {
            recency_weight: 0.6,
            prediction_weight: 0.4,
            target_usage: 0.8,
        }
    }
}

impl CacheConfig {
    // == From Env ==
    /// Creates a new CacheConfig by loading values from environment variables.
    ///
    /// # Environment Variables
    /// - `CACHE_MAX_SIZE` - Maximum live entries (default: 1000)
    /// - `CACHE_MAX_MEMORY_MB` - Memory ceiling in MiB (default: 100)
    /// - `CACHE_DEFAULT_TTL_MS` - Default TTL in milliseconds (default: 3600000)
    /// - `CACHE_QUANTIZATION_ENABLED` - Enable quantization (default: true)
    /// - `CACHE_QUANTIZATION_TYPE` - `int8`, `float16` or `none` (default: int8)
    /// - `CACHE_QUANTIZATION_THRESHOLD` - Size threshold in bytes (default: 1024)
    /// - `CACHE_METRICS_INTERVAL_MS` - Monitor interval (default: 30000)
    /// - `CACHE_OPTIMIZE_INTERVAL_MS` - Optimizer interval (default: 60000)
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_size: env_or("CACHE_MAX_SIZE", defaults.max_size),
            max_memory_mb: env_or("CACHE_MAX_MEMORY_MB", defaults.max_memory_mb),
            default_ttl_millis: env_or("CACHE_DEFAULT_TTL_MS", defaults.default_ttl_millis),
            quantization: QuantizationConfig {
                enabled: env_or("CACHE_QUANTIZATION_ENABLED", defaults.quantization.enabled),
                quantization_type: env_or(
                    "CACHE_QUANTIZATION_TYPE",
                    defaults.quantization.quantization_type,
                ),
                size_threshold_bytes: env_or(
                    "CACHE_QUANTIZATION_THRESHOLD",
                    defaults.quantization.size_threshold_bytes,
                ),
                aggressive: defaults.quantization.aggressive,
            },
            monitoring: MonitoringConfig {
                metrics_interval_millis: env_or(
                    "CACHE_METRICS_INTERVAL_MS",
                    defaults.monitoring.metrics_interval_millis,
                ),
                ..defaults.monitoring
            },
            eviction: defaults.eviction,
            optimization_interval_millis: env_or(
                "CACHE_OPTIMIZE_INTERVAL_MS",
                defaults.optimization_interval_millis,
            ),
        }
    }

    // == Memory Limit ==
    /// Returns the memory ceiling in bytes.
    pub fn max_memory_bytes(&self) -> u64 {
        (self.max_memory_mb * BYTES_PER_MB).max(0.0) as u64
    }

    // == Validate ==
    /// Checks every field range. Used for updates; construction through
    /// [`CacheStore::new`](crate::cache::CacheStore::new) accepts any config.
    pub fn validate(&self) -> Result<()> {
        if self.max_size == 0 {
            return Err(invalid("maxSize must be greater than 0"));
        }
        if !self.max_memory_mb.is_finite() || self.max_memory_mb <= 0.0 {
            return Err(invalid(format!(
                "maxMemoryMB must be a positive number, got {}",
                self.max_memory_mb
            )));
        }
        if self.default_ttl_millis == 0 {
            return Err(invalid("defaultTTL must be greater than 0"));
        }
        if self.quantization.size_threshold_bytes == 0 {
            return Err(invalid("quantization.sizeThresholdBytes must be greater than 0"));
        }
        if self.monitoring.metrics_interval_millis == 0 {
            return Err(invalid("monitoring.metricsIntervalMillis must be greater than 0"));
        }
        if self.optimization_interval_millis == 0 {
            return Err(invalid("optimizationIntervalMillis must be greater than 0"));
        }

        let thresholds = &self.monitoring.alert_thresholds;
        check_fraction("alertThresholds.hitRate", thresholds.hit_rate)?;
        check_fraction("alertThresholds.memoryUsagePct", thresholds.memory_usage_pct)?;
        check_fraction("alertThresholds.evictionRate", thresholds.eviction_rate)?;
        check_fraction("eviction.recencyWeight", self.eviction.recency_weight)?;
        check_fraction("eviction.predictionWeight", self.eviction.prediction_weight)?;
        check_fraction("eviction.targetUsage", self.eviction.target_usage)?;
        Ok(())
    }

    // == Apply ==
    /// Merges a partial update and validates the result.
    ///
    /// Returns the merged configuration; `self` is never modified, so a
    /// rejected update leaves the caller's configuration intact.
    pub fn apply(&self, update: &ConfigUpdate) -> Result<CacheConfig> {
        let mut next = self.clone();

        if let Some(max_size) = update.max_size {
            if max_size <= 0 {
                return Err(invalid(format!("maxSize must be greater than 0, got {max_size}")));
            }
            next.max_size = max_size as usize;
        }
        if let Some(mb) = update.max_memory_mb {
            next.max_memory_mb = mb;
        }
        if let Some(ttl) = update.default_ttl_millis {
            if ttl <= 0 {
                return Err(invalid(format!("defaultTTL must be greater than 0, got {ttl}")));
            }
            next.default_ttl_millis = ttl as u64;
        }
        if let Some(q) = &update.quantization {
            if let Some(enabled) = q.enabled {
                next.quantization.enabled = enabled;
            }
            if let Some(kind) = q.quantization_type {
                next.quantization.quantization_type = kind;
            }
            if let Some(threshold) = q.size_threshold_bytes {
                next.quantization.size_threshold_bytes = threshold;
            }
            if let Some(aggressive) = q.aggressive {
                next.quantization.aggressive = aggressive;
            }
        }
        if let Some(m) = &update.monitoring {
            if let Some(enabled) = m.enabled {
                next.monitoring.enabled = enabled;
            }
            if let Some(interval) = m.metrics_interval_millis {
                next.monitoring.metrics_interval_millis = interval;
            }
            if let Some(t) = &m.alert_thresholds {
                let thresholds = &mut next.monitoring.alert_thresholds;
                thresholds.hit_rate = t.hit_rate.unwrap_or(thresholds.hit_rate);
                thresholds.memory_usage_pct =
                    t.memory_usage_pct.unwrap_or(thresholds.memory_usage_pct);
                thresholds.eviction_rate = t.eviction_rate.unwrap_or(thresholds.eviction_rate);
            }
        }
        if let Some(e) = &update.eviction {
            next.eviction.recency_weight = e.recency_weight.unwrap_or(next.eviction.recency_weight);
            next.eviction.prediction_weight =
                e.prediction_weight.unwrap_or(next.eviction.prediction_weight);
            next.eviction.target_usage = e.target_usage.unwrap_or(next.eviction.target_usage);
        }
        if let Some(interval) = update.optimization_interval_millis {
            next.optimization_interval_millis = interval;
        }

        next.validate()?;
        Ok(next)
    }
}

// == Config Update ==
/// A partial configuration update. Absent fields keep their current value.
///
/// Numeric fields that must be positive are signed here so that out-of-range
/// input such as `{"maxMemoryMB": -1}` reaches validation instead of failing
/// to parse.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ConfigUpdate {
    pub max_size: Option<i64>,
    #[serde(rename = "maxMemoryMB")]
    pub max_memory_mb: Option<f64>,
    #[serde(rename = "defaultTTL")]
    pub default_ttl_millis: Option<i64>,
    pub quantization: Option<QuantizationUpdate>,
    pub monitoring: Option<MonitoringUpdate>,
    pub eviction: Option<EvictionUpdate>,
    pub optimization_interval_millis: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct QuantizationUpdate {
    pub enabled: Option<bool>,
    #[serde(rename = "type")]
    pub quantization_type: Option<QuantizationType>,
    pub size_threshold_bytes: Option<usize>,
    pub aggressive: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct MonitoringUpdate {
    pub enabled: Option<bool>,
    pub metrics_interval_millis: Option<u64>,
    pub alert_thresholds: Option<AlertThresholdsUpdate>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct AlertThresholdsUpdate {
    pub hit_rate: Option<f64>,
    pub memory_usage_pct: Option<f64>,
    pub eviction_rate: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EvictionUpdate {
    pub recency_weight: Option<f64>,
    pub prediction_weight: Option<f64>,
    pub target_usage: Option<f64>,
}

// == Utility Functions ==
fn env_or<T: FromStr>(name: &str, default: T) -> T {
    env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn invalid(message: impl Into<String>) -> CacheError {
    CacheError::InvalidConfiguration(message.into())
}

fn check_fraction(name: &str, value: f64) -> Result<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(invalid(format!("{name} must be within [0, 1], got {value}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = CacheConfig::default();
        assert_eq!(config.max_size, 1000);
        assert_eq!(config.max_memory_mb, 100.0);
        assert_eq!(config.default_ttl_millis, 3_600_000);
        assert_eq!(config.quantization.quantization_type, QuantizationType::Int8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_env_defaults() {
        // Clear any existing env vars to test defaults
        for name in [
            "CACHE_MAX_SIZE",
            "CACHE_MAX_MEMORY_MB",
            "CACHE_DEFAULT_TTL_MS",
            "CACHE_QUANTIZATION_ENABLED",
            "CACHE_QUANTIZATION_TYPE",
            "CACHE_QUANTIZATION_THRESHOLD",
            "CACHE_METRICS_INTERVAL_MS",
            "CACHE_OPTIMIZE_INTERVAL_MS",
        ] {
            env::remove_var(name);
        }

        let config = CacheConfig::from_env();
        assert_eq!(config, CacheConfig::default());
    }

    #[test]
    fn test_max_memory_bytes() {
        let config = CacheConfig {
            max_memory_mb: 10.0,
            ..Default::default()
        };
        assert_eq!(config.max_memory_bytes(), 10 * 1024 * 1024);
    }

    #[test]
    fn test_apply_merges_fields() {
        let config = CacheConfig::default();
        let update = ConfigUpdate {
            max_size: Some(50),
            quantization: Some(QuantizationUpdate {
                size_threshold_bytes: Some(100),
                ..Default::default()
            }),
            ..Default::default()
        };

        let next = config.apply(&update).unwrap();
        assert_eq!(next.max_size, 50);
        assert_eq!(next.quantization.size_threshold_bytes, 100);
        assert!(next.quantization.enabled);
        assert_eq!(next.max_memory_mb, config.max_memory_mb);
    }

    #[test]
    fn test_apply_rejects_negative_memory() {
        let config = CacheConfig::default();
        let update: ConfigUpdate = serde_json::from_str(r#"{"maxMemoryMB": -1}"#).unwrap();

        let result = config.apply(&update);
        assert!(matches!(result, Err(CacheError::InvalidConfiguration(_))));
    }

    #[test]
    fn test_apply_rejects_zero_max_size() {
        let update = ConfigUpdate {
            max_size: Some(0),
            ..Default::default()
        };
        assert!(CacheConfig::default().apply(&update).is_err());
    }

    #[test]
    fn test_apply_rejects_out_of_range_threshold() {
        let update: ConfigUpdate = serde_json::from_str(
            r#"{"maxSize": 10, "monitoring": {"alertThresholds": {"hitRate": 1.5}}}"#,
        )
        .unwrap();
        assert!(CacheConfig::default().apply(&update).is_err());
    }

    #[test]
    fn test_config_serializes_camel_case() {
        let json = serde_json::to_value(CacheConfig::default()).unwrap();
        assert_eq!(json["maxMemoryMB"], 100.0);
        assert_eq!(json["defaultTTL"], 3_600_000);
        assert_eq!(json["quantization"]["type"], "int8");
        assert_eq!(json["monitoring"]["alertThresholds"]["memoryUsagePct"], 0.9);
    }
}
