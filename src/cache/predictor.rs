//! Hit prediction: a deterministic heuristic estimating how likely an entry
//! is to be read again. Used only to order eviction victims.
//!
//! ```text
//! recency   = 1 - min(idle / ttl, 1)
//! frequency = accesses / (accesses + FREQUENCY_HALF_POINT)
//! p_hit     = logistic(STEEPNESS × (0.6 × recency + 0.4 × frequency - 0.5))
//! ```

use crate::cache::CacheEntry;

/// Score for keys with no entry.
pub const COLD_START_PROBABILITY: f64 = 0.3;

/// Access count at which the frequency term reaches 0.5.
const FREQUENCY_HALF_POINT: f64 = 5.0;

const RECENCY_WEIGHT: f64 = 0.6;
const FREQUENCY_WEIGHT: f64 = 0.4;
const STEEPNESS: f64 = 6.0;

/// Stateless hit-probability scorer over entry metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct PredictionModel;

impl PredictionModel {
    pub fn new() -> Self {
        Self
    }

    /// Probability in `[0, 1]` that `entry` will be hit again.
    /// `None` yields the cold-start score.
    pub fn predict(&self, entry: Option<&CacheEntry>, now: u64) -> f64 {
        let Some(entry) = entry else {
            return COLD_START_PROBABILITY;
        };

        let idle = now.saturating_sub(entry.last_access_at) as f64;
        let window = entry.ttl_millis.max(1) as f64;
        let recency = 1.0 - (idle / window).min(1.0);

        let accesses = entry.access_count as f64;
        let frequency = accesses / (accesses + FREQUENCY_HALF_POINT);

        let signal = RECENCY_WEIGHT * recency + FREQUENCY_WEIGHT * frequency;
        logistic(STEEPNESS * (signal - 0.5)).clamp(0.0, 1.0)
    }
}

fn logistic(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}
