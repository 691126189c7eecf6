//! Eviction policy: classifies memory pressure and decides which entries to
//! remove when the store must shrink.
//!
//! Victims are ordered by a weighted score combining:
//! - Recency rank (least recently touched → evictable)
//! - Predicted hit probability (unlikely to be read → evictable)
//!
//! Lowest score is evicted first; ties go to the older access, then to the
//! lexicographically smaller key.

use std::cmp::Ordering;

use serde::Serialize;

use crate::cache::predictor::PredictionModel;
use crate::cache::CacheEntry;
use crate::config::EvictionConfig;

// == Memory Pressure ==
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PressureLevel {
    Low,
    Medium,
    High,
    Critical,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum RecommendedAction {
    None,
    EvictColdEntries,
    AggressiveQuantize,
    RejectWrites,
}

/// Usage of the memory ceiling, classified into actionable bands.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryPressure {
    pub level: PressureLevel,
    /// Stored bytes as a percentage of the ceiling
    pub usage_percentage: f64,
    pub recommended_action: RecommendedAction,
}

impl MemoryPressure {
    /// Classifies `stored_bytes` against `limit_bytes`.
    ///
    /// | usage        | level    | action             |
    /// |--------------|----------|--------------------|
    /// | < 0.60       | low      | none               |
    /// | 0.60 – 0.80  | medium   | evictColdEntries   |
    /// | 0.80 – 0.95  | high     | aggressiveQuantize |
    /// | ≥ 0.95       | critical | rejectWrites       |
    pub fn classify(stored_bytes: u64, limit_bytes: u64) -> Self {
        let fraction = if limit_bytes == 0 {
            // A zero ceiling holds nothing
            1.0
        } else {
            stored_bytes as f64 / limit_bytes as f64
        };

        let (level, recommended_action) = if fraction < 0.6 {
            (PressureLevel::Low, RecommendedAction::None)
        } else if fraction < 0.8 {
            (PressureLevel::Medium, RecommendedAction::EvictColdEntries)
        } else if fraction < 0.95 {
            (PressureLevel::High, RecommendedAction::AggressiveQuantize)
        } else {
            (PressureLevel::Critical, RecommendedAction::RejectWrites)
        };

        Self {
            level,
            usage_percentage: fraction * 100.0,
            recommended_action,
        }
    }
}

// == Optimization Report ==
/// Outcome of an optimization pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizationReport {
    /// Entries removed, expired ones included
    pub entries_evicted: usize,
    /// Of which were removed because they expired
    pub expired_removed: usize,
    /// Stored bytes released by removals and quantization
    pub memory_freed: u64,
    pub quantizations_applied: usize,
}

impl OptimizationReport {
    pub fn merge(&mut self, other: OptimizationReport) {
        self.entries_evicted += other.entries_evicted;
        self.expired_removed += other.expired_removed;
        self.memory_freed += other.memory_freed;
        self.quantizations_applied += other.quantizations_applied;
    }

    pub fn is_noop(&self) -> bool {
        *self == OptimizationReport::default()
    }
}

// == Eviction Candidate ==
/// An eviction candidate with its computed score.
#[derive(Debug, Clone)]
pub struct EvictionCandidate {
    pub key: String,
    pub score: f64,
    pub access_seq: u64,
    pub stored_size: usize,
}

// Lower score = evicted first.
impl PartialEq for EvictionCandidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for EvictionCandidate {}

impl PartialOrd for EvictionCandidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for EvictionCandidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then(self.access_seq.cmp(&other.access_seq))
            .then_with(|| self.key.cmp(&other.key))
    }
}

// == Eviction Controller ==
/// The eviction policy engine.
#[derive(Debug, Clone)]
pub struct EvictionController {
    config: EvictionConfig,
    predictor: PredictionModel,
}

impl EvictionController {
    pub fn new(config: EvictionConfig) -> Self {
        Self {
            config,
            predictor: PredictionModel::new(),
        }
    }

    pub fn set_config(&mut self, config: EvictionConfig) {
        self.config = config;
    }

    pub fn predictor(&self) -> &PredictionModel {
        &self.predictor
    }

    /// Fraction of the ceiling an optimization pass evicts down to.
    pub fn target_usage(&self) -> f64 {
        self.config.target_usage
    }

    /// Scores `entries` and returns them in eviction order, first victim at
    /// index 0.
    ///
    /// ```text
    /// score(entry) = w_recency × recency_rank + w_prediction × p_hit
    /// ```
    pub fn rank_victims<'a>(
        &self,
        entries: impl Iterator<Item = &'a CacheEntry>,
        now: u64,
    ) -> Vec<EvictionCandidate> {
        let mut by_recency: Vec<&CacheEntry> = entries.collect();
        by_recency.sort_by_key(|entry| entry.access_seq);

        let n = by_recency.len();
        let mut candidates: Vec<EvictionCandidate> = by_recency
            .into_iter()
            .enumerate()
            .map(|(rank, entry)| {
                let recency_rank = if n > 1 {
                    rank as f64 / (n - 1) as f64
                } else {
                    1.0
                };
                let p_hit = self.predictor.predict(Some(entry), now);
                EvictionCandidate {
                    key: entry.key.clone(),
                    score: self.config.recency_weight * recency_rank
                        + self.config.prediction_weight * p_hit,
                    access_seq: entry.access_seq,
                    stored_size: entry.stored_size,
                }
            })
            .collect();

        candidates.sort();
        candidates
    }
}
