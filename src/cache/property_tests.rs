//! Property-Based Tests for Cache Module
//!
//! Uses proptest to check the store's correctness properties over random
//! operation sequences.

use proptest::prelude::*;
use serde_json::{json, Value};

use crate::cache::{CacheStore, MAX_KEY_LENGTH};
use crate::config::{CacheConfig, QuantizationConfig};

// == Test Configuration ==
const TEST_MAX_SIZE: usize = 100;

fn raw_config(max_size: usize, max_memory_mb: f64) -> CacheConfig {
    CacheConfig {
        max_size,
        max_memory_mb,
        quantization: QuantizationConfig {
            enabled: false,
            ..Default::default()
        },
        ..Default::default()
    }
}

// == Strategies ==
/// Generates valid cache keys (non-empty, within length limit)
fn valid_key_strategy() -> impl Strategy<Value = String> {
    "[a-zA-Z0-9_]{1,64}".prop_map(|s| s)
}

/// Generates JSON documents shaped like cached artifacts
fn artifact_strategy() -> impl Strategy<Value = Value> {
    (
        "[a-zA-Z0-9 ]{0,64}",
        any::<bool>(),
        prop::collection::vec(-1000.0f64..1000.0, 0..64),
    )
        .prop_map(|(summary, ok, scores)| json!({ "summary": summary, "ok": ok, "scores": scores }))
}

#[derive(Debug, Clone)]
enum CacheOp {
    Set { key: String, value: Value },
    Get { key: String },
    Has { key: String },
    Delete { key: String },
    Optimize,
}

fn cache_op_strategy() -> impl Strategy<Value = CacheOp> {
    prop_oneof![
        4 => (valid_key_strategy(), artifact_strategy())
            .prop_map(|(key, value)| CacheOp::Set { key, value }),
        3 => valid_key_strategy().prop_map(|key| CacheOp::Get { key }),
        1 => valid_key_strategy().prop_map(|key| CacheOp::Has { key }),
        1 => valid_key_strategy().prop_map(|key| CacheOp::Delete { key }),
        1 => Just(CacheOp::Optimize),
    ]
}

fn apply(store: &mut CacheStore, op: CacheOp) -> Option<bool> {
    match op {
        CacheOp::Set { key, value } => {
            store.set(&key, &value, None);
            None
        }
        CacheOp::Get { key } => Some(store.get(&key).is_some()),
        CacheOp::Has { key } => {
            store.has(&key);
            None
        }
        CacheOp::Delete { key } => {
            store.delete(&key);
            None
        }
        CacheOp::Optimize => {
            store.optimize_memory();
            None
        }
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // Hits and misses reflect exactly the outcomes of `get`, and the hit
    // rate is their ratio.
    #[test]
    fn prop_statistics_accuracy(ops in prop::collection::vec(cache_op_strategy(), 1..60)) {
        let mut store = CacheStore::new(CacheConfig::default());
        let mut expected_hits: u64 = 0;
        let mut expected_misses: u64 = 0;

        for op in ops {
            match apply(&mut store, op) {
                Some(true) => expected_hits += 1,
                Some(false) => expected_misses += 1,
                None => {}
            }
        }

        let metrics = store.metrics();
        prop_assert_eq!(metrics.hits, expected_hits);
        prop_assert_eq!(metrics.misses, expected_misses);
        prop_assert_eq!(metrics.total_requests, expected_hits + expected_misses);
        prop_assert!((0.0..=1.0).contains(&metrics.hit_rate));
        if metrics.total_requests > 0 {
            let ratio = expected_hits as f64 / metrics.total_requests as f64;
            prop_assert!((metrics.hit_rate - ratio).abs() < 1e-12);
        }
        prop_assert_eq!(metrics.entry_count, store.len());
    }

    // Without quantization a stored value comes back unchanged.
    #[test]
    fn prop_roundtrip_exact(key in valid_key_strategy(), value in artifact_strategy()) {
        let mut store = CacheStore::new(raw_config(TEST_MAX_SIZE, 10.0));

        prop_assert!(store.set(&key, &value, None));
        prop_assert_eq!(store.get(&key), Some(value));
    }

    // With quantization every number comes back within the int8 error bound
    // of its array and everything else is unchanged.
    #[test]
    fn prop_roundtrip_quantized(
        key in valid_key_strategy(),
        scores in prop::collection::vec(-50.0f64..50.0, 4..256),
        label in "[a-z]{1,16}"
    ) {
        let mut config = CacheConfig::default();
        config.quantization.size_threshold_bytes = 1;
        let mut store = CacheStore::new(config);
        let value = json!({ "label": label, "scores": scores });

        prop_assert!(store.set(&key, &value, None));
        let restored = store.get(&key).unwrap();
        prop_assert_eq!(&restored["label"], &value["label"]);

        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let bound = (max - min) / 255.0 / 2.0 + 1e-9;
        let restored = restored["scores"].as_array().unwrap();
        prop_assert_eq!(restored.len(), scores.len());
        for (orig, got) in scores.iter().zip(restored) {
            prop_assert!((orig - got.as_f64().unwrap()).abs() <= bound);
        }

        let meta = store.entry_metadata(&key).unwrap();
        prop_assert!(meta.stored_size_bytes <= meta.raw_size_bytes);
        prop_assert!(meta.compression_ratio >= 1.0);
    }

    // After any sequence of operations followed by an optimization pass the
    // entry count and stored bytes are within their limits.
    #[test]
    fn prop_capacity_enforcement(ops in prop::collection::vec(cache_op_strategy(), 1..200)) {
        let max_size = 20;
        let mut store = CacheStore::new(CacheConfig {
            max_size,
            max_memory_mb: 8192.0 / (1024.0 * 1024.0),
            ..Default::default()
        });
        let limit = store.configuration().max_memory_bytes();

        for op in ops {
            apply(&mut store, op);
            prop_assert!(store.len() <= max_size, "{} entries exceed {}", store.len(), max_size);
        }

        store.optimize_memory();
        prop_assert!(store.len() <= max_size);
        prop_assert!(store.memory_usage_bytes() <= limit);
    }

    // Predictions are probabilities for known and unknown keys alike.
    #[test]
    fn prop_prediction_range(
        ops in prop::collection::vec(cache_op_strategy(), 0..40),
        probe in valid_key_strategy()
    ) {
        let mut store = CacheStore::new(CacheConfig::default());
        let mut keys = vec![probe];
        for op in ops {
            if let CacheOp::Set { key, .. } | CacheOp::Get { key } = &op {
                keys.push(key.clone());
            }
            apply(&mut store, op);
        }

        for key in keys {
            let p = store.predict_hit(&key);
            prop_assert!((0.0..=1.0).contains(&p), "p({}) = {}", key, p);
        }
    }

    // A second optimization pass with no writes in between does nothing.
    #[test]
    fn prop_optimize_idempotent(ops in prop::collection::vec(cache_op_strategy(), 1..80)) {
        let mut config = CacheConfig {
            max_size: 30,
            max_memory_mb: 4096.0 / (1024.0 * 1024.0),
            ..Default::default()
        };
        config.quantization.size_threshold_bytes = 64;
        let mut store = CacheStore::new(config);

        for op in ops {
            apply(&mut store, op);
        }

        store.optimize_memory();
        let second = store.optimize_memory();
        prop_assert_eq!(second.entries_evicted, 0);
        prop_assert_eq!(second.quantizations_applied, 0);
    }

    // Keys outside the accepted length range are rejected without effect.
    #[test]
    fn prop_invalid_keys_rejected(extra in 1usize..64) {
        let mut store = CacheStore::new(CacheConfig::default());
        let key = "k".repeat(MAX_KEY_LENGTH + extra);

        prop_assert!(!store.set(&key, "value", None));
        prop_assert!(store.is_empty());
    }
}
