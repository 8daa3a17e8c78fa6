//! Deterministic utilities for reproducible training
//!
//! Row ordering hashes and split tie-breaking, so the same CSV and seed
//! always produce the same artifact.

use churn_core::FeatureValue;

/// Deterministic xxhash64-like hash in pure i64 arithmetic
pub fn xxhash64_i64(data: &[i64], seed: i64) -> i64 {
    const PRIME1: i64 = 0x9E3779B185EBCA87_u64 as i64;
    const PRIME2: i64 = 0xC2B2AE3D27D4EB4F_u64 as i64;
    const PRIME3: i64 = 0x165667B19E3779F9_u64 as i64;
    const PRIME5: i64 = 0x85EBCA77C2B2AE63_u64 as i64;

    let mut h = seed.wrapping_add(PRIME5);

    for &val in data {
        h = h.wrapping_add(val.wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME2);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Stable integer encoding of a feature value for row hashing
pub fn value_words(value: &FeatureValue) -> i64 {
    match value {
        FeatureValue::Number(v) => v.to_bits() as i64,
        FeatureValue::Text(s) => {
            let words: Vec<i64> = s.bytes().map(i64::from).collect();
            xxhash64_i64(&words, s.len() as i64)
        }
    }
}

/// Deterministic tie-breaker for split selection
///
/// Equal gains resolve to the lowest `(feature_idx, bin, node_id)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SplitTieBreaker {
    pub feature_idx: usize,
    pub bin: usize,
    pub node_id: usize,
}

impl SplitTieBreaker {
    pub fn new(feature_idx: usize, bin: usize, node_id: usize) -> Self {
        Self {
            feature_idx,
            bin,
            node_id,
        }
    }
}
