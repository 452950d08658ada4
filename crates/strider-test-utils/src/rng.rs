//! Deterministic RNG utilities for reproducible tests.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Create a deterministic `ChaCha8Rng` from a seed.
///
/// All test randomization should go through this to ensure reproducibility.
pub fn seeded_rng(seed: u64) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed)
}

/// `dim` values drawn uniformly from `[-amplitude, amplitude]`.
pub fn deterministic_vec(dim: usize, amplitude: f64, seed: u64) -> Vec<f64> {
    let mut rng = seeded_rng(seed);
    if amplitude <= 0.0 {
        return vec![0.0; dim];
    }
    (0..dim).map(|_| rng.gen_range(-amplitude..=amplitude)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
