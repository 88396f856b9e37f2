//! Monte Carlo sampler
//!
//! This module draws uniform points in the unit square and counts how many land
//! inside the quarter circle of radius 1. Four times the hit ratio is an
//! unbiased estimate of π.
//!
//! # Performance
//!
//! Uses the xoshiro256++ PRNG, which is fast and has good statistical
//! properties. Every worker owns its own generator, so there is no contention
//! and no shared state between workers.
//!
//! # Example
//!
//! ```
//! use pidist::sampler::estimate;
//!
//! let pi = estimate(100_000, 42);
//! assert!(pi > 3.0 && pi < 3.3);
//!
//! // Same inputs, same stream, same answer
//! assert_eq!(pi.to_bits(), estimate(100_000, 42).to_bits());
//! ```

use rand::Rng;
use rand::SeedableRng;
use rand_xoshiro::Xoshiro256PlusPlus;

/// Estimate π from `sample_count` random draws seeded by `seed`.
///
/// Returns `4 * hits / sample_count`, always within `[0, 4]`. A worker with no
/// samples contributes the neutral value `0.0`; the ratio is never computed
/// with a zero denominator.
pub fn estimate(sample_count: u64, seed: u64) -> f64 {
    if sample_count == 0 {
        return 0.0;
    }

    let hits = Sampler::with_seed(seed).sample(sample_count);
    4.0 * hits as f64 / sample_count as f64
}

/// Seeded quarter-circle sampler
///
/// Holds the generator so draws can be taken in several batches from one
/// stream. `estimate` is the one-shot form.
pub struct Sampler {
    rng: Xoshiro256PlusPlus,
}

impl Sampler {
    /// Create a sampler whose stream is fully determined by `seed`
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
        }
    }

    /// Draw `count` points and return how many fell inside the quarter circle
    pub fn sample(&mut self, count: u64) -> u64 {
        let mut hits = 0u64;
        for _ in 0..count {
            if self.draw() {
                hits += 1;
            }
        }
        hits
    }

    /// Draw one `(x, y)` pair from `[0,1) × [0,1)`
    #[inline(always)]
    fn draw(&mut self) -> bool {
        let x: f64 = self.rng.gen();
        let y: f64 = self.rng.gen();
        x * x + y * y <= 1.0
    }
}
