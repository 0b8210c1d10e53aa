//! Pseudo-random byte sources for `random_get`.
//!
//! Guests only need non-cryptographic randomness. Tests use [`SeededRng`]
//! for reproducible output.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::time::{SystemTime, UNIX_EPOCH};

/// Provider trait for random bytes.
pub trait RngProvider {
    /// Fill a byte slice with random data.
    fn fill_bytes(&mut self, dest: &mut [u8]);

    /// Check if this is a deterministic provider.
    fn is_deterministic(&self) -> bool;
}

/// Time-seeded RNG for real runs.
pub struct RealRng {
    rng: StdRng,
}

impl RealRng {
    /// Create a new time-seeded RNG.
    pub fn new() -> Self {
        let seed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or(0);

        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for RealRng {
    fn default() -> Self {
        Self::new()
    }
}

impl RngProvider for RealRng {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill(dest);
    }

    fn is_deterministic(&self) -> bool {
        false
    }
}

/// Seeded RNG that produces the same bytes for the same seed.
pub struct SeededRng {
    rng: StdRng,
}

impl SeededRng {
    /// Create a new seeded RNG.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl RngProvider for SeededRng {
    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.rng.fill(dest);
    }

    fn is_deterministic(&self) -> bool {
        true
    }
}
