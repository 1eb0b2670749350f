//! Per-worker RNG service.
//!
//! Each worker thread owns one [`WorkerRng`]. The sequence it produces is a deterministic
//! function of its seed, so a run is reproducible at a fixed thread count: the main loop
//! (`crate::main_loop`) seeds worker `i` with `base_seed + i`.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

/// A seedable uniform-`[0, 1)` source owned by one worker thread.
pub struct WorkerRng {
    rng: Pcg64,
}

impl WorkerRng {
    /// Creates a new generator seeded deterministically from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Pcg64::seed_from_u64(seed),
        }
    }

    /// Draws a uniform sample in `[0, 1)`.
    pub fn uniform(&mut self) -> f64 {
        self.rng.gen::<f64>()
    }

    /// Draws an exponentially distributed optical depth increment, `-ln(U)` for
    /// `U` uniform on `(0, 1]`. Used to initialize/reset a real packet's `tau_event`.
    pub fn exp_tau(&mut self) -> f64 {
        // `gen::<f64>()` samples `[0, 1)`; flip to `(0, 1]` so `ln` never sees zero.
        -(1.0 - self.uniform()).ln()
    }
}
