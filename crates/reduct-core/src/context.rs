//! Per-run state handed explicitly to the stack and the drive loop

use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256PlusPlus;

use crate::stats::SharedData;

/// Root seed used when none is configured
pub const DEFAULT_SEED: u64 = 0;

/// Random source, statistics and mode flags of one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub rng: Xoshiro256PlusPlus,
    pub stats: SharedData,
    /// `false` in evaluation (test-only) mode
    pub training: bool,
    /// Suppress human-readable progress output
    pub quiet: bool,
    seed: u64,
}

impl RunContext {
    pub fn new(seed: u64, training: bool) -> Self {
        Self {
            rng: Xoshiro256PlusPlus::seed_from_u64(seed),
            stats: SharedData::new(),
            training,
            quiet: false,
            seed,
        }
    }

    pub fn with_quiet(mut self, quiet: bool) -> Self {
        self.quiet = quiet;
        self
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Draw a seed for a component that keeps its own generator.
    pub fn draw_seed(&mut self) -> u64 {
        self.rng.random()
    }
}

impl Default for RunContext {
    fn default() -> Self {
        Self::new(DEFAULT_SEED, true)
    }
}
