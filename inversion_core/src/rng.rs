//! Explicit seeding context.
//!
//! Every stochastic step of a run (parameter initialization, shuffling,
//! augmentation, shuffled split policies) draws from its own [`StdRng`]
//! derived from a single root seed and a [`RngStream`] tag. Nothing mutates a
//! process-wide generator, so the same seed reproduces the same trajectory.

use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

/// Identifies an independent random stream derived from the root seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RngStream {
    /// Parameter initialization of a named component (e.g. layer index).
    Init(u64),
    /// Per-epoch shuffle order of a loader.
    Shuffle { epoch: u64 },
    /// Augmentation of the sample at `position` within an epoch.
    Augment { epoch: u64, position: u64 },
    /// Label permutation for a shuffled split policy.
    Split(u64),
    /// Synthetic data generation.
    Synthetic,
}

impl RngStream {
    fn key(self) -> (u64, u64, u64) {
        match self {
            RngStream::Init(id) => (1, id, 0),
            RngStream::Shuffle { epoch } => (2, epoch, 0),
            RngStream::Augment { epoch, position } => (3, epoch, position),
            RngStream::Split(index) => (4, index, 0),
            RngStream::Synthetic => (5, 0, 0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RngContext {
    seed: u64,
}

impl RngContext {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Derives the sub-seed for `stream`.
    pub fn derive_seed(&self, stream: RngStream) -> u64 {
        let (tag, a, b) = stream.key();
        let mut state = splitmix(self.seed ^ tag.wrapping_mul(0xA24B_AED4_963E_E407));
        state = splitmix(state ^ a);
        splitmix(state ^ b.wrapping_mul(0x9FB2_1C65_1E98_DF25))
    }

    /// Returns a fresh generator for `stream`.
    pub fn stream(&self, stream: RngStream) -> StdRng {
        StdRng::seed_from_u64(self.derive_seed(stream))
    }
}

impl Default for RngContext {
    fn default() -> Self {
        Self::new(0)
    }
}

fn splitmix(value: u64) -> u64 {
    let mut z = value.wrapping_add(0x9E37_79B9_7F4A_7C15);
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58_476D_1CE4_E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D0_49BB_1331_11EB);
    z ^ (z >> 31)
}
