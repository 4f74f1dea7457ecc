use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the uniform draws behind every probabilistic filter in a tick.
pub trait UniformSource: Send {
    /// A uniform sample in `[0, 1)`.
    fn next_unit(&mut self) -> f32;
}

#[derive(Debug, Clone)]
pub struct EntropySource {
    rng: StdRng,
}

impl EntropySource {
    pub fn from_entropy() -> Self {
        Self {
            rng: StdRng::from_entropy(),
        }
    }

    pub fn seeded(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
        }
    }
}

impl Default for EntropySource {
    fn default() -> Self {
        Self::from_entropy()
    }
}

impl UniformSource for EntropySource {
    fn next_unit(&mut self) -> f32 {
        self.rng.gen_range(0.0..1.0)
    }
}
