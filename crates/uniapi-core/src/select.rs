use std::sync::Mutex;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Picks one index out of `len` tied candidates. `len` is always at least 1.
pub trait SelectionStrategy: Send + Sync {
    fn pick(&self, len: usize) -> usize;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UniformRandom;

impl SelectionStrategy for UniformRandom {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        rand::rng().random_range(0..len)
    }
}

/// Uniform selection from a fixed seed, for reproducible runs.
#[derive(Debug)]
pub struct SeededRandom {
    rng: Mutex<StdRng>,
}

impl SeededRandom {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: Mutex::new(StdRng::seed_from_u64(seed)),
        }
    }
}

impl SelectionStrategy for SeededRandom {
    fn pick(&self, len: usize) -> usize {
        if len <= 1 {
            return 0;
        }
        let mut rng = self
            .rng
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        rng.random_range(0..len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_seed_same_sequence() {
        let a = SeededRandom::new(7);
        let b = SeededRandom::new(7);
        let left: Vec<usize> = (0..32).map(|_| a.pick(5)).collect();
        let right: Vec<usize> = (0..32).map(|_| b.pick(5)).collect();
        assert_eq!(left, right);
        assert!(left.iter().all(|index| *index < 5));
    }

    #[test]
    fn uniform_random_covers_every_candidate() {
        let strategy = UniformRandom;
        let mut seen = [false; 3];
        for _ in 0..500 {
            seen[strategy.pick(3)] = true;
        }
        assert_eq!(seen, [true, true, true]);
        assert_eq!(strategy.pick(1), 0);
    }
}
