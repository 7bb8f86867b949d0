//! Pseudo-random integer source capability, used only for the probabilistic cleanup
//! trigger.

use rand::Rng;

/// Abstract source of bounded random integers.
pub trait Random: Send + Sync + 'static {
    /// A uniformly distributed integer in `0..=max`, inclusive of both ends.
    fn int_inclusive(&self, max: u32) -> u32;
}

/// `Random` backed by `rand::thread_rng()`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRandom;

impl Random for ThreadRandom {
    fn int_inclusive(&self, max: u32) -> u32 {
        if max == 0 {
            return 0;
        }
        rand::thread_rng().gen_range(0..=max)
    }
}

/// Deterministic test double that always returns a fixed value, used to force or
/// suppress the probabilistic cleanup trigger in tests.
#[derive(Debug, Clone, Copy)]
pub struct FixedRandom(pub u32);

impl Random for FixedRandom {
    fn int_inclusive(&self, _max: u32) -> u32 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fixed_random_always_returns_its_value() {
        let random = FixedRandom(0);
        assert_eq!(random.int_inclusive(10), 0);
        assert_eq!(random.int_inclusive(1), 0);
    }

    #[test]
    fn thread_random_stays_in_bounds() {
        let random = ThreadRandom;
        for _ in 0..100 {
            assert!(random.int_inclusive(10) <= 10);
        }
    }

    #[test]
    fn thread_random_zero_max_is_always_zero() {
        assert_eq!(ThreadRandom.int_inclusive(0), 0);
    }
}
