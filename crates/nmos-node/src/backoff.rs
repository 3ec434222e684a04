//! Exponential backoff for discovery failures, per spec.md §4.3: "uniform
//! (0, backoff) delay with `backoff ← clamp(backoff × factor, min, max)`."

use std::time::Duration;

use rand::Rng;

#[derive(Clone, Debug)]
pub struct Backoff {
    min: Duration,
    max: Duration,
    factor: f64,
    ceiling: Duration,
}

impl Backoff {
    pub fn new(min: Duration, max: Duration, factor: f64) -> Self {
        Self {
            min,
            max,
            factor,
            ceiling: min,
        }
    }

    /// Grow the ceiling by `factor` (clamped to `[min, max]`), then sample
    /// uniformly from `[0, ceiling]`. Called once per discovery failure —
    /// the testable property (spec.md §8.4) is stated in terms of "after
    /// k consecutive failures", so the ceiling must grow *before* the
    /// sample is drawn, not after.
    pub fn next_wait(&mut self, rng: &mut impl Rng) -> Duration {
        let grown = self.ceiling.as_secs_f64() * self.factor;
        self.ceiling = Duration::from_secs_f64(grown.clamp(self.min.as_secs_f64(), self.max.as_secs_f64()));
        let sampled = rng.gen_range(0.0..=1.0) * self.ceiling.as_secs_f64();
        Duration::from_secs_f64(sampled)
    }

    pub fn reset(&mut self) {
        self.ceiling = self.min;
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ceiling_grows_geometrically_and_saturates_at_max() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 1.5);
        let mut rng = rand::thread_rng();
        for _ in 0..2 {
            backoff.next_wait(&mut rng);
        }
        // 1 * 1.5^2 = 2.25s
        assert!((backoff.ceiling().as_secs_f64() - 2.25).abs() < 1e-6);
        for _ in 0..20 {
            backoff.next_wait(&mut rng);
        }
        assert_eq!(backoff.ceiling(), Duration::from_secs(30));
    }

    #[test]
    fn wait_never_exceeds_the_ceiling() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 1.5);
        let mut rng = rand::thread_rng();
        for _ in 0..50 {
            let ceiling_before = {
                let grown = backoff.ceiling.as_secs_f64() * backoff.factor;
                grown.clamp(backoff.min.as_secs_f64(), backoff.max.as_secs_f64())
            };
            let wait = backoff.next_wait(&mut rng);
            assert!(wait.as_secs_f64() <= ceiling_before + 1e-9);
        }
    }

    #[test]
    fn reset_returns_to_min() {
        let mut backoff = Backoff::new(Duration::from_secs(1), Duration::from_secs(30), 1.5);
        let mut rng = rand::thread_rng();
        backoff.next_wait(&mut rng);
        backoff.reset();
        assert_eq!(backoff.ceiling(), Duration::from_secs(1));
    }
}
