use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Source of the simulator's randomness.
pub trait RandomSource: Send {
    /// Returns a value in `0..upper`, or `0` when `upper` is zero.
    fn next_below(&mut self, upper: u64) -> u64;
}

/// Adapts any `rand` generator.
pub struct RngSource<R>(pub R);

impl RngSource<StdRng> {
    pub fn from_entropy() -> Self {
        Self(StdRng::from_entropy())
    }

    pub fn seeded(seed: u64) -> Self {
        Self(StdRng::seed_from_u64(seed))
    }
}

impl<R> RandomSource for RngSource<R>
where
    R: Rng + Send,
{
    fn next_below(&mut self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.0.gen_range(0..upper)
    }
}

/// Replays a fixed sequence of draws, cycling when exhausted.
///
/// Each draw is reduced modulo the requested bound so scripted values never fall
/// outside the caller's range.
#[derive(Debug, Clone)]
pub struct SequenceSource {
    values: Vec<u64>,
    cursor: usize,
}

impl SequenceSource {
    pub fn new(values: impl Into<Vec<u64>>) -> Self {
        Self {
            values: values.into(),
            cursor: 0,
        }
    }
}

impl RandomSource for SequenceSource {
    fn next_below(&mut self, upper: u64) -> u64 {
        if upper == 0 || self.values.is_empty() {
            return 0;
        }
        let value = self.values[self.cursor % self.values.len()];
        self.cursor = self.cursor.wrapping_add(1);
        value % upper
    }
}
