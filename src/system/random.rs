//! Deterministic pseudo-random stream for search operators.
//!
//! Every genome owns one of these, so plans can be created, mutated and
//! evaluated in parallel without sharing any random state.

use rand::RngCore;

/// Lehmer multiplier.
const MULTIPLIER: u64 = 279_470_273;

/// Largest prime below 2^32.
pub const MODULUS: u64 = 4_294_967_291;

/// Multiplicative congruential generator (Lehmer).
///
/// The same seed always yields the same sequence. Zero is a fixed point of
/// the recurrence and is never stored or emitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RandomStream {
    state: u64,
}

impl RandomStream {
    /// Create from seed.
    pub fn new(seed: u64) -> Self {
        Self {
            state: seed % MODULUS,
        }
    }

    /// Current internal state.
    pub fn state(&self) -> u64 {
        self.state
    }

    /// Advance the stream and return the new value.
    pub fn next(&mut self) -> u32 {
        let mut input = self.state;
        let mut value = lehmer(input);
        // On a zero result the recurrence is retried from input + 1 and its
        // output is committed, not the incremented input.
        while value == 0 {
            input += 1;
            value = lehmer(input);
        }
        self.state = value;
        value as u32
    }

    /// Next value scaled into [0, 1).
    pub fn next_normalised(&mut self) -> f64 {
        self.next() as f64 / MODULUS as f64
    }

    /// Uniform draw in `0..n`. `n` must be non-zero.
    pub fn below(&mut self, n: usize) -> usize {
        debug_assert!(n > 0, "below() needs a non-empty range");
        self.next() as usize % n
    }

    /// True with probability `p`.
    pub fn chance(&mut self, p: f64) -> bool {
        self.next_normalised() < p
    }
}

#[inline]
fn lehmer(v: u64) -> u64 {
    v * MULTIPLIER % MODULUS
}

impl RngCore for RandomStream {
    fn next_u32(&mut self) -> u32 {
        self.next()
    }

    fn next_u64(&mut self) -> u64 {
        (u64::from(self.next()) << 32) | u64::from(self.next())
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        for chunk in dest.chunks_mut(4) {
            let bytes = self.next().to_le_bytes();
            chunk.copy_from_slice(&bytes[..chunk.len()]);
        }
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.fill_bytes(dest);
        Ok(())
    }
}
