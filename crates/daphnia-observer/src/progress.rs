//! Wrapping 8-bit progress accumulators.
//!
//! Clients steer with small magnitudes. Each command adds to (or subtracts
//! from) a `u8` accumulator, and only a wrap past the end of the range
//! turns into a whole voxel of movement or a whole degree of rotation. The
//! accumulator survives across ticks, so the motion rate is bounded no
//! matter how often a client sends commands, and a lost datagram only
//! delays the next step.

use serde::{Deserialize, Serialize};

/// A wrapping `u8` accumulator that reports when it wraps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Accumulator(u8);

impl Accumulator {
    /// An accumulator at `value`.
    pub const fn new(value: u8) -> Self {
        Self(value)
    }

    /// Current value.
    pub const fn value(self) -> u8 {
        self.0
    }

    /// Add `amount`; returns `true` if the value wrapped past 255.
    pub const fn advance(&mut self, amount: u8) -> bool {
        let before = self.0;
        self.0 = before.wrapping_add(amount);
        self.0 < before
    }

    /// Subtract `amount`; returns `true` if the value wrapped below 0.
    pub const fn retreat(&mut self, amount: u8) -> bool {
        let before = self.0;
        self.0 = before.wrapping_sub(amount);
        self.0 > before
    }
}
