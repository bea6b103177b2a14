//! The universe clock.
//!
//! One tick is one quantum of time. The tick's parity selects which photon
//! bank is read and which is written, so the clock is also the switch that
//! flips the double buffer.

use chrono::{DateTime, Utc};
use daphnia_ether::Bank;

/// Errors that can occur during clock operations.
#[derive(Debug, thiserror::Error)]
pub enum ClockError {
    /// Tick counter would overflow.
    #[error("tick counter overflow: cannot advance beyond u64::MAX")]
    TickOverflow,
}

/// Tick counter plus wall-clock start time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniverseClock {
    tick: u64,
    started_at: DateTime<Utc>,
}

impl Default for UniverseClock {
    fn default() -> Self {
        Self::new()
    }
}

impl UniverseClock {
    /// A clock at tick 0, started now.
    pub fn new() -> Self {
        Self {
            tick: 0,
            started_at: Utc::now(),
        }
    }

    /// A clock resumed at `tick`.
    pub fn from_tick(tick: u64) -> Self {
        Self {
            tick,
            started_at: Utc::now(),
        }
    }

    /// Advance by one tick. Returns the new tick number.
    pub fn advance(&mut self) -> Result<u64, ClockError> {
        self.tick = self.tick.checked_add(1).ok_or(ClockError::TickOverflow)?;
        Ok(self.tick)
    }

    /// Current tick number.
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Bank read during the current tick.
    pub const fn current_bank(&self) -> Bank {
        Bank::current(self.tick)
    }

    /// Bank written during the current tick.
    pub const fn next_bank(&self) -> Bank {
        Bank::next(self.tick)
    }

    /// When the clock was started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Whole seconds since the clock was started.
    pub fn uptime_seconds(&self) -> u64 {
        let elapsed = Utc::now().signed_duration_since(self.started_at);
        u64::try_from(elapsed.num_seconds()).unwrap_or(0)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn advancing_flips_the_banks() {
        let mut clock = UniverseClock::new();
        assert_eq!(clock.current_bank(), Bank::Even);
        assert_eq!(clock.advance().unwrap(), 1);
        assert_eq!(clock.current_bank(), Bank::Odd);
        assert_eq!(clock.next_bank(), Bank::Even);
    }

    #[test]
    fn overflow_is_an_error() {
        let mut clock = UniverseClock::from_tick(u64::MAX);
        assert!(clock.advance().is_err());
        assert_eq!(clock.tick(), u64::MAX);
    }
}
