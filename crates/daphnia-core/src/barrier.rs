//! The tick barrier.
//!
//! Every participant (each worker plus the driver) decrements a shared
//! countdown when it finishes its share of a tick. The driver waits for
//! the countdown to reach zero, does its post-tick work while everyone
//! else is parked, then resets the countdown and publishes the next tick
//! number, which releases the workers.
//!
//! Waiting spins briefly (tick periods are expected to be short) and then
//! falls back to a condition variable so an idle universe does not burn a
//! core per worker. The countdown is signed: a participant arriving twice
//! in one generation drives it negative, which is recorded as an underflow
//! instead of being silently absorbed.

use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};
use std::sync::{Condvar, Mutex, PoisonError};
use std::time::Duration;

use tracing::error;

/// Spin iterations before parking.
const SPIN_LIMIT: u32 = 1 << 12;

/// Longest a parked waiter sleeps before re-checking.
const PARK_TIMEOUT: Duration = Duration::from_millis(1);

/// Countdown barrier between the driver and the workers.
#[derive(Debug)]
pub struct TickBarrier {
    participants: i64,
    pending: AtomicI64,
    generation: AtomicU64,
    stopped: AtomicBool,
    underflow: AtomicBool,
    lock: Mutex<()>,
    wake: Condvar,
}

impl TickBarrier {
    /// A barrier for `participants` parties starting at tick `start`.
    pub fn new(participants: usize, start: u64) -> Self {
        let participants = i64::try_from(participants).unwrap_or(i64::MAX);
        Self {
            participants,
            pending: AtomicI64::new(participants),
            generation: AtomicU64::new(start),
            stopped: AtomicBool::new(false),
            underflow: AtomicBool::new(false),
            lock: Mutex::new(()),
            wake: Condvar::new(),
        }
    }

    /// Number of parties per generation.
    pub const fn participants(&self) -> i64 {
        self.participants
    }

    /// Parties still to arrive in this generation.
    pub fn pending(&self) -> i64 {
        self.pending.load(Ordering::Acquire)
    }

    /// The tick currently being worked on.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Whether the countdown was ever driven below zero.
    pub fn underflowed(&self) -> bool {
        self.underflow.load(Ordering::Acquire)
    }

    /// Whether the barrier has been shut down.
    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::Acquire)
    }

    /// Report this participant's share of the tick as done.
    ///
    /// Returns how many parties are still outstanding.
    pub fn arrive(&self) -> i64 {
        let left = self.pending.fetch_sub(1, Ordering::AcqRel).saturating_sub(1);
        if left < 0 {
            self.underflow.store(true, Ordering::Release);
            error!(left, generation = self.generation(), "tick barrier underflow");
        }
        if left <= 0 {
            self.notify();
        }
        left
    }

    /// Block until every participant has arrived.
    pub fn wait_all_arrived(&self) {
        self.wait_until(|| self.pending.load(Ordering::Acquire) <= 0);
    }

    /// Block until the generation moves past `seen`.
    ///
    /// Returns the new tick, or `None` once the barrier is shut down.
    pub fn wait_for_release(&self, seen: u64) -> Option<u64> {
        self.wait_until(|| self.generation.load(Ordering::Acquire) != seen);
        if self.is_stopped() {
            return None;
        }
        Some(self.generation())
    }

    /// Reset the countdown and start tick `next`.
    ///
    /// Only the driver calls this, and only after [`Self::wait_all_arrived`].
    pub fn release(&self, next: u64) {
        self.pending.store(self.participants, Ordering::Release);
        self.generation.store(next, Ordering::Release);
        self.notify();
    }

    /// Release every waiter for good.
    pub fn shutdown(&self) {
        self.stopped.store(true, Ordering::Release);
        self.generation.fetch_add(1, Ordering::AcqRel);
        self.notify();
    }

    fn notify(&self) {
        let _guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.wake.notify_all();
    }

    fn wait_until(&self, ready: impl Fn() -> bool) {
        for _ in 0..SPIN_LIMIT {
            if ready() {
                return;
            }
            std::hint::spin_loop();
        }
        let mut guard = self.lock.lock().unwrap_or_else(PoisonError::into_inner);
        while !ready() {
            guard = match self.wake.wait_timeout(guard, PARK_TIMEOUT) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }
    }
}
