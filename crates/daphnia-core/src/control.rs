//! Shared control block for the running simulation.
//!
//! The tick driver, the worker threads, and the admin API all hold an
//! [`Arc`](std::sync::Arc) to one [`SimulationControl`]. Every field is an
//! atomic so the hot path never takes a lock.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use daphnia_types::SessionToken;
use serde::{Deserialize, Serialize};

/// Reason why the simulation ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopReason {
    /// Reached the configured `max_ticks` limit.
    MaxTicksReached,
    /// Someone cleared the running flag.
    OperatorStop,
}

/// Flags shared between the driver, the workers, and the admin API.
#[derive(Debug)]
pub struct SimulationControl {
    running: AtomicBool,
    partition_dirty: AtomicBool,
    admin_observer: AtomicU64,
    started_at: DateTime<Utc>,
    max_ticks: u64,
}

impl SimulationControl {
    /// A running control block; `max_ticks` of 0 means unlimited.
    pub fn new(max_ticks: u64) -> Self {
        Self {
            running: AtomicBool::new(true),
            partition_dirty: AtomicBool::new(true),
            admin_observer: AtomicU64::new(SessionToken::REJECTED.into_inner()),
            started_at: Utc::now(),
            max_ticks,
        }
    }

    /// Whether the simulation should keep ticking.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Ask the scheduler to stop after the current tick.
    pub fn request_stop(&self) {
        self.running.store(false, Ordering::Release);
    }

    /// Flag that the simulated region must be recomputed.
    pub fn mark_partition_dirty(&self) {
        self.partition_dirty.store(true, Ordering::Release);
    }

    /// Consume the partition-dirty flag.
    pub fn take_partition_dirty(&self) -> bool {
        self.partition_dirty.swap(false, Ordering::AcqRel)
    }

    /// Register the observer that receives position broadcasts.
    pub fn set_admin_observer(&self, token: SessionToken) {
        self.admin_observer.store(token.into_inner(), Ordering::Release);
    }

    /// The registered admin observer, if any.
    pub fn admin_observer(&self) -> Option<SessionToken> {
        let token = SessionToken(self.admin_observer.load(Ordering::Acquire));
        token.is_valid().then_some(token)
    }

    /// When the simulation started.
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Configured tick limit (0 = unlimited).
    pub const fn max_ticks(&self) -> u64 {
        self.max_ticks
    }

    /// Whether `completed` ticks reach the configured limit.
    pub const fn tick_limit_reached(&self, completed: u64) -> bool {
        self.max_ticks > 0 && completed >= self.max_ticks
    }
}

impl Default for SimulationControl {
    fn default() -> Self {
        Self::new(0)
    }
}
