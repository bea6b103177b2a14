//! Tick loop, worker partitioning, and configuration for the Daphnia universe.
//!
//! The core crate owns time. A [`Scheduler`] drives a fixed pool of
//! worker threads through barrier-separated ticks; between ticks the
//! driver applies observer moves, delivers photons, and lets the session
//! layer answer clients through a [`TickHook`].
//!
//! # Modules
//!
//! - [`scheduler`] -- The driver loop, worker threads, and [`TickHook`].
//! - [`barrier`] -- Countdown barrier between the driver and workers.
//! - [`state`] -- [`SimulationState`]: everything the driver owns.
//! - [`partition`] -- Whole-universe and near-observer work boxes.
//! - [`commit`] -- Applying requested moves and eating crumbs.
//! - [`observers`] -- The fixed-capacity observer table.
//! - [`clock`] -- Tick counter and bank parity.
//! - [`control`] -- Atomic flags shared with the admin API.
//! - [`stats`] -- Ticks per second and per-thread timings.
//! - [`config`] -- YAML configuration with environment overrides.

pub mod barrier;
pub mod clock;
pub mod commit;
pub mod config;
pub mod control;
pub mod observers;
pub mod partition;
pub mod scheduler;
pub mod state;
pub mod stats;

pub use barrier::TickBarrier;
pub use clock::{ClockError, UniverseClock};
pub use commit::{CommitSummary, MoveRejection, commit_moves};
pub use config::{
    ConfigError, DaphniaConfig, LogFormat, LoggingConfig, NetworkConfig, ObserverConfig,
    SimulationConfig, UniverseConfig,
};
pub use control::{SimulationControl, StopReason};
pub use observers::{ObserverTable, SpawnError, SpawnedObserver};
pub use partition::{PartitionMode, Partitioner};
pub use scheduler::{NoOpHook, RunSummary, Scheduler, SchedulerError, TickHook};
pub use state::{SettleReport, SimulationState};
pub use stats::{StatsCollector, TickStatistics};
