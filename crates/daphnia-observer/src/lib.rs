//! Observers: the organisms remote clients steer through the universe.
//!
//! # Modules
//!
//! - [`observer`] -- [`Observer`] state, motion commands, photon reception,
//!   and echolocation.
//! - [`eye`] -- The compound eye and its pixel directions.
//! - [`progress`] -- Wrapping accumulators that turn small commands into
//!   whole steps.
//! - [`commands`] -- One-message-per-kind-per-tick deduplication.
//! - [`error`] -- Error types for observer construction.

pub mod commands;
pub mod error;
pub mod eye;
pub mod observer;
pub mod progress;

pub use commands::HandledKinds;
pub use error::ObserverError;
pub use eye::{EYE_FOV, Eye, MAX_EYE_SIZE, facing};
pub use observer::{ECHO_ALPHA, MAX_PENDING_PHOTONS, Observer, ObserverSummary, RateRatios, ReceivedPhoton};
pub use progress::Accumulator;
