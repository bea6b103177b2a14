//! Shared application state for the admin API.
//!
//! [`AppState`] holds the control handle shared with the tick loop, the
//! universe itself (for crumb lookups), and a [`UniverseSnapshot`] that
//! the driver republishes after every barrier. Reads are served from the
//! snapshot so the admin API never blocks the tick cycle.

use std::sync::Arc;

use daphnia_core::{SimulationControl, SimulationState, TickStatistics};
use daphnia_ether::{CrumbCursor, Ether};
use daphnia_observer::ObserverSummary;
use tokio::sync::{Mutex, RwLock};
use tracing::trace;

/// What the admin API knows about the simulation as of the last barrier.
#[derive(Debug, Clone, Default)]
pub struct UniverseSnapshot {
    /// Tick of the last publish, `None` until the first barrier.
    pub tick: Option<u64>,
    /// Attached observers.
    pub observers: Vec<ObserverSummary>,
    /// Last closed statistics window.
    pub statistics: TickStatistics,
}

/// Shared state behind every admin handler.
#[derive(Debug)]
pub struct AppState {
    /// Run flag and admin observer registration, shared with the driver.
    pub control: Arc<SimulationControl>,
    /// The universe, read for crumb lookups.
    pub ether: Arc<Ether>,
    /// Physical cells per logical voxel.
    pub universe_scale: i32,
    /// Scan position of `GET /api/crumbs/next`.
    pub crumbs: Mutex<CrumbCursor>,
    /// Latest published snapshot.
    pub snapshot: RwLock<UniverseSnapshot>,
}

impl AppState {
    /// State with an empty snapshot.
    pub fn new(control: Arc<SimulationControl>, ether: Arc<Ether>, universe_scale: i32) -> Self {
        Self {
            control,
            ether,
            universe_scale,
            crumbs: Mutex::new(CrumbCursor::new()),
            snapshot: RwLock::new(UniverseSnapshot::default()),
        }
    }

    /// Republish the snapshot from the driver's state.
    ///
    /// Called on the driver thread. When a request is still reading the
    /// previous snapshot the publish is skipped; the next barrier catches
    /// up.
    pub fn publish(&self, state: &SimulationState) {
        let Ok(mut snapshot) = self.snapshot.try_write() else {
            trace!(tick = state.tick(), "snapshot busy, publish skipped");
            return;
        };
        snapshot.tick = Some(state.tick());
        snapshot.observers = state.observers().summaries();
        snapshot.statistics.clone_from(state.stats().current());
    }
}
