//! The simulation state owned by the tick driver.
//!
//! Workers only ever see the grid (through the shared [`Arc<Ether>`]) and
//! their own box. Everything else here (clock, observer table,
//! statistics, the driver's random stream) is touched by the driver alone,
//! either during intake or after the tick barrier.

use std::sync::Arc;
use std::time::Duration;

use daphnia_ether::{Bank, Ether, Photon};
use daphnia_observer::Observer;
use daphnia_types::{EtherKind, ObserverKind, Rgba, SessionToken, Vec3};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::{debug, info};

use crate::clock::UniverseClock;
use crate::commit::{CommitSummary, commit_moves};
use crate::config::DaphniaConfig;
use crate::control::SimulationControl;
use crate::observers::{ObserverTable, SpawnError, SpawnedObserver};
use crate::stats::StatsCollector;

/// Mixed into the universe seed for the driver's own stream.
const DRIVER_STREAM: u64 = 0xD1CE_5EED_0B5E_12E5;

/// What the driver did after one tick's barrier.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SettleReport {
    /// Movement commits.
    pub commit: CommitSummary,
    /// Own echoes turned into eye pixels.
    pub received: u64,
    /// Foreign photons reflected off observer bodies.
    pub reflected: u64,
    /// Echolocation photons emitted.
    pub echoes: u64,
}

/// Everything the tick driver owns.
#[derive(Debug)]
pub struct SimulationState {
    ether: Arc<Ether>,
    clock: UniverseClock,
    observers: ObserverTable,
    stats: StatsCollector,
    control: Arc<SimulationControl>,
    eye_size: u8,
    spawn_attempts: u32,
    rng: SmallRng,
    admin_seen: Option<SessionToken>,
}

impl SimulationState {
    /// Build the driver state around an already populated grid.
    pub fn new(ether: Arc<Ether>, control: Arc<SimulationControl>, config: &DaphniaConfig) -> Self {
        let interval = Duration::from_millis(config.simulation.stats_interval_ms);
        Self {
            rng: SmallRng::seed_from_u64(ether.seed() ^ DRIVER_STREAM),
            ether,
            clock: UniverseClock::new(),
            observers: ObserverTable::new(config.network.max_observers),
            stats: StatsCollector::new(config.simulation.worker_count(), interval, 0),
            control,
            eye_size: config.observer.eye_size,
            spawn_attempts: config.observer.spawn_attempts,
            admin_seen: None,
        }
    }

    /// The shared grid.
    pub const fn ether(&self) -> &Arc<Ether> {
        &self.ether
    }

    /// The clock.
    pub const fn clock(&self) -> &UniverseClock {
        &self.clock
    }

    /// Mutable clock (the scheduler advances it).
    pub const fn clock_mut(&mut self) -> &mut UniverseClock {
        &mut self.clock
    }

    /// Current tick.
    pub const fn tick(&self) -> u64 {
        self.clock.tick()
    }

    /// Attached observers.
    pub const fn observers(&self) -> &ObserverTable {
        &self.observers
    }

    /// Mutable attached observers.
    pub const fn observers_mut(&mut self) -> &mut ObserverTable {
        &mut self.observers
    }

    /// Statistics collector.
    pub const fn stats(&self) -> &StatsCollector {
        &self.stats
    }

    /// Mutable statistics collector.
    pub const fn stats_mut(&mut self) -> &mut StatsCollector {
        &mut self.stats
    }

    /// Shared control block.
    pub const fn control(&self) -> &Arc<SimulationControl> {
        &self.control
    }

    /// Start a new intake window: every observer may again handle one
    /// message of each kind.
    pub fn begin_intake(&mut self) {
        self.observers.iter_mut().for_each(Observer::begin_intake);
    }

    /// Attach a new observer at a random free cell.
    pub fn spawn_observer(&mut self, kind: ObserverKind) -> Result<SpawnedObserver, SpawnError> {
        if self.observers.free_slot().is_none() {
            return Err(SpawnError::CapacityExceeded {
                capacity: self.observers.capacity(),
            });
        }
        let position = self
            .find_spawn_position(kind)
            .ok_or(SpawnError::NoFreeCell {
                attempts: self.spawn_attempts,
            })?;
        self.spawn_observer_at(kind, position)
    }

    /// Attach a new observer at `position`.
    pub fn spawn_observer_at(
        &mut self,
        kind: ObserverKind,
        position: Vec3,
    ) -> Result<SpawnedObserver, SpawnError> {
        let slot = self.observers.free_slot().ok_or(SpawnError::CapacityExceeded {
            capacity: self.observers.capacity(),
        })?;
        let token = self.fresh_token();
        let observer = Observer::new(slot, token, kind, position, self.eye_size, self.rng.random())?;
        self.ether
            .init_cell(position, EtherKind::Observer, observer.color())?;
        if !self.observers.insert(observer) {
            return Err(SpawnError::CapacityExceeded {
                capacity: self.observers.capacity(),
            });
        }
        self.control.mark_partition_dirty();
        info!(%slot, %position, ?kind, "observer attached");
        Ok(SpawnedObserver {
            slot,
            token,
            position,
        })
    }

    /// Post-barrier work for `tick`: photon delivery, moves, echolocation.
    ///
    /// Delivery runs before moves so photons are drained from the cell
    /// they reached.
    pub fn settle_tick(&mut self, tick: u64) -> SettleReport {
        let (received, reflected) = self.deliver_photons(tick);
        let commit = commit_moves(&self.ether, &mut self.observers);
        let mut view_changed = false;
        for observer in self.observers.iter_mut() {
            view_changed |= observer.take_view_changed();
        }
        if view_changed {
            self.control.mark_partition_dirty();
        }
        let echoes = self.echolocate(tick);
        self.sync_admin_observer();
        SettleReport {
            commit,
            received,
            reflected,
            echoes,
        }
    }

    /// Drain every observer's cell: own echoes become pixels, foreign
    /// photons bounce off the observer's body.
    ///
    /// All cells are drained before anything is reflected, so the result
    /// does not depend on the order observers are visited.
    pub fn deliver_photons(&mut self, tick: u64) -> (u64, u64) {
        let mut received = 0_u64;
        let mut foreign: Vec<(Vec3, Rgba, Photon)> = Vec::new();
        for observer in self.observers.iter_mut() {
            let position = observer.position();
            // Workers skip observer cells, so photons left in the current
            // bank by the previous settle (reflections, a move onto this
            // cell) are only ever picked up here.
            let mut arrivals = self.ether.take_photons(position, Bank::current(tick));
            arrivals.extend(self.ether.take_photons(position, Bank::next(tick)));
            let before = observer.pending_photons();
            let color = observer.color();
            foreign.extend(
                observer
                    .absorb(arrivals)
                    .into_iter()
                    .map(|photon| (position, color, photon)),
            );
            let gained = observer.pending_photons().saturating_sub(before);
            received = received.saturating_add(u64::try_from(gained).unwrap_or(u64::MAX));
        }
        let reflected = u64::try_from(foreign.len()).unwrap_or(u64::MAX);
        for (position, color, photon) in foreign {
            self.ether.step_photon(
                position,
                photon,
                EtherKind::Observer,
                color,
                tick,
                &mut self.rng,
            );
        }
        (received, reflected)
    }

    /// Every observer emits one photon per eye pixel.
    pub fn echolocate(&mut self, tick: u64) -> u64 {
        let ether = &self.ether;
        self.observers
            .iter_mut()
            .map(|observer| observer.echolocate(ether, tick))
            .fold(0_u64, |total, emitted| {
                total.saturating_add(u64::try_from(emitted).unwrap_or(u64::MAX))
            })
    }

    /// Pick up a newly registered admin observer: everyone must be
    /// broadcast to it once.
    fn sync_admin_observer(&mut self) {
        let admin = self.control.admin_observer();
        if admin == self.admin_seen {
            return;
        }
        debug!(admin = ?admin.map(SessionToken::into_inner), "admin observer changed");
        self.admin_seen = admin;
        self.observers.iter_mut().for_each(Observer::mark_for_admin);
    }

    fn fresh_token(&mut self) -> SessionToken {
        loop {
            let token = SessionToken(self.rng.random());
            if token.is_valid() && !self.observers.token_in_use(token) {
                return token;
            }
        }
    }

    fn find_spawn_position(&mut self, kind: ObserverKind) -> Option<Vec3> {
        let radius = i32::try_from(kind.radius()).ok()?;
        let size = self.ether.size();
        let lo = Vec3::splat(radius);
        let hi = size.saturating_sub(lo);
        if hi.x <= lo.x || hi.y <= lo.y || hi.z <= lo.z {
            return None;
        }
        for _ in 0..self.spawn_attempts {
            let candidate = Vec3::new(
                self.rng.random_range(lo.x..hi.x),
                self.rng.random_range(lo.y..hi.y),
                self.rng.random_range(lo.z..hi.z),
            );
            if self.footprint_is_free(candidate, radius)
                && self.observers.crowds(candidate, kind.radius(), None).is_none()
            {
                return Some(candidate);
            }
        }
        None
    }

    fn footprint_is_free(&self, center: Vec3, radius: i32) -> bool {
        let span = -radius..=radius;
        span.clone().all(|dx| {
            span.clone().all(|dy| {
                span.clone().all(|dz| {
                    let cell = center.saturating_add(Vec3::new(dx, dy, dz));
                    self.ether.kind_at(cell) == Some(EtherKind::Space)
                })
            })
        })
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use daphnia_types::{ObserverSlot, OrientationVector};

    use super::*;

    fn state(size: Vec3, max_observers: usize) -> SimulationState {
        let mut config = DaphniaConfig::default();
        config.network.max_observers = max_observers;
        config.observer.eye_size = 4;
        let ether = Arc::new(Ether::new(size).unwrap().with_seed(5));
        SimulationState::new(ether, Arc::new(SimulationControl::default()), &config)
    }

    #[test]
    fn spawn_finds_the_only_free_cell() {
        let mut state = state(Vec3::new(4, 3, 3), 2);
        for pos in state.ether().positions().collect::<Vec<_>>() {
            state.ether().init_cell(pos, EtherKind::Block, Rgba::gray(50)).unwrap();
        }
        state
            .ether()
            .init_cell(Vec3::new(2, 1, 1), EtherKind::Space, Rgba::TRANSPARENT)
            .unwrap();
        let spawned = state.spawn_observer(ObserverKind::Small).unwrap();
        assert_eq!(spawned.position, Vec3::new(2, 1, 1));
        assert!(spawned.token.is_valid());
        assert_eq!(state.ether().kind_at(spawned.position), Some(EtherKind::Observer));
        assert!(matches!(
            state.spawn_observer(ObserverKind::Small),
            Err(SpawnError::NoFreeCell { .. })
        ));
    }

    #[test]
    fn capacity_is_enforced() {
        let mut state = state(Vec3::splat(8), 1);
        state.spawn_observer(ObserverKind::Small).unwrap();
        assert!(matches!(
            state.spawn_observer(ObserverKind::Small),
            Err(SpawnError::CapacityExceeded { capacity: 1 })
        ));
    }

    #[test]
    fn big_observer_needs_room() {
        let mut state = state(Vec3::new(2, 8, 8), 1);
        assert!(matches!(
            state.spawn_observer(ObserverKind::Big),
            Err(SpawnError::NoFreeCell { .. })
        ));
        let mut state = self::state(Vec3::splat(3), 1);
        let spawned = state.spawn_observer(ObserverKind::Big).unwrap();
        assert_eq!(spawned.position, Vec3::ONE);
    }

    #[test]
    fn own_echo_is_received_and_foreign_photon_reflected() {
        let mut state = state(Vec3::splat(7), 2);
        let a = state.spawn_observer_at(ObserverKind::Small, Vec3::splat(3)).unwrap();
        state.spawn_observer_at(ObserverKind::Small, Vec3::new(0, 0, 0)).unwrap();

        let dir = OrientationVector::new(OrientationVector::MAX, 0, 0);
        let own = Photon::new(Rgba::RED, dir).from_observer(a.slot, 5);
        let foreign = Photon::new(Rgba::BLUE, dir).from_observer(ObserverSlot(1), 0);
        assert!(state.ether().place_photon(a.position, Bank::next(0), 0, &own));
        assert!(state.ether().place_photon(a.position, Bank::next(0), 1, &foreign));

        let (received, reflected) = state.deliver_photons(0);
        assert_eq!((received, reflected), (1, 1));
        let pixels = state.observers_mut().get_mut(a.slot).unwrap().drain_received();
        assert_eq!(pixels.len(), 1);
        assert_eq!((pixels[0].pixel_x, pixels[0].pixel_y), (1, 1));

        // The reflected photon travels back along -X, painted white.
        let landed = state.ether().photon_snapshot(Bank::next(0));
        assert_eq!(landed.len(), 1);
        let (index, _, bounced) = landed[0];
        assert_eq!(state.ether().position_of(index), Some(Vec3::new(2, 3, 3)));
        assert_eq!(bounced.color.r, 255);
        assert_eq!(bounced.direction.x, -OrientationVector::MAX);
    }

    #[test]
    fn echo_arriving_on_a_move_tick_is_received() {
        let mut state = state(Vec3::splat(9), 1);
        let a = state.spawn_observer_at(ObserverKind::Small, Vec3::splat(4)).unwrap();
        let dir = OrientationVector::new(-OrientationVector::MAX, 0, 0);
        let echo = Photon::new(Rgba::RED, dir).from_observer(a.slot, 5);
        assert!(state.ether().place_photon(a.position, Bank::next(0), 0, &echo));
        let observer = state.observers_mut().get_mut(a.slot).unwrap();
        observer.move_forward(255);
        observer.move_forward(1);

        let report = state.settle_tick(0);
        assert_eq!(report.commit.moved, 1);
        assert_eq!(report.received, 1);
        let observer = state.observers_mut().get_mut(a.slot).unwrap();
        assert_eq!(observer.position(), Vec3::new(5, 4, 4));
        assert_eq!(observer.drain_received().len(), 1);
    }

    #[test]
    fn echo_waiting_at_the_destination_is_received_next_tick() {
        let mut state = state(Vec3::splat(9), 1);
        let a = state.spawn_observer_at(ObserverKind::Small, Vec3::splat(4)).unwrap();
        let destination = Vec3::new(5, 4, 4);
        let dir = OrientationVector::new(-OrientationVector::MAX, 0, 0);
        let echo = Photon::new(Rgba::RED, dir).from_observer(a.slot, 5);
        assert!(state.ether().place_photon(destination, Bank::next(0), 0, &echo));
        let observer = state.observers_mut().get_mut(a.slot).unwrap();
        observer.move_forward(255);
        observer.move_forward(1);

        let first = state.settle_tick(0);
        assert_eq!((first.commit.moved, first.received), (1, 0));
        let waiting = state.ether().cell(destination).unwrap().live_count(Bank::current(1));
        assert_eq!(waiting, 1);

        let second = state.settle_tick(1);
        assert_eq!(second.received, 1);
    }

    #[test]
    fn settle_marks_partition_dirty_for_new_views() {
        let mut state = state(Vec3::splat(9), 1);
        state.control().take_partition_dirty();
        state.spawn_observer_at(ObserverKind::Small, Vec3::splat(4)).unwrap();
        state.control().take_partition_dirty();
        let report = state.settle_tick(0);
        assert_eq!(report.echoes, 16);
        assert!(state.control().take_partition_dirty());
        state.settle_tick(1);
        assert!(!state.control().take_partition_dirty());
    }

    #[test]
    fn registering_an_admin_rebroadcasts_everyone() {
        let mut state = state(Vec3::splat(9), 1);
        let spawned = state.spawn_observer_at(ObserverKind::Small, Vec3::splat(4)).unwrap();
        let obs = state.observers_mut().get_mut(spawned.slot).unwrap();
        assert!(obs.take_admin_update());
        assert!(!obs.take_admin_update());
        state.control().set_admin_observer(SessionToken(7));
        state.settle_tick(0);
        let obs = state.observers_mut().get_mut(spawned.slot).unwrap();
        assert!(obs.take_admin_update());
    }
}
