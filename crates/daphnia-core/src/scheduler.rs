//! The tick scheduler.
//!
//! One driver (the calling thread) and a fixed pool of workers advance the
//! universe in lockstep:
//!
//! 1. Workers propagate photons in their boxes while the driver runs the
//!    intake hook (message handling, which never touches the grid).
//! 2. Everyone arrives at the [`TickBarrier`].
//! 3. With the workers parked, the driver delivers photons to observers,
//!    commits moves, emits echolocation photons, runs the barrier hook
//!    (replies, new sessions), and repartitions if observers moved.
//! 4. The driver advances the clock and releases the next tick.

use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::ScopedJoinHandle;
use std::time::Instant;

use daphnia_ether::{Ether, PropagationStats};
use daphnia_types::SimulationBox;
use serde::Serialize;
use tracing::{debug, error, info, trace};

use crate::barrier::TickBarrier;
use crate::clock::ClockError;
use crate::config::SimulationConfig;
use crate::control::StopReason;
use crate::partition::{PartitionMode, Partitioner};
use crate::state::SimulationState;
use crate::stats::duration_ns;

/// Callbacks the driver runs at fixed points of every tick.
pub trait TickHook {
    /// Runs while the workers propagate photons.
    ///
    /// Must not modify the grid.
    fn on_intake(&mut self, _state: &mut SimulationState) {}

    /// Runs after the tick's moves, deliveries and echolocation.
    fn on_barrier(&mut self, _state: &mut SimulationState) {}
}

/// A hook that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpHook;

impl TickHook for NoOpHook {}

/// Errors that stop the scheduler.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The clock could not advance.
    #[error("clock error: {source}")]
    Clock {
        /// The underlying clock error.
        #[from]
        source: ClockError,
    },

    /// A worker thread could not be started.
    #[error("failed to spawn worker thread: {source}")]
    Spawn {
        /// The underlying I/O error.
        source: std::io::Error,
    },

    /// A worker thread panicked.
    #[error("worker {index} panicked")]
    WorkerPanicked {
        /// Index of the first worker found dead.
        index: usize,
    },
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Why the loop stopped.
    pub reason: StopReason,
    /// Ticks completed during this run.
    pub ticks: u64,
    /// Clock value when the loop stopped.
    pub final_tick: u64,
}

#[derive(Debug, Clone, Copy, Default)]
struct WorkerReport {
    busy_ns: u64,
    propagation: PropagationStats,
}

/// Shared between the driver and the workers for one run.
struct Crew<'a> {
    ether: &'a Ether,
    boxes: &'a RwLock<Vec<SimulationBox>>,
    reports: &'a [Mutex<WorkerReport>],
    barrier: &'a TickBarrier,
}

/// Owns the simulation state and runs the tick loop.
#[derive(Debug)]
pub struct Scheduler {
    state: SimulationState,
    partitioner: Partitioner,
    boxes: Vec<SimulationBox>,
    underflowed: bool,
}

impl Scheduler {
    /// A scheduler using the thread layout from `config`.
    pub const fn new(state: SimulationState, config: &SimulationConfig) -> Self {
        let mode = if config.simulate_near_observers() {
            PartitionMode::NearObservers {
                simulation_size: config.simulation_size,
            }
        } else {
            PartitionMode::WholeUniverse
        };
        Self {
            state,
            partitioner: Partitioner::new(mode, config.worker_count()),
            boxes: Vec::new(),
            underflowed: false,
        }
    }

    /// The simulation state.
    pub const fn state(&self) -> &SimulationState {
        &self.state
    }

    /// Mutable simulation state (only between runs).
    pub const fn state_mut(&mut self) -> &mut SimulationState {
        &mut self.state
    }

    /// Give the state back.
    pub fn into_state(self) -> SimulationState {
        self.state
    }

    /// The partitioner in use.
    pub const fn partitioner(&self) -> &Partitioner {
        &self.partitioner
    }

    /// Worker boxes as last partitioned, one per worker.
    pub fn boxes(&self) -> &[SimulationBox] {
        &self.boxes
    }

    /// Whether the last run's barrier ever counted below zero.
    pub const fn barrier_underflowed(&self) -> bool {
        self.underflowed
    }

    /// Run ticks until the operator stops the universe or the tick limit
    /// is reached.
    pub fn run(&mut self, hook: &mut dyn TickHook) -> Result<RunSummary, SchedulerError> {
        let workers = self.partitioner.workers();
        let start = self.state.tick();
        let ether = Arc::clone(self.state.ether());
        self.boxes = self
            .partitioner
            .compute(ether.size(), self.state.observers().iter());
        let boxes = RwLock::new(self.boxes.clone());
        self.state.control().take_partition_dirty();
        let reports: Vec<Mutex<WorkerReport>> =
            (0..workers).map(|_| Mutex::default()).collect();
        let barrier = TickBarrier::new(workers.saturating_add(1), start);
        let crew = Crew {
            ether: &ether,
            boxes: &boxes,
            reports: &reports,
            barrier: &barrier,
        };

        info!(
            workers,
            mode = ?self.partitioner.mode(),
            start_tick = start,
            "simulation started"
        );

        let outcome = std::thread::scope(|scope| {
            let mut handles: Vec<ScopedJoinHandle<'_, ()>> = Vec::with_capacity(workers);
            for index in 0..workers {
                let crew = &crew;
                let spawned = std::thread::Builder::new()
                    .name(format!("daphnia-worker-{index}"))
                    .spawn_scoped(scope, move || worker_loop(index, crew, start));
                match spawned {
                    Ok(handle) => handles.push(handle),
                    Err(source) => {
                        error!(index, error = %source, "failed to spawn worker");
                        barrier.shutdown();
                        return Err(SchedulerError::Spawn { source });
                    }
                }
            }

            let result = self.drive(hook, &crew);
            barrier.shutdown();

            let mut panicked = None;
            for (index, handle) in handles.into_iter().enumerate() {
                if handle.join().is_err() {
                    error!(index, "worker panicked");
                    panicked.get_or_insert(index);
                }
            }
            match panicked {
                Some(index) => Err(SchedulerError::WorkerPanicked { index }),
                None => result,
            }
        });

        self.underflowed = barrier.underflowed();
        if let Ok(summary) = &outcome {
            info!(
                reason = ?summary.reason,
                ticks = summary.ticks,
                final_tick = summary.final_tick,
                "simulation stopped"
            );
        }
        outcome
    }

    fn drive(&mut self, hook: &mut dyn TickHook, crew: &Crew<'_>) -> Result<RunSummary, SchedulerError> {
        let mut completed = 0_u64;
        loop {
            let tick = self.state.tick();
            let intake_started = Instant::now();
            self.state.begin_intake();
            hook.on_intake(&mut self.state);
            let intake = intake_started.elapsed();

            crew.barrier.arrive();
            crew.barrier.wait_all_arrived();

            let settle_started = Instant::now();
            let report = self.state.settle_tick(tick);
            trace!(tick, ?report, "tick settled");
            hook.on_barrier(&mut self.state);

            if self.state.control().take_partition_dirty()
                && self.partitioner.mode() != PartitionMode::WholeUniverse
            {
                let next = self
                    .partitioner
                    .compute(crew.ether.size(), self.state.observers().iter());
                debug!(tick, boxes = ?next, "repartitioned");
                self.boxes.clone_from(&next);
                *crew.boxes.write().unwrap_or_else(PoisonError::into_inner) = next;
            }

            for (index, slot) in crew.reports.iter().enumerate() {
                let report = *slot.lock().unwrap_or_else(PoisonError::into_inner);
                self.state
                    .stats_mut()
                    .record_worker(index, report.busy_ns, &report.propagation);
            }
            self.state
                .stats_mut()
                .record_driver(intake.saturating_add(settle_started.elapsed()));

            completed = completed.saturating_add(1);
            let next = self.state.clock_mut().advance()?;
            let observers = self.state.observers().len();
            if let Some(stats) = self.state.stats_mut().roll(next, observers, Instant::now()) {
                debug!(
                    tick = stats.tick,
                    fps = stats.fps,
                    driver_ns = stats.driver_tick_ns,
                    observers = stats.observers,
                    "tick statistics"
                );
            }

            let control = self.state.control();
            let stop = if !control.is_running() {
                Some(StopReason::OperatorStop)
            } else if control.tick_limit_reached(completed) {
                Some(StopReason::MaxTicksReached)
            } else {
                None
            };
            if let Some(reason) = stop {
                return Ok(RunSummary {
                    reason,
                    ticks: completed,
                    final_tick: next,
                });
            }
            crew.barrier.release(next);
        }
    }
}

fn worker_loop(index: usize, crew: &Crew<'_>, start: u64) {
    let mut tick = start;
    loop {
        let bounds = crew
            .boxes
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
            .unwrap_or(SimulationBox::EMPTY);
        let started = Instant::now();
        let propagation = crew.ether.simulate_box(&bounds, tick);
        let busy_ns = duration_ns(started.elapsed());
        if let Some(slot) = crew.reports.get(index) {
            *slot.lock().unwrap_or_else(PoisonError::into_inner) = WorkerReport {
                busy_ns,
                propagation,
            };
        }
        crew.barrier.arrive();
        match crew.barrier.wait_for_release(tick) {
            Some(next) => tick = next,
            None => break,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use daphnia_types::{ObserverKind, Vec3};

    use super::*;
    use crate::config::DaphniaConfig;
    use crate::control::SimulationControl;

    fn scheduler(threads: usize, max_ticks: u64) -> Scheduler {
        let mut config = DaphniaConfig::default();
        config.simulation.threads = threads;
        config.simulation.max_ticks = max_ticks;
        config.observer.eye_size = 2;
        let ether = Arc::new(Ether::new(Vec3::splat(6)).unwrap().with_seed(3));
        let control = Arc::new(SimulationControl::new(max_ticks));
        let state = SimulationState::new(ether, control, &config);
        Scheduler::new(state, &config.simulation)
    }

    #[test]
    fn stops_at_the_tick_limit() {
        let mut scheduler = scheduler(2, 5);
        let summary = scheduler.run(&mut NoOpHook).unwrap();
        assert_eq!(summary.reason, StopReason::MaxTicksReached);
        assert_eq!(summary.ticks, 5);
        assert_eq!(summary.final_tick, 5);
        assert_eq!(scheduler.state().tick(), 5);
        assert!(!scheduler.barrier_underflowed());
    }

    struct StopAfter {
        ticks: u64,
        intakes: u64,
        barriers: u64,
    }

    impl TickHook for StopAfter {
        fn on_intake(&mut self, _state: &mut SimulationState) {
            self.intakes = self.intakes.saturating_add(1);
        }

        fn on_barrier(&mut self, state: &mut SimulationState) {
            self.barriers = self.barriers.saturating_add(1);
            if self.barriers >= self.ticks {
                state.control().request_stop();
            }
        }
    }

    #[test]
    fn operator_stop_ends_the_run() {
        let mut scheduler = scheduler(1, 0);
        let mut hook = StopAfter {
            ticks: 3,
            intakes: 0,
            barriers: 0,
        };
        let summary = scheduler.run(&mut hook).unwrap();
        assert_eq!(summary.reason, StopReason::OperatorStop);
        assert_eq!(summary.ticks, 3);
        assert_eq!((hook.intakes, hook.barriers), (3, 3));
    }

    #[test]
    fn near_observer_mode_runs_with_observers() {
        let mut scheduler = scheduler(0, 4);
        scheduler
            .state_mut()
            .spawn_observer_at(ObserverKind::Small, Vec3::splat(3))
            .unwrap();
        let summary = scheduler.run(&mut NoOpHook).unwrap();
        assert_eq!(summary.final_tick, 4);
        assert!(matches!(
            scheduler.partitioner().mode(),
            PartitionMode::NearObservers { .. }
        ));
    }
}
