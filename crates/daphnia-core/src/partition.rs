//! Spatial partitioning of propagation work.
//!
//! The simulated region is cut along X into one contiguous slab per worker.
//! In whole-universe mode the region is the full grid and never changes.
//! In near-observer mode it is the union, over all observers, of the box
//! each observer could possibly see, and it is recomputed whenever an
//! observer moves or turns.
//!
//! An observer's box extends `simulation_size` cells in every direction,
//! except along an axis where every eye pixel looks the same way: no
//! photon from behind can reach the eye there, so the box stops at the
//! observer on that side.

use daphnia_observer::Observer;
use daphnia_types::{Axis, SimulationBox, Vec3};

/// Which part of the universe the workers propagate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionMode {
    /// Every cell, every tick.
    WholeUniverse,
    /// Only cells within `simulation_size` of some observer's view.
    NearObservers {
        /// Reach of the region around an observer.
        simulation_size: i32,
    },
}

/// Computes per-worker boxes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    mode: PartitionMode,
    workers: usize,
}

impl Partitioner {
    /// A partitioner for `workers` slabs.
    pub const fn new(mode: PartitionMode, workers: usize) -> Self {
        Self { mode, workers }
    }

    /// Partitioning mode.
    pub const fn mode(&self) -> PartitionMode {
        self.mode
    }

    /// Number of slabs produced.
    pub const fn workers(&self) -> usize {
        self.workers
    }

    /// Slabs for a universe of `size` holding `observers`.
    pub fn compute<'a>(
        &self,
        size: Vec3,
        observers: impl IntoIterator<Item = &'a Observer>,
    ) -> Vec<SimulationBox> {
        let region = match self.mode {
            PartitionMode::WholeUniverse => SimulationBox::covering(size),
            PartitionMode::NearObservers { simulation_size } => observers
                .into_iter()
                .map(|obs| observer_region(obs, simulation_size, size))
                .fold(SimulationBox::EMPTY, |acc, region| acc.union(&region)),
        };
        slice_along_x(&region, self.workers)
    }
}

/// The box an observer could see, clamped to the universe.
pub fn observer_region(observer: &Observer, simulation_size: i32, universe: Vec3) -> SimulationBox {
    let reach = Vec3::splat(simulation_size);
    let eye = observer.eye();
    let below = reach.min_each(eye.min_changer());
    let above = reach.min_each(eye.max_changer());
    let position = observer.position();
    let min = position.saturating_sub(below).clamp_to(universe);
    let max = position
        .saturating_add(above)
        .saturating_add(Vec3::ONE)
        .clamp_to(universe);
    SimulationBox::new(min, max)
}

/// Cut `region` into `parts` slabs along X.
///
/// Slabs are contiguous and differ in width by at most one cell; the first
/// slabs take the remainder. An empty region yields empty slabs.
pub fn slice_along_x(region: &SimulationBox, parts: usize) -> Vec<SimulationBox> {
    if region.is_empty() {
        return vec![SimulationBox::EMPTY; parts];
    }
    let Ok(count) = i32::try_from(parts) else {
        return vec![*region];
    };
    let length = region.max.x.saturating_sub(region.min.x);
    let width = length.checked_div(count).unwrap_or(0);
    let mut remain = length.checked_rem(count).unwrap_or(0);
    let mut begin = region.min.x;
    let mut slabs = Vec::with_capacity(parts);
    for _ in 0..parts {
        let mut end = begin.saturating_add(width);
        if remain > 0 {
            end = end.saturating_add(1);
            remain = remain.saturating_sub(1);
        }
        slabs.push(SimulationBox::new(
            region.min.with(Axis::X, begin),
            region.max.with(Axis::X, end),
        ));
        begin = end;
    }
    slabs
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use daphnia_types::{ObserverKind, ObserverSlot, SessionToken};

    use super::*;

    fn observer_at(position: Vec3, latitude: i16, longitude: i16) -> Observer {
        let mut obs = Observer::new(
            ObserverSlot(0),
            SessionToken(1),
            ObserverKind::Small,
            position,
            16,
            3,
        )
        .unwrap();
        obs.set_facing(latitude, longitude);
        obs
    }

    #[test]
    fn slabs_cover_the_region_with_remainder_first() {
        let region = SimulationBox::new(Vec3::new(2, 0, 0), Vec3::new(12, 4, 5));
        let slabs = slice_along_x(&region, 4);
        let edges: Vec<(i32, i32)> = slabs.iter().map(|b| (b.min.x, b.max.x)).collect();
        assert_eq!(edges, vec![(2, 5), (5, 8), (8, 10), (10, 12)]);
        assert!(slabs.iter().all(|b| b.min.y == 0 && b.max.z == 5));
        let total: usize = slabs.iter().map(SimulationBox::cell_count).sum();
        assert_eq!(total, region.cell_count());
    }

    #[test]
    fn narrow_regions_leave_trailing_slabs_empty() {
        let region = SimulationBox::new(Vec3::ZERO, Vec3::new(2, 3, 3));
        let slabs = slice_along_x(&region, 4);
        assert_eq!(slabs.len(), 4);
        assert_eq!(slabs.iter().filter(|b| b.is_empty()).count(), 2);
    }

    #[test]
    fn observer_facing_east_is_not_simulated_behind() {
        let obs = observer_at(Vec3::splat(20), 0, 0);
        let region = observer_region(&obs, 8, Vec3::splat(64));
        assert_eq!(region.min, Vec3::new(20, 12, 12));
        assert_eq!(region.max, Vec3::new(29, 29, 29));
    }

    #[test]
    fn observer_region_is_clamped_to_the_universe() {
        let obs = observer_at(Vec3::new(1, 1, 1), 0, 0);
        let region = observer_region(&obs, 8, Vec3::splat(6));
        assert_eq!(region.min, Vec3::new(1, 0, 0));
        assert_eq!(region.max, Vec3::splat(6));
    }

    #[test]
    fn near_observer_mode_unions_observers() {
        let a = observer_at(Vec3::splat(10), 0, 0);
        let b = observer_at(Vec3::new(40, 10, 10), 0, 0);
        let partitioner = Partitioner::new(PartitionMode::NearObservers { simulation_size: 4 }, 2);
        let slabs = partitioner.compute(Vec3::splat(64), [&a, &b]);
        assert_eq!(slabs.first().unwrap().min.x, 10);
        assert_eq!(slabs.last().unwrap().max.x, 45);
    }

    #[test]
    fn near_observer_mode_without_observers_is_idle() {
        let partitioner = Partitioner::new(PartitionMode::NearObservers { simulation_size: 4 }, 3);
        let slabs = partitioner.compute(Vec3::splat(8), std::iter::empty());
        assert!(slabs.iter().all(SimulationBox::is_empty));
    }

    #[test]
    fn whole_universe_mode_ignores_observers() {
        let partitioner = Partitioner::new(PartitionMode::WholeUniverse, 1);
        let slabs = partitioner.compute(Vec3::new(5, 6, 7), std::iter::empty());
        assert_eq!(slabs, vec![SimulationBox::covering(Vec3::new(5, 6, 7))]);
    }
}
