//! Photon propagation.
//!
//! One tick of propagation reads every live photon in the current bank of
//! a box of cells, bounces it off reflective cells, weakens it, and emits
//! it one lattice step further into the next bank. Cells of kind
//! [`EtherKind::Observer`] are skipped; the tick driver drains them
//! separately so photons can be attributed to eye pixels.
//!
//! Emission into an occupied slot is resolved by a fair coin: the incoming
//! photon either replaces the resident one or is dropped. Lost photons are
//! never retried.

use daphnia_types::{EtherKind, Rgba, SimulationBox, Vec3};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::cell::{Bank, Photon};
use crate::direction::{photon_slot_index, quantized_step};
use crate::ether::Ether;
use crate::random::cell_stream;

/// Result of emitting one photon one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmitOutcome {
    /// Written into an empty slot.
    Stored,
    /// Won the coin flip and overwrote a live photon.
    Replaced,
    /// Lost the coin flip against a live photon.
    Dropped,
    /// The destination lies outside the universe.
    OutOfBounds,
    /// Every axis draw failed; the photon did not move and is lost.
    Stationary,
}

/// Result of advancing one photon through the cell it sits in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Energy ran out.
    Absorbed,
    /// The photon was re-emitted.
    Emitted(EmitOutcome),
}

/// Counters for one worker's tick, or a rolled-up window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PropagationStats {
    /// Photons read from the current bank.
    pub stepped: u64,
    /// Photons absorbed after weakening.
    pub absorbed: u64,
    /// Photons stored in an empty slot.
    pub stored: u64,
    /// Photons that overwrote a live photon.
    pub replaced: u64,
    /// Photons that lost a slot collision.
    pub dropped: u64,
    /// Photons that left the universe.
    pub out_of_bounds: u64,
    /// Photons that failed to move.
    pub stationary: u64,
}

impl PropagationStats {
    /// Count one step outcome.
    pub const fn record(&mut self, outcome: StepOutcome) {
        self.stepped = self.stepped.saturating_add(1);
        let counter = match outcome {
            StepOutcome::Absorbed => &mut self.absorbed,
            StepOutcome::Emitted(EmitOutcome::Stored) => &mut self.stored,
            StepOutcome::Emitted(EmitOutcome::Replaced) => &mut self.replaced,
            StepOutcome::Emitted(EmitOutcome::Dropped) => &mut self.dropped,
            StepOutcome::Emitted(EmitOutcome::OutOfBounds) => &mut self.out_of_bounds,
            StepOutcome::Emitted(EmitOutcome::Stationary) => &mut self.stationary,
        };
        *counter = counter.saturating_add(1);
    }

    /// Add another set of counters into this one.
    pub const fn merge(&mut self, other: &Self) {
        self.stepped = self.stepped.saturating_add(other.stepped);
        self.absorbed = self.absorbed.saturating_add(other.absorbed);
        self.stored = self.stored.saturating_add(other.stored);
        self.replaced = self.replaced.saturating_add(other.replaced);
        self.dropped = self.dropped.saturating_add(other.dropped);
        self.out_of_bounds = self.out_of_bounds.saturating_add(other.out_of_bounds);
        self.stationary = self.stationary.saturating_add(other.stationary);
    }
}

impl Ether {
    /// Emit `photon` one quantized step from `origin` into the next bank.
    ///
    /// If the target slot is already occupied a fair coin decides: either
    /// the incoming photon is dropped, or it overwrites the resident one.
    pub fn emit_photon<R: Rng + ?Sized>(
        &self,
        origin: Vec3,
        photon: &Photon,
        tick: u64,
        rng: &mut R,
    ) -> EmitOutcome {
        let step = quantized_step(photon.direction, rng);
        let Some(slot_index) = photon_slot_index(step) else {
            return EmitOutcome::Stationary;
        };
        let destination = origin.saturating_add(step);
        let Some(slot) = self
            .cell(destination)
            .and_then(|cell| cell.slot(Bank::next(tick), slot_index))
        else {
            return EmitOutcome::OutOfBounds;
        };
        if slot.is_live() {
            if rng.random_bool(0.5) {
                return EmitOutcome::Dropped;
            }
            slot.store(photon);
            return EmitOutcome::Replaced;
        }
        slot.store(photon);
        EmitOutcome::Stored
    }

    /// Advance `photon`, which sits in a cell of `kind` and `cell_color`.
    ///
    /// Reflective cells invert the direction and paint the photon with
    /// their color. The photon then loses [`Ether::weakening`] alpha and
    /// is re-emitted if any energy remains.
    pub fn step_photon<R: Rng + ?Sized>(
        &self,
        pos: Vec3,
        photon: Photon,
        kind: EtherKind,
        cell_color: Rgba,
        tick: u64,
        rng: &mut R,
    ) -> StepOutcome {
        let mut photon = photon;
        if kind.reflects_photons() {
            photon.direction = photon.direction.inverted();
            photon.color = kind.reflected_color(cell_color, photon.color);
        }
        match photon.color.a.checked_sub(self.weakening()) {
            Some(alpha) if alpha > 0 => {
                photon.color.a = alpha;
                StepOutcome::Emitted(self.emit_photon(pos, &photon, tick, rng))
            }
            _ => StepOutcome::Absorbed,
        }
    }

    /// Propagate every photon in the current bank of the cells in `bounds`.
    ///
    /// Each cell with live photons draws from its own random stream keyed
    /// by `(seed, tick, cell index)`, so the outcome does not depend on how
    /// the universe is partitioned among callers.
    pub fn simulate_box(&self, bounds: &SimulationBox, tick: u64) -> PropagationStats {
        let mut stats = PropagationStats::default();
        let min = bounds.min.clamp_to(self.size());
        let max = bounds.max.clamp_to(self.size());
        let current = Bank::current(tick);
        for x in min.x..max.x {
            for y in min.y..max.y {
                for z in min.z..max.z {
                    let pos = Vec3::new(x, y, z);
                    let Some(index) = self.index_of(pos) else {
                        continue;
                    };
                    let Some(cell) = self.cell_at_index(index) else {
                        continue;
                    };
                    let kind = cell.kind();
                    if kind == EtherKind::Observer {
                        continue;
                    }
                    let color = cell.color();
                    let mut rng = None;
                    for slot in cell.bank(current) {
                        let Some(photon) = slot.take() else {
                            continue;
                        };
                        let rng = rng.get_or_insert_with(|| cell_stream(self.seed(), tick, index));
                        let outcome = self.step_photon(pos, photon, kind, color, tick, rng);
                        stats.record(outcome);
                    }
                }
            }
        }
        stats
    }
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::panic,
    clippy::indexing_slicing,
    clippy::arithmetic_side_effects,
    clippy::cast_possible_truncation
)]
mod tests {
    use daphnia_types::OrientationVector;
    use rand::SeedableRng;
    use rand::rngs::SmallRng;

    use super::*;
    use crate::direction::unit_vector_from_index;

    fn photon(dir: OrientationVector, alpha: u8) -> Photon {
        Photon::new(Rgba::WHITE.with_alpha(alpha), dir)
    }

    #[test]
    fn emit_at_origin_towards_negative_corner_is_out_of_bounds() {
        let ether = Ether::new(Vec3::splat(4)).unwrap();
        let max = OrientationVector::MAX;
        let p = photon(OrientationVector::new(-max, -max, -max), 255);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(
            ether.emit_photon(Vec3::ZERO, &p, 0, &mut rng),
            EmitOutcome::OutOfBounds
        );
        assert_eq!(ether.live_photon_count(Bank::Odd), 0);
        assert_eq!(ether.live_photon_count(Bank::Even), 0);
    }

    #[test]
    fn zero_direction_is_stationary() {
        let ether = Ether::new(Vec3::splat(4)).unwrap();
        let p = photon(OrientationVector::default(), 255);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(
            ether.emit_photon(Vec3::splat(1), &p, 0, &mut rng),
            EmitOutcome::Stationary
        );
    }

    #[test]
    fn emit_writes_the_next_bank_slot_named_by_the_step() {
        let ether = Ether::new(Vec3::splat(4)).unwrap();
        let p = photon(OrientationVector::new(OrientationVector::MAX, 0, 0), 200);
        let mut rng = SmallRng::seed_from_u64(1);
        assert_eq!(
            ether.emit_photon(Vec3::new(1, 1, 1), &p, 4, &mut rng),
            EmitOutcome::Stored
        );
        let snapshot = ether.photon_snapshot(Bank::next(4));
        assert_eq!(snapshot.len(), 1);
        let (index, slot, stored) = snapshot.first().copied().unwrap();
        assert_eq!(ether.position_of(index), Some(Vec3::new(2, 1, 1)));
        assert_eq!(unit_vector_from_index(slot), Some(Vec3::new(1, 0, 0)));
        assert_eq!(stored, p);
    }

    #[test]
    fn collisions_either_drop_or_replace() {
        let ether = Ether::new(Vec3::splat(4)).unwrap();
        let first = photon(OrientationVector::new(OrientationVector::MAX, 0, 0), 200);
        let second = Photon::new(Rgba::RED, first.direction);
        let mut rng = SmallRng::seed_from_u64(3);
        let mut dropped = 0;
        let mut replaced = 0;
        for _ in 0..200 {
            ether.init_cell(Vec3::new(2, 1, 1), EtherKind::Space, Rgba::TRANSPARENT).unwrap();
            ether.emit_photon(Vec3::new(1, 1, 1), &first, 0, &mut rng);
            let outcome = ether.emit_photon(Vec3::new(1, 1, 1), &second, 0, &mut rng);
            let resident = ether.take_photons(Vec3::new(2, 1, 1), Bank::next(0));
            assert_eq!(resident.len(), 1);
            match outcome {
                EmitOutcome::Dropped => {
                    assert_eq!(resident[0], first);
                    dropped += 1;
                }
                EmitOutcome::Replaced => {
                    assert_eq!(resident[0], second);
                    replaced += 1;
                }
                other => panic!("unexpected {other:?}"),
            }
        }
        assert!(dropped > 50 && replaced > 50, "{dropped} / {replaced}");
    }

    #[test]
    fn reflection_inverts_and_recolors_keeping_alpha() {
        let ether = Ether::new(Vec3::splat(4)).unwrap();
        let p = photon(OrientationVector::new(OrientationVector::MAX, 0, 0), 100);
        let mut rng = SmallRng::seed_from_u64(2);
        let outcome = ether.step_photon(
            Vec3::new(2, 1, 1),
            p,
            EtherKind::Block,
            Rgba::gray(50),
            0,
            &mut rng,
        );
        assert_eq!(outcome, StepOutcome::Emitted(EmitOutcome::Stored));
        let snapshot = ether.photon_snapshot(Bank::Odd);
        let (index, _, bounced) = snapshot.first().copied().unwrap();
        assert_eq!(ether.position_of(index), Some(Vec3::new(1, 1, 1)));
        assert_eq!(bounced.color, Rgba::new(50, 50, 50, 90));
        assert_eq!(bounced.direction.x, -OrientationVector::MAX);
    }

    #[test]
    fn weak_photons_are_absorbed() {
        let ether = Ether::new(Vec3::splat(4)).unwrap();
        let mut rng = SmallRng::seed_from_u64(2);
        let dir = OrientationVector::new(OrientationVector::MAX, 0, 0);
        for alpha in [1, 9, 10] {
            let outcome = ether.step_photon(
                Vec3::new(1, 1, 1),
                photon(dir, alpha),
                EtherKind::Space,
                Rgba::TRANSPARENT,
                0,
                &mut rng,
            );
            assert_eq!(outcome, StepOutcome::Absorbed, "alpha {alpha}");
        }
        let outcome = ether.step_photon(
            Vec3::new(1, 1, 1),
            photon(dir, 11),
            EtherKind::Space,
            Rgba::TRANSPARENT,
            0,
            &mut rng,
        );
        assert_eq!(outcome, StepOutcome::Emitted(EmitOutcome::Stored));
    }

    #[test]
    fn simulate_box_moves_photons_between_banks() {
        let ether = Ether::new(Vec3::new(6, 3, 3)).unwrap().with_seed(9);
        let p = photon(OrientationVector::new(OrientationVector::MAX, 0, 0), 255);
        assert!(ether.place_photon(Vec3::new(0, 1, 1), Bank::Even, 0, &p));

        let mut position = 0;
        for tick in 0..4 {
            let stats = ether.simulate_box(&ether.bounds(), tick);
            assert_eq!(stats.stepped, 1);
            assert_eq!(stats.stored, 1);
            position += 1;
            let snapshot = ether.photon_snapshot(Bank::next(tick));
            let (index, _, moved) = snapshot.first().copied().unwrap();
            assert_eq!(ether.position_of(index), Some(Vec3::new(position, 1, 1)));
            assert_eq!(u32::from(moved.color.a), 255 - 10 * (tick as u32 + 1));
            assert_eq!(ether.live_photon_count(Bank::current(tick)), 0);
        }
    }

    #[test]
    fn observer_cells_are_skipped() {
        let ether = Ether::new(Vec3::splat(3)).unwrap();
        ether.init_cell(Vec3::splat(1), EtherKind::Observer, Rgba::WHITE).unwrap();
        let p = photon(OrientationVector::new(OrientationVector::MAX, 0, 0), 255);
        assert!(ether.place_photon(Vec3::splat(1), Bank::Even, 4, &p));
        let stats = ether.simulate_box(&ether.bounds(), 0);
        assert_eq!(stats.stepped, 0);
        assert_eq!(ether.live_photon_count(Bank::Even), 1);
    }
}
