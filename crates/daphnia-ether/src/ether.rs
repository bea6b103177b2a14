//! The voxel grid.
//!
//! [`Ether`] is a dense `size.x * size.y * size.z` array of [`Cell`]s
//! stored x-major (then y, then z), matching the persisted universe
//! layout. It is shared by reference between the tick driver and the
//! worker threads. Coordinates are validated once, in [`Ether::index_of`],
//! and every accessor goes through it.

use daphnia_types::{EtherKind, Rgba, SimulationBox, Vec3};

use crate::cell::{Bank, Cell, Photon};
use crate::error::EtherError;

/// Default per-step alpha loss of a photon.
pub const DEFAULT_WEAKENING: u8 = 10;

/// The simulated universe.
#[derive(Debug)]
pub struct Ether {
    size: Vec3,
    cells: Vec<Cell>,
    weakening: u8,
    seed: u64,
}

impl Ether {
    /// Allocate an all-[`EtherKind::Space`] universe of `size`.
    pub fn new(size: Vec3) -> Result<Self, EtherError> {
        if !size.is_positive() {
            return Err(EtherError::InvalidSize { size });
        }
        let count = size.volume().ok_or(EtherError::InvalidSize { size })?;
        let mut cells = Vec::with_capacity(count);
        cells.resize_with(count, Cell::default);
        Ok(Self {
            size,
            cells,
            weakening: DEFAULT_WEAKENING,
            seed: 0,
        })
    }

    /// Set the per-step alpha loss (at least 1).
    #[must_use]
    pub fn with_weakening(mut self, weakening: u8) -> Self {
        self.weakening = weakening.max(1);
        self
    }

    /// Set the seed of the per-cell random streams.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Universe extents.
    pub const fn size(&self) -> Vec3 {
        self.size
    }

    /// Per-step alpha loss.
    pub const fn weakening(&self) -> u8 {
        self.weakening
    }

    /// Seed of the per-cell random streams.
    pub const fn seed(&self) -> u64 {
        self.seed
    }

    /// Total number of cells.
    pub fn cell_count(&self) -> usize {
        self.cells.len()
    }

    /// Box covering the whole universe.
    pub const fn bounds(&self) -> SimulationBox {
        SimulationBox::covering(self.size)
    }

    /// Whether `pos` lies inside the universe.
    pub const fn in_bounds(&self, pos: Vec3) -> bool {
        self.bounds().contains(pos)
    }

    /// Linear index of `pos`, or `None` if out of bounds.
    pub fn index_of(&self, pos: Vec3) -> Option<usize> {
        if !self.in_bounds(pos) {
            return None;
        }
        let x = usize::try_from(pos.x).ok()?;
        let y = usize::try_from(pos.y).ok()?;
        let z = usize::try_from(pos.z).ok()?;
        let sy = usize::try_from(self.size.y).ok()?;
        let sz = usize::try_from(self.size.z).ok()?;
        x.checked_mul(sy)?.checked_add(y)?.checked_mul(sz)?.checked_add(z)
    }

    /// Position of linear index `index`.
    pub fn position_of(&self, index: usize) -> Option<Vec3> {
        if index >= self.cells.len() {
            return None;
        }
        let sy = usize::try_from(self.size.y).ok()?;
        let sz = usize::try_from(self.size.z).ok()?;
        let z = index.checked_rem(sz)?;
        let rest = index.checked_div(sz)?;
        let y = rest.checked_rem(sy)?;
        let x = rest.checked_div(sy)?;
        Some(Vec3::new(
            i32::try_from(x).ok()?,
            i32::try_from(y).ok()?,
            i32::try_from(z).ok()?,
        ))
    }

    /// The cell at `pos`.
    pub fn cell(&self, pos: Vec3) -> Option<&Cell> {
        self.cells.get(self.index_of(pos)?)
    }

    /// The cell at linear index `index`.
    pub fn cell_at_index(&self, index: usize) -> Option<&Cell> {
        self.cells.get(index)
    }

    /// Kind of the cell at `pos`.
    pub fn kind_at(&self, pos: Vec3) -> Option<EtherKind> {
        self.cell(pos).map(Cell::kind)
    }

    /// Body color of the cell at `pos`.
    pub fn color_at(&self, pos: Vec3) -> Option<Rgba> {
        self.cell(pos).map(Cell::color)
    }

    /// Install a kind and color at `pos` and empty both photon banks.
    pub fn init_cell(&self, pos: Vec3, kind: EtherKind, color: Rgba) -> Result<(), EtherError> {
        let cell = self.cell(pos).ok_or(EtherError::OutOfBounds {
            position: pos,
            size: self.size,
        })?;
        cell.reset(kind, color);
        Ok(())
    }

    /// Install a kind and color at `pos`, keeping any photons in transit.
    pub fn retype_cell(&self, pos: Vec3, kind: EtherKind, color: Rgba) -> Result<(), EtherError> {
        let cell = self.cell(pos).ok_or(EtherError::OutOfBounds {
            position: pos,
            size: self.size,
        })?;
        cell.retype(kind, color);
        Ok(())
    }

    /// Write a photon straight into a slot, bypassing propagation.
    ///
    /// Used to seed scenarios; returns `false` for a bad position or slot.
    pub fn place_photon(&self, pos: Vec3, bank: Bank, slot: usize, photon: &Photon) -> bool {
        match self.cell(pos).and_then(|c| c.slot(bank, slot)) {
            Some(s) => {
                s.store(photon);
                true
            }
            None => false,
        }
    }

    /// Remove and return every photon in `bank` of the cell at `pos`.
    pub fn take_photons(&self, pos: Vec3, bank: Bank) -> Vec<Photon> {
        self.cell(pos)
            .map(|cell| cell.bank(bank).iter().filter_map(|s| s.take()).collect())
            .unwrap_or_default()
    }

    /// All live photons of `bank` as `(cell index, slot, photon)`, in
    /// cell order.
    pub fn photon_snapshot(&self, bank: Bank) -> Vec<(usize, usize, Photon)> {
        self.cells
            .iter()
            .enumerate()
            .flat_map(|(index, cell)| {
                cell.bank(bank)
                    .iter()
                    .enumerate()
                    .filter_map(move |(slot, s)| s.load().map(|p| (index, slot, p)))
            })
            .collect()
    }

    /// Number of live photons in `bank` across the universe.
    pub fn live_photon_count(&self, bank: Bank) -> usize {
        self.cells.iter().map(|c| c.live_count(bank)).sum()
    }

    /// Iterate over every position in the universe in storage order.
    pub fn positions(&self) -> impl Iterator<Item = Vec3> + '_ {
        (0..self.cells.len()).filter_map(|i| self.position_of(i))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use daphnia_types::OrientationVector;

    use super::*;

    #[test]
    fn rejects_non_positive_size() {
        assert!(matches!(
            Ether::new(Vec3::new(0, 4, 4)),
            Err(EtherError::InvalidSize { .. })
        ));
    }

    #[test]
    fn index_and_position_are_inverse() {
        let ether = Ether::new(Vec3::new(3, 4, 5)).unwrap();
        for (i, pos) in ether.positions().enumerate() {
            assert_eq!(ether.index_of(pos), Some(i));
        }
        assert_eq!(ether.index_of(Vec3::new(1, 0, 0)), Some(20));
        assert_eq!(ether.index_of(Vec3::new(3, 0, 0)), None);
        assert_eq!(ether.index_of(Vec3::new(0, -1, 0)), None);
    }

    #[test]
    fn init_cell_out_of_bounds_is_an_error() {
        let ether = Ether::new(Vec3::splat(2)).unwrap();
        assert!(matches!(
            ether.init_cell(Vec3::new(2, 0, 0), EtherKind::Block, Rgba::gray(50)),
            Err(EtherError::OutOfBounds { .. })
        ));
        ether
            .init_cell(Vec3::new(1, 1, 1), EtherKind::Block, Rgba::gray(50))
            .unwrap();
        assert_eq!(ether.kind_at(Vec3::new(1, 1, 1)), Some(EtherKind::Block));
    }

    #[test]
    fn retype_keeps_photons_but_init_clears_them() {
        let ether = Ether::new(Vec3::splat(2)).unwrap();
        let photon = Photon::new(Rgba::RED, OrientationVector::new(1, 0, 0));
        assert!(ether.place_photon(Vec3::ZERO, Bank::Even, 2, &photon));
        ether
            .retype_cell(Vec3::ZERO, EtherKind::Observer, Rgba::WHITE)
            .unwrap();
        assert_eq!(ether.kind_at(Vec3::ZERO), Some(EtherKind::Observer));
        assert_eq!(ether.live_photon_count(Bank::Even), 1);
        ether.init_cell(Vec3::ZERO, EtherKind::Space, Rgba::TRANSPARENT).unwrap();
        assert_eq!(ether.live_photon_count(Bank::Even), 0);
    }

    #[test]
    fn take_photons_drains_the_bank() {
        let ether = Ether::new(Vec3::splat(2)).unwrap();
        let photon = Photon::new(Rgba::RED, OrientationVector::new(1, 0, 0));
        assert!(ether.place_photon(Vec3::ZERO, Bank::Odd, 0, &photon));
        assert!(ether.place_photon(Vec3::ZERO, Bank::Odd, 5, &photon));
        assert!(!ether.place_photon(Vec3::ZERO, Bank::Odd, 26, &photon));
        assert_eq!(ether.live_photon_count(Bank::Odd), 2);
        assert_eq!(ether.take_photons(Vec3::ZERO, Bank::Odd).len(), 2);
        assert_eq!(ether.live_photon_count(Bank::Odd), 0);
    }
}
