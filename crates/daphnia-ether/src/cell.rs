//! Cells and their double-buffered photon banks.
//!
//! A cell holds a kind, a body color, and two banks of 26 photon slots.
//! During tick `T` the bank selected by `T mod 2` is current (read and
//! cleared by the worker that owns the cell) and the other bank is next
//! (written by emissions). Every field is an atomic so the grid can be
//! shared between threads without locks; the tick barrier provides the
//! happens-before edge between one tick's writes and the next tick's
//! reads, so the slot fields themselves use relaxed ordering.

use std::sync::atomic::{AtomicI32, AtomicU8, AtomicU32, Ordering};

use daphnia_types::{EtherKind, ObserverSlot, OrientationVector, Rgba};
use serde::{Deserialize, Serialize};

use crate::direction::SLOT_COUNT;

/// Which of the two photon banks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Bank {
    /// Current on even ticks.
    Even,
    /// Current on odd ticks.
    Odd,
}

impl Bank {
    /// The bank read during `tick`.
    pub const fn current(tick: u64) -> Self {
        if tick & 1 == 0 { Self::Even } else { Self::Odd }
    }

    /// The bank written during `tick`.
    pub const fn next(tick: u64) -> Self {
        Self::current(tick).other()
    }

    /// The opposite bank.
    pub const fn other(self) -> Self {
        match self {
            Self::Even => Self::Odd,
            Self::Odd => Self::Even,
        }
    }
}

/// A photon in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Photon {
    /// Color; alpha is the remaining energy.
    pub color: Rgba,
    /// Direction of travel.
    pub direction: OrientationVector,
    /// Observer that emitted it, if any.
    pub origin: Option<ObserverSlot>,
    /// Emitter-defined payload; eye pixel index for echolocation.
    pub param: u32,
}

impl Photon {
    /// A fresh photon with no origin.
    pub const fn new(color: Rgba, direction: OrientationVector) -> Self {
        Self {
            color,
            direction,
            origin: None,
            param: 0,
        }
    }

    /// Tag the photon with its emitting observer and payload.
    #[must_use]
    pub const fn from_observer(mut self, origin: ObserverSlot, param: u32) -> Self {
        self.origin = Some(origin);
        self.param = param;
        self
    }

    /// Whether the photon carries any energy.
    pub const fn is_live(&self) -> bool {
        !self.color.is_transparent()
    }
}

/// One directional slot: an atomic rendition of [`Photon`].
///
/// A packed color with alpha zero marks the slot empty.
#[derive(Debug, Default)]
pub struct PhotonSlot {
    color: AtomicU32,
    direction: [AtomicI32; 3],
    origin: AtomicU32,
    param: AtomicU32,
}

impl PhotonSlot {
    /// Whether the slot holds a live photon.
    pub fn is_live(&self) -> bool {
        !Rgba::unpack(self.color.load(Ordering::Relaxed)).is_transparent()
    }

    /// Read the photon without clearing it.
    pub fn load(&self) -> Option<Photon> {
        let color = Rgba::unpack(self.color.load(Ordering::Relaxed));
        if color.is_transparent() {
            return None;
        }
        let [x, y, z] = &self.direction;
        Some(Photon {
            color,
            direction: OrientationVector::new(
                x.load(Ordering::Relaxed),
                y.load(Ordering::Relaxed),
                z.load(Ordering::Relaxed),
            ),
            origin: ObserverSlot::from_origin_tag(self.origin.load(Ordering::Relaxed)),
            param: self.param.load(Ordering::Relaxed),
        })
    }

    /// Read the photon and empty the slot.
    pub fn take(&self) -> Option<Photon> {
        let photon = self.load()?;
        self.clear();
        Some(photon)
    }

    /// Overwrite the slot.
    pub fn store(&self, photon: &Photon) {
        let [x, y, z] = &self.direction;
        x.store(photon.direction.x, Ordering::Relaxed);
        y.store(photon.direction.y, Ordering::Relaxed);
        z.store(photon.direction.z, Ordering::Relaxed);
        self.origin.store(
            photon.origin.map_or(0, ObserverSlot::origin_tag),
            Ordering::Relaxed,
        );
        self.param.store(photon.param, Ordering::Relaxed);
        self.color.store(photon.color.pack(), Ordering::Relaxed);
    }

    /// Empty the slot.
    pub fn clear(&self) {
        self.color.store(Rgba::TRANSPARENT.pack(), Ordering::Relaxed);
    }
}

/// One voxel of the universe.
#[derive(Debug)]
pub struct Cell {
    kind: AtomicU8,
    color: AtomicU32,
    even: [PhotonSlot; SLOT_COUNT],
    odd: [PhotonSlot; SLOT_COUNT],
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            kind: AtomicU8::new(EtherKind::Space.as_byte()),
            color: AtomicU32::new(Rgba::TRANSPARENT.pack()),
            even: std::array::from_fn(|_| PhotonSlot::default()),
            odd: std::array::from_fn(|_| PhotonSlot::default()),
        }
    }
}

impl Cell {
    /// Cell kind.
    pub fn kind(&self) -> EtherKind {
        EtherKind::from_byte(self.kind.load(Ordering::Relaxed)).unwrap_or_default()
    }

    /// Body color.
    pub fn color(&self) -> Rgba {
        Rgba::unpack(self.color.load(Ordering::Relaxed))
    }

    /// The 26 slots of `bank`.
    pub const fn bank(&self, bank: Bank) -> &[PhotonSlot; SLOT_COUNT] {
        match bank {
            Bank::Even => &self.even,
            Bank::Odd => &self.odd,
        }
    }

    /// One slot of `bank`, or `None` for an index outside `0..26`.
    pub fn slot(&self, bank: Bank, index: usize) -> Option<&PhotonSlot> {
        self.bank(bank).get(index)
    }

    /// Install a kind and color and empty both banks.
    pub fn reset(&self, kind: EtherKind, color: Rgba) {
        self.kind.store(kind.as_byte(), Ordering::Relaxed);
        self.color.store(color.pack(), Ordering::Relaxed);
        for slot in self.even.iter().chain(self.odd.iter()) {
            slot.clear();
        }
    }

    /// Change kind and color, leaving both banks untouched.
    pub fn retype(&self, kind: EtherKind, color: Rgba) {
        self.kind.store(kind.as_byte(), Ordering::Relaxed);
        self.color.store(color.pack(), Ordering::Relaxed);
    }

    /// Number of live photons in `bank`.
    pub fn live_count(&self, bank: Bank) -> usize {
        self.bank(bank).iter().filter(|s| s.is_live()).count()
    }
}
