//! The observer table.
//!
//! A fixed number of slots, one per attachable client. Slots are engine
//! identities used to tag photons; the wire-visible identity is the
//! observer's [`SessionToken`], which is looked up here.

use daphnia_ether::EtherError;
use daphnia_observer::{Observer, ObserverError, ObserverSummary};
use daphnia_types::{ObserverSlot, SessionToken, Vec3};

/// Errors that can occur while attaching a new observer.
#[derive(Debug, thiserror::Error)]
pub enum SpawnError {
    /// Every observer slot is taken.
    #[error("observer capacity of {capacity} reached")]
    CapacityExceeded {
        /// Configured maximum number of observers.
        capacity: usize,
    },

    /// No free cell was found.
    #[error("no free cell found after {attempts} attempts")]
    NoFreeCell {
        /// Number of random positions tried.
        attempts: u32,
    },

    /// The observer could not be built.
    #[error("observer error: {source}")]
    Observer {
        /// The underlying observer error.
        #[from]
        source: ObserverError,
    },

    /// The grid rejected the observer's cell.
    #[error("ether error: {source}")]
    Ether {
        /// The underlying grid error.
        #[from]
        source: EtherError,
    },
}

/// A freshly attached observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpawnedObserver {
    /// Engine slot.
    pub slot: ObserverSlot,
    /// Wire-visible id.
    pub token: SessionToken,
    /// Starting cell.
    pub position: Vec3,
}

/// Fixed-capacity storage for attached observers.
#[derive(Debug, Default)]
pub struct ObserverTable {
    slots: Vec<Option<Observer>>,
}

impl ObserverTable {
    /// An empty table with `capacity` slots.
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
        }
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of attached observers.
    pub fn len(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Whether no observer is attached.
    pub fn is_empty(&self) -> bool {
        self.slots.iter().all(Option::is_none)
    }

    /// First unused slot.
    pub fn free_slot(&self) -> Option<ObserverSlot> {
        let index = self.slots.iter().position(Option::is_none)?;
        u32::try_from(index).ok().map(ObserverSlot)
    }

    /// Put `observer` into its slot. Returns `false` if the slot is taken.
    #[must_use]
    pub fn insert(&mut self, observer: Observer) -> bool {
        match self.slots.get_mut(observer.slot().index()) {
            Some(entry @ None) => {
                *entry = Some(observer);
                true
            }
            _ => false,
        }
    }

    /// Detach the observer in `slot`.
    pub fn remove(&mut self, slot: ObserverSlot) -> Option<Observer> {
        self.slots.get_mut(slot.index())?.take()
    }

    /// Observer in `slot`.
    pub fn get(&self, slot: ObserverSlot) -> Option<&Observer> {
        self.slots.get(slot.index())?.as_ref()
    }

    /// Mutable observer in `slot`.
    pub fn get_mut(&mut self, slot: ObserverSlot) -> Option<&mut Observer> {
        self.slots.get_mut(slot.index())?.as_mut()
    }

    /// Observer whose session token is `token`.
    pub fn by_token(&self, token: SessionToken) -> Option<&Observer> {
        self.iter().find(|obs| obs.token() == token)
    }

    /// Mutable observer whose session token is `token`.
    pub fn by_token_mut(&mut self, token: SessionToken) -> Option<&mut Observer> {
        self.iter_mut().find(|obs| obs.token() == token)
    }

    /// Whether any observer holds `token`.
    pub fn token_in_use(&self, token: SessionToken) -> bool {
        self.by_token(token).is_some()
    }

    /// Attached observers in slot order.
    pub fn iter(&self) -> impl Iterator<Item = &Observer> {
        self.slots.iter().flatten()
    }

    /// Mutable attached observers in slot order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Observer> {
        self.slots.iter_mut().flatten()
    }

    /// Slots of attached observers.
    pub fn occupied_slots(&self) -> Vec<ObserverSlot> {
        self.iter().map(Observer::slot).collect()
    }

    /// Admin listing of every attached observer.
    pub fn summaries(&self) -> Vec<ObserverSummary> {
        self.iter().map(Observer::summary).collect()
    }

    /// Whether a body of `radius` at `position` would touch an observer
    /// other than `except`.
    pub fn crowds(&self, position: Vec3, radius: u32, except: Option<ObserverSlot>) -> Option<SessionToken> {
        self.iter()
            .filter(|obs| Some(obs.slot()) != except)
            .find(|obs| {
                position.chebyshev_distance(obs.position())
                    <= radius.saturating_add(obs.kind().radius())
            })
            .map(Observer::token)
    }
}
