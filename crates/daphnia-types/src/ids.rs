//! Identifier newtypes.
//!
//! Two kinds of identity exist for an observer. The engine addresses
//! observers by [`ObserverSlot`], a dense index into the observer table
//! that photons carry as their origin tag. Clients only ever see a
//! [`SessionToken`], a random 64-bit handle generated at handshake time
//! and unrelated to memory addresses or slot numbers, so a reused slot can
//! never be reached through a stale client id.

use serde::{Deserialize, Serialize};

/// Generates an integer newtype with standard derives and conversions.
macro_rules! define_id {
    (
        $(#[$meta:meta])*
        $name:ident($inner:ty)
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub $inner);

        impl $name {
            /// Return the inner integer value.
            pub const fn into_inner(self) -> $inner {
                self.0
            }
        }

        impl core::fmt::Display for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<$inner> for $name {
            fn from(id: $inner) -> Self {
                Self(id)
            }
        }

        impl From<$name> for $inner {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

define_id! {
    /// Dense index of an observer in the engine's observer table.
    ObserverSlot(u32)
}

define_id! {
    /// Opaque wire-visible observer identifier. Zero means "rejected".
    SessionToken(u64)
}

impl ObserverSlot {
    /// Encode as a photon origin tag (`slot + 1`; zero means "no observer").
    pub const fn origin_tag(self) -> u32 {
        self.0.saturating_add(1)
    }

    /// Decode a photon origin tag produced by [`Self::origin_tag`].
    pub const fn from_origin_tag(tag: u32) -> Option<Self> {
        match tag.checked_sub(1) {
            Some(slot) => Some(Self(slot)),
            None => None,
        }
    }

    /// The slot as a table index.
    pub fn index(self) -> usize {
        usize::try_from(self.0).unwrap_or(usize::MAX)
    }
}

impl SessionToken {
    /// The token sent back to a client whose handshake was rejected.
    pub const REJECTED: Self = Self(0);

    /// Whether this token denotes a live session.
    pub const fn is_valid(self) -> bool {
        self.0 != 0
    }
}
