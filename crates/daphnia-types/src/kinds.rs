//! Closed enumerations for cell and observer kinds.

use serde::{Deserialize, Serialize};

use crate::color::Rgba;

/// The kind of material occupying a cell.
///
/// The byte values are the persisted universe format and must not change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EtherKind {
    /// Empty space; photons pass through.
    #[default]
    Space = 0,
    /// An edible crumb.
    Crumb = 1,
    /// A solid block.
    Block = 2,
    /// The voxel occupied by an observer.
    Observer = 3,
}

impl EtherKind {
    /// Decode a persisted byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Space),
            1 => Some(Self::Crumb),
            2 => Some(Self::Block),
            3 => Some(Self::Observer),
            _ => None,
        }
    }

    /// Encode as a persisted byte.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Whether a photon entering a cell of this kind bounces back.
    pub const fn reflects_photons(self) -> bool {
        matches!(self, Self::Crumb | Self::Block | Self::Observer)
    }

    /// Whether an observer may move into a cell of this kind.
    pub const fn is_passable(self) -> bool {
        matches!(self, Self::Space | Self::Crumb)
    }

    /// Color a photon takes after touching a cell of this kind.
    ///
    /// Reflective cells paint the photon with their own color, keeping the
    /// photon's energy. Space leaves the photon untouched.
    pub const fn reflected_color(self, cell_color: Rgba, photon: Rgba) -> Rgba {
        if self.reflects_photons() {
            cell_color.with_alpha(photon.a)
        } else {
            photon
        }
    }
}

impl core::fmt::Display for EtherKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Space => "space",
            Self::Crumb => "crumb",
            Self::Block => "block",
            Self::Observer => "observer",
        };
        f.write_str(name)
    }
}

/// Body size of an observer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum ObserverKind {
    /// Occupies a single voxel.
    #[default]
    Small = 0,
    /// Reserves a 3x3x3 footprint centered on its position.
    Big = 1,
}

impl ObserverKind {
    /// Decode the handshake's observer-type byte.
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Small),
            1 => Some(Self::Big),
            _ => None,
        }
    }

    /// Encode as the handshake's observer-type byte.
    pub const fn as_byte(self) -> u8 {
        self as u8
    }

    /// Chebyshev radius of the body footprint.
    pub const fn radius(self) -> u32 {
        match self {
            Self::Small => 0,
            Self::Big => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn byte_roundtrip_and_reject_unknown() {
        for kind in [
            EtherKind::Space,
            EtherKind::Crumb,
            EtherKind::Block,
            EtherKind::Observer,
        ] {
            assert_eq!(EtherKind::from_byte(kind.as_byte()), Some(kind));
        }
        assert_eq!(EtherKind::from_byte(4), None);
        assert_eq!(ObserverKind::from_byte(9), None);
    }

    #[test]
    fn only_solid_kinds_reflect() {
        assert!(!EtherKind::Space.reflects_photons());
        assert!(EtherKind::Crumb.reflects_photons());
        assert!(EtherKind::Block.reflects_photons());
        assert!(EtherKind::Observer.reflects_photons());
    }

    #[test]
    fn reflected_color_keeps_photon_energy() {
        let photon = Rgba::WHITE.with_alpha(90);
        let out = EtherKind::Block.reflected_color(Rgba::gray(50), photon);
        assert_eq!(out, Rgba::new(50, 50, 50, 90));
        assert_eq!(EtherKind::Space.reflected_color(Rgba::gray(50), photon), photon);
    }
}
