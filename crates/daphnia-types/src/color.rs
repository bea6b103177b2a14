//! RGBA8 colors.
//!
//! Cells carry a body color; photons carry a color whose alpha channel is
//! the photon's remaining energy. A photon with alpha zero does not exist,
//! which lets a packed `u32` double as an "empty slot" marker.

use serde::{Deserialize, Serialize};

/// An 8-bit-per-channel RGBA color.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel; for photons, the remaining energy.
    pub a: u8,
}

impl Rgba {
    /// Fully transparent black (an empty photon slot).
    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    /// Opaque black.
    pub const BLACK: Self = Self::new(0, 0, 0, 255);
    /// Opaque red.
    pub const RED: Self = Self::new(255, 0, 0, 255);
    /// Opaque green.
    pub const GREEN: Self = Self::new(0, 255, 0, 255);
    /// Opaque blue.
    pub const BLUE: Self = Self::new(0, 0, 255, 255);
    /// Opaque yellow.
    pub const YELLOW: Self = Self::new(255, 255, 0, 255);
    /// Opaque white.
    pub const WHITE: Self = Self::new(255, 255, 255, 255);

    /// Colors a freshly loaded crumb may take.
    pub const CRUMB_PALETTE: [Self; 4] = [Self::RED, Self::GREEN, Self::BLUE, Self::YELLOW];

    /// Create a color from its channels.
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// An opaque gray with all color channels set to `level`.
    pub const fn gray(level: u8) -> Self {
        Self::new(level, level, level, 255)
    }

    /// Pack into a `u32` as `0xAABBGGRR`.
    pub const fn pack(self) -> u32 {
        u32::from_le_bytes([self.r, self.g, self.b, self.a])
    }

    /// Unpack a value produced by [`Self::pack`].
    pub const fn unpack(value: u32) -> Self {
        let [r, g, b, a] = value.to_le_bytes();
        Self::new(r, g, b, a)
    }

    /// Return a copy with the alpha channel replaced.
    #[must_use]
    pub const fn with_alpha(self, a: u8) -> Self {
        Self::new(self.r, self.g, self.b, a)
    }

    /// Whether the color is fully transparent (alpha zero).
    pub const fn is_transparent(self) -> bool {
        self.a == 0
    }
}
