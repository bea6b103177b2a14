//! Integer lattice geometry for the voxel universe.
//!
//! Everything in the simulation lives on an integer lattice: cell
//! positions, unit steps between neighboring cells, and the half-open
//! boxes handed to worker threads. Continuous directions only exist at
//! the edge, where an observer's latitude/longitude is turned into an
//! [`OrientationVector`] whose components span the full `i32` range.
//!
//! All arithmetic on [`Vec3`] saturates so that a corrupt coordinate can
//! never wrap around into a valid cell index.

use serde::{Deserialize, Serialize};

/// One of the three lattice axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Axis {
    /// The X axis (worker partitions are sliced along it).
    X,
    /// The Y axis.
    Y,
    /// The Z axis.
    Z,
}

impl Axis {
    /// All axes in X, Y, Z order.
    pub const ALL: [Self; 3] = [Self::X, Self::Y, Self::Z];
}

/// An integer 3D vector used for cell positions, sizes, and unit steps.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Vec3 {
    /// X component.
    pub x: i32,
    /// Y component.
    pub y: i32,
    /// Z component.
    pub z: i32,
}

impl Vec3 {
    /// The zero vector.
    pub const ZERO: Self = Self::new(0, 0, 0);

    /// The `(1, 1, 1)` vector.
    pub const ONE: Self = Self::new(1, 1, 1);

    /// Create a vector from its components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Create a vector with every component set to `value`.
    pub const fn splat(value: i32) -> Self {
        Self::new(value, value, value)
    }

    /// Return the component along `axis`.
    pub const fn get(self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// Return a copy with the component along `axis` replaced.
    #[must_use]
    pub const fn with(self, axis: Axis, value: i32) -> Self {
        match axis {
            Axis::X => Self::new(value, self.y, self.z),
            Axis::Y => Self::new(self.x, value, self.z),
            Axis::Z => Self::new(self.x, self.y, value),
        }
    }

    /// Component-wise saturating addition.
    #[must_use]
    pub const fn saturating_add(self, other: Self) -> Self {
        Self::new(
            self.x.saturating_add(other.x),
            self.y.saturating_add(other.y),
            self.z.saturating_add(other.z),
        )
    }

    /// Component-wise saturating subtraction.
    #[must_use]
    pub const fn saturating_sub(self, other: Self) -> Self {
        Self::new(
            self.x.saturating_sub(other.x),
            self.y.saturating_sub(other.y),
            self.z.saturating_sub(other.z),
        )
    }

    /// Component-wise saturating multiplication by a scalar.
    #[must_use]
    pub const fn saturating_scale(self, factor: i32) -> Self {
        Self::new(
            self.x.saturating_mul(factor),
            self.y.saturating_mul(factor),
            self.z.saturating_mul(factor),
        )
    }

    /// Component-wise checked multiplication by a scalar.
    pub const fn checked_scale(self, factor: i32) -> Option<Self> {
        let Some(x) = self.x.checked_mul(factor) else {
            return None;
        };
        let Some(y) = self.y.checked_mul(factor) else {
            return None;
        };
        let Some(z) = self.z.checked_mul(factor) else {
            return None;
        };
        Some(Self::new(x, y, z))
    }

    /// Component-wise minimum.
    #[must_use]
    pub fn min_each(self, other: Self) -> Self {
        Self::new(self.x.min(other.x), self.y.min(other.y), self.z.min(other.z))
    }

    /// Component-wise maximum.
    #[must_use]
    pub fn max_each(self, other: Self) -> Self {
        Self::new(self.x.max(other.x), self.y.max(other.y), self.z.max(other.z))
    }

    /// Clamp every component into `[0, limit]` of the matching component.
    #[must_use]
    pub fn clamp_to(self, limit: Self) -> Self {
        self.max_each(Self::ZERO).min_each(limit)
    }

    /// Component-wise sign (`-1`, `0`, or `1`).
    #[must_use]
    pub const fn signum(self) -> Self {
        Self::new(self.x.signum(), self.y.signum(), self.z.signum())
    }

    /// Component-wise saturating negation.
    #[must_use]
    pub const fn saturating_neg(self) -> Self {
        Self::new(
            self.x.saturating_neg(),
            self.y.saturating_neg(),
            self.z.saturating_neg(),
        )
    }

    /// Chebyshev (king-move) distance between two positions.
    pub const fn chebyshev_distance(self, other: Self) -> u32 {
        let dx = self.x.abs_diff(other.x);
        let dy = self.y.abs_diff(other.y);
        let dz = self.z.abs_diff(other.z);
        let xy = if dx > dy { dx } else { dy };
        if xy > dz { xy } else { dz }
    }

    /// Whether every component is strictly positive.
    pub const fn is_positive(self) -> bool {
        self.x > 0 && self.y > 0 && self.z > 0
    }

    /// Product of the three components, or `None` if any is negative or the
    /// product overflows `usize`.
    pub fn volume(self) -> Option<usize> {
        let x = usize::try_from(self.x).ok()?;
        let y = usize::try_from(self.y).ok()?;
        let z = usize::try_from(self.z).ok()?;
        x.checked_mul(y)?.checked_mul(z)
    }
}

impl core::fmt::Display for Vec3 {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// A continuous unit direction discretized onto the full `i32` range.
///
/// The largest-magnitude component is pushed to the extreme of the range
/// (`i32::MAX` or its negative) and the others are scaled by the same
/// factor. Comparing a component's magnitude against a uniform draw in
/// `[0, i32::MAX]` therefore gives the probability of stepping along that
/// axis, which is how photons and observers walk the lattice.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct OrientationVector {
    /// X component.
    pub x: i32,
    /// Y component.
    pub y: i32,
    /// Z component.
    pub z: i32,
}

impl OrientationVector {
    /// The extreme component magnitude.
    pub const MAX: i32 = i32::MAX;

    /// Create an orientation from raw components.
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    /// Quantize a floating-point direction.
    ///
    /// The vector is scaled so that its largest-magnitude component reaches
    /// [`Self::MAX`]; each scaled component is rounded half away from zero.
    /// A zero input yields the zero orientation.
    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    pub fn maximize(x: f32, y: f32, z: f32) -> Self {
        let max_component = x.abs().max(y.abs()).max(z.abs());
        let factor = if max_component > 0.0 {
            Self::MAX as f32 / max_component
        } else {
            0.0
        };
        // Float-to-int `as` casts saturate, which pins the dominant axis to
        // the extreme even when `MAX as f32` rounds up.
        let round = |value: f32| -> i32 {
            let scaled = value * factor;
            if scaled < 0.0 {
                (scaled - 0.5) as i32
            } else {
                (scaled + 0.5) as i32
            }
        };
        Self::new(round(x), round(y), round(z))
    }

    /// Return the component along `axis`.
    pub const fn get(self, axis: Axis) -> i32 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
            Axis::Z => self.z,
        }
    }

    /// The reversed direction (used when a photon reflects).
    #[must_use]
    pub const fn inverted(self) -> Self {
        Self::new(
            self.x.saturating_neg(),
            self.y.saturating_neg(),
            self.z.saturating_neg(),
        )
    }

    /// Whether all components are zero.
    pub const fn is_zero(self) -> bool {
        self.x == 0 && self.y == 0 && self.z == 0
    }
}

/// A half-open integer box `[min, max)` assigned to one worker thread.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SimulationBox {
    /// Inclusive lower corner.
    pub min: Vec3,
    /// Exclusive upper corner.
    pub max: Vec3,
}

impl SimulationBox {
    /// An empty box that simulates nothing.
    pub const EMPTY: Self = Self {
        min: Vec3::ZERO,
        max: Vec3::ZERO,
    };

    /// Create a box from its corners.
    pub const fn new(min: Vec3, max: Vec3) -> Self {
        Self { min, max }
    }

    /// A box covering a whole universe of the given size.
    pub const fn covering(size: Vec3) -> Self {
        Self::new(Vec3::ZERO, size)
    }

    /// Whether the box contains no cells.
    pub const fn is_empty(&self) -> bool {
        self.max.x <= self.min.x || self.max.y <= self.min.y || self.max.z <= self.min.z
    }

    /// Whether `pos` lies inside the box.
    pub const fn contains(&self, pos: Vec3) -> bool {
        pos.x >= self.min.x
            && pos.y >= self.min.y
            && pos.z >= self.min.z
            && pos.x < self.max.x
            && pos.y < self.max.y
            && pos.z < self.max.z
    }

    /// Number of cells in the box (0 for an empty box).
    pub fn cell_count(&self) -> usize {
        if self.is_empty() {
            return 0;
        }
        self.max.saturating_sub(self.min).volume().unwrap_or(0)
    }

    /// Smallest box containing both `self` and `other`.
    ///
    /// An empty operand is ignored.
    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Self::new(self.min.min_each(other.min), self.max.max_each(other.max))
    }
}
