//! The compound eye.
//!
//! An observer sees through an `eye_size x eye_size` grid of directions
//! spread over a fixed field of view around its facing. Each pixel's
//! direction is a latitude/longitude offset from the facing:
//!
//! - rows sweep latitude from `-FOV/2` to `+FOV/2`, columns sweep longitude;
//! - a sample that runs over a pole is folded back onto the opposite
//!   meridian;
//! - latitude is pulled toward the equator in proportion to the longitude
//!   offset, which evens out sampling density near the poles.
//!
//! The eye also yields the "orient changers" the partitioner uses: an axis
//! on which every pixel looks the same way cannot receive photons from
//! behind the observer, so the simulated region need not extend there.

use daphnia_types::{OrientationVector, Vec3};

use crate::error::ObserverError;

/// Field of view in degrees along each eye axis.
pub const EYE_FOV: i32 = 120;

/// Largest supported eye resolution.
pub const MAX_EYE_SIZE: u8 = 16;

/// Unit direction for a latitude/longitude pair in degrees, quantized.
pub fn facing(latitude: i16, longitude: i16) -> OrientationVector {
    let lat = f32::from(latitude).to_radians();
    let lon = f32::from(longitude).to_radians();
    OrientationVector::maximize(lat.cos() * lon.cos(), lat.cos() * lon.sin(), lat.sin())
}

/// Wrap a longitude into `-179..=180`.
pub const fn wrap_longitude(longitude: i32) -> i32 {
    if longitude < -179 {
        longitude.saturating_add(360)
    } else if longitude > 180 {
        longitude.saturating_sub(360)
    } else {
        longitude
    }
}

/// Sampled directions of one eye.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Eye {
    size: u8,
    directions: Vec<OrientationVector>,
    min_changer: Vec3,
    max_changer: Vec3,
}

impl Eye {
    /// Sample an eye of `size` pixels per side facing `(latitude, longitude)`.
    pub fn new(size: u8, latitude: i16, longitude: i16) -> Result<Self, ObserverError> {
        if size == 0 || size > MAX_EYE_SIZE {
            return Err(ObserverError::InvalidEyeSize {
                eye_size: size,
                max: MAX_EYE_SIZE,
            });
        }
        let mut eye = Self {
            size,
            directions: Vec::with_capacity(usize::from(size).saturating_mul(usize::from(size))),
            min_changer: Vec3::ZERO,
            max_changer: Vec3::ZERO,
        };
        eye.recompute(latitude, longitude);
        Ok(eye)
    }

    /// Pixels per side.
    pub const fn size(&self) -> u8 {
        self.size
    }

    /// Resample for a new facing.
    pub fn recompute(&mut self, latitude: i16, longitude: i16) {
        let size = i32::from(self.size);
        self.directions.clear();
        for y in 0..size {
            for x in 0..size {
                self.directions
                    .push(pixel_direction(latitude, longitude, x, y, size));
            }
        }
        let (min, max) = orient_changers(&self.directions);
        self.min_changer = min;
        self.max_changer = max;
    }

    /// Direction of pixel `(x, y)`.
    pub fn direction(&self, x: u8, y: u8) -> Option<OrientationVector> {
        if x >= self.size || y >= self.size {
            return None;
        }
        let index = usize::from(y)
            .checked_mul(usize::from(self.size))?
            .checked_add(usize::from(x))?;
        self.directions.get(index).copied()
    }

    /// All pixel directions, row-major.
    pub fn directions(&self) -> &[OrientationVector] {
        &self.directions
    }

    /// Per-axis reach of the visible volume below the observer (0 or `i32::MAX`).
    pub const fn min_changer(&self) -> Vec3 {
        self.min_changer
    }

    /// Per-axis reach of the visible volume above the observer (0 or `i32::MAX`).
    pub const fn max_changer(&self) -> Vec3 {
        self.max_changer
    }
}

// Inputs are bounded: |latitude| <= 90, longitude in -179..=180,
// 0 <= x, y < size <= 16, so every intermediate fits easily in i32.
#[allow(clippy::arithmetic_side_effects, clippy::cast_possible_truncation)]
fn pixel_direction(latitude: i16, longitude: i16, x: i32, y: i32, size: i32) -> OrientationVector {
    let mut lat = i32::from(latitude) + EYE_FOV * y / size - EYE_FOV / 2;
    let shift = EYE_FOV * x / size - EYE_FOV / 2;
    let lon = if lat < -90 || lat > 90 {
        lat = lat.signum() * 180 - lat;
        let mirrored = wrap_longitude(i32::from(longitude) - shift) - 180;
        if mirrored < -179 { mirrored + 360 } else { mirrored }
    } else {
        wrap_longitude(i32::from(longitude) + shift)
    };

    let lat16 = i16::try_from(lat).unwrap_or_default();
    let compress = (f32::from(i16::try_from(shift.abs()).unwrap_or_default())
        * f32::from(lat16).to_radians().sin()) as i32;
    lat -= compress;

    facing(
        i16::try_from(lat).unwrap_or_default(),
        i16::try_from(lon).unwrap_or_default(),
    )
}

fn orient_changers(directions: &[OrientationVector]) -> (Vec3, Vec3) {
    let reach = |all_same_side: bool| if all_same_side { 0 } else { i32::MAX };
    let axis = |component: fn(&OrientationVector) -> i32| {
        let nonneg = directions.iter().all(|d| component(d) >= 0);
        let nonpos = directions.iter().all(|d| component(d) <= 0);
        (reach(nonneg), reach(nonpos))
    };
    let (min_x, max_x) = axis(|d| d.x);
    let (min_y, max_y) = axis(|d| d.y);
    let (min_z, max_z) = axis(|d| d.z);
    (Vec3::new(min_x, min_y, min_z), Vec3::new(max_x, max_y, max_z))
}
