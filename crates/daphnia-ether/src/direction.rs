//! Lattice stepping and the 26 directional photon slots.
//!
//! A photon's continuous direction is turned into a unit step on the
//! lattice by drawing one uniform number per axis: the axis moves by the
//! sign of its component when the component's magnitude is at least the
//! draw. Over many steps the walk converges to the input direction.
//!
//! The step vector also names the slot the photon lands in at its
//! destination, so a destination slot has exactly one possible source
//! cell. This is what lets worker threads write the next bank without
//! coordination.

use daphnia_types::{OrientationVector, Vec3};
use rand::Rng;

/// Number of directional slots per bank.
pub const SLOT_COUNT: usize = 26;

/// Index of the excluded zero vector in the raw `3^3` enumeration.
const ZERO_RAW_INDEX: u32 = 13;

/// Map a unit step in `{-1, 0, 1}^3 \ {0}` to its slot index in `0..26`.
///
/// Returns `None` for the zero vector and for components outside `-1..=1`.
pub fn photon_slot_index(step: Vec3) -> Option<usize> {
    let digit = |c: i32| -> Option<u32> {
        match c {
            -1 => Some(0),
            0 => Some(1),
            1 => Some(2),
            _ => None,
        }
    };
    let raw = digit(step.x)?
        .checked_mul(9)?
        .checked_add(digit(step.y)?.checked_mul(3)?)?
        .checked_add(digit(step.z)?)?;
    let index = match raw {
        ZERO_RAW_INDEX => return None,
        r if r > ZERO_RAW_INDEX => r.checked_sub(1)?,
        r => r,
    };
    usize::try_from(index).ok()
}

/// Inverse of [`photon_slot_index`].
pub fn unit_vector_from_index(index: usize) -> Option<Vec3> {
    let index = u32::try_from(index).ok()?;
    if index >= 26 {
        return None;
    }
    let raw = if index >= ZERO_RAW_INDEX {
        index.checked_add(1)?
    } else {
        index
    };
    let component = |digit: u32| -> Option<i32> { i32::try_from(digit).ok()?.checked_sub(1) };
    Some(Vec3::new(
        component(raw.checked_div(9)?)?,
        component(raw.checked_div(3)?.checked_rem(3)?)?,
        component(raw.checked_rem(3)?)?,
    ))
}

/// Draw one quantized lattice step along `direction`.
///
/// Each axis is evaluated independently, so the result may be the zero
/// vector when every draw exceeds its component.
pub fn quantized_step<R: Rng + ?Sized>(direction: OrientationVector, rng: &mut R) -> Vec3 {
    let mut axis = |component: i32| -> i32 {
        let draw = rng.random_range(0..=OrientationVector::MAX.unsigned_abs());
        if component.unsigned_abs() >= draw {
            component.signum()
        } else {
            0
        }
    };
    let x = axis(direction.x);
    let y = axis(direction.y);
    let z = axis(direction.z);
    Vec3::new(x, y, z)
}
