//! Rotation matrix derivation from gravity and geomagnetic vectors,
//! axis remapping for screen rotation, and Euler decomposition.
//!
//! World frame: X east, Y magnetic north, Z up. Matrices are row-major
//! and map device coordinates to world coordinates.

use crate::types::DisplayRotation;
use glam::Vec3;
use thiserror::Error;

pub const STANDARD_GRAVITY: f32 = 9.80665;

/// Gravity below 10% of g (squared) means the device is in free fall.
const FREE_FALL_GRAVITY_SQUARED: f32 = 0.01 * STANDARD_GRAVITY * STANDARD_GRAVITY;
/// |gravity x field| below this means the field is missing or parallel to gravity.
const MIN_EAST_NORM: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum FusionError {
    #[error("gravity vector too weak ({0:.3} m/s^2), device in free fall")]
    FreeFall(f32),
    #[error("geomagnetic field too weak or parallel to gravity")]
    DegenerateField,
    #[error("sensor vectors contain non-finite components")]
    NonFinite,
    #[error("axis remap uses the same axis twice")]
    InvalidRemap,
}

/// Device axis used as a remap target. Negative variants flip the sign.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Axis {
    X,
    Y,
    Z,
    MinusX,
    MinusY,
    MinusZ,
}

impl Axis {
    fn code(self) -> u8 {
        match self {
            Axis::X => 0x01,
            Axis::Y => 0x02,
            Axis::Z => 0x03,
            Axis::MinusX => 0x81,
            Axis::MinusY => 0x82,
            Axis::MinusZ => 0x83,
        }
    }
}

/// Remap targets that keep "up" on the current screen consistent while the
/// camera looks out of the back of the device.
pub fn remap_axes(rotation: DisplayRotation) -> (Axis, Axis) {
    match rotation {
        DisplayRotation::Rotation0 => (Axis::X, Axis::Z),
        DisplayRotation::Rotation90 => (Axis::MinusY, Axis::Z),
        DisplayRotation::Rotation180 => (Axis::MinusX, Axis::Z),
        DisplayRotation::Rotation270 => (Axis::Y, Axis::Z),
    }
}

/// Resolve the effective rotation. Some devices report 0 while held in
/// landscape; the sign of gravity along X tells which way it is turned.
pub fn effective_rotation(
    reported: DisplayRotation,
    gravity: Vec3,
    infer_landscape: bool,
    threshold: f32,
) -> DisplayRotation {
    if !infer_landscape || reported != DisplayRotation::Rotation0 {
        return reported;
    }
    if gravity.x < -threshold {
        DisplayRotation::Rotation90
    } else if gravity.x > threshold {
        DisplayRotation::Rotation270
    } else {
        DisplayRotation::Rotation0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RotationMatrix(pub [f32; 9]);

impl RotationMatrix {
    pub const IDENTITY: Self = Self([1.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0]);

    /// Build the device-to-world rotation from a gravity reading and a
    /// geomagnetic field reading, both in device coordinates.
    pub fn from_gravity_and_field(gravity: Vec3, field: Vec3) -> Result<Self, FusionError> {
        if !gravity.is_finite() || !field.is_finite() {
            return Err(FusionError::NonFinite);
        }
        let gravity_sq = gravity.length_squared();
        if gravity_sq < FREE_FALL_GRAVITY_SQUARED {
            return Err(FusionError::FreeFall(gravity_sq.sqrt()));
        }

        let east = field.cross(gravity);
        let east_norm = east.length();
        if east_norm < MIN_EAST_NORM {
            return Err(FusionError::DegenerateField);
        }
        let east = east / east_norm;
        let up = gravity / gravity_sq.sqrt();
        let north = up.cross(east);

        Ok(Self([
            east.x, east.y, east.z, //
            north.x, north.y, north.z, //
            up.x, up.y, up.z,
        ]))
    }

    /// Rotate the device frame so `x_axis` and `y_axis` of the result are
    /// the given device axes. Z completes a right-handed frame.
    pub fn remap(&self, x_axis: Axis, y_axis: Axis) -> Result<Self, FusionError> {
        let x_code = x_axis.code();
        let y_code = y_axis.code();
        if x_code & 0x03 == y_code & 0x03 {
            return Err(FusionError::InvalidRemap);
        }

        let mut z_code = x_code ^ y_code;
        let x = (x_code & 0x03) as usize - 1;
        let y = (y_code & 0x03) as usize - 1;
        let z = (z_code & 0x03) as usize - 1;

        // Flip Z when (x, y, z) is not a cyclic permutation.
        let cyclic_y = (z + 1) % 3;
        let cyclic_z = (z + 2) % 3;
        if (x ^ cyclic_y) | (y ^ cyclic_z) != 0 {
            z_code ^= 0x80;
        }

        let flip_x = x_code & 0x80 != 0;
        let flip_y = y_code & 0x80 != 0;
        let flip_z = z_code & 0x80 != 0;
        let signed = |flip: bool, v: f32| if flip { -v } else { v };

        let mut out = [0.0; 9];
        for row in 0..3 {
            let base = row * 3;
            let src = &self.0[base..base + 3];
            out[base + x] = signed(flip_x, src[0]);
            out[base + y] = signed(flip_y, src[1]);
            out[base + z] = signed(flip_z, src[2]);
        }
        Ok(Self(out))
    }

    /// Aeronautical decomposition in radians: (azimuth, pitch, roll).
    pub fn euler_angles(&self) -> (f32, f32, f32) {
        let m = &self.0;
        let azimuth = m[1].atan2(m[4]);
        let pitch = (-m[7]).clamp(-1.0, 1.0).asin();
        let roll = (-m[6]).atan2(m[8]);
        (azimuth, pitch, roll)
    }
}
