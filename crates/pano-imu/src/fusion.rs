use crate::math::{effective_rotation, remap_axes, FusionError, RotationMatrix};
use crate::types::{DisplayRotationSource, OrientationEstimate, RawSample, SensorKind};
use glam::Vec3;
use std::sync::Arc;

/// Heavy damping: each new reading moves the filter 6% of the way.
pub const DEFAULT_SMOOTHING_ALPHA: f32 = 0.06;

#[derive(Debug, Clone, Copy)]
pub struct FusionSettings {
    /// EMA coefficient shared by the vector stage and the angle stage.
    pub alpha: f32,
    /// Treat a 0° display as landscape when gravity points along X.
    pub infer_landscape_from_gravity: bool,
    /// |gravity.x| above which landscape is inferred (m/s^2).
    pub landscape_gravity_threshold: f32,
}

impl Default for FusionSettings {
    fn default() -> Self {
        Self {
            alpha: DEFAULT_SMOOTHING_ALPHA,
            infer_landscape_from_gravity: true,
            landscape_gravity_threshold: 4.5,
        }
    }
}

/// First-order exponential moving average over a 3-axis vector.
///
/// The first reading seeds the filter directly so it does not ramp up from zero.
#[derive(Debug, Clone, Copy, Default)]
pub struct SmoothedVector {
    value: Option<Vec3>,
}

impl SmoothedVector {
    pub fn blend(&mut self, raw: Vec3, alpha: f32) -> Vec3 {
        let next = match self.value {
            Some(smoothed) => smoothed + alpha * (raw - smoothed),
            None => raw,
        };
        self.value = Some(next);
        next
    }

    pub fn get(&self) -> Option<Vec3> {
        self.value
    }
}

/// Angle-stage EMA. Azimuth is blended along the short way around the circle.
#[derive(Debug, Clone, Copy, Default)]
struct SmoothedAngles {
    value: Option<OrientationEstimate>,
}

impl SmoothedAngles {
    fn blend(&mut self, raw: OrientationEstimate, alpha: f32) -> OrientationEstimate {
        let next = match self.value {
            None => OrientationEstimate {
                azimuth: normalize_degrees(raw.azimuth),
                ..raw
            },
            Some(prev) => {
                let mut azimuth = normalize_degrees(raw.azimuth);
                let diff = azimuth - prev.azimuth;
                if diff > 180.0 {
                    azimuth -= 360.0;
                } else if diff < -180.0 {
                    azimuth += 360.0;
                }
                OrientationEstimate {
                    azimuth: normalize_degrees(prev.azimuth + alpha * (azimuth - prev.azimuth)),
                    pitch: prev.pitch + alpha * (raw.pitch - prev.pitch),
                    roll: prev.roll + alpha * (raw.roll - prev.roll),
                }
            }
        };
        self.value = Some(next);
        next
    }
}

/// Wrap an angle in degrees into [0, 360).
pub fn normalize_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs.
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Fuses accelerometer and magnetometer readings into a jitter-resistant
/// orientation estimate.
///
/// Two smoothing stages run back to back: raw vectors are filtered before
/// the rotation matrix is derived, and the decomposed angles are filtered
/// again to suppress jitter from the nonlinear decomposition.
pub struct OrientationEstimator {
    settings: FusionSettings,
    rotation: Arc<dyn DisplayRotationSource>,
    accelerometer: SmoothedVector,
    magnetometer: SmoothedVector,
    gyroscope: SmoothedVector,
    angles: SmoothedAngles,
}

impl OrientationEstimator {
    pub fn new(settings: FusionSettings, rotation: Arc<dyn DisplayRotationSource>) -> Self {
        Self {
            settings,
            rotation,
            accelerometer: SmoothedVector::default(),
            magnetometer: SmoothedVector::default(),
            gyroscope: SmoothedVector::default(),
            angles: SmoothedAngles::default(),
        }
    }

    /// Feed one raw sample. Returns the refreshed estimate when the sample
    /// produced one, `Ok(None)` while a required sensor kind is still missing,
    /// and an error when the vectors are degenerate. On error the previous
    /// estimate is left untouched.
    pub fn ingest(&mut self, sample: &RawSample) -> Result<Option<OrientationEstimate>, FusionError> {
        if !sample.value.is_finite() {
            return Err(FusionError::NonFinite);
        }
        let alpha = self.settings.alpha;
        match sample.kind {
            SensorKind::Accelerometer => {
                self.accelerometer.blend(sample.value, alpha);
            }
            SensorKind::Magnetometer => {
                self.magnetometer.blend(sample.value, alpha);
            }
            SensorKind::Gyroscope => {
                self.gyroscope.blend(sample.value, alpha);
                return Ok(None);
            }
        }

        let (Some(gravity), Some(field)) = (self.accelerometer.get(), self.magnetometer.get())
        else {
            return Ok(None);
        };
        let raw = self.decompose(gravity, field)?;
        Ok(Some(self.angles.blend(raw, alpha)))
    }

    /// Latest smoothed angles. `None` until both accelerometer and
    /// magnetometer have reported.
    pub fn current_estimate(&self) -> Option<OrientationEstimate> {
        self.angles.value
    }

    pub fn smoothed(&self, kind: SensorKind) -> Option<Vec3> {
        match kind {
            SensorKind::Accelerometer => self.accelerometer.get(),
            SensorKind::Magnetometer => self.magnetometer.get(),
            SensorKind::Gyroscope => self.gyroscope.get(),
        }
    }

    /// Smoothed gyroscope reading (rad/s).
    pub fn angular_rate(&self) -> Option<Vec3> {
        self.gyroscope.get()
    }

    /// Drop all filter state.
    pub fn reset(&mut self) {
        self.accelerometer = SmoothedVector::default();
        self.magnetometer = SmoothedVector::default();
        self.gyroscope = SmoothedVector::default();
        self.angles = SmoothedAngles::default();
    }

    fn decompose(&self, gravity: Vec3, field: Vec3) -> Result<OrientationEstimate, FusionError> {
        let matrix = RotationMatrix::from_gravity_and_field(gravity, field)?;
        let rotation = effective_rotation(
            self.rotation.rotation(),
            gravity,
            self.settings.infer_landscape_from_gravity,
            self.settings.landscape_gravity_threshold,
        );
        let (x_axis, y_axis) = remap_axes(rotation);
        let (azimuth, pitch, roll) = matrix.remap(x_axis, y_axis)?.euler_angles();
        let estimate = OrientationEstimate {
            azimuth: azimuth.to_degrees(),
            pitch: pitch.to_degrees(),
            roll: roll.to_degrees(),
        };
        if estimate.azimuth.is_finite() && estimate.pitch.is_finite() && estimate.roll.is_finite() {
            Ok(estimate)
        } else {
            Err(FusionError::NonFinite)
        }
    }
}
