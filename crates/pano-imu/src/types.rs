use glam::Vec3;
use std::sync::atomic::{AtomicU8, Ordering};

/// Which motion sensor produced a sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Accelerometer,
    Magnetometer,
    Gyroscope,
}

/// Raw reading pushed by the sensor source.
#[derive(Debug, Clone, Copy)]
pub struct RawSample {
    pub kind: SensorKind,
    /// Sensor timestamp in nanoseconds.
    pub timestamp_ns: u64,
    /// Accelerometer: m/s^2. Magnetometer: uT. Gyroscope: rad/s.
    pub value: Vec3,
}

impl RawSample {
    pub fn new(kind: SensorKind, timestamp_ns: u64, value: Vec3) -> Self {
        Self {
            kind,
            timestamp_ns,
            value,
        }
    }

    pub fn accelerometer(timestamp_ns: u64, value: Vec3) -> Self {
        Self::new(SensorKind::Accelerometer, timestamp_ns, value)
    }

    pub fn magnetometer(timestamp_ns: u64, value: Vec3) -> Self {
        Self::new(SensorKind::Magnetometer, timestamp_ns, value)
    }

    pub fn gyroscope(timestamp_ns: u64, value: Vec3) -> Self {
        Self::new(SensorKind::Gyroscope, timestamp_ns, value)
    }
}

/// Smoothed device orientation in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct OrientationEstimate {
    /// Heading, normalized to [0, 360).
    pub azimuth: f32,
    /// Rotation about the screen X axis.
    pub pitch: f32,
    /// Rotation about the viewing axis.
    pub roll: f32,
}

impl OrientationEstimate {
    pub fn new(azimuth: f32, pitch: f32, roll: f32) -> Self {
        Self {
            azimuth,
            pitch,
            roll,
        }
    }
}

/// Screen rotation relative to the device's natural orientation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DisplayRotation {
    #[default]
    Rotation0,
    Rotation90,
    Rotation180,
    Rotation270,
}

impl DisplayRotation {
    pub fn from_degrees(degrees: u32) -> Option<Self> {
        match degrees % 360 {
            0 => Some(Self::Rotation0),
            90 => Some(Self::Rotation90),
            180 => Some(Self::Rotation180),
            270 => Some(Self::Rotation270),
            _ => None,
        }
    }

    pub fn degrees(self) -> u32 {
        match self {
            Self::Rotation0 => 0,
            Self::Rotation90 => 90,
            Self::Rotation180 => 180,
            Self::Rotation270 => 270,
        }
    }
}

/// Reports the current screen rotation. Polled on every fused update.
pub trait DisplayRotationSource: Send + Sync {
    fn rotation(&self) -> DisplayRotation;
}

/// Rotation source that never changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedRotation(pub DisplayRotation);

impl DisplayRotationSource for FixedRotation {
    fn rotation(&self) -> DisplayRotation {
        self.0
    }
}

/// Rotation source updated by the host whenever the screen rotates.
#[derive(Debug, Default)]
pub struct SharedRotation(AtomicU8);

impl SharedRotation {
    pub fn new(rotation: DisplayRotation) -> Self {
        let shared = Self::default();
        shared.set(rotation);
        shared
    }

    pub fn set(&self, rotation: DisplayRotation) {
        let code = match rotation {
            DisplayRotation::Rotation0 => 0,
            DisplayRotation::Rotation90 => 1,
            DisplayRotation::Rotation180 => 2,
            DisplayRotation::Rotation270 => 3,
        };
        self.0.store(code, Ordering::Relaxed);
    }
}

impl DisplayRotationSource for SharedRotation {
    fn rotation(&self) -> DisplayRotation {
        match self.0.load(Ordering::Relaxed) {
            1 => DisplayRotation::Rotation90,
            2 => DisplayRotation::Rotation180,
            3 => DisplayRotation::Rotation270,
            _ => DisplayRotation::Rotation0,
        }
    }
}
