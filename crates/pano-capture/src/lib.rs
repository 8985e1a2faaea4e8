pub mod session;
pub mod synthetic;

pub use session::{CaptureOutcome, CaptureSession, Confirmation};
pub use synthetic::SyntheticCamera;

use anyhow::Result;
use image::RgbaImage;
use pano_imu::OrientationEstimate;
use std::time::SystemTime;

/// A decoded still plus the orientation at the moment it was taken.
#[derive(Debug, Clone)]
pub struct CaptureFrame {
    pub image: RgbaImage,
    /// `None` when no orientation estimate was available yet.
    pub orientation: Option<OrientationEstimate>,
    pub captured_at: SystemTime,
}

impl CaptureFrame {
    pub fn new(image: RgbaImage, orientation: Option<OrientationEstimate>) -> Self {
        Self {
            image,
            orientation,
            captured_at: SystemTime::now(),
        }
    }
}

/// Trait for platform-specific still capture implementations.
pub trait FrameSource: Send {
    /// Take one still. Returns `None` if the camera has no frame to give.
    fn try_capture(&mut self) -> Result<Option<RgbaImage>>;
}
