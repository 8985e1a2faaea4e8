use crate::FrameSource;
use anyhow::{ensure, Result};
use image::{Rgba, RgbaImage};
use tracing::info;

/// Stand-in camera that pans across a procedurally generated scene.
///
/// Each capture returns the next window of the scene, shifted right by
/// `step` pixels, so consecutive frames overlap by `width - step`.
pub struct SyntheticCamera {
    scene: RgbaImage,
    width: u32,
    step: u32,
    position: u32,
}

impl SyntheticCamera {
    pub fn new(width: u32, height: u32, step: u32, shots: u32) -> Result<Self> {
        ensure!(width > 0 && height > 0, "frame size must be non-zero");
        ensure!(step > 0 && step < width, "step must be in 1..width");
        let scene_width = width + step * shots.saturating_sub(1);
        info!(width, height, step, shots, scene_width, "Synthetic camera initialized");
        Ok(Self {
            scene: scene(scene_width, height),
            width,
            step,
            position: 0,
        })
    }

    /// The full scene the frames are cut from.
    pub fn scene(&self) -> &RgbaImage {
        &self.scene
    }
}

impl FrameSource for SyntheticCamera {
    fn try_capture(&mut self) -> Result<Option<RgbaImage>> {
        if self.position + self.width > self.scene.width() {
            return Ok(None);
        }
        let frame = image::imageops::crop_imm(
            &self.scene,
            self.position,
            0,
            self.width,
            self.scene.height(),
        )
        .to_image();
        self.position += self.step;
        Ok(Some(frame))
    }
}

/// Blocky value noise over a horizontal gradient: textured everywhere and
/// never periodic, so overlap search has a single clear optimum.
fn scene(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        let cell = hash(x / 4, y / 4);
        let r = 40 + (cell & 0x7f) as u8;
        let g = 40 + ((cell >> 8) & 0x7f) as u8;
        let b = ((x * 200) / width.max(1)) as u8 + 30;
        Rgba([r, g, b, 255])
    })
}

fn hash(x: u32, y: u32) -> u32 {
    let mut h = x.wrapping_mul(0x9E37_79B1) ^ y.wrapping_mul(0x85EB_CA77);
    h ^= h >> 15;
    h = h.wrapping_mul(0x2C1B_3C6D);
    h ^= h >> 12;
    h
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frames_overlap_by_width_minus_step() {
        let mut camera = SyntheticCamera::new(64, 32, 40, 3).unwrap();
        let first = camera.try_capture().unwrap().unwrap();
        let second = camera.try_capture().unwrap().unwrap();
        assert_eq!(first.dimensions(), (64, 32));
        for y in 0..32 {
            for x in 0..24 {
                assert_eq!(first.get_pixel(40 + x, y), second.get_pixel(x, y));
            }
        }
    }

    #[test]
    fn runs_out_after_planned_shots() {
        let mut camera = SyntheticCamera::new(64, 32, 40, 3).unwrap();
        for _ in 0..3 {
            assert!(camera.try_capture().unwrap().is_some());
        }
        assert!(camera.try_capture().unwrap().is_none());
    }

    #[test]
    fn rejects_step_wider_than_frame() {
        assert!(SyntheticCamera::new(64, 32, 64, 3).is_err());
    }
}
