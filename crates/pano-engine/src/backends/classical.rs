use super::luma;
use crate::capability::{AlgorithmHandle, CompletionCapability, CompletionSession};
use crate::error::BackendError;
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Diffusion-style inpainting of the empty border around a stitch.
///
/// Pixels at or below `hole_luma` are treated as missing. The mask is
/// dilated by `dilate_radius` to swallow the dark fringe left by resampling,
/// then filled inward from its edge, one ring per pass, with the
/// distance-weighted mean of known pixels within `fill_radius`.
#[derive(Debug, Clone, Copy)]
pub struct ClassicalInpainter {
    pub hole_luma: u8,
    pub dilate_radius: u32,
    pub fill_radius: u32,
}

impl Default for ClassicalInpainter {
    fn default() -> Self {
        Self {
            hole_luma: 1,
            dilate_radius: 2,
            fill_radius: 3,
        }
    }
}

impl CompletionCapability for ClassicalInpainter {
    fn name(&self) -> &'static str {
        "classical-inpainting"
    }

    fn acquire(&self) -> Result<AlgorithmHandle, BackendError> {
        Ok(AlgorithmHandle::new(self.name(), Box::new(ClassicalSession(*self))))
    }
}

struct ClassicalSession(ClassicalInpainter);

impl CompletionSession for ClassicalSession {
    fn complete(&mut self, image: &RgbaImage) -> Result<Option<RgbaImage>, BackendError> {
        let params = self.0;
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Ok(None);
        }

        let raw: Vec<bool> = image.pixels().map(|p| luma(p) <= params.hole_luma).collect();
        if !raw.iter().any(|&h| h) {
            return Ok(Some(image.clone()));
        }
        let mut hole = dilate(&raw, width, height, params.dilate_radius);
        let mut pending: Vec<(u32, u32)> = (0..height)
            .flat_map(|y| (0..width).map(move |x| (x, y)))
            .filter(|&(x, y)| hole[(y * width + x) as usize])
            .collect();
        if pending.len() == hole.len() {
            debug!("Nothing known to fill from");
            return Ok(None);
        }

        let mut out = image.clone();
        let r = params.fill_radius.max(1) as i64;
        let mut passes = 0u32;
        while !pending.is_empty() {
            let mut filled = Vec::new();
            pending.retain(|&(x, y)| {
                let mut sum = [0f32; 3];
                let mut weight = 0f32;
                for dy in -r..=r {
                    for dx in -r..=r {
                        let nx = x as i64 + dx;
                        let ny = y as i64 + dy;
                        if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                            continue;
                        }
                        if hole[(ny as u32 * width + nx as u32) as usize] {
                            continue;
                        }
                        let w = 1.0 / (dx * dx + dy * dy) as f32;
                        let p = out.get_pixel(nx as u32, ny as u32);
                        for c in 0..3 {
                            sum[c] += p.0[c] as f32 * w;
                        }
                        weight += w;
                    }
                }
                if weight == 0.0 {
                    return true;
                }
                let rgb = sum.map(|s| (s / weight).round().clamp(0.0, 255.0) as u8);
                filled.push((x, y, Rgba([rgb[0], rgb[1], rgb[2], 255])));
                false
            });
            if filled.is_empty() {
                break;
            }
            for (x, y, pixel) in filled {
                out.put_pixel(x, y, pixel);
                hole[(y * width + x) as usize] = false;
            }
            passes += 1;
        }

        debug!(passes, "Border inpainted");
        Ok(Some(out))
    }
}

fn dilate(mask: &[bool], width: u32, height: u32, radius: u32) -> Vec<bool> {
    let r = radius as i64;
    let (w, h) = (width as i64, height as i64);
    let mut out = vec![false; mask.len()];
    for y in 0..h {
        for x in 0..w {
            let hit = (-r..=r).any(|dy| {
                (-r..=r).any(|dx| {
                    let (nx, ny) = (x + dx, y + dy);
                    nx >= 0 && ny >= 0 && nx < w && ny < h && mask[(ny * w + nx) as usize]
                })
            });
            out[(y * w + x) as usize] = hit;
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(image: &RgbaImage) -> Option<RgbaImage> {
        let mut handle = ClassicalInpainter::default().acquire().unwrap();
        let out = handle.complete(image).unwrap();
        handle.release();
        out
    }

    #[test]
    fn image_without_holes_is_unchanged() {
        let image = RgbaImage::from_pixel(8, 8, Rgba([90, 120, 30, 255]));
        assert_eq!(run(&image), Some(image));
    }

    #[test]
    fn fully_empty_image_yields_nothing() {
        let image = RgbaImage::new(6, 6);
        assert_eq!(run(&image), None);
    }

    #[test]
    fn fills_a_black_border_from_the_interior() {
        let image = RgbaImage::from_fn(30, 20, |x, y| {
            if y < 3 || y >= 17 {
                Rgba([0, 0, 0, 0])
            } else {
                Rgba([200, 100, 50, 255])
            }
        });
        let out = run(&image).unwrap();
        assert!(out.pixels().all(|p| *p == Rgba([200, 100, 50, 255])));
    }

    #[test]
    fn dilation_grows_mask_by_radius() {
        let mut mask = vec![false; 49];
        mask[3 * 7 + 3] = true;
        let grown = dilate(&mask, 7, 7, 2);
        assert_eq!(grown.iter().filter(|&&h| h).count(), 25);
        assert!(!grown[0]);
    }
}
