use super::luma;
use crate::capability::StitchingCapability;
use crate::error::BackendError;
use image::{Rgba, RgbaImage};
use tracing::debug;

/// Basic feature-matching stitcher for a left-to-right horizontal sweep.
///
/// Consecutive frames are aligned by searching the horizontal overlap that
/// minimizes the mean absolute luma difference, then composed onto one
/// canvas. Frames must share a height.
#[derive(Debug, Clone, Copy)]
pub struct OverlapStitcher {
    /// Smallest overlap tried, as a fraction of the narrower frame.
    pub min_overlap: f32,
    /// Largest overlap tried, as a fraction of the narrower frame.
    pub max_overlap: f32,
    /// Best match must be at least this close (mean luma difference).
    pub max_mean_error: f32,
    /// Overlap regions flatter than this luma standard deviation cannot be matched.
    pub min_texture: f32,
}

impl Default for OverlapStitcher {
    fn default() -> Self {
        Self {
            min_overlap: 0.1,
            max_overlap: 0.6,
            max_mean_error: 12.0,
            min_texture: 2.0,
        }
    }
}

/// Coarse planes are at most this wide during the overlap search.
const SEARCH_WIDTH: u32 = 256;

/// Per-frame luma plane.
struct Plane {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Plane {
    fn new(image: &RgbaImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            data: image.pixels().map(luma).collect(),
        }
    }

    fn at(&self, x: u32, y: u32) -> u8 {
        self.data[(y * self.width + x) as usize]
    }

    /// Box-filtered copy, `factor` times smaller on each axis.
    fn downsample(&self, factor: u32) -> Self {
        let width = self.width / factor;
        let height = self.height / factor;
        let area = factor * factor;
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                let mut sum = 0u32;
                for dy in 0..factor {
                    for dx in 0..factor {
                        sum += self.at(x * factor + dx, y * factor + dy) as u32;
                    }
                }
                data.push((sum / area) as u8);
            }
        }
        Self { width, height, data }
    }
}

/// Mean absolute luma difference between the right edge of `left` and the
/// left edge of `right` for a given overlap.
fn overlap_error(left: &Plane, right: &Plane, overlap: u32) -> f32 {
    let start = left.width - overlap;
    let height = left.height.min(right.height);
    let mut total: u64 = 0;
    for y in 0..height {
        for x in 0..overlap {
            total += left.at(start + x, y).abs_diff(right.at(x, y)) as u64;
        }
    }
    total as f32 / (overlap * height) as f32
}

fn best_overlap(left: &Plane, right: &Plane, candidates: impl Iterator<Item = u32>) -> Option<(u32, f32)> {
    let mut best: Option<(u32, f32)> = None;
    for overlap in candidates {
        let error = overlap_error(left, right, overlap);
        if best.map_or(true, |(_, e)| error < e) {
            best = Some((overlap, error));
        }
    }
    best
}

impl OverlapStitcher {
    /// Wide frames are matched on downsampled planes first, then refined at
    /// full resolution around the coarse optimum.
    fn estimate_overlap(&self, left: &Plane, right: &Plane, height: u32) -> Result<u32, BackendError> {
        let narrow = left.width.min(right.width);
        let lo = ((narrow as f32 * self.min_overlap).ceil() as u32).max(1);
        let hi = ((narrow as f32 * self.max_overlap).floor() as u32).min(narrow);
        if lo > hi {
            return Err(BackendError::new(format!(
                "frames {narrow}px wide are too narrow to align"
            )));
        }

        let factor = narrow.div_ceil(SEARCH_WIDTH).max(1);
        let (search_lo, search_hi) = if factor > 1 && height >= factor {
            let coarse_left = left.downsample(factor);
            let coarse_right = right.downsample(factor);
            let coarse_narrow = coarse_left.width.min(coarse_right.width);
            let coarse_lo = (lo / factor).max(1);
            let coarse_hi = (hi / factor).min(coarse_narrow);
            match best_overlap(&coarse_left, &coarse_right, coarse_lo..=coarse_hi) {
                Some((coarse, _)) => {
                    let center = left.width - factor * (coarse_left.width - coarse);
                    (
                        center.saturating_sub(2 * factor).max(lo),
                        (center + 2 * factor).min(hi),
                    )
                }
                None => (lo, hi),
            }
        } else {
            (lo, hi)
        };

        let best = best_overlap(left, right, search_lo..=search_hi);
        let Some((overlap, error)) = best else {
            return Err(BackendError::new("no overlap candidates"));
        };
        if error > self.max_mean_error {
            return Err(BackendError::new(format!(
                "no consistent overlap between frames (best mean error {error:.1})"
            )));
        }

        let samples = (overlap * height) as f32;
        let mean = (0..height)
            .flat_map(|y| (0..overlap).map(move |x| (x, y)))
            .map(|(x, y)| right.at(x, y) as f32)
            .sum::<f32>()
            / samples;
        let variance = (0..height)
            .flat_map(|y| (0..overlap).map(move |x| (x, y)))
            .map(|(x, y)| (right.at(x, y) as f32 - mean).powi(2))
            .sum::<f32>()
            / samples;
        if variance.sqrt() < self.min_texture {
            return Err(BackendError::new(
                "overlap region has too little texture to match",
            ));
        }

        debug!(overlap, error, "Frame pair aligned");
        Ok(overlap)
    }
}

impl StitchingCapability for OverlapStitcher {
    fn name(&self) -> &'static str {
        "feature-based-basic"
    }

    fn stitch(&self, frames: &[RgbaImage], blend_enabled: bool) -> Result<RgbaImage, BackendError> {
        if frames.len() < 2 {
            return Err(BackendError::new("at least two frames are needed"));
        }
        let height = frames[0].height();
        for (i, frame) in frames.iter().enumerate() {
            if frame.width() == 0 || frame.height() == 0 {
                return Err(BackendError::new(format!("frame {i} is empty")));
            }
            if frame.height() != height {
                return Err(BackendError::new(format!(
                    "frame {i} is {}px tall, expected {height}px",
                    frame.height()
                )));
            }
        }

        let planes: Vec<Plane> = frames.iter().map(Plane::new).collect();
        let mut offsets = vec![0u32];
        let mut overlaps = Vec::with_capacity(frames.len() - 1);
        for pair in planes.windows(2) {
            let overlap = self.estimate_overlap(&pair[0], &pair[1], height)?;
            let previous = offsets[offsets.len() - 1];
            offsets.push(previous + pair[0].width - overlap);
            overlaps.push(overlap);
        }

        let last = frames.len() - 1;
        let width = offsets[last] + frames[last].width();
        let mut canvas = RgbaImage::new(width, height);
        for (x, y, pixel) in frames[0].enumerate_pixels() {
            canvas.put_pixel(x, y, *pixel);
        }

        for (i, frame) in frames.iter().enumerate().skip(1) {
            let offset = offsets[i];
            let overlap = overlaps[i - 1];
            for (x, y, pixel) in frame.enumerate_pixels() {
                let target = offset + x;
                let value = if x >= overlap {
                    *pixel
                } else if blend_enabled {
                    let t = (x + 1) as f32 / (overlap + 1) as f32;
                    mix(canvas.get_pixel(target, y), pixel, t)
                } else if x >= overlap / 2 {
                    *pixel
                } else {
                    continue;
                };
                canvas.put_pixel(target, y, value);
            }
        }

        debug!(frames = frames.len(), width, height, blend_enabled, "Stitch composed");
        Ok(canvas)
    }
}

fn mix(a: &Rgba<u8>, b: &Rgba<u8>, t: f32) -> Rgba<u8> {
    let mut out = [0u8; 4];
    for (c, o) in out.iter_mut().enumerate() {
        *o = (a.0[c] as f32 * (1.0 - t) + b.0[c] as f32 * t).round() as u8;
    }
    Rgba(out)
}
