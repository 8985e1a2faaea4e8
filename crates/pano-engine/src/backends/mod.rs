//! Built-in backends. Native engines are supplied by the host through
//! [`EngineContext`](crate::EngineContext).

mod classical;
mod learned;
mod overlap;
mod passthrough;

pub use classical::ClassicalInpainter;
pub use learned::{InpaintModelRuntime, LearnedInpainter};
pub use overlap::OverlapStitcher;
pub use passthrough::PassThroughCompleter;

use image::Rgba;

/// Integer Rec. 601 luma.
pub(crate) fn luma(pixel: &Rgba<u8>) -> u8 {
    let [r, g, b, _] = pixel.0;
    ((r as u32 * 299 + g as u32 * 587 + b as u32 * 114) / 1000) as u8
}
