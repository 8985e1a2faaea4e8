use crate::capability::{AlgorithmHandle, CompletionCapability, CompletionSession};
use crate::error::BackendError;
use image::RgbaImage;

/// Returns the stitched image unchanged. Used when no completion is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct PassThroughCompleter;

struct PassThroughSession;

impl CompletionSession for PassThroughSession {
    fn complete(&mut self, image: &RgbaImage) -> Result<Option<RgbaImage>, BackendError> {
        Ok(Some(image.clone()))
    }
}

impl CompletionCapability for PassThroughCompleter {
    fn name(&self) -> &'static str {
        "pass-through"
    }

    fn acquire(&self) -> Result<AlgorithmHandle, BackendError> {
        Ok(AlgorithmHandle::new(self.name(), Box::new(PassThroughSession)))
    }
}
