use crate::capability::{AlgorithmHandle, CompletionCapability, CompletionSession};
use crate::error::{BackendError, ResolutionError};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Host-provided inference runtime able to load an inpainting model.
///
/// `load` may be slow and memory hungry; the returned session is dropped
/// as soon as one completion finishes.
pub trait InpaintModelRuntime: Send + Sync {
    fn load(&self, model_path: &Path) -> Result<Box<dyn CompletionSession>, BackendError>;
}

/// Learned inpainting over a model file loaded per job.
pub struct LearnedInpainter {
    runtime: Arc<dyn InpaintModelRuntime>,
    model_path: Option<PathBuf>,
}

impl LearnedInpainter {
    pub fn new(runtime: Arc<dyn InpaintModelRuntime>, model_path: Option<PathBuf>) -> Self {
        Self {
            runtime,
            model_path,
        }
    }
}

impl CompletionCapability for LearnedInpainter {
    fn name(&self) -> &'static str {
        "learned-inpainting"
    }

    fn validate(&self) -> Result<(), ResolutionError> {
        match &self.model_path {
            None => Err(ResolutionError::AssetNotConfigured {
                variant: self.name(),
            }),
            Some(path) if !path.is_file() => Err(ResolutionError::MissingAsset {
                variant: self.name(),
                path: path.clone(),
            }),
            Some(_) => Ok(()),
        }
    }

    fn acquire(&self) -> Result<AlgorithmHandle, BackendError> {
        let path = self
            .model_path
            .as_deref()
            .ok_or_else(|| BackendError::new("no model path configured"))?;
        tracing::info!(?path, "Loading inpainting model");
        let session = self.runtime.load(path)?;
        Ok(AlgorithmHandle::new(self.name(), session))
    }
}
