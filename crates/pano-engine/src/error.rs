use std::path::PathBuf;
use thiserror::Error;

/// Failure reported by a stitching or completion backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct BackendError(String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }

    pub fn message(&self) -> &str {
        &self.0
    }
}

/// Which pipeline stage a variant name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Stitch,
    Completion,
}

impl std::fmt::Display for StageKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageKind::Stitch => f.write_str("stitch"),
            StageKind::Completion => f.write_str("completion"),
        }
    }
}

/// A configured variant could not be turned into a backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResolutionError {
    #[error("unknown {stage} variant {name:?}")]
    UnknownVariant { stage: StageKind, name: String },
    #[error("{variant} requires {path:?}, which does not exist")]
    MissingAsset { variant: &'static str, path: PathBuf },
    #[error("{variant} requires a model path but none is configured")]
    AssetNotConfigured { variant: &'static str },
    #[error("no backend registered for {variant}")]
    Unavailable { variant: &'static str },
}

/// Terminal or rejection error of a pipeline job.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("at least 2 frames are required, got {0}")]
    InsufficientFrames(usize),
    #[error("a pipeline job is already active")]
    Busy,
    #[error(transparent)]
    Resolution(#[from] ResolutionError),
    #[error("stitching failed: {0}")]
    Stitch(BackendError),
    #[error("completion failed: {0}")]
    Completion(BackendError),
    #[error("job cancelled")]
    Cancelled,
    #[error("backend panicked during {0}")]
    Panicked(&'static str),
    #[error("pipeline worker is not running")]
    WorkerGone,
}
