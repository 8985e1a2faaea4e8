//! Stitch and completion pipeline.
//!
//! [`AlgorithmRegistry`] turns configured variant names into backends, and
//! [`PipelineCoordinator`] runs one job at a time through them on a worker
//! thread, delivering progress over channels.

pub mod backends;
mod capability;
mod coordinator;
mod error;
mod job;
mod registry;
mod settings;

pub use backends::{
    ClassicalInpainter, InpaintModelRuntime, LearnedInpainter, OverlapStitcher, PassThroughCompleter,
};
pub use capability::{AlgorithmHandle, CompletionCapability, CompletionSession, StitchingCapability};
pub use coordinator::PipelineCoordinator;
pub use error::{BackendError, PipelineError, ResolutionError, StageKind};
pub use job::{JobHandle, JobOutcome, JobStage, JobStatus, PipelineEvent};
pub use registry::{AlgorithmRegistry, CompleterVariant, EngineContext, StitcherVariant};
pub use settings::VariantSettings;

pub use image::RgbaImage;
