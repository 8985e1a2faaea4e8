//! Job identity, status and the caller-side handle.

use crate::error::PipelineError;
use image::RgbaImage;
use std::sync::Arc;
use tokio::sync::{broadcast, oneshot};

/// Terminal outcome of one job.
pub type JobOutcome = Result<Arc<RgbaImage>, PipelineError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobStage {
    Stitching,
    Completing,
}

impl std::fmt::Display for JobStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobStage::Stitching => f.write_str("stitching"),
            JobStage::Completing => f.write_str("completing"),
        }
    }
}

/// Coordinator state: `Idle -> Stitching -> Completing -> Done | Failed`.
///
/// `Done` and `Failed` persist until the next job is accepted.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum JobStatus {
    #[default]
    Idle,
    Stitching,
    Completing,
    Done(Arc<RgbaImage>),
    Failed(PipelineError),
}

impl JobStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Stitching | JobStatus::Completing)
    }

    pub(crate) fn from_outcome(outcome: &JobOutcome) -> Self {
        match outcome {
            Ok(image) => JobStatus::Done(Arc::clone(image)),
            Err(e) => JobStatus::Failed(e.clone()),
        }
    }
}

impl From<JobStage> for JobStatus {
    fn from(stage: JobStage) -> Self {
        match stage {
            JobStage::Stitching => JobStatus::Stitching,
            JobStage::Completing => JobStatus::Completing,
        }
    }
}

/// Progress notification broadcast to every subscriber.
#[derive(Debug, Clone)]
pub enum PipelineEvent {
    Accepted { job_id: u64 },
    StageChanged { job_id: u64, stage: JobStage },
    /// Sent exactly once per accepted job.
    Finished { job_id: u64, outcome: JobOutcome },
}

impl PipelineEvent {
    pub fn job_id(&self) -> u64 {
        match self {
            PipelineEvent::Accepted { job_id }
            | PipelineEvent::StageChanged { job_id, .. }
            | PipelineEvent::Finished { job_id, .. } => *job_id,
        }
    }
}

/// Returned by a successful submission; resolves to the job's outcome.
pub struct JobHandle {
    id: u64,
    result: oneshot::Receiver<JobOutcome>,
    events: broadcast::Receiver<PipelineEvent>,
}

impl JobHandle {
    pub(crate) fn new(
        id: u64,
        result: oneshot::Receiver<JobOutcome>,
        events: broadcast::Receiver<PipelineEvent>,
    ) -> Self {
        Self { id, result, events }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Events of all jobs, starting with this job's `Accepted`.
    pub fn events(&mut self) -> &mut broadcast::Receiver<PipelineEvent> {
        &mut self.events
    }

    pub async fn wait(self) -> JobOutcome {
        self.result.await.unwrap_or(Err(PipelineError::WorkerGone))
    }

    /// Blocking variant of [`wait`](Self::wait). Must not be called from
    /// within an async runtime.
    pub fn blocking_wait(self) -> JobOutcome {
        self.result
            .blocking_recv()
            .unwrap_or(Err(PipelineError::WorkerGone))
    }

    /// Outcome if the job has already finished.
    pub fn try_outcome(&mut self) -> Option<JobOutcome> {
        match self.result.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(PipelineError::WorkerGone)),
        }
    }
}

impl std::fmt::Debug for JobHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JobHandle").field("id", &self.id).finish()
    }
}
