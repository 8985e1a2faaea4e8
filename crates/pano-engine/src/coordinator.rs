//! Single-flight stitch then complete pipeline.

use crate::capability::{CompletionCapability, StitchingCapability};
use crate::error::{BackendError, PipelineError};
use crate::job::{JobHandle, JobOutcome, JobStage, JobStatus, PipelineEvent};
use crate::registry::{AlgorithmRegistry, CompleterVariant, StitcherVariant};
use crate::settings::VariantSettings;
use image::RgbaImage;
use parking_lot::Mutex;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{mpsc, Arc};
use std::thread::JoinHandle;
use tokio::sync::{broadcast, oneshot, watch};
use tracing::{debug, error, info, warn};

const EVENT_CAPACITY: usize = 64;

/// Work item handed to the worker thread.
struct Job {
    id: u64,
    frames: Vec<RgbaImage>,
    stitcher: Arc<dyn StitchingCapability>,
    completer: Arc<dyn CompletionCapability>,
    blend_enabled: bool,
}

/// The job occupying the single-flight slot.
struct ActiveJob {
    id: u64,
    stage: JobStage,
    in_native_call: bool,
    cancel_requested: bool,
    result_tx: oneshot::Sender<JobOutcome>,
}

/// State shared between the coordinator and its worker.
struct Shared {
    active: Mutex<Option<ActiveJob>>,
    status: watch::Sender<JobStatus>,
    events: broadcast::Sender<PipelineEvent>,
}

impl Shared {
    /// Deliver `outcome` and free the slot. The slot is emptied here only,
    /// so each job gets one terminal outcome.
    fn finish_locked(&self, slot: &mut Option<ActiveJob>, outcome: JobOutcome) {
        let Some(job) = slot.take() else {
            return;
        };
        match &outcome {
            Ok(image) => info!(job_id = job.id, width = image.width(), height = image.height(), "Job done"),
            Err(PipelineError::Cancelled) => info!(job_id = job.id, "Job cancelled"),
            Err(e) => error!(job_id = job.id, %e, "Job failed"),
        }
        self.status.send_replace(JobStatus::from_outcome(&outcome));
        let _ = self.events.send(PipelineEvent::Finished {
            job_id: job.id,
            outcome: outcome.clone(),
        });
        let _ = job.result_tx.send(outcome);
    }

    fn finish(&self, job_id: u64, outcome: JobOutcome) {
        let mut slot = self.active.lock();
        if slot.as_ref().is_some_and(|job| job.id == job_id) {
            self.finish_locked(&mut slot, outcome);
        }
    }

    /// Mark the start of a backend call. Returns false if the job is gone
    /// or a cancellation was pending, in which case the job is over.
    fn begin_call(&self, job_id: u64, stage: JobStage) -> bool {
        let mut slot = self.active.lock();
        let Some(job) = slot.as_mut().filter(|job| job.id == job_id) else {
            return false;
        };
        if job.cancel_requested {
            self.finish_locked(&mut slot, Err(PipelineError::Cancelled));
            return false;
        }
        job.in_native_call = true;
        if job.stage != stage {
            job.stage = stage;
            info!(job_id, %stage, "Stage changed");
            self.status.send_replace(stage.into());
            let _ = self.events.send(PipelineEvent::StageChanged { job_id, stage });
        }
        true
    }

    /// Mark the end of a backend call. Returns false if a deferred
    /// cancellation was observed.
    fn end_call(&self, job_id: u64) -> bool {
        let mut slot = self.active.lock();
        let Some(job) = slot.as_mut().filter(|job| job.id == job_id) else {
            return false;
        };
        job.in_native_call = false;
        if job.cancel_requested {
            self.finish_locked(&mut slot, Err(PipelineError::Cancelled));
            return false;
        }
        true
    }
}

/// Runs at most one stitch/complete job at a time on a dedicated worker
/// thread, so callers never block on backend computation.
///
/// A submission while a job is active fails with [`PipelineError::Busy`]
/// instead of queuing. Completion handles are acquired right before use and
/// released right after, on every exit path.
pub struct PipelineCoordinator {
    registry: AlgorithmRegistry,
    shared: Arc<Shared>,
    jobs: Mutex<Option<mpsc::Sender<Job>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    next_id: AtomicU64,
}

impl PipelineCoordinator {
    pub fn new(registry: AlgorithmRegistry) -> std::io::Result<Self> {
        let (tx, rx) = mpsc::channel::<Job>();
        let coordinator = Self::with_sender(registry, tx);
        let shared = Arc::clone(&coordinator.shared);
        let worker = std::thread::Builder::new()
            .name("pipeline-worker".into())
            .spawn(move || worker_loop(&shared, rx))?;
        *coordinator.worker.lock() = Some(worker);
        Ok(coordinator)
    }

    fn with_sender(registry: AlgorithmRegistry, jobs: mpsc::Sender<Job>) -> Self {
        let (status, _) = watch::channel(JobStatus::Idle);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            registry,
            shared: Arc::new(Shared {
                active: Mutex::new(None),
                status,
                events,
            }),
            jobs: Mutex::new(Some(jobs)),
            worker: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn registry(&self) -> &AlgorithmRegistry {
        &self.registry
    }

    /// Accept a job, or reject it without touching any running job.
    pub fn submit(
        &self,
        frames: Vec<RgbaImage>,
        stitcher: StitcherVariant,
        completer: CompleterVariant,
        blend_enabled: bool,
    ) -> Result<JobHandle, PipelineError> {
        if frames.len() < 2 {
            return Err(PipelineError::InsufficientFrames(frames.len()));
        }

        let mut slot = self.shared.active.lock();
        if let Some(active) = slot.as_ref() {
            warn!(active_job = active.id, "Submission rejected while a job is running");
            return Err(PipelineError::Busy);
        }

        let stitcher_backend = self.registry.resolve_stitcher(stitcher)?;
        let completer_backend = self.registry.resolve_completer(completer)?;

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (result_tx, result_rx) = oneshot::channel();
        let events = self.shared.events.subscribe();
        *slot = Some(ActiveJob {
            id,
            stage: JobStage::Stitching,
            in_native_call: false,
            cancel_requested: false,
            result_tx,
        });
        self.shared.status.send_replace(JobStatus::Stitching);
        let _ = self.shared.events.send(PipelineEvent::Accepted { job_id: id });
        let _ = self.shared.events.send(PipelineEvent::StageChanged {
            job_id: id,
            stage: JobStage::Stitching,
        });
        info!(
            job_id = id,
            frames = frames.len(),
            %stitcher,
            %completer,
            blend_enabled,
            "Job accepted"
        );

        let job = Job {
            id,
            frames,
            stitcher: stitcher_backend,
            completer: completer_backend,
            blend_enabled,
        };
        let sent = match self.jobs.lock().as_ref() {
            Some(tx) => tx.send(job).is_ok(),
            None => false,
        };
        if !sent {
            self.shared.finish_locked(&mut slot, Err(PipelineError::WorkerGone));
            return Err(PipelineError::WorkerGone);
        }
        Ok(JobHandle::new(id, result_rx, events))
    }

    /// Submit using variant names, as read from a settings store.
    pub fn submit_named(
        &self,
        frames: Vec<RgbaImage>,
        stitcher: &str,
        completer: &str,
        blend_enabled: bool,
    ) -> Result<JobHandle, PipelineError> {
        let stitcher: StitcherVariant = stitcher.parse()?;
        let completer: CompleterVariant = completer.parse()?;
        self.submit(frames, stitcher, completer, blend_enabled)
    }

    /// Submit with variants read once from `settings`.
    pub fn submit_with_settings(
        &self,
        frames: Vec<RgbaImage>,
        settings: &dyn VariantSettings,
    ) -> Result<JobHandle, PipelineError> {
        self.submit_named(
            frames,
            &settings.stitch_variant(),
            &settings.completion_variant(),
            settings.blend_enabled(),
        )
    }

    /// Request cancellation of the active job.
    ///
    /// Takes effect immediately between backend calls. During a call the
    /// job finishes as cancelled once the call returns; backend work is
    /// never interrupted. Returns false if no job is active.
    pub fn cancel(&self) -> bool {
        let mut slot = self.shared.active.lock();
        let (id, in_call) = match slot.as_ref() {
            Some(job) => (job.id, job.in_native_call),
            None => return false,
        };
        if in_call {
            if let Some(job) = slot.as_mut() {
                job.cancel_requested = true;
            }
            info!(job_id = id, "Cancellation deferred until the backend call returns");
        } else {
            self.shared.finish_locked(&mut slot, Err(PipelineError::Cancelled));
        }
        true
    }

    pub fn status(&self) -> JobStatus {
        self.shared.status.borrow().clone()
    }

    pub fn is_busy(&self) -> bool {
        self.shared.active.lock().is_some()
    }

    pub fn subscribe_status(&self) -> watch::Receiver<JobStatus> {
        self.shared.status.subscribe()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<PipelineEvent> {
        self.shared.events.subscribe()
    }

    /// Stop accepting jobs and wait for the worker to finish the current one.
    pub fn shutdown(&self) {
        self.jobs.lock().take();
        if let Some(worker) = self.worker.lock().take() {
            if worker.join().is_err() {
                error!("Pipeline worker panicked");
            }
        }
    }
}

impl Drop for PipelineCoordinator {
    fn drop(&mut self) {
        // Closing the channel lets the worker exit after the current job.
        self.jobs.lock().take();
    }
}

fn worker_loop(shared: &Shared, jobs: mpsc::Receiver<Job>) {
    debug!("Pipeline worker started");
    while let Ok(job) = jobs.recv() {
        run_job(shared, job);
    }
    debug!("Pipeline worker stopped");
}

fn run_job(shared: &Shared, job: Job) {
    let Job {
        id,
        frames,
        stitcher,
        completer,
        blend_enabled,
    } = job;

    if !shared.begin_call(id, JobStage::Stitching) {
        return;
    }
    let stitched = panic::catch_unwind(AssertUnwindSafe(|| stitcher.stitch(&frames, blend_enabled)));
    if !shared.end_call(id) {
        return;
    }
    let stitched = match stitched {
        Ok(Ok(image)) => image,
        Ok(Err(e)) => return shared.finish(id, Err(PipelineError::Stitch(e))),
        Err(_) => return shared.finish(id, Err(PipelineError::Panicked("stitching"))),
    };
    drop(frames);
    debug!(job_id = id, width = stitched.width(), height = stitched.height(), "Stitched");

    if !shared.begin_call(id, JobStage::Completing) {
        return;
    }
    let completed = panic::catch_unwind(AssertUnwindSafe(|| -> Result<Option<RgbaImage>, BackendError> {
        let mut handle = completer.acquire()?;
        let result = handle.complete(&stitched);
        handle.release();
        result
    }));
    if !shared.end_call(id) {
        return;
    }
    let outcome = match completed {
        Ok(Ok(Some(image))) => Ok(Arc::new(image)),
        Ok(Ok(None)) => Err(PipelineError::Completion(BackendError::new(
            "backend produced no image",
        ))),
        Ok(Err(e)) => Err(PipelineError::Completion(e)),
        Err(_) => Err(PipelineError::Panicked("completion")),
    };
    shared.finish(id, outcome);
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    fn frames(n: usize) -> Vec<RgbaImage> {
        (0..n)
            .map(|i| RgbaImage::from_pixel(4, 4, Rgba([i as u8, 0, 0, 255])))
            .collect()
    }

    /// Coordinator whose queue is drained by the test instead of a worker.
    fn detached() -> (PipelineCoordinator, mpsc::Receiver<Job>) {
        let (tx, rx) = mpsc::channel();
        (PipelineCoordinator::with_sender(AlgorithmRegistry::default(), tx), rx)
    }

    #[test]
    fn cancel_between_calls_finishes_immediately() {
        let (coordinator, queue) = detached();
        let handle = coordinator
            .submit(frames(2), StitcherVariant::FeatureBasedBasic, CompleterVariant::PassThrough, true)
            .unwrap();
        assert_eq!(coordinator.status(), JobStatus::Stitching);

        assert!(coordinator.cancel());
        assert_eq!(coordinator.status(), JobStatus::Failed(PipelineError::Cancelled));
        assert!(!coordinator.is_busy());
        assert_eq!(handle.blocking_wait(), Err(PipelineError::Cancelled));

        // The queued job notices it no longer owns the slot.
        let job = queue.recv().unwrap();
        run_job(&coordinator.shared, job);
        assert_eq!(coordinator.status(), JobStatus::Failed(PipelineError::Cancelled));
    }

    #[test]
    fn cancel_when_idle_is_a_no_op() {
        let (coordinator, _queue) = detached();
        assert!(!coordinator.cancel());
        assert_eq!(coordinator.status(), JobStatus::Idle);
    }

    #[test]
    fn queued_job_blocks_further_submissions() {
        let (coordinator, _queue) = detached();
        let first = coordinator
            .submit(frames(2), StitcherVariant::FeatureBasedBasic, CompleterVariant::PassThrough, true)
            .unwrap();
        let second =
            coordinator.submit(frames(3), StitcherVariant::FeatureBasedBasic, CompleterVariant::PassThrough, true);
        assert_eq!(second.err(), Some(PipelineError::Busy));
        assert_eq!(coordinator.status(), JobStatus::Stitching);
        assert_eq!(first.id(), 1);
    }

    #[test]
    fn events_follow_the_job() {
        let (coordinator, queue) = detached();
        let mut handle = coordinator
            .submit(frames(2), StitcherVariant::FeatureBasedBasic, CompleterVariant::PassThrough, true)
            .unwrap();
        run_job(&coordinator.shared, queue.recv().unwrap());

        let events = handle.events();
        assert!(matches!(events.try_recv(), Ok(PipelineEvent::Accepted { job_id: 1 })));
        assert!(matches!(
            events.try_recv(),
            Ok(PipelineEvent::StageChanged { stage: JobStage::Stitching, .. })
        ));
        // Flat 4x4 frames cannot be aligned.
        match events.try_recv() {
            Ok(PipelineEvent::Finished { outcome: Err(PipelineError::Stitch(_)), .. }) => {}
            other => panic!("unexpected event {other:?}"),
        }
        assert!(matches!(handle.try_outcome(), Some(Err(PipelineError::Stitch(_)))));
    }

    #[test]
    fn closed_queue_reports_worker_gone() {
        let (coordinator, queue) = detached();
        drop(queue);
        let err = coordinator
            .submit(frames(2), StitcherVariant::FeatureBasedBasic, CompleterVariant::PassThrough, true)
            .unwrap_err();
        assert_eq!(err, PipelineError::WorkerGone);
        assert!(!coordinator.is_busy());
    }
}
