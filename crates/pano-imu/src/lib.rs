pub mod fusion;
pub mod math;
pub mod types;

pub use fusion::{normalize_degrees, FusionSettings, OrientationEstimator, DEFAULT_SMOOTHING_ALPHA};
pub use math::FusionError;
pub use types::*;

use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Commands sent to the fusion task.
enum TrackerCommand {
    Reset,
}

/// Background orientation tracker.
///
/// Owns an [`OrientationEstimator`] on a dedicated task. The sensor source
/// pushes samples through a bounded queue; readers get the latest estimate
/// from a watch channel without ever touching the filter state.
pub struct OrientationTracker {
    sample_tx: mpsc::Sender<RawSample>,
    orientation_rx: watch::Receiver<Option<OrientationEstimate>>,
    command_tx: mpsc::UnboundedSender<TrackerCommand>,
    _task: tokio::task::JoinHandle<()>,
}

impl OrientationTracker {
    /// Start the fusion task. Must be called from within a tokio runtime.
    pub fn spawn(
        settings: FusionSettings,
        rotation: Arc<dyn DisplayRotationSource>,
        queue_capacity: usize,
    ) -> Self {
        let (sample_tx, sample_rx) = mpsc::channel(queue_capacity.max(1));
        let (orientation_tx, orientation_rx) = watch::channel(None);
        let (command_tx, command_rx) = mpsc::unbounded_channel();

        let estimator = OrientationEstimator::new(settings, rotation);
        let task = tokio::spawn(fusion_loop(estimator, sample_rx, orientation_tx, command_rx));
        tracing::info!(alpha = settings.alpha, queue_capacity, "Orientation tracker started");

        Self {
            sample_tx,
            orientation_rx,
            command_tx,
            _task: task,
        }
    }

    /// Sender handed to the sensor source.
    pub fn sample_sender(&self) -> mpsc::Sender<RawSample> {
        self.sample_tx.clone()
    }

    /// Enqueue a sample, waiting for room in the queue.
    pub async fn push(&self, sample: RawSample) {
        let _ = self.sample_tx.send(sample).await;
    }

    /// Enqueue a sample without waiting. Returns `false` if it was dropped.
    pub fn try_push(&self, sample: RawSample) -> bool {
        match self.sample_tx.try_send(sample) {
            Ok(()) => true,
            Err(e) => {
                tracing::trace!(?e, "Dropping sensor sample");
                false
            }
        }
    }

    /// Latest fused orientation (non-blocking).
    pub fn orientation(&self) -> Option<OrientationEstimate> {
        *self.orientation_rx.borrow()
    }

    /// Receiver notified on every fused update.
    pub fn subscribe(&self) -> watch::Receiver<Option<OrientationEstimate>> {
        self.orientation_rx.clone()
    }

    /// Discard filter state; the next samples start a fresh estimate.
    pub fn reset(&self) {
        let _ = self.command_tx.send(TrackerCommand::Reset);
    }
}

/// Background task: drain samples, run fusion, publish orientation.
async fn fusion_loop(
    mut estimator: OrientationEstimator,
    mut sample_rx: mpsc::Receiver<RawSample>,
    orientation_tx: watch::Sender<Option<OrientationEstimate>>,
    mut command_rx: mpsc::UnboundedReceiver<TrackerCommand>,
) {
    let mut sample_count: u64 = 0;
    let mut suppressed: u64 = 0;

    loop {
        tokio::select! {
            sample = sample_rx.recv() => {
                let Some(sample) = sample else {
                    tracing::info!(sample_count, suppressed, "Sensor source closed");
                    break;
                };
                match estimator.ingest(&sample) {
                    Ok(Some(estimate)) => {
                        orientation_tx.send_replace(Some(estimate));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        suppressed += 1;
                        tracing::trace!(?e, kind = ?sample.kind, "Suppressed degenerate sample");
                    }
                }
                sample_count += 1;
                if sample_count % 1000 == 0 {
                    tracing::debug!(sample_count, suppressed, "Sensor samples processed");
                }
            }
            Some(cmd) = command_rx.recv() => {
                match cmd {
                    TrackerCommand::Reset => {
                        estimator.reset();
                        orientation_tx.send_replace(None);
                        tracing::info!("Orientation filters reset");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;
    use std::time::Duration;

    async fn next_estimate(
        rx: &mut watch::Receiver<Option<OrientationEstimate>>,
    ) -> Option<OrientationEstimate> {
        let latest = tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|e| e.is_some()))
            .await
            .expect("timed out waiting for orientation")
            .expect("tracker task stopped");
        *latest
    }

    #[tokio::test]
    async fn publishes_fused_orientation() {
        let tracker = OrientationTracker::spawn(
            FusionSettings::default(),
            Arc::new(FixedRotation::default()),
            16,
        );
        let mut rx = tracker.subscribe();
        assert!(tracker.orientation().is_none());

        tracker
            .push(RawSample::accelerometer(0, Vec3::new(0.0, 9.81, 0.0)))
            .await;
        tracker
            .push(RawSample::magnetometer(1, Vec3::new(0.0, -40.0, -20.0)))
            .await;

        let estimate = next_estimate(&mut rx).await.unwrap();
        assert!(estimate.pitch.abs() < 1e-3);
        assert!(estimate.roll.abs() < 1e-3);
        assert_eq!(tracker.orientation(), Some(estimate));
    }

    #[tokio::test]
    async fn reset_clears_published_orientation() {
        let tracker = OrientationTracker::spawn(
            FusionSettings::default(),
            Arc::new(FixedRotation::default()),
            16,
        );
        let mut rx = tracker.subscribe();
        tracker
            .push(RawSample::accelerometer(0, Vec3::new(0.0, 9.81, 0.0)))
            .await;
        tracker
            .push(RawSample::magnetometer(1, Vec3::new(0.0, -40.0, -20.0)))
            .await;
        next_estimate(&mut rx).await;

        tracker.reset();
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|e| e.is_none()))
            .await
            .expect("timed out waiting for reset")
            .expect("tracker task stopped");
        assert!(tracker.orientation().is_none());
    }
}
