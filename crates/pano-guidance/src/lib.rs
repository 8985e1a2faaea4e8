pub mod gate;

pub use gate::{CaptureGuidanceGate, Deviation, DeviationStatus, Thresholds};

use pano_imu::OrientationEstimate;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::sync::{watch, Notify};

/// Gate shared between the capture trigger and the live status monitor.
///
/// Every mutation wakes the monitor so the published status follows
/// baseline changes without waiting for the next sensor update.
#[derive(Clone)]
pub struct SharedGate {
    inner: Arc<Mutex<CaptureGuidanceGate>>,
    changed: Arc<Notify>,
}

impl SharedGate {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CaptureGuidanceGate::new(thresholds))),
            changed: Arc::new(Notify::new()),
        }
    }

    pub fn lock_baseline(&self, estimate: OrientationEstimate) {
        self.inner.lock().lock_baseline(estimate);
        tracing::info!(
            pitch = estimate.pitch,
            roll = estimate.roll,
            azimuth = estimate.azimuth,
            "Baseline locked"
        );
        self.changed.notify_one();
    }

    pub fn reset(&self) {
        self.inner.lock().reset();
        tracing::info!("Baseline cleared");
        self.changed.notify_one();
    }

    pub fn baseline(&self) -> Option<OrientationEstimate> {
        self.inner.lock().baseline()
    }

    pub fn evaluate(&self, estimate: &OrientationEstimate) -> DeviationStatus {
        self.inner.lock().evaluate(estimate)
    }

    pub fn deviation(&self, estimate: &OrientationEstimate) -> Option<Deviation> {
        self.inner.lock().deviation(estimate)
    }
}

/// Re-evaluates the gate on every orientation update and publishes the
/// status for UI color hints.
pub struct GuidanceMonitor {
    status_rx: watch::Receiver<DeviationStatus>,
    _task: tokio::task::JoinHandle<()>,
}

impl GuidanceMonitor {
    /// Start monitoring. Must be called from within a tokio runtime.
    pub fn spawn(
        gate: SharedGate,
        orientation_rx: watch::Receiver<Option<OrientationEstimate>>,
    ) -> Self {
        let (status_tx, status_rx) = watch::channel(DeviationStatus::NoBaseline);
        let task = tokio::spawn(monitor_loop(gate, orientation_rx, status_tx));
        Self {
            status_rx,
            _task: task,
        }
    }

    pub fn status(&self) -> DeviationStatus {
        *self.status_rx.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<DeviationStatus> {
        self.status_rx.clone()
    }
}

async fn monitor_loop(
    gate: SharedGate,
    mut orientation_rx: watch::Receiver<Option<OrientationEstimate>>,
    status_tx: watch::Sender<DeviationStatus>,
) {
    loop {
        let latest = *orientation_rx.borrow_and_update();
        let status = match latest {
            Some(estimate) => gate.evaluate(&estimate),
            None => DeviationStatus::NoBaseline,
        };
        let previous = status_tx.send_replace(status);
        if previous != status {
            if status == DeviationStatus::Exceeded {
                if let Some(deviation) = latest.and_then(|e| gate.deviation(&e)) {
                    tracing::info!(
                        pitch_dev = deviation.pitch,
                        roll_dev = deviation.roll,
                        pitch_exceeded = deviation.pitch_exceeded,
                        roll_exceeded = deviation.roll_exceeded,
                        "Orientation deviation exceeded"
                    );
                }
            } else {
                tracing::debug!(?status, "Deviation status changed");
            }
        }

        tokio::select! {
            changed = orientation_rx.changed() => {
                if changed.is_err() {
                    tracing::debug!("Orientation source closed, monitor stopping");
                    break;
                }
            }
            _ = gate.changed.notified() => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    async fn wait_status(rx: &mut watch::Receiver<DeviationStatus>, want: DeviationStatus) {
        tokio::time::timeout(Duration::from_secs(2), rx.wait_for(|s| *s == want))
            .await
            .expect("timed out waiting for status")
            .expect("monitor stopped");
    }

    #[tokio::test]
    async fn monitor_follows_orientation_and_baseline() {
        let gate = SharedGate::new(Thresholds::default());
        let (orientation_tx, orientation_rx) = watch::channel(None);
        let monitor = GuidanceMonitor::spawn(gate.clone(), orientation_rx);
        let mut status = monitor.subscribe();

        orientation_tx.send_replace(Some(OrientationEstimate::new(0.0, 1.0, 2.0)));
        gate.lock_baseline(OrientationEstimate::new(0.0, 0.0, 0.0));
        wait_status(&mut status, DeviationStatus::Ok).await;

        orientation_tx.send_replace(Some(OrientationEstimate::new(0.0, 25.0, 0.0)));
        wait_status(&mut status, DeviationStatus::Exceeded).await;

        gate.reset();
        wait_status(&mut status, DeviationStatus::NoBaseline).await;
        assert_eq!(monitor.status(), DeviationStatus::NoBaseline);
    }

    #[test]
    fn shared_gate_is_one_gate() {
        let gate = SharedGate::new(Thresholds::default());
        let other = gate.clone();
        gate.lock_baseline(OrientationEstimate::new(10.0, 5.0, 5.0));
        assert_eq!(other.baseline(), Some(OrientationEstimate::new(10.0, 5.0, 5.0)));
        assert_eq!(
            other.evaluate(&OrientationEstimate::new(0.0, 5.0, 40.0)),
            DeviationStatus::Exceeded
        );
    }
}
