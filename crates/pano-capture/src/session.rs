use crate::{CaptureFrame, FrameSource};
use anyhow::Result;
use image::RgbaImage;
use pano_guidance::{Deviation, DeviationStatus, SharedGate};
use pano_imu::OrientationEstimate;
use tracing::{info, warn};

/// How the capture trigger answers an exceeded deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Confirmation {
    /// Ask before taking a shot that exceeds the thresholds.
    #[default]
    Ask,
    /// The user already confirmed; take the shot regardless.
    Override,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CaptureOutcome {
    /// Frame appended at `index`. `status` is the gate reading at capture time.
    Accepted {
        index: usize,
        status: DeviationStatus,
    },
    /// Deviation exceeded; nothing was captured. Retry with
    /// [`Confirmation::Override`] once the user agrees.
    NeedsConfirmation(Deviation),
    /// The frame source had nothing to return.
    NoFrame,
}

/// Ordered frames for one panorama plus the soft orientation gate.
///
/// The first accepted frame locks the baseline. Later frames whose
/// orientation exceeds a threshold are held back until the trigger passes
/// [`Confirmation::Override`]; the gate never refuses outright.
pub struct CaptureSession {
    gate: SharedGate,
    frames: Vec<CaptureFrame>,
}

impl CaptureSession {
    pub fn new(gate: SharedGate) -> Self {
        Self {
            gate,
            frames: Vec::new(),
        }
    }

    pub fn capture(
        &mut self,
        source: &mut dyn FrameSource,
        orientation: Option<OrientationEstimate>,
        confirmation: Confirmation,
    ) -> Result<CaptureOutcome> {
        let status = match orientation {
            Some(estimate) => self.gate.evaluate(&estimate),
            None => DeviationStatus::NoBaseline,
        };

        if status == DeviationStatus::Exceeded && confirmation == Confirmation::Ask {
            if let Some(deviation) = orientation.and_then(|e| self.gate.deviation(&e)) {
                return Ok(CaptureOutcome::NeedsConfirmation(deviation));
            }
        }
        if status == DeviationStatus::Exceeded {
            warn!(frames = self.frames.len(), "Capturing past deviation threshold on user override");
        }

        let Some(image) = source.try_capture()? else {
            return Ok(CaptureOutcome::NoFrame);
        };

        // Frames taken before fusion settles carry no orientation; the first
        // frame that has one becomes the baseline.
        if self.gate.baseline().is_none() {
            if let Some(estimate) = orientation {
                self.gate.lock_baseline(estimate);
            }
        }

        self.frames.push(CaptureFrame::new(image, orientation));
        let index = self.frames.len() - 1;
        info!(index, ?status, "Frame captured");
        Ok(CaptureOutcome::Accepted { index, status })
    }

    /// Drop all frames and the baseline.
    pub fn reset(&mut self) {
        info!(discarded = self.frames.len(), "Capture session reset");
        self.frames.clear();
        self.gate.reset();
    }

    /// Remove the most recent frame. Removing the first frame clears the baseline.
    pub fn undo_last(&mut self) -> Option<CaptureFrame> {
        let frame = self.frames.pop()?;
        if self.frames.is_empty() {
            self.gate.reset();
        }
        Some(frame)
    }

    pub fn frames(&self) -> &[CaptureFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Stitching needs at least two frames.
    pub fn ready_for_stitching(&self) -> bool {
        self.frames.len() >= 2
    }

    /// Copies of the captured images in capture order.
    pub fn images(&self) -> Vec<RgbaImage> {
        self.frames.iter().map(|f| f.image.clone()).collect()
    }

    pub fn into_images(self) -> Vec<RgbaImage> {
        self.frames.into_iter().map(|f| f.image).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SyntheticCamera;
    use pano_guidance::Thresholds;

    fn session() -> (CaptureSession, SharedGate, SyntheticCamera) {
        let gate = SharedGate::new(Thresholds::default());
        let camera = SyntheticCamera::new(48, 24, 30, 4).unwrap();
        (CaptureSession::new(gate.clone()), gate, camera)
    }

    #[test]
    fn first_frame_locks_baseline() {
        let (mut session, gate, mut camera) = session();
        let level = OrientationEstimate::new(90.0, 2.0, -1.0);
        let outcome = session
            .capture(&mut camera, Some(level), Confirmation::Ask)
            .unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::Accepted {
                index: 0,
                status: DeviationStatus::NoBaseline
            }
        );
        assert_eq!(gate.baseline(), Some(level));

        let outcome = session
            .capture(&mut camera, Some(OrientationEstimate::new(120.0, 5.0, 3.0)), Confirmation::Ask)
            .unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::Accepted {
                index: 1,
                status: DeviationStatus::Ok
            }
        );
        assert_eq!(gate.baseline(), Some(level));
        assert!(session.ready_for_stitching());
    }

    #[test]
    fn baseline_locks_on_first_frame_with_orientation() {
        let (mut session, gate, mut camera) = session();
        session.capture(&mut camera, None, Confirmation::Ask).unwrap();
        assert_eq!(gate.baseline(), None);

        let level = OrientationEstimate::new(0.0, 0.0, 0.0);
        session
            .capture(&mut camera, Some(level), Confirmation::Ask)
            .unwrap();
        assert_eq!(gate.baseline(), Some(level));

        let tilted = OrientationEstimate::new(0.0, 80.0, 80.0);
        match session.capture(&mut camera, Some(tilted), Confirmation::Ask).unwrap() {
            CaptureOutcome::NeedsConfirmation(deviation) => {
                assert!(deviation.pitch_exceeded);
                assert!(deviation.roll_exceeded);
            }
            other => panic!("expected confirmation request, got {other:?}"),
        }
        assert_eq!(session.len(), 2);
    }

    #[test]
    fn exceeded_deviation_asks_then_accepts_override() {
        let (mut session, _gate, mut camera) = session();
        session
            .capture(&mut camera, Some(OrientationEstimate::default()), Confirmation::Ask)
            .unwrap();

        let tilted = OrientationEstimate::new(0.0, 25.0, 0.0);
        match session.capture(&mut camera, Some(tilted), Confirmation::Ask).unwrap() {
            CaptureOutcome::NeedsConfirmation(deviation) => {
                assert!(deviation.pitch_exceeded);
                assert!(!deviation.roll_exceeded);
            }
            other => panic!("expected confirmation request, got {other:?}"),
        }
        assert_eq!(session.len(), 1);

        let outcome = session
            .capture(&mut camera, Some(tilted), Confirmation::Override)
            .unwrap();
        assert_eq!(
            outcome,
            CaptureOutcome::Accepted {
                index: 1,
                status: DeviationStatus::Exceeded
            }
        );
    }

    #[test]
    fn reset_clears_frames_and_baseline() {
        let (mut session, gate, mut camera) = session();
        session
            .capture(&mut camera, Some(OrientationEstimate::default()), Confirmation::Ask)
            .unwrap();
        session.reset();
        assert!(session.is_empty());
        assert!(gate.baseline().is_none());
        assert_eq!(
            gate.evaluate(&OrientationEstimate::new(0.0, 80.0, 0.0)),
            DeviationStatus::NoBaseline
        );
    }

    #[test]
    fn undo_of_first_frame_clears_baseline() {
        let (mut session, gate, mut camera) = session();
        session
            .capture(&mut camera, Some(OrientationEstimate::default()), Confirmation::Ask)
            .unwrap();
        assert!(session.undo_last().is_some());
        assert!(gate.baseline().is_none());
        assert!(session.undo_last().is_none());
    }

    #[test]
    fn exhausted_source_reports_no_frame() {
        let gate = SharedGate::new(Thresholds::default());
        let mut camera = SyntheticCamera::new(48, 24, 30, 1).unwrap();
        let mut session = CaptureSession::new(gate);
        session.capture(&mut camera, None, Confirmation::Ask).unwrap();
        assert_eq!(
            session.capture(&mut camera, None, Confirmation::Ask).unwrap(),
            CaptureOutcome::NoFrame
        );
        assert_eq!(session.into_images().len(), 1);
    }
}
