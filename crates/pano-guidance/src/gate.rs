use pano_imu::OrientationEstimate;

/// Advisory classification of the live orientation against the baseline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DeviationStatus {
    /// No frame accepted yet in this session.
    #[default]
    NoBaseline,
    Ok,
    /// Past the warning fraction of a threshold. Never blocks capture.
    Warning,
    /// Past a threshold. The capture trigger must ask for confirmation.
    Exceeded,
}

impl DeviationStatus {
    /// Whether a shot may be taken without asking the user first.
    pub fn allows_capture(self) -> bool {
        !matches!(self, DeviationStatus::Exceeded)
    }
}

/// Per-axis limits in degrees. Comparisons are strictly-greater-than.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Thresholds {
    pub pitch: f32,
    pub roll: f32,
    /// Fraction of each limit that raises [`DeviationStatus::Warning`].
    pub warning_fraction: Option<f32>,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            pitch: 20.0,
            roll: 30.0,
            warning_fraction: None,
        }
    }
}

/// Absolute pitch/roll offsets from the baseline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Deviation {
    pub pitch: f32,
    pub roll: f32,
    pub pitch_exceeded: bool,
    pub roll_exceeded: bool,
}

impl Deviation {
    pub fn exceeded(&self) -> bool {
        self.pitch_exceeded || self.roll_exceeded
    }
}

/// Tracks the session baseline and classifies live deviation from it.
#[derive(Debug, Clone, Default)]
pub struct CaptureGuidanceGate {
    thresholds: Thresholds,
    baseline: Option<OrientationEstimate>,
}

impl CaptureGuidanceGate {
    pub fn new(thresholds: Thresholds) -> Self {
        Self {
            thresholds,
            baseline: None,
        }
    }

    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    pub fn baseline(&self) -> Option<OrientationEstimate> {
        self.baseline
    }

    /// Store the orientation at the first accepted frame.
    pub fn lock_baseline(&mut self, estimate: OrientationEstimate) {
        self.baseline = Some(estimate);
    }

    pub fn reset(&mut self) {
        self.baseline = None;
    }

    pub fn deviation(&self, estimate: &OrientationEstimate) -> Option<Deviation> {
        let baseline = self.baseline?;
        let pitch = (estimate.pitch - baseline.pitch).abs();
        let roll = (estimate.roll - baseline.roll).abs();
        Some(Deviation {
            pitch,
            roll,
            pitch_exceeded: pitch > self.thresholds.pitch,
            roll_exceeded: roll > self.thresholds.roll,
        })
    }

    pub fn evaluate(&self, estimate: &OrientationEstimate) -> DeviationStatus {
        let Some(deviation) = self.deviation(estimate) else {
            return DeviationStatus::NoBaseline;
        };
        if deviation.exceeded() {
            return DeviationStatus::Exceeded;
        }
        if let Some(fraction) = self.thresholds.warning_fraction {
            if deviation.pitch > self.thresholds.pitch * fraction
                || deviation.roll > self.thresholds.roll * fraction
            {
                return DeviationStatus::Warning;
            }
        }
        DeviationStatus::Ok
    }
}
