use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Orientation smoothing and deviation gating.
    pub guidance: GuidanceConfig,
    /// Algorithm selection for the stitch and completion stages.
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuidanceConfig {
    /// EMA coefficient applied to sensor vectors and to decomposed angles.
    /// Lower = smoother, slower to follow.
    pub smoothing_alpha: f32,
    /// Maximum pitch deviation from the baseline before a shot is flagged (degrees).
    pub pitch_threshold_deg: f32,
    /// Maximum roll deviation from the baseline before a shot is flagged (degrees).
    pub roll_threshold_deg: f32,
    /// Fraction of a threshold at which an advisory warning is raised.
    /// `None` disables the warning tier; `Some(0.5)` gives the classic
    /// half-threshold yellow band of the level overlay.
    pub warning_fraction: Option<f32>,
    /// Infer landscape orientation from the gravity X component when the
    /// display reports no rotation.
    pub infer_landscape_from_gravity: bool,
    /// |gravity.x| above which a 0° display is treated as landscape (m/s^2).
    pub landscape_gravity_threshold: f32,
    /// Capacity of the queue between the sensor source and the fusion task.
    pub sample_queue_capacity: usize,
}

impl Default for GuidanceConfig {
    fn default() -> Self {
        Self {
            smoothing_alpha: 0.06,
            pitch_threshold_deg: 20.0,
            roll_threshold_deg: 30.0,
            warning_fraction: None,
            infer_landscape_from_gravity: true,
            landscape_gravity_threshold: 4.5,
            sample_queue_capacity: 256,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Stitching variant name, e.g. "APAP" or "SIFT".
    pub stitch_algo: String,
    /// Completion variant name, e.g. "LAMA", "OPENCV" or "NONE".
    pub complete_algo: String,
    /// Linearly blend overlapping regions to hide seams.
    pub blend_enabled: bool,
    /// Inpainting model used by the learned completion variant.
    pub model_path: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            stitch_algo: "APAP".into(),
            complete_algo: "LAMA".into(),
            blend_enabled: true,
            model_path: None,
        }
    }
}
