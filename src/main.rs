use anyhow::{Context, Result};
use glam::Vec3;
use pano_capture::{CaptureOutcome, CaptureSession, Confirmation, SyntheticCamera};
use pano_config::{AppConfig, GuidanceConfig, PipelineConfig};
use pano_engine::{
    AlgorithmRegistry, CompleterVariant, EngineContext, PipelineCoordinator, PipelineError,
    PipelineEvent, RgbaImage, StitcherVariant,
};
use pano_guidance::{GuidanceMonitor, SharedGate, Thresholds};
use pano_imu::{DisplayRotation, FusionSettings, OrientationTracker, RawSample, SharedRotation};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

const SHOTS: u32 = 3;
const FRAME_WIDTH: u32 = 320;
const FRAME_HEIGHT: u32 = 180;
const FRAME_STEP: u32 = 200;
const SENSOR_PERIOD: Duration = Duration::from_millis(5);
const SHOT_INTERVAL: Duration = Duration::from_millis(300);

fn fusion_settings(config: &GuidanceConfig) -> FusionSettings {
    FusionSettings {
        alpha: config.smoothing_alpha,
        infer_landscape_from_gravity: config.infer_landscape_from_gravity,
        landscape_gravity_threshold: config.landscape_gravity_threshold,
    }
}

fn thresholds(config: &GuidanceConfig) -> Thresholds {
    Thresholds {
        pitch: config.pitch_threshold_deg,
        roll: config.roll_threshold_deg,
        warning_fraction: config.warning_fraction,
    }
}

fn engine_context(config: &PipelineConfig) -> EngineContext {
    let ctx = EngineContext::new();
    match &config.model_path {
        Some(path) => ctx.with_model_path(path),
        None => ctx,
    }
}

fn save_png(panorama: &RgbaImage, path: &Path) -> Result<()> {
    panorama
        .save_with_format(path, image::ImageFormat::Png)
        .with_context(|| format!("failed to write {}", path.display()))
}

/// Stand-in sensor source: an upright device slowly panning right with a
/// little hand wobble.
async fn simulate_sensors(tx: mpsc::Sender<RawSample>) {
    let mut ticker = tokio::time::interval(SENSOR_PERIOD);
    let mut t: f32 = 0.0;
    loop {
        ticker.tick().await;
        let timestamp_ns = (t * 1e9) as u64;
        let heading = t * 0.2;
        let gravity = Vec3::new(0.4 * (t * 3.0).sin(), 9.81, 0.6 * (t * 2.1).cos());
        let field = Vec3::new(-20.0 * heading.sin(), -40.0, -20.0 * heading.cos());
        let gyro = Vec3::new(0.0, 0.2, 0.0);

        for sample in [
            RawSample::accelerometer(timestamp_ns, gravity),
            RawSample::magnetometer(timestamp_ns, field),
            RawSample::gyroscope(timestamp_ns, gyro),
        ] {
            if tx.send(sample).await.is_err() {
                return;
            }
        }
        t += SENSOR_PERIOD.as_secs_f32();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "panorama_pro=info,pano_imu=info,pano_engine=info".into()),
        )
        .init();

    info!("Panorama Pro starting");

    let output = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("panorama.png"));

    let config = pano_config::load_config().unwrap_or_else(|e| {
        warn!(?e, "Failed to load config, using defaults");
        AppConfig::default()
    });
    info!(
        stitch = %config.pipeline.stitch_algo,
        complete = %config.pipeline.complete_algo,
        "Config loaded"
    );

    // Orientation and guidance.
    let rotation = Arc::new(SharedRotation::new(DisplayRotation::Rotation0));
    let tracker = OrientationTracker::spawn(
        fusion_settings(&config.guidance),
        rotation,
        config.guidance.sample_queue_capacity,
    );
    let feed = tokio::spawn(simulate_sensors(tracker.sample_sender()));
    let gate = SharedGate::new(thresholds(&config.guidance));
    let monitor = GuidanceMonitor::spawn(gate.clone(), tracker.subscribe());

    let mut orientation_rx = tracker.subscribe();
    orientation_rx
        .wait_for(|estimate| estimate.is_some())
        .await
        .context("orientation tracker stopped")?;

    // Capture.
    let mut camera = SyntheticCamera::new(FRAME_WIDTH, FRAME_HEIGHT, FRAME_STEP, SHOTS)?;
    let mut session = CaptureSession::new(gate);
    let mut confirmation = Confirmation::Ask;
    while session.len() < SHOTS as usize {
        tokio::time::sleep(SHOT_INTERVAL).await;
        match session.capture(&mut camera, tracker.orientation(), confirmation)? {
            CaptureOutcome::Accepted { index, status } => {
                info!(index, ?status, guidance = ?monitor.status(), "Shot taken");
                confirmation = Confirmation::Ask;
            }
            CaptureOutcome::NeedsConfirmation(deviation) => {
                warn!(
                    pitch = deviation.pitch,
                    roll = deviation.roll,
                    "Device tilted past threshold, confirming shot"
                );
                confirmation = Confirmation::Override;
            }
            CaptureOutcome::NoFrame => break,
        }
    }
    feed.abort();

    // Processing.
    let coordinator =
        PipelineCoordinator::new(AlgorithmRegistry::new(engine_context(&config.pipeline)))?;
    let mut events = coordinator.subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let PipelineEvent::StageChanged { job_id, stage } = event {
                info!(job_id, %stage, "Pipeline progress");
            }
        }
    });

    let frames = session.into_images();
    let handle = match coordinator.submit_with_settings(frames.clone(), &config.pipeline) {
        Ok(handle) => handle,
        Err(PipelineError::Resolution(e)) => {
            warn!(%e, "Configured algorithms unavailable, using built-in ones");
            coordinator.submit(
                frames,
                StitcherVariant::FeatureBasedBasic,
                CompleterVariant::ClassicalInpainting,
                config.pipeline.blend_enabled,
            )?
        }
        Err(e) => return Err(e.into()),
    };

    let panorama = handle.wait().await?;
    save_png(&panorama, &output)?;
    info!(
        path = %output.display(),
        width = panorama.width(),
        height = panorama.height(),
        "Panorama saved"
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn saved_panorama_reads_back_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pano.out");
        let panorama = RgbaImage::from_fn(7, 3, |x, y| image::Rgba([x as u8 * 30, y as u8 * 80, 5, 255]));

        save_png(&panorama, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), image::ImageFormat::Png);
        let decoded = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(decoded, panorama);
    }

    #[test]
    fn engine_context_carries_model_path() {
        let config = PipelineConfig {
            model_path: Some(PathBuf::from("/models/lama.pt")),
            ..PipelineConfig::default()
        };
        assert_eq!(
            engine_context(&config).model_path,
            Some(PathBuf::from("/models/lama.pt"))
        );
        assert_eq!(engine_context(&PipelineConfig::default()).model_path, None);
    }
}
