mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;

/// Returns the config directory: <platform config dir>/panorama-pro/
pub fn config_dir() -> Result<PathBuf> {
    let dir = dirs::config_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?
        .join("panorama-pro");
    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Returns the config file path: <config dir>/panorama-pro/config.toml
pub fn config_path() -> Result<PathBuf> {
    Ok(config_dir()?.join("config.toml"))
}

/// Load config from the default location, or return defaults if not found.
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&config_path()?)
}

/// Save config to the default location.
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &config_path()?)
}

/// Load config from `path`, or return defaults if the file does not exist.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if path.exists() {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading {}", path.display()))?;
        let config: AppConfig =
            toml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
        info!(?path, "Loaded config");
        Ok(config)
    } else {
        info!(?path, "No config found, using defaults");
        Ok(AppConfig::default())
    }
}

/// Save config to `path`, creating parent directories as needed.
pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents).with_context(|| format!("writing {}", path.display()))?;
    info!(?path, "Saved config");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.pipeline.stitch_algo, "APAP");
        assert_eq!(config.pipeline.complete_algo, "LAMA");
        assert!((config.guidance.pitch_threshold_deg - 20.0).abs() < f32::EPSILON);
    }

    #[test]
    fn save_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let mut config = AppConfig::default();
        config.pipeline.complete_algo = "OPENCV".into();
        config.pipeline.model_path = Some(PathBuf::from("/models/lama_fp32.onnx"));
        config.guidance.warning_fraction = Some(0.5);
        save_config_to(&config, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.pipeline.complete_algo, "OPENCV");
        assert_eq!(
            loaded.pipeline.model_path.as_deref(),
            Some(Path::new("/models/lama_fp32.onnx"))
        );
        assert_eq!(loaded.guidance.warning_fraction, Some(0.5));
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline]\nstitch_algo = \"SIFT\"\n").unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.pipeline.stitch_algo, "SIFT");
        assert_eq!(loaded.pipeline.complete_algo, "LAMA");
        assert!(loaded.pipeline.blend_enabled);
        assert!((loaded.guidance.smoothing_alpha - 0.06).abs() < f32::EPSILON);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[pipeline\nstitch_algo = ").unwrap();
        assert!(load_config_from(&path).is_err());
    }
}
