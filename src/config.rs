use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{read_to_string, Result, SyncError};

/// How spectra are smoothed before display and export.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmoothingStrategy {
    /// Designed FIR when the settings allow one, moving average otherwise.
    #[default]
    Auto,
    WindowedFir,
    MovingAverage,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub taps: usize,
    /// Assumed sample rate of the wavelength axis.
    pub sample_rate: f64,
    pub cutoff: f64,
    pub strategy: SmoothingStrategy,
}

impl Default for FilterSettings {
    fn default() -> Self {
        FilterSettings {
            taps: 101,
            sample_rate: 2047.0,
            cutoff: 10.0,
            strategy: SmoothingStrategy::Auto,
        }
    }
}

/// File names expected inside a session directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryLayout {
    pub video: String,
    pub frame_times: String,
    pub spectral: String,
    pub metadata: String,
    pub dark_reference: String,
}

impl Default for DirectoryLayout {
    fn default() -> Self {
        DirectoryLayout {
            video: "video.avi".to_string(),
            frame_times: "frame_times.txt".to_string(),
            spectral: "parsed_data.txt".to_string(),
            metadata: "control_inputs_log.txt".to_string(),
            dark_reference: "darkreferencelog.txt".to_string(),
        }
    }
}

impl DirectoryLayout {
    pub fn video_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.video)
    }

    pub fn frame_times_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.frame_times)
    }

    pub fn spectral_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.spectral)
    }

    pub fn metadata_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.metadata)
    }

    pub fn dark_reference_in(&self, dir: &Path) -> PathBuf {
        dir.join(&self.dark_reference)
    }
}

/// Settings for a review session. Every field has a default, so a config
/// file only needs the values it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub layout: DirectoryLayout,
    /// Where the aligned CSV goes when no path is given.
    pub output_path: PathBuf,
    pub filter: FilterSettings,
    /// Frame rate used when the frame source does not report one.
    pub fps: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        SessionConfig {
            layout: DirectoryLayout::default(),
            output_path: PathBuf::from("output.csv"),
            filter: FilterSettings::default(),
            fps: 30.0,
        }
    }
}

impl SessionConfig {
    /// Read a JSON config file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = read_to_string(path)?;
        let config: SessionConfig = serde_json::from_str(&text)
            .map_err(|e| SyncError::Config(format!("{}: {e}", path.display())))?;
        if !(config.fps > 0.0) {
            return Err(SyncError::Config(format!(
                "{}: fps must be positive, got {}",
                path.display(),
                config.fps
            )));
        }
        log::debug!("Loaded session config from {}", path.display());
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(
            &path,
            r#"{ "filter": { "strategy": "moving_average", "taps": 11 }, "layout": { "spectral": "spectra.csv" } }"#,
        )
        .unwrap();

        let config = SessionConfig::load(&path).unwrap();
        assert_eq!(config.filter.taps, 11);
        assert_eq!(config.filter.strategy, SmoothingStrategy::MovingAverage);
        assert_eq!(config.filter.sample_rate, 2047.0);
        assert_eq!(config.layout.spectral, "spectra.csv");
        assert_eq!(config.layout.frame_times, "frame_times.txt");
        assert_eq!(config.output_path, PathBuf::from("output.csv"));
    }

    #[test]
    fn rejects_bad_config() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, r#"{ "fps": 0 }"#).unwrap();
        assert!(matches!(SessionConfig::load(&path), Err(SyncError::Config(_))));
        std::fs::write(&path, "not json").unwrap();
        assert!(matches!(SessionConfig::load(&path), Err(SyncError::Config(_))));
    }
}
