//! Engine configuration loaded from TOML.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) yields a working configuration:
//!
//! ```toml
//! [storage]
//! data_dir = "data"
//! scenes_dir = "data/scenes"
//!
//! [workers]
//! max_concurrent_runs = 2
//! resume_interrupted = true
//!
//! [detector]
//! kind = "auto"
//! confidence_floor = 0.3
//!
//! [classifier]
//! flood_onset = 0.2
//! burn_threshold = -0.1
//!
//! [raster]
//! masked_scl_classes = [3, 8, 9, 10]
//! ```

use std::path::{Path, PathBuf};

use damage_map_classifier::ClassifierConfig;
use damage_map_detection::DetectorConfig;
use damage_map_raster::MaskConfig;
use serde::Deserialize;
use thiserror::Error;

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DAMAGE_MAP_CONFIG";

/// Errors that can occur while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read config {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("Invalid config: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Where projects and scenes live on disk.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Root data directory; project files go to `<data_dir>/projects`.
    pub data_dir: PathBuf,
    /// Directory of `<project_id>.json` / `.msgpack` scene files.
    pub scenes_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            scenes_dir: PathBuf::from("data/scenes"),
        }
    }
}

impl StorageConfig {
    /// Directory holding one JSON file per project.
    #[must_use]
    pub fn projects_dir(&self) -> PathBuf {
        self.data_dir.join("projects")
    }
}

/// Background worker pool settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    /// Pipeline runs allowed at once; further runs queue.
    pub max_concurrent_runs: usize,
    /// Re-run projects left in `processing` by a previous process instead
    /// of failing them.
    pub resume_interrupted: bool,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: 2,
            resume_interrupted: true,
        }
    }
}

/// Complete engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Storage locations.
    pub storage: StorageConfig,
    /// Worker pool.
    pub workers: WorkerConfig,
    /// Infrastructure detection.
    pub detector: DetectorConfig,
    /// Damage classification.
    pub classifier: ClassifierConfig,
    /// Pixel masking.
    pub raster: MaskConfig,
}

impl EngineConfig {
    /// Parses configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] if the text is not valid.
    pub fn from_toml(source: &str) -> Result<Self, ConfigError> {
        let mut config: Self = toml::de::from_str(source)?;
        config.workers.max_concurrent_runs = config.workers.max_concurrent_runs.max(1);
        Ok(config)
    }

    /// Reads configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_toml(&source)
    }

    /// Loads configuration from `path`, else from the file named by
    /// `DAMAGE_MAP_CONFIG`, else defaults.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if a named file cannot be read or parsed.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = path {
            log::info!("Loading config from {}", path.display());
            return Self::from_file(path);
        }
        match std::env::var(CONFIG_ENV) {
            Ok(env_path) if !env_path.trim().is_empty() => {
                log::info!("Loading config from {env_path} ({CONFIG_ENV})");
                Self::from_file(Path::new(env_path.trim()))
            }
            _ => {
                log::info!("No config file given, using defaults");
                Ok(Self::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damage_map_detection::DetectorKind;

    #[test]
    fn empty_config_uses_defaults() {
        assert_eq!(EngineConfig::from_toml("").unwrap(), EngineConfig::default());
    }

    #[test]
    fn sections_override_individual_fields() {
        let config = EngineConfig::from_toml(
            r#"
            [storage]
            data_dir = "/var/lib/damage-map"

            [workers]
            max_concurrent_runs = 0

            [detector]
            kind = "spectral_rules"

            [detector.rules]
            min_building_pixels = 9

            [classifier]
            burn_threshold = -0.2

            [raster]
            nodata = -9999.0
            "#,
        )
        .unwrap();

        assert_eq!(config.storage.data_dir, PathBuf::from("/var/lib/damage-map"));
        assert_eq!(config.storage.scenes_dir, PathBuf::from("data/scenes"));
        assert_eq!(config.workers.max_concurrent_runs, 1);
        assert!(config.workers.resume_interrupted);
        assert_eq!(config.detector.kind, DetectorKind::SpectralRules);
        assert_eq!(config.detector.rules.min_building_pixels, 9);
        assert!((config.classifier.burn_threshold - (-0.2)).abs() < f64::EPSILON);
        assert!((config.classifier.flood_onset - 0.2).abs() < f64::EPSILON);
        assert_eq!(config.raster.nodata, Some(-9999.0));
    }

    #[test]
    fn unknown_detector_kind_is_rejected() {
        assert!(matches!(
            EngineConfig::from_toml("[detector]\nkind = \"telepathy\""),
            Err(ConfigError::Parse(_))
        ));
    }
}
