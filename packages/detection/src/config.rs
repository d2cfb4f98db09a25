//! Detector configuration.

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Which detection strategy the engine builds.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DetectorKind {
    /// The scene's class map, then reference footprints, then spectral
    /// rules, whichever is present first.
    #[default]
    Auto,
    /// Spectral-signature thresholds only.
    SpectralRules,
    /// Reference footprints only.
    Footprints,
    /// The segmentation class map delivered with the scene.
    Model,
}

/// Thresholds of the spectral rule detector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleConfig {
    /// A pixel is built-up when its NDBI exceeds this.
    pub built_up_ndbi: f32,
    /// A built-up pixel must have NDVI below this.
    pub max_ndvi: f32,
    /// A pixel is water when its MNDWI exceeds this.
    pub water_mndwi: f32,
    /// Smallest compact component reported as a building.
    pub min_building_pixels: usize,
    /// Widest mean cross-section (pixels) still treated as linear.
    pub max_linear_width: f64,
    /// Minimum length-to-width ratio of a linear component.
    pub min_elongation: f64,
    /// Minimum length (pixels) of a single-pixel-wide power line.
    pub min_power_line_length: u32,
    /// NDBI margin above `built_up_ndbi` that yields full confidence.
    pub confidence_span: f64,
}

impl Default for RuleConfig {
    fn default() -> Self {
        Self {
            built_up_ndbi: 0.1,
            max_ndvi: 0.2,
            water_mndwi: 0.0,
            min_building_pixels: 4,
            max_linear_width: 3.0,
            min_elongation: 4.0,
            min_power_line_length: 10,
            confidence_span: 0.3,
        }
    }
}

/// Detector section of the engine configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Strategy to build.
    pub kind: DetectorKind,
    /// Detections below this confidence are dropped.
    pub confidence_floor: f64,
    /// Confidence assigned to rasterized reference footprints.
    pub footprint_confidence: f64,
    /// Smallest class-map region reported by the model detector.
    pub model_min_pixels: usize,
    /// Spectral rule thresholds.
    pub rules: RuleConfig,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            kind: DetectorKind::Auto,
            confidence_floor: 0.3,
            footprint_confidence: 0.9,
            model_min_pixels: 4,
            rules: RuleConfig::default(),
        }
    }
}
