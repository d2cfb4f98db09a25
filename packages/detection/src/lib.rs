#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Infrastructure detection.
//!
//! Detection is polymorphic over the [`InfrastructureDetector`] trait.
//! Three strategies are provided:
//!
//! * [`SpectralRuleDetector`] thresholds built-up spectral signatures and
//!   labels connected components by shape.
//! * [`ModelDetector`] turns the class map of a pluggable
//!   [`SegmentationModel`] into detections, e.g. one delivered with the
//!   scene through [`SceneSegmentation`].
//! * [`FootprintDetector`] rasterizes known footprints (e.g. from
//!   `OpenStreetMap`) onto the scene grid.
//!
//! A [`DetectionStage`] wraps any of them and turns raw pixel detections
//! into [`InfrastructureElement`]s with areas, ids, and sectors.

pub mod components;
pub mod config;
pub mod footprint;
pub mod land_use;
pub mod model;
pub mod rules;
pub mod stage;

use std::sync::Arc;

use damage_map_damage_models::{InfrastructureElement, InfrastructureType};
use damage_map_raster::IndexStack;
use damage_map_raster_models::{Band, ClassMap, GeoBounds, RasterBandSet, VectorFeature};
use thiserror::Error;

pub use config::{DetectorConfig, DetectorKind, RuleConfig};
pub use footprint::FootprintDetector;
pub use land_use::{LandUseIndex, features_from_geojson};
pub use model::{ModelDetector, SceneSegmentation, SegmentationModel, class_type};
pub use rules::SpectralRuleDetector;
pub use stage::DetectionStage;

/// Errors that can occur during detection.
#[derive(Debug, Error)]
pub enum DetectionError {
    /// The segmentation model failed to produce a class map.
    #[error("Segmentation model error: {0}")]
    Model(String),

    /// Detector output does not match the scene grid.
    #[error("Detector output has {actual} pixels, grid has {expected}")]
    GridSize {
        /// Pixels on the scene grid.
        expected: usize,
        /// Pixels produced by the detector.
        actual: usize,
    },

    /// A band the spectral rules need is absent from the after snapshot.
    #[error("Missing band {0} for spectral detection")]
    MissingBand(Band),

    /// A land-use or footprint layer could not be parsed.
    #[error("Invalid vector layer: {0}")]
    VectorLayer(String),
}

/// Everything a detector may look at.
#[derive(Debug, Clone, Copy)]
pub struct DetectionInput<'a> {
    /// Post-event bands.
    pub after: &'a RasterBandSet,
    /// Derived index layers, when already computed.
    pub indices: Option<&'a IndexStack>,
    /// Region detections must fall into.
    pub area_of_interest: GeoBounds,
    /// Known footprints in the scene's coordinate reference.
    pub reference_footprints: &'a [VectorFeature],
    /// Class map delivered with the scene, if any.
    pub segmentation: Option<&'a ClassMap>,
}

/// Row-major pixel indices covered by a detection, sorted ascending.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PixelFootprint {
    pixels: Vec<usize>,
}

impl PixelFootprint {
    /// Creates a footprint, sorting and deduplicating the pixel indices.
    #[must_use]
    pub fn new(mut pixels: Vec<usize>) -> Self {
        pixels.sort_unstable();
        pixels.dedup();
        Self { pixels }
    }

    /// The covered pixel indices, ascending.
    #[must_use]
    pub fn pixels(&self) -> &[usize] {
        &self.pixels
    }

    /// Number of covered pixels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pixels.len()
    }

    /// Whether no pixel is covered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pixels.is_empty()
    }

    /// First pixel in scan order.
    #[must_use]
    pub fn first(&self) -> Option<usize> {
        self.pixels.first().copied()
    }
}

/// Raw detector output: a typed pixel footprint with a confidence.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Kind of object detected.
    pub infrastructure_type: InfrastructureType,
    /// Pixels the object covers.
    pub footprint: PixelFootprint,
    /// Confidence in [0, 1].
    pub confidence: f64,
}

/// An element plus the pixels it was detected on.
///
/// The pixel footprint is only needed until classification and is not
/// part of the persisted result.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedElement {
    /// The persisted element.
    pub element: InfrastructureElement,
    /// Pixels the element covers.
    pub pixels: PixelFootprint,
}

/// Capability interface for infrastructure detection strategies.
pub trait InfrastructureDetector: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &'static str;

    /// Detects infrastructure in the post-event snapshot.
    ///
    /// Confidences must lie in [0, 1] and footprints must index the grid
    /// of `input.after`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the strategy cannot run on the input.
    fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Detection>, DetectionError>;
}

impl<T: InfrastructureDetector + ?Sized> InfrastructureDetector for Arc<T> {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Detection>, DetectionError> {
        (**self).detect(input)
    }
}

/// Uses the scene's class map when it carries one, then reference
/// footprints, and falls back to spectral rules otherwise.
#[derive(Debug, Clone)]
pub struct FallbackDetector {
    model: ModelDetector<SceneSegmentation>,
    footprints: FootprintDetector,
    rules: SpectralRuleDetector,
}

impl FallbackDetector {
    /// Creates the detector from its three strategies.
    #[must_use]
    pub const fn new(
        model: ModelDetector<SceneSegmentation>,
        footprints: FootprintDetector,
        rules: SpectralRuleDetector,
    ) -> Self {
        Self {
            model,
            footprints,
            rules,
        }
    }
}

impl InfrastructureDetector for FallbackDetector {
    fn name(&self) -> &'static str {
        "auto"
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Detection>, DetectionError> {
        if input.segmentation.is_some() {
            self.model.detect(input)
        } else if input.reference_footprints.is_empty() {
            self.rules.detect(input)
        } else {
            self.footprints.detect(input)
        }
    }
}

/// Builds the detector selected by configuration.
#[must_use]
pub fn build_detector(config: &DetectorConfig) -> Arc<dyn InfrastructureDetector> {
    let rules = SpectralRuleDetector::new(config.rules.clone());
    let footprints = FootprintDetector::new(config.footprint_confidence);
    let model = ModelDetector::new(SceneSegmentation, config.model_min_pixels);
    match config.kind {
        DetectorKind::SpectralRules => Arc::new(rules),
        DetectorKind::Footprints => Arc::new(footprints),
        DetectorKind::Model => Arc::new(model),
        DetectorKind::Auto => Arc::new(FallbackDetector::new(model, footprints, rules)),
    }
}
