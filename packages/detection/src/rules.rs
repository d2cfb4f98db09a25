//! Rule-based detection from spectral signatures.
//!
//! Built-up pixels (high NDBI, low NDVI, not water) are grouped into
//! 4-connected components, and each component is typed by its shape:
//!
//! * thin and elongated, touching water: bridge
//! * a single pixel wide and long: power line
//! * thin and elongated: road
//! * compact and large enough: building
//!
//! Smaller compact blobs are treated as noise.

use damage_map_damage_models::InfrastructureType;
use damage_map_raster::SpectralIndex;
use damage_map_raster::indices::normalized_difference;
use damage_map_raster_models::{Band, RasterBandSet};

use crate::components::{Component, label};
use crate::config::RuleConfig;
use crate::{Detection, DetectionError, DetectionInput, InfrastructureDetector, PixelFootprint};

/// Per-pixel index values of the after snapshot used by the rules.
struct Signatures {
    ndvi: Vec<f32>,
    ndbi: Vec<f32>,
    mndwi: Vec<f32>,
    valid: Vec<bool>,
}

impl Signatures {
    fn from_input(input: &DetectionInput<'_>) -> Result<Self, DetectionError> {
        if let Some(stack) = input.indices {
            let layer = |index: SpectralIndex| {
                stack
                    .layer(index)
                    .map(|l| l.after.clone())
                    .unwrap_or_else(|| vec![0.0; stack.grid.pixel_count()])
            };
            return Ok(Self {
                ndvi: layer(SpectralIndex::Ndvi),
                ndbi: layer(SpectralIndex::Ndbi),
                mndwi: layer(SpectralIndex::Mndwi),
                valid: stack.valid.clone(),
            });
        }

        let bands = input.after;
        let nd = |index: SpectralIndex| -> Result<Vec<f32>, DetectionError> {
            let (a, b) = index.bands();
            let a = require(bands, a)?;
            let b = require(bands, b)?;
            Ok(a.iter()
                .zip(b)
                .map(|(a, b)| normalized_difference(*a, *b))
                .collect())
        };

        Ok(Self {
            ndvi: nd(SpectralIndex::Ndvi)?,
            ndbi: nd(SpectralIndex::Ndbi)?,
            mndwi: nd(SpectralIndex::Mndwi)?,
            valid: vec![true; bands.grid.pixel_count()],
        })
    }
}

fn require(bands: &RasterBandSet, band: Band) -> Result<&[f32], DetectionError> {
    bands.band(band).ok_or(DetectionError::MissingBand(band))
}

/// Detects infrastructure from built-up spectral signatures.
#[derive(Debug, Clone, Default)]
pub struct SpectralRuleDetector {
    config: RuleConfig,
}

impl SpectralRuleDetector {
    /// Creates a detector with the given thresholds.
    #[must_use]
    pub const fn new(config: RuleConfig) -> Self {
        Self { config }
    }

    fn classify_shape(
        &self,
        component: &Component,
        touches_water: bool,
    ) -> Option<InfrastructureType> {
        let linear = component.mean_width() <= self.config.max_linear_width
            && component.elongation() >= self.config.min_elongation;

        if linear && touches_water {
            Some(InfrastructureType::Bridge)
        } else if component.mean_width() <= 1.0
            && component.length() >= self.config.min_power_line_length
        {
            Some(InfrastructureType::PowerLine)
        } else if linear {
            Some(InfrastructureType::Road)
        } else if component.pixels.len() >= self.config.min_building_pixels {
            Some(InfrastructureType::Building)
        } else {
            None
        }
    }

    #[allow(clippy::cast_precision_loss)]
    fn confidence(&self, component: &Component, ndbi: &[f32]) -> f64 {
        let sum: f64 = component
            .pixels
            .iter()
            .map(|p| f64::from(ndbi[*p]))
            .sum();
        let mean = sum / component.pixels.len() as f64;
        let margin = mean - f64::from(self.config.built_up_ndbi);
        let span = self.config.confidence_span.max(f64::EPSILON);
        0.5f64.mul_add(margin / span, 0.5).clamp(0.0, 1.0)
    }
}

impl InfrastructureDetector for SpectralRuleDetector {
    fn name(&self) -> &'static str {
        "spectral_rules"
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Detection>, DetectionError> {
        let grid = &input.after.grid;
        let signatures = Signatures::from_input(input)?;

        let water: Vec<bool> = signatures
            .mndwi
            .iter()
            .zip(&signatures.valid)
            .map(|(m, v)| *v && *m > self.config.water_mndwi)
            .collect();

        let built_up: Vec<bool> = (0..grid.pixel_count())
            .map(|p| {
                signatures.valid[p]
                    && !water[p]
                    && signatures.ndbi[p] > self.config.built_up_ndbi
                    && signatures.ndvi[p] < self.config.max_ndvi
            })
            .collect();

        let mut detections = Vec::new();
        for component in label(grid, &built_up) {
            let touches_water = component.touches(grid, &water);
            let Some(infrastructure_type) = self.classify_shape(&component, touches_water) else {
                log::debug!(
                    "Ignoring {}-pixel built-up blob at ({}, {})",
                    component.pixels.len(),
                    component.min_col,
                    component.min_row
                );
                continue;
            };
            let confidence = self.confidence(&component, &signatures.ndbi);
            detections.push(Detection {
                infrastructure_type,
                footprint: PixelFootprint::new(component.pixels),
                confidence,
            });
        }

        Ok(detections)
    }
}
