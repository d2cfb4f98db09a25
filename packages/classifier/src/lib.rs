#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Damage classification.
//!
//! Each detected element gets at most one [`DamageEvent`]. The category is
//! the first rule that fires, in this order:
//!
//! 1. ΔMNDWI above the flood onset: flooding
//! 2. ΔNBR below the burn threshold: fire
//! 3. |ΔNDBI| above the structural threshold: structural (buildings) or
//!    infrastructure (roads, bridges, power lines)
//! 4. ΔNDVI below the vegetation loss threshold: vegetation loss
//!
//! The damage score is the magnitude of the triggering delta over the
//! category's full scale, clamped to [0, 1], and maps to a
//! [`SeverityLevel`]. Detector confidence is carried through untouched.

use damage_map_damage_models::{DamageCategory, DamageEvent, IndexDeltas, SeverityLevel};
use damage_map_detection::DetectedElement;
use damage_map_raster::{IndexStack, SpectralIndex};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while classifying one element.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ClassifierError {
    /// Too few of the element's pixels are valid in both snapshots.
    #[error(
        "Element {element_id} has {:.1}% valid pixels, at least {:.1}% required",
        .valid_fraction * 100.0,
        .required * 100.0
    )]
    InsufficientData {
        /// The element that could not be classified.
        element_id: String,
        /// Share of valid footprint pixels.
        valid_fraction: f64,
        /// Configured minimum share.
        required: f64,
    },
}

/// Classification thresholds and full scales.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    /// ΔMNDWI above this is flooding.
    pub flood_onset: f64,
    /// ΔNBR below this is fire.
    pub burn_threshold: f64,
    /// |ΔNDBI| above this is structural change.
    pub structural_change: f64,
    /// ΔNDVI below this is vegetation loss.
    pub vegetation_loss: f64,
    /// |ΔMNDWI| giving a flooding score of 1.
    pub flood_full_scale: f64,
    /// |ΔNBR| giving a fire score of 1.
    pub fire_full_scale: f64,
    /// |ΔNDBI| giving a structural score of 1.
    pub structural_full_scale: f64,
    /// |ΔNDVI| giving a vegetation loss score of 1.
    pub vegetation_full_scale: f64,
    /// Minimum share of footprint pixels valid in both snapshots.
    pub min_valid_fraction: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            flood_onset: 0.20,
            burn_threshold: -0.10,
            structural_change: 0.15,
            vegetation_loss: -0.20,
            flood_full_scale: 1.0,
            fire_full_scale: 1.0,
            structural_full_scale: 0.5,
            vegetation_full_scale: 1.0,
            min_valid_fraction: 0.5,
        }
    }
}

impl ClassifierConfig {
    /// Picks the category and score for a set of mean deltas.
    ///
    /// Returns `None` when no rule fires (undamaged).
    #[must_use]
    pub fn categorize(
        &self,
        deltas: &IndexDeltas,
        structural_category: DamageCategory,
    ) -> Option<(DamageCategory, f64)> {
        let (category, delta, full_scale) = if deltas.mndwi > self.flood_onset {
            (DamageCategory::Flooding, deltas.mndwi, self.flood_full_scale)
        } else if deltas.nbr < self.burn_threshold {
            (DamageCategory::Fire, deltas.nbr, self.fire_full_scale)
        } else if deltas.ndbi.abs() > self.structural_change {
            (structural_category, deltas.ndbi, self.structural_full_scale)
        } else if deltas.ndvi < self.vegetation_loss {
            (
                DamageCategory::VegetationLoss,
                deltas.ndvi,
                self.vegetation_full_scale,
            )
        } else {
            return None;
        };

        Some((category, damage_score(delta, full_scale)))
    }
}

/// Normalized magnitude of a delta, clamped to [0, 1].
#[must_use]
pub fn damage_score(delta: f64, full_scale: f64) -> f64 {
    if full_scale <= 0.0 || !delta.is_finite() {
        return 0.0;
    }
    (delta.abs() / full_scale).clamp(0.0, 1.0)
}

/// Mean deltas over the footprint pixels valid in both snapshots.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn mean_deltas(pixels: &[usize], stack: &IndexStack) -> IndexDeltas {
    let mut sums = [0.0_f64; 4];
    let mut valid = 0_usize;

    for pixel in pixels {
        if !stack.is_valid(*pixel) {
            continue;
        }
        valid += 1;
        for (sum, index) in sums.iter_mut().zip([
            SpectralIndex::Ndvi,
            SpectralIndex::Ndbi,
            SpectralIndex::Mndwi,
            SpectralIndex::Nbr,
        ]) {
            *sum += f64::from(stack.delta(index, *pixel));
        }
    }

    let valid_fraction = if pixels.is_empty() {
        0.0
    } else {
        valid as f64 / pixels.len() as f64
    };
    let mean = |sum: f64| if valid == 0 { 0.0 } else { sum / valid as f64 };

    IndexDeltas {
        ndvi: mean(sums[0]),
        ndbi: mean(sums[1]),
        mndwi: mean(sums[2]),
        nbr: mean(sums[3]),
        valid_fraction,
    }
}

/// Classifies one element.
///
/// Returns `Ok(None)` for an undamaged element.
///
/// # Errors
///
/// Returns [`ClassifierError::InsufficientData`] if fewer than
/// `config.min_valid_fraction` of the element's pixels are valid.
pub fn classify_element(
    detected: &DetectedElement,
    stack: &IndexStack,
    config: &ClassifierConfig,
) -> Result<Option<DamageEvent>, ClassifierError> {
    let element = &detected.element;
    let deltas = mean_deltas(detected.pixels.pixels(), stack);

    if deltas.valid_fraction < config.min_valid_fraction || deltas.valid_fraction <= 0.0 {
        return Err(ClassifierError::InsufficientData {
            element_id: element.id.clone(),
            valid_fraction: deltas.valid_fraction,
            required: config.min_valid_fraction,
        });
    }

    let structural_category = element.infrastructure_type.structural_category();
    Ok(config
        .categorize(&deltas, structural_category)
        .map(|(category, score)| DamageEvent {
            element_id: element.id.clone(),
            category,
            severity: SeverityLevel::from_score(score),
            score,
            deltas,
            confidence: element.confidence,
        }))
}

/// Result of classifying every element of an assessment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Classification {
    /// One event per damaged element.
    pub events: Vec<DamageEvent>,
    /// Ids of elements no rule fired for.
    pub undamaged: Vec<String>,
    /// Ids of elements excluded for insufficient valid pixels.
    pub unclassifiable: Vec<String>,
}

/// Classifies every element.
///
/// Elements with insufficient data are reported, not dropped.
#[must_use]
pub fn classify(
    elements: &[DetectedElement],
    stack: &IndexStack,
    config: &ClassifierConfig,
) -> Classification {
    let mut out = Classification::default();

    for detected in elements {
        match classify_element(detected, stack, config) {
            Ok(Some(event)) => {
                log::debug!(
                    "{} {}: {} {} (score {:.2})",
                    detected.element.infrastructure_type,
                    event.element_id,
                    event.category,
                    event.severity,
                    event.score
                );
                out.events.push(event);
            }
            Ok(None) => out.undamaged.push(detected.element.id.clone()),
            Err(e) => {
                log::warn!("{e}");
                let ClassifierError::InsufficientData { element_id, .. } = e;
                out.unclassifiable.push(element_id);
            }
        }
    }

    log::info!(
        "Classified {} elements: {} damaged, {} undamaged, {} unclassifiable",
        elements.len(),
        out.events.len(),
        out.undamaged.len(),
        out.unclassifiable.len()
    );

    out
}
