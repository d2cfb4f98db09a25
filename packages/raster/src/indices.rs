//! Spectral index calculation.
//!
//! Every index is a normalized difference `(a - b) / (a + b)` of two
//! bands. A zero denominator yields `0.0` rather than an undefined value,
//! so downstream thresholds never see NaN. Results are clamped to
//! [-1, 1]. Deltas are `after - before`, pixel by pixel.

use std::collections::BTreeMap;

use damage_map_raster_models::{Band, RasterBandSet, RasterGrid, Scene, Snapshot};
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

use crate::RasterError;
use crate::mask::{MaskConfig, valid_fraction, validity_mask};

/// Normalized difference spectral indices derived for each snapshot.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SpectralIndex {
    /// Vegetation: (NIR - RED) / (NIR + RED).
    Ndvi,
    /// Built-up area: (SWIR1 - NIR) / (SWIR1 + NIR).
    Ndbi,
    /// Open water: (GREEN - SWIR1) / (GREEN + SWIR1).
    Mndwi,
    /// Burn severity: (NIR - SWIR2) / (NIR + SWIR2).
    Nbr,
}

impl SpectralIndex {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Ndvi, Self::Ndbi, Self::Mndwi, Self::Nbr]
    }

    /// The `(minuend, subtrahend)` bands of the normalized difference.
    #[must_use]
    pub const fn bands(self) -> (Band, Band) {
        match self {
            Self::Ndvi => (Band::Nir, Band::Red),
            Self::Ndbi => (Band::Swir1, Band::Nir),
            Self::Mndwi => (Band::Green, Band::Swir1),
            Self::Nbr => (Band::Nir, Band::Swir2),
        }
    }
}

/// Normalized difference of two samples with the zero-denominator policy.
#[must_use]
pub fn normalized_difference(a: f32, b: f32) -> f32 {
    let denominator = a + b;
    if denominator.abs() < f32::EPSILON || !denominator.is_finite() {
        return 0.0;
    }
    let value = (a - b) / denominator;
    if value.is_finite() {
        value.clamp(-1.0, 1.0)
    } else {
        0.0
    }
}

/// One index for both snapshots plus the before-to-after delta.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexLayer {
    /// Which index the layer holds.
    pub index: SpectralIndex,
    /// Pre-event values.
    pub before: Vec<f32>,
    /// Post-event values.
    pub after: Vec<f32>,
    /// `after - before` per pixel.
    pub delta: Vec<f32>,
}

/// All index layers of a scene plus the combined validity mask.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexStack {
    /// Grid shared by every layer.
    pub grid: RasterGrid,
    /// Layers keyed by index.
    pub layers: BTreeMap<SpectralIndex, IndexLayer>,
    /// Pixels valid in both snapshots.
    pub valid: Vec<bool>,
}

impl IndexStack {
    /// Returns the layer for `index`.
    ///
    /// Every stack built by [`compute_indices`] holds all four indices.
    #[must_use]
    pub fn layer(&self, index: SpectralIndex) -> Option<&IndexLayer> {
        self.layers.get(&index)
    }

    /// Delta of `index` at a pixel, `0.0` if the layer is absent.
    #[must_use]
    pub fn delta(&self, index: SpectralIndex, pixel: usize) -> f32 {
        self.layer(index)
            .and_then(|layer| layer.delta.get(pixel).copied())
            .unwrap_or(0.0)
    }

    /// After-snapshot value of `index` at a pixel, `0.0` if absent.
    #[must_use]
    pub fn after(&self, index: SpectralIndex, pixel: usize) -> f32 {
        self.layer(index)
            .and_then(|layer| layer.after.get(pixel).copied())
            .unwrap_or(0.0)
    }

    /// Whether a pixel is valid in both snapshots.
    #[must_use]
    pub fn is_valid(&self, pixel: usize) -> bool {
        self.valid.get(pixel).copied().unwrap_or(false)
    }

    /// Share of pixels valid in both snapshots.
    #[must_use]
    pub fn valid_fraction(&self) -> f64 {
        valid_fraction(&self.valid)
    }
}

/// Computes one index for one snapshot.
///
/// Invalid pixels (per `mask`) are written as `0.0`.
///
/// # Errors
///
/// Returns [`RasterError::MissingBand`] if either input band is absent.
pub fn compute_index(
    bands: &RasterBandSet,
    index: SpectralIndex,
    snapshot: Snapshot,
    mask: &[bool],
) -> Result<Vec<f32>, RasterError> {
    let (a_band, b_band) = index.bands();
    let a = bands
        .band(a_band)
        .ok_or(RasterError::MissingBand {
            band: a_band,
            snapshot,
        })?;
    let b = bands
        .band(b_band)
        .ok_or(RasterError::MissingBand {
            band: b_band,
            snapshot,
        })?;

    Ok(a.iter()
        .zip(b)
        .zip(mask)
        .map(|((a, b), valid)| if *valid { normalized_difference(*a, *b) } else { 0.0 })
        .collect())
}

/// Derives every [`SpectralIndex`] for both snapshots of a scene.
///
/// Required bands are checked on both snapshots before any arithmetic so
/// the first missing band is reported deterministically (before snapshot
/// first, then index order).
///
/// # Errors
///
/// Returns [`RasterError::Scene`] if the scene is malformed or the grids
/// differ, [`RasterError::MissingBand`] for an absent band, and
/// [`RasterError::InsufficientData`] if fewer than
/// `config.min_scene_valid_fraction` of pixels are valid in both snapshots.
pub fn compute_indices(scene: &Scene, config: &MaskConfig) -> Result<IndexStack, RasterError> {
    scene.validate()?;

    for (bands, snapshot) in [
        (&scene.before, Snapshot::Before),
        (&scene.after, Snapshot::After),
    ] {
        for index in SpectralIndex::all() {
            let (a, b) = index.bands();
            for band in [a, b] {
                if bands.band(band).is_none() {
                    return Err(RasterError::MissingBand { band, snapshot });
                }
            }
        }
    }

    let before_mask = validity_mask(&scene.before, config);
    let after_mask = validity_mask(&scene.after, config);
    let valid: Vec<bool> = before_mask
        .iter()
        .zip(&after_mask)
        .map(|(b, a)| *b && *a)
        .collect();

    let fraction = valid_fraction(&valid);
    if fraction < config.min_scene_valid_fraction {
        return Err(RasterError::InsufficientData {
            valid_percent: fraction * 100.0,
            required_percent: config.min_scene_valid_fraction * 100.0,
        });
    }
    if fraction < 1.0 {
        log::debug!(
            "{:.1}% of pixels masked (clouds or nodata)",
            (1.0 - fraction) * 100.0
        );
    }

    let mut layers = BTreeMap::new();
    for index in SpectralIndex::all() {
        let before = compute_index(&scene.before, *index, Snapshot::Before, &valid)?;
        let after = compute_index(&scene.after, *index, Snapshot::After, &valid)?;
        let delta = before.iter().zip(&after).map(|(b, a)| a - b).collect();
        layers.insert(
            *index,
            IndexLayer {
                index: *index,
                before,
                after,
                delta,
            },
        );
    }

    Ok(IndexStack {
        grid: scene.after.grid.clone(),
        layers,
        valid,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: u32, height: u32) -> RasterGrid {
        RasterGrid {
            width,
            height,
            origin_lon: 36.73,
            origin_lat: -1.25,
            pixel_width_deg: 0.0001,
            pixel_height_deg: 0.0001,
            resolution_m: 10.0,
            crs: "EPSG:4326".to_string(),
        }
    }

    fn full_bands(value: f32) -> Vec<(Band, f32)> {
        vec![
            (Band::Green, value),
            (Band::Red, value),
            (Band::Nir, value),
            (Band::Swir1, value),
            (Band::Swir2, value),
        ]
    }

    #[test]
    fn zero_denominator_yields_zero_for_every_index() {
        let scene = Scene::new(
            RasterBandSet::uniform(grid(3, 3), &full_bands(0.0)),
            RasterBandSet::uniform(grid(3, 3), &full_bands(0.0)),
        );
        let stack = compute_indices(&scene, &MaskConfig::default()).unwrap();
        for index in SpectralIndex::all() {
            let layer = stack.layer(*index).unwrap();
            for values in [&layer.before, &layer.after, &layer.delta] {
                assert!(values.iter().all(|v| *v == 0.0 && !v.is_nan()), "{index}");
            }
        }
    }

    #[test]
    fn opposite_signed_bands_with_zero_sum_yield_zero() {
        assert!(normalized_difference(0.3, -0.3).abs() < f32::EPSILON);
        assert!(normalized_difference(-0.2, 0.2).abs() < f32::EPSILON);
    }

    #[test]
    fn indices_follow_their_band_formulas() {
        let values = [
            (Band::Green, 0.1),
            (Band::Red, 0.1),
            (Band::Nir, 0.5),
            (Band::Swir1, 0.25),
            (Band::Swir2, 0.15),
        ];
        let scene = Scene::new(
            RasterBandSet::uniform(grid(2, 2), &values),
            RasterBandSet::uniform(grid(2, 2), &values),
        );
        let stack = compute_indices(&scene, &MaskConfig::default()).unwrap();
        let close = |a: f32, b: f32| (a - b).abs() < 1e-6;
        assert!(close(stack.after(SpectralIndex::Ndvi, 0), 0.4 / 0.6));
        assert!(close(stack.after(SpectralIndex::Ndbi, 0), -0.25 / 0.75));
        assert!(close(stack.after(SpectralIndex::Mndwi, 0), -0.15 / 0.35));
        assert!(close(stack.after(SpectralIndex::Nbr, 0), 0.35 / 0.65));
        assert!(close(stack.delta(SpectralIndex::Nbr, 3), 0.0));
    }

    #[test]
    fn delta_is_after_minus_before() {
        let mut after = RasterBandSet::uniform(grid(2, 1), &full_bands(0.2));
        after.insert(Band::Swir2, vec![0.8, 0.2]).unwrap();
        let scene = Scene::new(RasterBandSet::uniform(grid(2, 1), &full_bands(0.2)), after);
        let stack = compute_indices(&scene, &MaskConfig::default()).unwrap();
        assert!((stack.delta(SpectralIndex::Nbr, 0) - (-0.6)).abs() < 1e-6);
        assert!(stack.delta(SpectralIndex::Nbr, 1).abs() < 1e-6);
    }

    #[test]
    fn missing_band_is_named_with_snapshot() {
        let mut after = full_bands(0.2);
        after.retain(|(band, _)| *band != Band::Swir2);
        let scene = Scene::new(
            RasterBandSet::uniform(grid(2, 2), &full_bands(0.2)),
            RasterBandSet::uniform(grid(2, 2), &after),
        );
        match compute_indices(&scene, &MaskConfig::default()) {
            Err(RasterError::MissingBand { band, snapshot }) => {
                assert_eq!(band, Band::Swir2);
                assert_eq!(snapshot, Snapshot::After);
            }
            other => panic!("expected MissingBand, got {other:?}"),
        }
    }

    #[test]
    fn grid_mismatch_is_rejected() {
        let scene = Scene::new(
            RasterBandSet::uniform(grid(2, 2), &full_bands(0.2)),
            RasterBandSet::uniform(grid(3, 2), &full_bands(0.2)),
        );
        assert!(matches!(
            compute_indices(&scene, &MaskConfig::default()),
            Err(RasterError::Scene(_))
        ));
    }

    #[test]
    fn fully_clouded_scene_is_insufficient() {
        let mut before = RasterBandSet::uniform(grid(2, 2), &full_bands(0.2));
        before.insert(Band::Scl, vec![9.0; 4]).unwrap();
        let scene = Scene::new(before, RasterBandSet::uniform(grid(2, 2), &full_bands(0.2)));
        assert!(matches!(
            compute_indices(&scene, &MaskConfig::default()),
            Err(RasterError::InsufficientData { .. })
        ));
    }

    #[test]
    fn masked_pixels_are_zero_and_invalid() {
        let mut after = RasterBandSet::uniform(grid(2, 1), &full_bands(0.2));
        after.insert(Band::Scl, vec![4.0, 8.0]).unwrap();
        after.insert(Band::Swir2, vec![0.8, 0.8]).unwrap();
        let scene = Scene::new(RasterBandSet::uniform(grid(2, 1), &full_bands(0.2)), after);
        let stack = compute_indices(&scene, &MaskConfig::default()).unwrap();
        assert!(stack.is_valid(0));
        assert!(!stack.is_valid(1));
        assert!(stack.delta(SpectralIndex::Nbr, 1).abs() < f32::EPSILON);
        assert!((stack.valid_fraction() - 0.5).abs() < f64::EPSILON);
    }
}
