//! Pixel validity masking.
//!
//! A pixel is valid when every reflectance band holds a finite sample
//! different from the nodata value and, if a scene classification band is
//! present, its class is not one of the masked (cloud/shadow) classes.

use damage_map_raster_models::{Band, RasterBandSet};
use serde::Deserialize;

/// Sentinel-2 SCL classes masked by default: cloud shadow (3), cloud
/// medium/high probability (8, 9), and thin cirrus (10).
pub const DEFAULT_MASKED_SCL_CLASSES: &[u8] = &[3, 8, 9, 10];

/// Masking rules applied before indices are derived.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MaskConfig {
    /// Scene classification classes treated as invalid.
    pub masked_scl_classes: Vec<u8>,
    /// Sample value that marks missing data.
    pub nodata: Option<f32>,
    /// Minimum share of pixels (0-1) that must be valid in both snapshots
    /// for a scene to be processed at all.
    pub min_scene_valid_fraction: f64,
}

impl Default for MaskConfig {
    fn default() -> Self {
        Self {
            masked_scl_classes: DEFAULT_MASKED_SCL_CLASSES.to_vec(),
            nodata: None,
            min_scene_valid_fraction: 0.05,
        }
    }
}

impl MaskConfig {
    fn is_nodata(&self, sample: f32) -> bool {
        !sample.is_finite() || self.nodata.is_some_and(|n| (sample - n).abs() < f32::EPSILON)
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    fn is_masked_class(&self, class: f32) -> bool {
        class.is_finite()
            && class >= 0.0
            && self.masked_scl_classes.contains(&(class.round() as u8))
    }
}

/// Computes the per-pixel validity mask for one snapshot.
#[must_use]
pub fn validity_mask(bands: &RasterBandSet, config: &MaskConfig) -> Vec<bool> {
    let mut valid = vec![true; bands.grid.pixel_count()];

    for (band, values) in &bands.bands {
        if band.is_reflectance() {
            for (flag, sample) in valid.iter_mut().zip(values) {
                if config.is_nodata(*sample) {
                    *flag = false;
                }
            }
        }
    }

    if let Some(scl) = bands.band(Band::Scl) {
        for (flag, class) in valid.iter_mut().zip(scl) {
            if config.is_masked_class(*class) {
                *flag = false;
            }
        }
    }

    valid
}

/// Share of `true` entries in a mask, in [0, 1].
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn valid_fraction(mask: &[bool]) -> f64 {
    if mask.is_empty() {
        return 0.0;
    }
    mask.iter().filter(|v| **v).count() as f64 / mask.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use damage_map_raster_models::RasterGrid;

    fn grid() -> RasterGrid {
        RasterGrid {
            width: 2,
            height: 2,
            origin_lon: 0.0,
            origin_lat: 0.0,
            pixel_width_deg: 0.001,
            pixel_height_deg: 0.001,
            resolution_m: 10.0,
            crs: "EPSG:4326".to_string(),
        }
    }

    #[test]
    fn cloud_classes_are_masked() {
        let mut bands = RasterBandSet::uniform(grid(), &[(Band::Red, 0.1), (Band::Nir, 0.4)]);
        bands.insert(Band::Scl, vec![4.0, 8.0, 10.0, 5.0]).unwrap();
        let mask = validity_mask(&bands, &MaskConfig::default());
        assert_eq!(mask, vec![true, false, false, true]);
        assert!((valid_fraction(&mask) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn nodata_and_non_finite_samples_are_masked() {
        let mut bands = RasterBandSet::uniform(grid(), &[(Band::Nir, 0.4)]);
        bands
            .insert(Band::Red, vec![0.1, f32::NAN, -9999.0, f32::INFINITY])
            .unwrap();
        let config = MaskConfig {
            nodata: Some(-9999.0),
            ..MaskConfig::default()
        };
        let mask = validity_mask(&bands, &config);
        assert_eq!(mask, vec![true, false, false, false]);
    }

    #[test]
    fn empty_mask_has_zero_fraction() {
        assert!(valid_fraction(&[]).abs() < f64::EPSILON);
    }
}
