//! Turns raw detections into infrastructure elements.

use damage_map_damage_models::{
    GeoFootprint, GeoPoint, InfrastructureElement, InfrastructureType, Sector,
};
use damage_map_raster_models::{GeoBounds, RasterGrid};

use crate::land_use::LandUseIndex;
use crate::{DetectedElement, Detection, DetectionError, DetectionInput, InfrastructureDetector};

/// Runs a detector and post-processes its output.
///
/// Post-processing drops detections below the confidence floor or with a
/// centroid outside the area of interest, derives geographic footprints
/// and areas, assigns sectors, and numbers elements in scan order of their
/// first pixel so ids are stable for a given scene.
#[derive(Debug, Clone)]
pub struct DetectionStage<D: InfrastructureDetector> {
    detector: D,
    confidence_floor: f64,
}

impl<D: InfrastructureDetector> DetectionStage<D> {
    /// Wraps `detector` with the given confidence floor.
    #[must_use]
    pub const fn new(detector: D, confidence_floor: f64) -> Self {
        Self {
            detector,
            confidence_floor,
        }
    }

    /// The wrapped detector.
    #[must_use]
    pub const fn detector(&self) -> &D {
        &self.detector
    }

    /// Detects and post-processes elements.
    ///
    /// Zero elements is a valid outcome.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError`] if the detector fails or reports pixels
    /// outside the grid.
    pub fn run(
        &self,
        input: &DetectionInput<'_>,
        land_use: &LandUseIndex,
    ) -> Result<Vec<DetectedElement>, DetectionError> {
        let grid = &input.after.grid;
        let pixel_count = grid.pixel_count();
        let raw = self.detector.detect(input)?;
        let detected = raw.len();

        let mut kept: Vec<(Detection, GeoFootprint)> = Vec::with_capacity(raw.len());
        let mut below_floor = 0_usize;
        let mut outside = 0_usize;

        for detection in raw {
            if let Some(&last) = detection.footprint.pixels().last()
                && last >= pixel_count
            {
                return Err(DetectionError::GridSize {
                    expected: pixel_count,
                    actual: last + 1,
                });
            }
            if detection.footprint.is_empty() {
                continue;
            }
            if !detection.confidence.is_finite() || detection.confidence < self.confidence_floor {
                below_floor += 1;
                continue;
            }

            let footprint = geo_footprint(grid, detection.footprint.pixels());
            if !input
                .area_of_interest
                .contains(footprint.centroid.longitude, footprint.centroid.latitude)
            {
                outside += 1;
                continue;
            }
            kept.push((detection, footprint));
        }

        kept.sort_by(|(a, _), (b, _)| {
            a.footprint
                .first()
                .cmp(&b.footprint.first())
                .then(a.infrastructure_type.cmp(&b.infrastructure_type))
        });

        let elements: Vec<DetectedElement> = kept
            .into_iter()
            .enumerate()
            .map(|(i, (detection, footprint))| {
                let sector = assign_sector(detection.infrastructure_type, &footprint, land_use);
                DetectedElement {
                    element: InfrastructureElement {
                        id: format!("el-{:04}", i + 1),
                        infrastructure_type: detection.infrastructure_type,
                        footprint,
                        confidence: detection.confidence.clamp(0.0, 1.0),
                        sector,
                    },
                    pixels: detection.footprint,
                }
            })
            .collect();

        if below_floor > 0 || outside > 0 {
            log::debug!(
                "Dropped {below_floor} detections below confidence {} and {outside} outside the area of interest",
                self.confidence_floor
            );
        }
        log::info!(
            "Detector {} kept {} of {detected} detections",
            self.detector.name(),
            elements.len()
        );

        Ok(elements)
    }
}

/// Sector for an element: land-use zones may override the building
/// default, other types always belong to infrastructure.
#[must_use]
pub fn assign_sector(
    infrastructure_type: InfrastructureType,
    footprint: &GeoFootprint,
    land_use: &LandUseIndex,
) -> Sector {
    match infrastructure_type {
        InfrastructureType::Building => land_use
            .lookup(footprint.centroid.longitude, footprint.centroid.latitude)
            .unwrap_or_else(|| infrastructure_type.default_sector()),
        InfrastructureType::Road | InfrastructureType::Bridge | InfrastructureType::PowerLine => {
            infrastructure_type.default_sector()
        }
    }
}

/// Geographic footprint of a set of pixels.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn geo_footprint(grid: &RasterGrid, pixels: &[usize]) -> GeoFootprint {
    let mut sum_lon = 0.0;
    let mut sum_lat = 0.0;
    let mut min_col = u32::MAX;
    let mut max_col = 0;
    let mut min_row = u32::MAX;
    let mut max_row = 0;

    for pixel in pixels {
        let (col, row) = grid.position(*pixel);
        let (lon, lat) = grid.pixel_center(col, row);
        sum_lon += lon;
        sum_lat += lat;
        min_col = min_col.min(col);
        max_col = max_col.max(col);
        min_row = min_row.min(row);
        max_row = max_row.max(row);
    }

    let count = pixels.len().max(1) as f64;
    let west = f64::from(min_col).mul_add(grid.pixel_width_deg, grid.origin_lon);
    let east = f64::from(max_col + 1).mul_add(grid.pixel_width_deg, grid.origin_lon);
    let north = f64::from(min_row).mul_add(-grid.pixel_height_deg, grid.origin_lat);
    let south = f64::from(max_row + 1).mul_add(-grid.pixel_height_deg, grid.origin_lat);

    GeoFootprint {
        centroid: GeoPoint {
            longitude: sum_lon / count,
            latitude: sum_lat / count,
        },
        bounds: GeoBounds::new(west, south, east, north),
        pixel_count: pixels.len() as u64,
        area_m2: pixels.len() as f64 * grid.pixel_area_m2(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::PixelFootprint;
    use damage_map_raster_models::{RasterBandSet, VectorFeature};

    struct Fixed(Vec<Detection>);

    impl InfrastructureDetector for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn detect(&self, _input: &DetectionInput<'_>) -> Result<Vec<Detection>, DetectionError> {
            Ok(self.0.clone())
        }
    }

    fn grid() -> RasterGrid {
        RasterGrid {
            width: 10,
            height: 10,
            origin_lon: 10.0,
            origin_lat: 20.0,
            pixel_width_deg: 0.001,
            pixel_height_deg: 0.001,
            resolution_m: 10.0,
            crs: "EPSG:4326".to_string(),
        }
    }

    fn detection(t: InfrastructureType, pixels: Vec<usize>, confidence: f64) -> Detection {
        Detection {
            infrastructure_type: t,
            footprint: PixelFootprint::new(pixels),
            confidence,
        }
    }

    fn run(detections: Vec<Detection>, aoi: GeoBounds, land_use: &LandUseIndex) -> Vec<DetectedElement> {
        let bands = RasterBandSet::new(grid());
        let input = DetectionInput {
            after: &bands,
            indices: None,
            area_of_interest: aoi,
            reference_footprints: &[],
            segmentation: None,
        };
        DetectionStage::new(Fixed(detections), 0.3)
            .run(&input, land_use)
            .unwrap()
    }

    #[test]
    fn elements_are_filtered_numbered_and_measured() {
        let elements = run(
            vec![
                detection(InfrastructureType::Road, vec![50, 51, 52], 0.9),
                detection(InfrastructureType::Building, vec![0, 1, 10, 11], 0.8),
                detection(InfrastructureType::Building, vec![99], 0.1),
            ],
            grid().extent(),
            &LandUseIndex::default(),
        );

        assert_eq!(elements.len(), 2);
        let building = &elements[0].element;
        assert_eq!(building.id, "el-0001");
        assert_eq!(building.infrastructure_type, InfrastructureType::Building);
        assert_eq!(building.sector, Sector::Residential);
        assert_eq!(building.footprint.pixel_count, 4);
        assert!((building.footprint.area_m2 - 400.0).abs() < 1e-9);
        assert!((building.footprint.centroid.longitude - 10.001).abs() < 1e-9);
        assert!((building.footprint.centroid.latitude - 19.999).abs() < 1e-9);
        assert!((building.footprint.bounds.east - 10.002).abs() < 1e-9);

        let road = &elements[1].element;
        assert_eq!(road.id, "el-0002");
        assert_eq!(road.sector, Sector::Infrastructure);
    }

    #[test]
    fn detections_outside_area_of_interest_are_dropped() {
        let aoi = GeoBounds::new(10.0, 19.995, 10.005, 20.0);
        let elements = run(
            vec![
                detection(InfrastructureType::Building, vec![0], 0.9),
                detection(InfrastructureType::Building, vec![99], 0.9),
            ],
            aoi,
            &LandUseIndex::default(),
        );
        assert_eq!(elements.len(), 1);
        assert_eq!(elements[0].pixels.pixels(), &[0]);
    }

    #[test]
    fn land_use_overrides_building_sector_only() {
        let farmland = VectorFeature {
            tags: BTreeMap::from([("landuse".to_string(), "farmland".to_string())]),
            ring: vec![
                [10.0, 19.99],
                [10.01, 19.99],
                [10.01, 20.0],
                [10.0, 20.0],
                [10.0, 19.99],
            ],
        };
        let elements = run(
            vec![
                detection(InfrastructureType::Building, vec![22], 0.9),
                detection(InfrastructureType::Road, vec![44, 45, 46], 0.9),
            ],
            grid().extent(),
            &LandUseIndex::new(&[farmland]),
        );
        assert_eq!(elements[0].element.sector, Sector::Agricultural);
        assert_eq!(elements[1].element.sector, Sector::Infrastructure);
    }

    #[test]
    fn nothing_detected_is_not_an_error() {
        assert!(run(vec![], grid().extent(), &LandUseIndex::default()).is_empty());
    }
}
