//! Detection from known reference footprints.
//!
//! Footprints are OSM-style tagged features. Closed rings are rasterized
//! by testing pixel centres against the polygon; open lines (roads, power
//! lines) mark every pixel they pass through.

use damage_map_damage_models::InfrastructureType;
use damage_map_raster_models::{RasterGrid, VectorFeature};
use geo::{BoundingRect, Contains, LineString, Point, Polygon};

use crate::{Detection, DetectionError, DetectionInput, InfrastructureDetector, PixelFootprint};

/// Infrastructure type implied by a feature's tags, if any.
#[must_use]
pub fn tagged_type(feature: &VectorFeature) -> Option<InfrastructureType> {
    let present = |key: &str| feature.tag(key).is_some_and(|v| v != "no");

    if present("bridge") {
        Some(InfrastructureType::Bridge)
    } else if matches!(feature.tag("power"), Some("line" | "minor_line")) {
        Some(InfrastructureType::PowerLine)
    } else if present("building") {
        Some(InfrastructureType::Building)
    } else if present("highway") {
        Some(InfrastructureType::Road)
    } else {
        None
    }
}

fn is_closed(ring: &[[f64; 2]]) -> bool {
    ring.len() >= 4 && ring.first() == ring.last()
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rasterize_polygon(grid: &RasterGrid, ring: &[[f64; 2]]) -> Vec<usize> {
    let polygon = Polygon::new(LineString::from(ring.to_vec()), vec![]);
    let Some(rect) = polygon.bounding_rect() else {
        return Vec::new();
    };

    let col_of = |lon: f64| ((lon - grid.origin_lon) / grid.pixel_width_deg).floor();
    let row_of = |lat: f64| ((grid.origin_lat - lat) / grid.pixel_height_deg).floor();
    let max_col = f64::from(grid.width) - 1.0;
    let max_row = f64::from(grid.height) - 1.0;

    let first_col = col_of(rect.min().x).clamp(0.0, max_col) as u32;
    let last_col = col_of(rect.max().x).clamp(0.0, max_col) as u32;
    let first_row = row_of(rect.max().y).clamp(0.0, max_row) as u32;
    let last_row = row_of(rect.min().y).clamp(0.0, max_row) as u32;

    let mut pixels = Vec::new();
    for row in first_row..=last_row {
        for col in first_col..=last_col {
            let (lon, lat) = grid.pixel_center(col, row);
            if polygon.contains(&Point::new(lon, lat)) {
                pixels.push(grid.index(col, row));
            }
        }
    }

    // Footprints smaller than a pixel still occupy the pixel they sit in.
    if pixels.is_empty() {
        let (x, y) = (
            (rect.min().x + rect.max().x) / 2.0,
            (rect.min().y + rect.max().y) / 2.0,
        );
        pixels.extend(grid.pixel_at(x, y));
    }

    pixels
}

#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn rasterize_line(grid: &RasterGrid, line: &[[f64; 2]]) -> Vec<usize> {
    let step = grid.pixel_width_deg.min(grid.pixel_height_deg) / 2.0;
    if !step.is_finite() || step <= 0.0 {
        return Vec::new();
    }
    // Segments far longer than the grid are sampled more coarsely.
    let max_steps = 4 * (grid.width as usize + grid.height as usize);
    let mut pixels = Vec::new();

    for segment in line.windows(2) {
        let [x0, y0] = segment[0];
        let [x1, y1] = segment[1];
        let length = (x1 - x0).hypot(y1 - y0);
        let steps = ((length / step).ceil().max(1.0) as usize).min(max_steps);
        for i in 0..=steps {
            #[allow(clippy::cast_precision_loss)]
            let t = i as f64 / steps as f64;
            pixels.extend(grid.pixel_at(t.mul_add(x1 - x0, x0), t.mul_add(y1 - y0, y0)));
        }
    }
    if let [[x, y]] = line {
        pixels.extend(grid.pixel_at(*x, *y));
    }

    pixels
}

/// Rasterizes tagged reference footprints onto the scene grid.
#[derive(Debug, Clone)]
pub struct FootprintDetector {
    confidence: f64,
}

impl FootprintDetector {
    /// Creates a detector that reports every footprint at `confidence`.
    #[must_use]
    pub const fn new(confidence: f64) -> Self {
        Self {
            confidence: confidence.clamp(0.0, 1.0),
        }
    }
}

impl Default for FootprintDetector {
    fn default() -> Self {
        Self::new(0.9)
    }
}

impl InfrastructureDetector for FootprintDetector {
    fn name(&self) -> &'static str {
        "footprints"
    }

    fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Detection>, DetectionError> {
        let grid = &input.after.grid;
        let mut detections = Vec::new();

        for feature in input.reference_footprints {
            let Some(infrastructure_type) = tagged_type(feature) else {
                log::debug!("Skipping untyped reference feature {:?}", feature.tags);
                continue;
            };
            if feature.ring.is_empty() {
                continue;
            }

            let pixels = if is_closed(&feature.ring) {
                rasterize_polygon(grid, &feature.ring)
            } else {
                rasterize_line(grid, &feature.ring)
            };
            if pixels.is_empty() {
                continue;
            }

            detections.push(Detection {
                infrastructure_type,
                footprint: PixelFootprint::new(pixels),
                confidence: self.confidence,
            });
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use damage_map_raster_models::{GeoBounds, RasterBandSet};

    fn grid() -> RasterGrid {
        RasterGrid {
            width: 10,
            height: 10,
            origin_lon: 0.0,
            origin_lat: 0.001,
            pixel_width_deg: 0.0001,
            pixel_height_deg: 0.0001,
            resolution_m: 10.0,
            crs: "EPSG:4326".to_string(),
        }
    }

    fn feature(key: &str, value: &str, ring: Vec<[f64; 2]>) -> VectorFeature {
        VectorFeature {
            tags: BTreeMap::from([(key.to_string(), value.to_string())]),
            ring,
        }
    }

    fn detect(features: &[VectorFeature]) -> Vec<Detection> {
        let bands = RasterBandSet::new(grid());
        let input = DetectionInput {
            after: &bands,
            indices: None,
            area_of_interest: GeoBounds::new(0.0, 0.0, 0.001, 0.001),
            reference_footprints: features,
            segmentation: None,
        };
        FootprintDetector::new(0.8).detect(&input).unwrap()
    }

    #[test]
    fn building_polygon_covers_inner_pixel_centres() {
        // Columns 2..=4 and rows 1..=2.
        let ring = vec![
            [0.0002, 0.0009],
            [0.0005, 0.0009],
            [0.0005, 0.0007],
            [0.0002, 0.0007],
            [0.0002, 0.0009],
        ];
        let detections = detect(&[feature("building", "yes", ring)]);
        assert_eq!(detections.len(), 1);
        let g = grid();
        assert_eq!(
            detections[0].footprint.pixels(),
            &[
                g.index(2, 1),
                g.index(3, 1),
                g.index(4, 1),
                g.index(2, 2),
                g.index(3, 2),
                g.index(4, 2)
            ]
        );
        assert!((detections[0].confidence - 0.8).abs() < f64::EPSILON);
    }

    #[test]
    fn open_highway_marks_crossed_pixels() {
        let line = vec![[0.00005, 0.00055], [0.00095, 0.00055]];
        let detections = detect(&[feature("highway", "residential", line)]);
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].infrastructure_type, InfrastructureType::Road);
        assert_eq!(detections[0].footprint.len(), 10);
    }

    #[test]
    fn line_sampling_is_bounded() {
        let mut flat = grid();
        flat.pixel_width_deg = 0.0;
        assert!(rasterize_line(&flat, &[[0.0, 0.0005], [0.001, 0.0005]]).is_empty());

        let pixels = rasterize_line(&grid(), &[[0.00005, 0.00055], [1.0e6, 0.00055]]);
        assert!(!pixels.is_empty());
        assert!(pixels.len() <= 4 * 20 + 1);
    }

    #[test]
    fn tags_map_to_types() {
        assert_eq!(
            tagged_type(&feature("power", "line", vec![])),
            Some(InfrastructureType::PowerLine)
        );
        assert_eq!(
            tagged_type(&feature("bridge", "yes", vec![])),
            Some(InfrastructureType::Bridge)
        );
        assert_eq!(tagged_type(&feature("building", "no", vec![])), None);
        assert_eq!(tagged_type(&feature("natural", "wood", vec![])), None);
    }
}
