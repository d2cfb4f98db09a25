//! Detection from a semantic segmentation model.
//!
//! The model itself is out of scope; anything that can label each pixel
//! of the after snapshot with a class and a probability plugs in through
//! [`SegmentationModel`]. [`SceneSegmentation`] reads the class map a scene
//! was delivered with, and a [`ClassMap`] can also be used as a model
//! directly.

use damage_map_damage_models::InfrastructureType;
pub use damage_map_raster_models::ClassMap;

use crate::components::label;
use crate::{Detection, DetectionError, DetectionInput, InfrastructureDetector, PixelFootprint};

/// Infrastructure type encoded by a class code.
#[must_use]
pub const fn class_type(code: u8) -> Option<InfrastructureType> {
    match code {
        1 => Some(InfrastructureType::Building),
        2 => Some(InfrastructureType::Road),
        3 => Some(InfrastructureType::Bridge),
        4 => Some(InfrastructureType::PowerLine),
        _ => None,
    }
}

/// A model that labels every pixel of the after snapshot.
pub trait SegmentationModel: Send + Sync {
    /// Produces a class map on the grid of `input.after`.
    ///
    /// # Errors
    ///
    /// Returns [`DetectionError::Model`] if inference fails.
    fn segment(&self, input: &DetectionInput<'_>) -> Result<ClassMap, DetectionError>;
}

impl SegmentationModel for ClassMap {
    fn segment(&self, _input: &DetectionInput<'_>) -> Result<ClassMap, DetectionError> {
        Ok(self.clone())
    }
}

/// Uses the segmentation carried by the scene.
#[derive(Debug, Clone, Copy, Default)]
pub struct SceneSegmentation;

impl SegmentationModel for SceneSegmentation {
    fn segment(&self, input: &DetectionInput<'_>) -> Result<ClassMap, DetectionError> {
        input
            .segmentation
            .cloned()
            .ok_or_else(|| DetectionError::Model("scene carries no class map".to_string()))
    }
}

/// Turns each connected region of one class into a detection whose
/// confidence is the region's mean class probability.
#[derive(Debug, Clone)]
pub struct ModelDetector<M: SegmentationModel> {
    model: M,
    min_pixels: usize,
}

impl<M: SegmentationModel> ModelDetector<M> {
    /// Wraps a model; regions smaller than `min_pixels` are ignored.
    #[must_use]
    pub const fn new(model: M, min_pixels: usize) -> Self {
        Self { model, min_pixels }
    }
}

impl<M: SegmentationModel> InfrastructureDetector for ModelDetector<M> {
    fn name(&self) -> &'static str {
        "model"
    }

    #[allow(clippy::cast_precision_loss)]
    fn detect(&self, input: &DetectionInput<'_>) -> Result<Vec<Detection>, DetectionError> {
        let grid = &input.after.grid;
        let map = self.model.segment(input)?;

        let expected = grid.pixel_count();
        for actual in [map.classes.len(), map.probabilities.len()] {
            if actual != expected {
                return Err(DetectionError::GridSize { expected, actual });
            }
        }

        let mut detections = Vec::new();
        for infrastructure_type in InfrastructureType::all() {
            let mask: Vec<bool> = map
                .classes
                .iter()
                .map(|c| class_type(*c) == Some(*infrastructure_type))
                .collect();

            for component in label(grid, &mask) {
                if component.pixels.len() < self.min_pixels.max(1) {
                    continue;
                }
                let sum: f64 = component
                    .pixels
                    .iter()
                    .map(|p| f64::from(map.probabilities[*p]))
                    .sum();
                let confidence = (sum / component.pixels.len() as f64).clamp(0.0, 1.0);
                detections.push(Detection {
                    infrastructure_type: *infrastructure_type,
                    footprint: PixelFootprint::new(component.pixels),
                    confidence,
                });
            }
        }

        Ok(detections)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damage_map_raster_models::{GeoBounds, RasterBandSet, RasterGrid};

    fn bands() -> RasterBandSet {
        RasterBandSet::new(RasterGrid {
            width: 4,
            height: 2,
            origin_lon: 0.0,
            origin_lat: 0.0,
            pixel_width_deg: 0.0001,
            pixel_height_deg: 0.0001,
            resolution_m: 10.0,
            crs: "EPSG:4326".to_string(),
        })
    }

    fn input<'a>(bands: &'a RasterBandSet, map: Option<&'a ClassMap>) -> DetectionInput<'a> {
        DetectionInput {
            after: bands,
            indices: None,
            area_of_interest: GeoBounds::new(-1.0, -1.0, 1.0, 1.0),
            reference_footprints: &[],
            segmentation: map,
        }
    }

    #[test]
    fn regions_become_detections_with_mean_probability() {
        let map = ClassMap {
            classes: vec![1, 1, 0, 2, 1, 1, 0, 2],
            probabilities: vec![0.8, 0.6, 0.0, 0.9, 0.8, 0.6, 0.0, 0.7],
        };
        let bands = bands();
        let detections = ModelDetector::new(map, 1).detect(&input(&bands, None)).unwrap();

        assert_eq!(detections.len(), 2);
        assert_eq!(detections[0].infrastructure_type, InfrastructureType::Building);
        assert!((detections[0].confidence - 0.7).abs() < 1e-6);
        assert_eq!(detections[1].infrastructure_type, InfrastructureType::Road);
        assert!((detections[1].confidence - 0.8).abs() < 1e-6);
    }

    #[test]
    fn wrong_sized_class_map_is_rejected() {
        let map = ClassMap {
            classes: vec![1; 3],
            probabilities: vec![1.0; 3],
        };
        let bands = bands();
        assert!(matches!(
            ModelDetector::new(map, 1).detect(&input(&bands, None)),
            Err(DetectionError::GridSize {
                expected: 8,
                actual: 3
            })
        ));
    }

    #[test]
    fn scene_segmentation_reads_the_scene_class_map() {
        let map = ClassMap {
            classes: vec![0, 3, 3, 0, 0, 3, 3, 9],
            probabilities: vec![0.0, 0.9, 0.9, 0.0, 0.0, 0.7, 0.7, 1.0],
        };
        let bands = bands();
        let detector = ModelDetector::new(SceneSegmentation, 1);

        let detections = detector.detect(&input(&bands, Some(&map))).unwrap();
        assert_eq!(detections.len(), 1);
        assert_eq!(detections[0].infrastructure_type, InfrastructureType::Bridge);
        assert_eq!(detections[0].footprint.pixels(), &[1, 2, 5, 6]);
        assert!((detections[0].confidence - 0.8).abs() < 1e-6);

        assert!(matches!(
            detector.detect(&input(&bands, None)),
            Err(DetectionError::Model(_))
        ));
    }

    #[test]
    fn unknown_codes_are_background() {
        assert_eq!(class_type(0), None);
        assert_eq!(class_type(4), Some(InfrastructureType::PowerLine));
        assert_eq!(class_type(200), None);
    }
}
