//! The damage assessment pipeline.
//!
//! Runs synchronously over one scene: index calculation, detection,
//! classification, aggregation. The engine drives it on a blocking thread
//! and records each stage as it starts.

use std::sync::Arc;

use damage_map_aggregate::aggregate;
use damage_map_assessment_models::PipelineStage;
use damage_map_classifier::classify;
use damage_map_damage_models::AssessmentResult;
use damage_map_detection::{DetectionInput, DetectionStage, InfrastructureDetector, LandUseIndex};
use damage_map_raster::compute_indices;
use damage_map_raster_models::Scene;

use crate::config::EngineConfig;
use crate::error::AssessmentError;

/// Assesses one scene.
///
/// `on_stage` is called as each stage starts. Any stage error aborts the
/// remaining stages; no partial result is returned.
///
/// # Errors
///
/// Returns [`AssessmentError`] if the scene is invalid, lacks a band,
/// carries too few valid pixels, or detection fails.
pub fn assess_scene(
    scene: &Scene,
    detector: &Arc<dyn InfrastructureDetector>,
    config: &EngineConfig,
    mut on_stage: impl FnMut(PipelineStage),
) -> Result<AssessmentResult, AssessmentError> {
    on_stage(PipelineStage::CalculatingIndices);
    let stack = compute_indices(scene, &config.raster)?;

    on_stage(PipelineStage::DetectingInfrastructure);
    let input = DetectionInput {
        after: &scene.after,
        indices: Some(&stack),
        area_of_interest: scene.area_of_interest(),
        reference_footprints: &scene.reference_footprints,
        segmentation: scene.segmentation.as_ref(),
    };
    let land_use = LandUseIndex::new(&scene.land_use);
    let detected = DetectionStage::new(Arc::clone(detector), config.detector.confidence_floor)
        .run(&input, &land_use)?;

    on_stage(PipelineStage::ClassifyingDamage);
    let classification = classify(&detected, &stack, &config.classifier);
    drop(stack);

    on_stage(PipelineStage::AggregatingSectors);
    let elements: Vec<_> = detected.into_iter().map(|d| d.element).collect();
    Ok(aggregate(
        &elements,
        &classification.events,
        &classification.unclassifiable,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{burned_scene, vegetation_scene};
    use damage_map_assessment_models::ErrorKind;
    use damage_map_damage_models::{DamageCategory, Sector, SeverityLevel};
    use damage_map_damage_models::InfrastructureType;
    use damage_map_detection::{DetectorKind, build_detector};
    use damage_map_raster_models::{Band, ClassMap, VectorFeature};

    fn run(scene: &Scene) -> (Result<AssessmentResult, AssessmentError>, Vec<PipelineStage>) {
        run_with(&EngineConfig::default(), scene)
    }

    fn run_with(
        config: &EngineConfig,
        scene: &Scene,
    ) -> (Result<AssessmentResult, AssessmentError>, Vec<PipelineStage>) {
        let detector = build_detector(&config.detector);
        let mut stages = Vec::new();
        let result = assess_scene(scene, &detector, config, |s| stages.push(s));
        (result, stages)
    }

    #[test]
    fn burned_block_is_one_heavily_damaged_residential_fire() {
        let (result, stages) = run(&burned_scene());
        let result = result.unwrap();

        assert_eq!(stages, PipelineStage::all());
        assert_eq!(result.total_elements, 1);
        assert_eq!(result.damaged_elements, 1);
        let record = &result.records[0];
        assert_eq!(record.event.category, DamageCategory::Fire);
        assert_eq!(record.event.severity, SeverityLevel::HeavilyDamaged);
        assert!((record.event.score - 0.6).abs() < 1e-6);
        assert!((record.event.deltas.nbr - (-0.6)).abs() < 1e-6);
        assert_eq!(record.element.footprint.pixel_count, 100);

        let residential = result.sector(Sector::Residential).unwrap();
        assert_eq!(residential.count(SeverityLevel::HeavilyDamaged), 1);
        assert_eq!(residential.damaged_elements, 1);
        for severity in SeverityLevel::all() {
            if *severity != SeverityLevel::HeavilyDamaged {
                assert_eq!(residential.count(*severity), 0, "{severity}");
            }
        }
        for sector in result.sectors.iter().filter(|s| s.sector != Sector::Residential) {
            assert_eq!(sector.total_elements, 0, "{}", sector.sector);
            assert_eq!(sector.damaged_elements, 0, "{}", sector.sector);
        }
    }

    #[test]
    fn degenerate_grid_fails_before_detection() {
        let mut scene = burned_scene();
        scene.before.grid.pixel_width_deg = 0.0;
        scene.after.grid.pixel_width_deg = 0.0;
        scene.reference_footprints.push(VectorFeature {
            tags: [("highway".to_string(), "primary".to_string())].into(),
            ring: vec![[35.0005, 36.1995], [35.0015, 36.1985]],
        });

        let (result, stages) = run(&scene);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ProcessingError);
        assert_eq!(stages, vec![PipelineStage::CalculatingIndices]);
    }

    #[test]
    fn scene_class_map_drives_detection() {
        let mut scene = burned_scene();
        let grid = scene.after.grid.clone();
        let mut classes = vec![0; grid.pixel_count()];
        let mut probabilities = vec![0.0; grid.pixel_count()];
        for row in 5..15 {
            for col in 5..15 {
                classes[grid.index(col, row)] = 3;
                probabilities[grid.index(col, row)] = 0.9;
            }
        }
        scene.segmentation = Some(ClassMap {
            classes,
            probabilities,
        });

        let mut config = EngineConfig::default();
        config.detector.kind = DetectorKind::Model;
        for config in [config, EngineConfig::default()] {
            let result = run_with(&config, &scene).0.unwrap();
            assert_eq!(result.total_elements, 1);
            let record = &result.records[0];
            assert_eq!(record.element.infrastructure_type, InfrastructureType::Bridge);
            assert_eq!(record.element.sector, Sector::Infrastructure);
            assert!((record.element.confidence - 0.9).abs() < 1e-6);
            assert_eq!(record.event.category, DamageCategory::Fire);
            let infrastructure = result.sector(Sector::Infrastructure).unwrap();
            assert_eq!(infrastructure.count(SeverityLevel::HeavilyDamaged), 1);
        }
    }

    #[test]
    fn model_detector_without_class_map_fails() {
        let mut config = EngineConfig::default();
        config.detector.kind = DetectorKind::Model;
        let (result, stages) = run_with(&config, &burned_scene());
        assert_eq!(result.unwrap_err().kind(), ErrorKind::ProcessingError);
        assert_eq!(stages.last(), Some(&PipelineStage::DetectingInfrastructure));
    }

    #[test]
    fn scene_without_infrastructure_completes_empty() {
        let (result, _) = run(&vegetation_scene());
        let result = result.unwrap();
        assert_eq!(result.total_elements, 0);
        assert_eq!(result.sectors.len(), Sector::all().len());
    }

    #[test]
    fn missing_band_aborts_before_detection() {
        let mut scene = burned_scene();
        scene.before.bands.remove(&Band::Swir2);

        let (result, stages) = run(&scene);
        let error = result.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::MissingBandError);
        assert_eq!(stages, vec![PipelineStage::CalculatingIndices]);
    }

    #[test]
    fn fully_clouded_scene_is_insufficient_data() {
        let mut scene = burned_scene();
        let count = scene.after.grid.pixel_count();
        scene.after.insert(Band::Scl, vec![9.0; count]).unwrap();

        let (result, _) = run(&scene);
        assert_eq!(result.unwrap_err().kind(), ErrorKind::InsufficientDataError);
    }
}
