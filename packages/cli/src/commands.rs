//! Offline commands working directly on scene files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use damage_map_assessment::{EngineConfig, ExportGeometry, assess_scene, damage_features};
use damage_map_assessment_models::PipelineStage;
use damage_map_cli_utils::{IndicatifProgress, MultiProgress};
use damage_map_damage_models::AssessmentResult;
use damage_map_detection::{DetectorKind, build_detector, features_from_geojson};
use damage_map_raster::{FileBandStore, SceneFormat, compute_indices, read_scene_file};
use damage_map_raster_models::{ClassMap, RasterBandSet, Scene, VectorFeature};

/// Scene file plus optional vector layers merged into it.
#[derive(Debug, Clone, clap::Args)]
pub struct SceneArgs {
    /// Scene file (`.json` or `.msgpack`)
    #[arg(long)]
    pub scene: PathBuf,
    /// `GeoJSON` land-use zones used to assign building sectors
    #[arg(long)]
    pub land_use: Option<PathBuf>,
    /// `GeoJSON` reference footprints (buildings, roads, bridges, power lines)
    #[arg(long)]
    pub footprints: Option<PathBuf>,
    /// JSON segmentation class map (`classes`, `probabilities`) of the
    /// after snapshot
    #[arg(long)]
    pub class_map: Option<PathBuf>,
}

async fn read_layer(
    path: &Path,
    layer: &mut Vec<VectorFeature>,
) -> Result<(), Box<dyn std::error::Error>> {
    let text = tokio::fs::read_to_string(path).await?;
    let features = features_from_geojson(&text)?;
    log::info!("Read {} features from {}", features.len(), path.display());
    layer.extend(features);
    Ok(())
}

/// Reads a scene and merges the vector layers named in `args`.
///
/// # Errors
///
/// Returns an error if a file cannot be read or parsed.
pub async fn load_scene(args: &SceneArgs) -> Result<Scene, Box<dyn std::error::Error>> {
    let mut scene = read_scene_file(&args.scene).await?;
    if let Some(path) = &args.land_use {
        read_layer(path, &mut scene.land_use).await?;
    }
    if let Some(path) = &args.footprints {
        read_layer(path, &mut scene.reference_footprints).await?;
    }
    if let Some(path) = &args.class_map {
        let map: ClassMap = serde_json::from_slice(&tokio::fs::read(path).await?)?;
        log::info!("Read class map of {} pixels from {}", map.classes.len(), path.display());
        scene.segmentation = Some(map);
    }
    Ok(scene)
}

/// Options of the `assess` command.
#[derive(Debug, Clone, clap::Args)]
pub struct AssessArgs {
    #[command(flatten)]
    pub scene: SceneArgs,
    /// Detector override (`auto`, `spectral_rules`, `footprints`, `model`)
    #[arg(long)]
    pub detector: Option<DetectorKind>,
    /// Write the full result as JSON to this file
    #[arg(long)]
    pub output: Option<PathBuf>,
    /// Write damaged elements as `GeoJSON` to this file
    #[arg(long)]
    pub geojson: Option<PathBuf>,
    /// Geometry for the `GeoJSON` export (`centroid`, `footprint`)
    #[arg(long, default_value = "centroid")]
    pub geometry: ExportGeometry,
}

/// Runs the full pipeline on a scene file and prints the summary.
///
/// # Errors
///
/// Returns an error if the scene cannot be loaded, the pipeline fails, or
/// an output file cannot be written.
#[allow(clippy::cast_possible_truncation)]
pub async fn assess(
    multi: &MultiProgress,
    mut config: EngineConfig,
    args: AssessArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(kind) = args.detector {
        config.detector.kind = kind;
    }

    let loading = IndicatifProgress::spinner(multi, "Loading scene");
    let scene = load_scene(&args.scene).await?;
    loading.finish_and_clear();

    let stages =
        IndicatifProgress::steps_bar(multi, "Assessing", PipelineStage::all().len() as u64);
    let detector = build_detector(&config.detector);
    let bar = Arc::clone(&stages);
    let result = tokio::task::spawn_blocking(move || {
        assess_scene(&scene, &detector, &config, |stage| {
            bar.set_position(stage.position() as u64);
            bar.set_message(stage.description().to_string());
        })
    })
    .await??;
    stages.set_position(PipelineStage::all().len() as u64);
    stages.finish("Assessment complete".to_string());

    print_summary(&result);

    if let Some(path) = &args.output {
        tokio::fs::write(path, serde_json::to_vec_pretty(&result)?).await?;
        log::info!("Wrote result to {}", path.display());
    }
    if let Some(path) = &args.geojson {
        let collection = damage_features(&result, args.geometry);
        tokio::fs::write(path, serde_json::to_vec_pretty(&collection)?).await?;
        log::info!(
            "Wrote {} damaged elements to {}",
            collection.features.len(),
            path.display()
        );
    }

    Ok(())
}

fn print_summary(result: &AssessmentResult) {
    println!();
    println!(
        "Elements: {} ({} damaged, {} undamaged, {} unclassifiable)",
        result.total_elements,
        result.damaged_elements,
        result.undamaged_elements,
        result.unclassifiable_elements
    );

    println!();
    println!("By type:");
    for (kind, count) in &result.infrastructure_by_type {
        println!("  {:<20} {count:>6}", kind.as_ref());
    }

    println!();
    println!("By severity:");
    for (severity, count) in &result.severity_distribution {
        println!("  {:<20} {count:>6}", severity.as_ref());
    }

    println!();
    println!("By category:");
    for (category, count) in &result.damage_by_category {
        println!("  {:<20} {count:>6}", category.as_ref());
    }

    println!();
    println!(
        "  {:<18} {:>7} {:>8} {:>8}",
        "sector", "total", "damaged", "percent"
    );
    for sector in &result.sectors {
        println!(
            "  {:<18} {:>7} {:>8} {:>7.1}%",
            sector.sector.as_ref(),
            sector.total_elements,
            sector.damaged_elements,
            sector.damage_percent()
        );
    }

    if !result.records.is_empty() {
        println!();
        println!("Damage locations:");
        for record in &result.records {
            let centroid = record.element.footprint.centroid;
            println!(
                "  {} {} {} {} ({:.6}, {:.6})",
                record.element.id,
                record.element.infrastructure_type,
                record.event.category,
                record.event.severity,
                centroid.longitude,
                centroid.latitude
            );
        }
    }
}

fn band_list(bands: &RasterBandSet) -> String {
    bands
        .bands
        .keys()
        .map(AsRef::as_ref)
        .collect::<Vec<&str>>()
        .join(", ")
}

/// Checks a scene file and reports its grid, bands, and valid share.
///
/// # Errors
///
/// Returns an error if the scene cannot be loaded, is structurally
/// invalid, lacks an index band, or has too few valid pixels.
pub async fn validate_scene(
    config: &EngineConfig,
    args: &SceneArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let scene = load_scene(args).await?;
    let grid = &scene.after.grid;

    println!(
        "Grid: {}x{} at {} m ({})",
        grid.width, grid.height, grid.resolution_m, grid.crs
    );
    println!("Before bands: {}", band_list(&scene.before));
    println!("After bands: {}", band_list(&scene.after));
    println!(
        "Land-use zones: {}, reference footprints: {}",
        scene.land_use.len(),
        scene.reference_footprints.len()
    );
    if let Some(map) = &scene.segmentation {
        println!("Class map: {} pixels", map.classes.len());
    }

    let stack = compute_indices(&scene, &config.raster)?;
    println!("Valid pixels: {:.1}%", stack.valid_fraction() * 100.0);
    println!("Scene is ready for assessment");

    Ok(())
}

/// Options of the `import-scene` command.
#[derive(Debug, Clone, clap::Args)]
pub struct ImportArgs {
    /// Project id the scene belongs to
    #[arg(long)]
    pub project: String,
    #[command(flatten)]
    pub scene: SceneArgs,
    /// Store as JSON instead of `MessagePack`
    #[arg(long)]
    pub json: bool,
}

/// Copies a scene (with merged vector layers) into the configured scenes
/// directory under a project id.
///
/// # Errors
///
/// Returns an error if the scene cannot be loaded, is invalid, or cannot
/// be written.
pub async fn import_scene(
    config: &EngineConfig,
    args: &ImportArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let scene = load_scene(&args.scene).await?;
    scene.validate()?;

    let format = if args.json {
        SceneFormat::Json
    } else {
        SceneFormat::MessagePack
    };
    let store = FileBandStore::new(config.storage.scenes_dir.clone());
    let path = store.save_scene(&args.project, &scene, format).await?;
    println!("Stored scene for project {} at {}", args.project, path.display());

    Ok(())
}
