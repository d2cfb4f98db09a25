//! Synthetic scenes shared by the engine tests.

use damage_map_raster_models::{Band, RasterBandSet, RasterGrid, Scene};

const VEGETATION: [(Band, f32); 5] = [
    (Band::Green, 0.1),
    (Band::Red, 0.1),
    (Band::Nir, 0.5),
    (Band::Swir1, 0.25),
    (Band::Swir2, 0.15),
];

pub fn grid() -> RasterGrid {
    RasterGrid {
        width: 20,
        height: 20,
        origin_lon: 35.0,
        origin_lat: 36.2,
        pixel_width_deg: 0.0001,
        pixel_height_deg: 0.0001,
        resolution_m: 10.0,
        crs: "EPSG:4326".to_string(),
    }
}

/// Vegetated scene with no change between snapshots.
pub fn vegetation_scene() -> Scene {
    let bands = RasterBandSet::uniform(grid(), &VEGETATION);
    Scene::new(bands.clone(), bands)
}

fn paint(bands: &mut RasterBandSet, values: &[(Band, f32)]) {
    let grid = bands.grid.clone();
    for (band, value) in values {
        if let Some(samples) = bands.band_mut(*band) {
            for row in 5..15 {
                for col in 5..15 {
                    samples[grid.index(col, row)] = *value;
                }
            }
        }
    }
}

/// Vegetation with a 10x10 built-up block whose SWIR2 jumps from 0.2 to
/// 0.8, a burn giving ΔNBR = -0.6 and no other change.
pub fn burned_scene() -> Scene {
    let built = [
        (Band::Green, 0.1),
        (Band::Red, 0.25),
        (Band::Nir, 0.2),
        (Band::Swir1, 0.35),
    ];

    let mut before = RasterBandSet::uniform(grid(), &VEGETATION);
    paint(&mut before, &built);
    paint(&mut before, &[(Band::Swir2, 0.2)]);

    let mut after = RasterBandSet::uniform(grid(), &VEGETATION);
    paint(&mut after, &built);
    paint(&mut after, &[(Band::Swir2, 0.8)]);

    Scene::new(before, after)
}
