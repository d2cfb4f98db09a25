#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Raster grid, band, and scene types for before/after imagery.
//!
//! A [`Scene`] is the unit handed to the damage assessment engine: two
//! co-registered [`RasterBandSet`]s (before and after the event) sharing
//! one [`RasterGrid`], plus optional vector context (land-use zones and
//! reference footprints) in the same coordinate reference.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Default coordinate reference label for scene grids.
pub const DEFAULT_CRS: &str = "EPSG:4326";

/// Tolerance used when comparing georeferencing parameters of two grids.
const GRID_EPSILON: f64 = 1e-9;

/// A spectral (or auxiliary) band of a multispectral snapshot.
///
/// Names follow Sentinel-2 conventions: `Blue` = B2, `Green` = B3,
/// `Red` = B4, `Nir` = B8, `Swir1` = B11, `Swir2` = B12, and `Scl` is the
/// scene classification layer used for cloud masking.
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
pub enum Band {
    /// Blue reflectance (B2).
    Blue,
    /// Green reflectance (B3).
    Green,
    /// Red reflectance (B4).
    Red,
    /// Near-infrared reflectance (B8).
    Nir,
    /// Short-wave infrared 1 (B11).
    Swir1,
    /// Short-wave infrared 2 (B12).
    Swir2,
    /// Scene classification layer (integer classes stored as floats).
    Scl,
}

impl Band {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Blue,
            Self::Green,
            Self::Red,
            Self::Nir,
            Self::Swir1,
            Self::Swir2,
            Self::Scl,
        ]
    }

    /// Whether this band carries reflectance values (as opposed to a
    /// classification layer).
    #[must_use]
    pub const fn is_reflectance(self) -> bool {
        !matches!(self, Self::Scl)
    }
}

/// Which side of the event a snapshot was acquired on.
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
pub enum Snapshot {
    /// Pre-event baseline.
    Before,
    /// Post-event acquisition.
    After,
}

/// Geographic bounding box in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoBounds {
    /// Western longitude boundary.
    pub west: f64,
    /// Southern latitude boundary.
    pub south: f64,
    /// Eastern longitude boundary.
    pub east: f64,
    /// Northern latitude boundary.
    pub north: f64,
}

impl GeoBounds {
    /// Creates a new bounding box from the given coordinates.
    #[must_use]
    pub const fn new(west: f64, south: f64, east: f64, north: f64) -> Self {
        Self {
            west,
            south,
            east,
            north,
        }
    }

    /// Whether the point lies inside the box (edges inclusive).
    #[must_use]
    pub fn contains(&self, lon: f64, lat: f64) -> bool {
        lon >= self.west && lon <= self.east && lat >= self.south && lat <= self.north
    }
}

/// Georeferenced pixel grid shared by the bands of a snapshot.
///
/// Pixels are stored row-major starting at the top-left corner
/// (`origin_lon`, `origin_lat`). Longitude grows with the column index,
/// latitude shrinks with the row index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterGrid {
    /// Number of columns.
    pub width: u32,
    /// Number of rows.
    pub height: u32,
    /// Longitude of the top-left corner.
    pub origin_lon: f64,
    /// Latitude of the top-left corner.
    pub origin_lat: f64,
    /// Pixel width in degrees of longitude.
    pub pixel_width_deg: f64,
    /// Pixel height in degrees of latitude.
    pub pixel_height_deg: f64,
    /// Ground sample distance in metres (square pixels).
    pub resolution_m: f64,
    /// Coordinate reference label.
    #[serde(default = "default_crs")]
    pub crs: String,
}

fn default_crs() -> String {
    DEFAULT_CRS.to_string()
}

impl RasterGrid {
    /// Total number of pixels in the grid.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major index of the pixel at (`col`, `row`).
    #[must_use]
    pub const fn index(&self, col: u32, row: u32) -> usize {
        row as usize * self.width as usize + col as usize
    }

    /// Column and row of a row-major pixel index.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub const fn position(&self, index: usize) -> (u32, u32) {
        let width = self.width as usize;
        ((index % width) as u32, (index / width) as u32)
    }

    /// Longitude/latitude of the centre of pixel (`col`, `row`).
    #[must_use]
    pub fn pixel_center(&self, col: u32, row: u32) -> (f64, f64) {
        (
            (f64::from(col) + 0.5).mul_add(self.pixel_width_deg, self.origin_lon),
            (f64::from(row) + 0.5).mul_add(-self.pixel_height_deg, self.origin_lat),
        )
    }

    /// Row-major index of the pixel containing a position, if on the grid.
    #[must_use]
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn pixel_at(&self, lon: f64, lat: f64) -> Option<usize> {
        let col = ((lon - self.origin_lon) / self.pixel_width_deg).floor();
        let row = ((self.origin_lat - lat) / self.pixel_height_deg).floor();
        if !col.is_finite() || !row.is_finite() || col < 0.0 || row < 0.0 {
            return None;
        }
        if col >= f64::from(self.width) || row >= f64::from(self.height) {
            return None;
        }
        Some(self.index(col as u32, row as u32))
    }

    /// Ground area covered by one pixel in square metres.
    #[must_use]
    pub fn pixel_area_m2(&self) -> f64 {
        self.resolution_m * self.resolution_m
    }

    /// Geographic extent of the whole grid.
    #[must_use]
    pub fn extent(&self) -> GeoBounds {
        GeoBounds::new(
            self.origin_lon,
            f64::from(self.height).mul_add(-self.pixel_height_deg, self.origin_lat),
            f64::from(self.width).mul_add(self.pixel_width_deg, self.origin_lon),
            self.origin_lat,
        )
    }

    /// Checks that the grid has pixels and a usable georeference.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidGrid`] for a zero width or height, a
    /// non-finite origin, or a pixel size or resolution that is not a
    /// positive finite number.
    pub fn validate(&self) -> Result<(), SceneError> {
        if self.width == 0 || self.height == 0 {
            return Err(SceneError::InvalidGrid(format!(
                "{}x{} grid has no pixels",
                self.width, self.height
            )));
        }
        if !self.origin_lon.is_finite() || !self.origin_lat.is_finite() {
            return Err(SceneError::InvalidGrid(format!(
                "origin ({}, {}) is not finite",
                self.origin_lon, self.origin_lat
            )));
        }
        for (name, value) in [
            ("pixel_width_deg", self.pixel_width_deg),
            ("pixel_height_deg", self.pixel_height_deg),
            ("resolution_m", self.resolution_m),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(SceneError::InvalidGrid(format!(
                    "{name} must be positive, got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Whether `other` describes the same extent, resolution, and pixel
    /// count.
    #[must_use]
    pub fn is_aligned_with(&self, other: &Self) -> bool {
        self.width == other.width
            && self.height == other.height
            && self.crs == other.crs
            && (self.origin_lon - other.origin_lon).abs() < GRID_EPSILON
            && (self.origin_lat - other.origin_lat).abs() < GRID_EPSILON
            && (self.pixel_width_deg - other.pixel_width_deg).abs() < GRID_EPSILON
            && (self.pixel_height_deg - other.pixel_height_deg).abs() < GRID_EPSILON
            && (self.resolution_m - other.resolution_m).abs() < GRID_EPSILON
    }
}

/// Named collection of aligned bands for a single snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterBandSet {
    /// Grid shared by every band in the set.
    pub grid: RasterGrid,
    /// Row-major samples per band; each holds `grid.pixel_count()` values.
    pub bands: BTreeMap<Band, Vec<f32>>,
}

impl RasterBandSet {
    /// Creates an empty band set on the given grid.
    #[must_use]
    pub const fn new(grid: RasterGrid) -> Self {
        Self {
            grid,
            bands: BTreeMap::new(),
        }
    }

    /// Creates a band set where each listed band holds a constant value.
    #[must_use]
    pub fn uniform(grid: RasterGrid, values: &[(Band, f32)]) -> Self {
        let count = grid.pixel_count();
        let bands = values
            .iter()
            .map(|(band, value)| (*band, vec![*value; count]))
            .collect();
        Self { grid, bands }
    }

    /// Adds (or replaces) a band.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::BandLength`] if `values` does not hold exactly
    /// one sample per grid pixel.
    pub fn insert(&mut self, band: Band, values: Vec<f32>) -> Result<(), SceneError> {
        let expected = self.grid.pixel_count();
        if values.len() != expected {
            return Err(SceneError::BandLength {
                band,
                expected,
                actual: values.len(),
            });
        }
        self.bands.insert(band, values);
        Ok(())
    }

    /// Returns the samples of `band`, if present.
    #[must_use]
    pub fn band(&self, band: Band) -> Option<&[f32]> {
        self.bands.get(&band).map(Vec::as_slice)
    }

    /// Mutable access to the samples of `band`, if present.
    pub fn band_mut(&mut self, band: Band) -> Option<&mut [f32]> {
        self.bands.get_mut(&band).map(Vec::as_mut_slice)
    }

    /// Checks the grid and that every band has one sample per pixel.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidGrid`] for an unusable grid, or
    /// [`SceneError::BandLength`] for the first band of the wrong length.
    pub fn validate(&self) -> Result<(), SceneError> {
        self.grid.validate()?;
        let expected = self.grid.pixel_count();
        for (band, values) in &self.bands {
            if values.len() != expected {
                return Err(SceneError::BandLength {
                    band: *band,
                    expected,
                    actual: values.len(),
                });
            }
        }
        Ok(())
    }
}

/// A vector feature with OSM-style tags and a single exterior ring of
/// `[lon, lat]` positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorFeature {
    /// Key/value tags (e.g. `landuse=farmland`, `building=yes`).
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
    /// Exterior ring; closing the ring is optional.
    pub ring: Vec<[f64; 2]>,
}

impl VectorFeature {
    /// Returns the value of `key`, if tagged.
    #[must_use]
    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Per-pixel output of a segmentation model on the after snapshot.
///
/// Class codes: 0 background, 1 building, 2 road, 3 bridge, 4 power line.
/// Any other code is treated as background.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMap {
    /// Row-major class codes.
    pub classes: Vec<u8>,
    /// Row-major probability of the assigned class, in [0, 1].
    pub probabilities: Vec<f32>,
}

/// A co-registered before/after image pair with optional vector context.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Pre-event bands.
    pub before: RasterBandSet,
    /// Post-event bands.
    pub after: RasterBandSet,
    /// Area of interest; the full grid extent when absent.
    #[serde(default)]
    pub area_of_interest: Option<GeoBounds>,
    /// Land-use zones used as sector hints.
    #[serde(default)]
    pub land_use: Vec<VectorFeature>,
    /// Known infrastructure footprints (e.g. from `OpenStreetMap`).
    #[serde(default)]
    pub reference_footprints: Vec<VectorFeature>,
    /// Segmentation of the after snapshot produced outside the engine.
    #[serde(default)]
    pub segmentation: Option<ClassMap>,
}

impl Scene {
    /// Creates a scene with no vector context.
    #[must_use]
    pub const fn new(before: RasterBandSet, after: RasterBandSet) -> Self {
        Self {
            before,
            after,
            area_of_interest: None,
            land_use: Vec::new(),
            reference_footprints: Vec::new(),
            segmentation: None,
        }
    }

    /// The area of interest, defaulting to the after-snapshot extent.
    #[must_use]
    pub fn area_of_interest(&self) -> GeoBounds {
        self.area_of_interest
            .unwrap_or_else(|| self.after.grid.extent())
    }

    /// Checks grids and band lengths on both snapshots and that both share
    /// one grid.
    ///
    /// # Errors
    ///
    /// Returns [`SceneError::InvalidGrid`], [`SceneError::BandLength`], or
    /// [`SceneError::GridMismatch`].
    pub fn validate(&self) -> Result<(), SceneError> {
        self.before.validate()?;
        self.after.validate()?;
        if !self.before.grid.is_aligned_with(&self.after.grid) {
            return Err(SceneError::GridMismatch {
                before: format!(
                    "{}x{} @ {} m",
                    self.before.grid.width, self.before.grid.height, self.before.grid.resolution_m
                ),
                after: format!(
                    "{}x{} @ {} m",
                    self.after.grid.width, self.after.grid.height, self.after.grid.resolution_m
                ),
            });
        }
        Ok(())
    }
}

/// Structural problems with a scene or band set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SceneError {
    /// A band does not hold one sample per pixel.
    BandLength {
        /// Offending band.
        band: Band,
        /// Expected sample count.
        expected: usize,
        /// Actual sample count.
        actual: usize,
    },
    /// The grid has no pixels or an unusable pixel size.
    InvalidGrid(String),
    /// Before and after snapshots are not on the same grid.
    GridMismatch {
        /// Description of the before grid.
        before: String,
        /// Description of the after grid.
        after: String,
    },
}

impl fmt::Display for SceneError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::BandLength {
                band,
                expected,
                actual,
            } => write!(f, "band {band} has {actual} samples, expected {expected}"),
            Self::InvalidGrid(reason) => write!(f, "invalid grid: {reason}"),
            Self::GridMismatch { before, after } => write!(
                f,
                "before/after grids differ (before {before}, after {after})"
            ),
        }
    }
}

impl std::error::Error for SceneError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(width: u32, height: u32) -> RasterGrid {
        RasterGrid {
            width,
            height,
            origin_lon: -63.15,
            origin_lat: 18.10,
            pixel_width_deg: 0.0001,
            pixel_height_deg: 0.0001,
            resolution_m: 10.0,
            crs: DEFAULT_CRS.to_string(),
        }
    }

    #[test]
    fn index_and_position_are_inverse() {
        let g = grid(7, 5);
        for row in 0..5 {
            for col in 0..7 {
                assert_eq!(g.position(g.index(col, row)), (col, row));
            }
        }
    }

    #[test]
    fn extent_covers_all_pixel_centres() {
        let g = grid(20, 10);
        let extent = g.extent();
        let (lon, lat) = g.pixel_center(19, 9);
        assert!(extent.contains(lon, lat));
        let (lon, lat) = g.pixel_center(0, 0);
        assert!(extent.contains(lon, lat));
        assert!((extent.east - (-63.148)).abs() < 1e-9);
        assert!((extent.south - 18.099).abs() < 1e-9);
    }

    #[test]
    fn pixel_at_finds_containing_pixel() {
        let g = grid(20, 10);
        let (lon, lat) = g.pixel_center(3, 7);
        assert_eq!(g.pixel_at(lon, lat), Some(g.index(3, 7)));
        assert_eq!(g.pixel_at(-63.2, 18.05), None);
        assert_eq!(g.pixel_at(-63.14, 18.099_5), None);
    }

    #[test]
    fn insert_rejects_wrong_length() {
        let mut set = RasterBandSet::new(grid(4, 4));
        let err = set.insert(Band::Red, vec![0.0; 15]).unwrap_err();
        assert_eq!(
            err,
            SceneError::BandLength {
                band: Band::Red,
                expected: 16,
                actual: 15
            }
        );
        assert!(set.insert(Band::Red, vec![0.0; 16]).is_ok());
    }

    #[test]
    fn scene_validate_detects_grid_mismatch() {
        let before = RasterBandSet::uniform(grid(4, 4), &[(Band::Red, 0.1)]);
        let after = RasterBandSet::uniform(grid(4, 5), &[(Band::Red, 0.1)]);
        let scene = Scene::new(before, after);
        assert!(matches!(
            scene.validate(),
            Err(SceneError::GridMismatch { .. })
        ));
    }

    #[test]
    fn degenerate_grids_are_rejected() {
        let mut zero_width = grid(4, 4);
        zero_width.pixel_width_deg = 0.0;
        let mut negative_resolution = grid(4, 4);
        negative_resolution.resolution_m = -10.0;
        let mut nan_height = grid(4, 4);
        nan_height.pixel_height_deg = f64::NAN;
        let empty = grid(0, 4);

        for g in [zero_width, negative_resolution, nan_height, empty] {
            assert!(matches!(g.validate(), Err(SceneError::InvalidGrid(_))), "{g:?}");
            let set = RasterBandSet::new(g.clone());
            let scene = Scene::new(set.clone(), set);
            assert!(matches!(scene.validate(), Err(SceneError::InvalidGrid(_))));
        }
        assert!(grid(4, 4).validate().is_ok());
    }

    #[test]
    fn band_names_are_snake_case() {
        assert_eq!(Band::Swir1.to_string(), "swir1");
        assert_eq!("nir".parse::<Band>().unwrap(), Band::Nir);
        let json = serde_json::to_string(&Band::Scl).unwrap();
        assert_eq!(json, "\"scl\"");
    }

    #[test]
    fn scene_defaults_area_of_interest_to_extent() {
        let g = grid(4, 4);
        let scene = Scene::new(
            RasterBandSet::uniform(g.clone(), &[]),
            RasterBandSet::uniform(g.clone(), &[]),
        );
        assert_eq!(scene.area_of_interest(), g.extent());
    }
}
