//! Land-use zones as sector hints.
//!
//! Zones are held in an R-tree keyed by bounding box; a lookup narrows
//! candidates by envelope and then runs an exact point-in-polygon test.
//! Where zones overlap, the smallest one wins.

use damage_map_damage_models::Sector;
use damage_map_raster_models::VectorFeature;
use geo::{Area, BoundingRect, Contains, LineString, MultiPolygon, Point, Polygon};
use geojson::GeoJson;
use rstar::{AABB, RTree, RTreeObject};

use crate::DetectionError;

/// A zone stored in the R-tree with its sector.
struct ZoneEntry {
    sector: Sector,
    area: f64,
    envelope: AABB<[f64; 2]>,
    polygon: Polygon<f64>,
}

impl RTreeObject for ZoneEntry {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        self.envelope
    }
}

/// Sector implied by a land-use feature's tags.
#[must_use]
pub fn zone_sector(feature: &VectorFeature) -> Option<Sector> {
    if let Some(landuse) = feature.tag("landuse") {
        return match landuse {
            "residential" => Some(Sector::Residential),
            "commercial" | "retail" | "industrial" => Some(Sector::Commercial),
            "farmland" | "farmyard" | "orchard" | "meadow" | "vineyard"
            | "greenhouse_horticulture" => Some(Sector::Agricultural),
            "reservoir" | "basin" => Some(Sector::WaterResources),
            _ => None,
        };
    }
    match feature.tag("man_made") {
        Some("reservoir_covered" | "water_works" | "water_tower") => Some(Sector::WaterResources),
        _ => None,
    }
}

/// Spatial index over land-use zones.
pub struct LandUseIndex {
    zones: RTree<ZoneEntry>,
}

impl Default for LandUseIndex {
    fn default() -> Self {
        Self {
            zones: RTree::new(),
        }
    }
}

impl std::fmt::Debug for LandUseIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LandUseIndex")
            .field("zones", &self.zones.size())
            .finish()
    }
}

impl LandUseIndex {
    /// Builds the index from tagged zone features.
    ///
    /// Features without a recognised land-use tag or with fewer than three
    /// ring positions are skipped.
    #[must_use]
    pub fn new(features: &[VectorFeature]) -> Self {
        let mut entries = Vec::new();

        for feature in features {
            let Some(sector) = zone_sector(feature) else {
                continue;
            };
            if feature.ring.len() < 3 {
                log::warn!("Skipping degenerate land-use zone {:?}", feature.tags);
                continue;
            }

            let polygon = Polygon::new(LineString::from(feature.ring.clone()), vec![]);
            let Some(rect) = polygon.bounding_rect() else {
                continue;
            };

            entries.push(ZoneEntry {
                sector,
                area: polygon.unsigned_area(),
                envelope: AABB::from_corners(
                    [rect.min().x, rect.min().y],
                    [rect.max().x, rect.max().y],
                ),
                polygon,
            });
        }

        Self {
            zones: RTree::bulk_load(entries),
        }
    }

    /// Number of indexed zones.
    #[must_use]
    pub fn len(&self) -> usize {
        self.zones.size()
    }

    /// Whether no zone is indexed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.zones.size() == 0
    }

    /// Sector of the smallest zone containing the point.
    #[must_use]
    pub fn lookup(&self, lon: f64, lat: f64) -> Option<Sector> {
        let point = Point::new(lon, lat);
        let query_env = AABB::from_point([lon, lat]);

        let mut best: Option<&ZoneEntry> = None;
        for entry in self.zones.locate_in_envelope_intersecting(&query_env) {
            if entry.polygon.contains(&point) {
                match best {
                    None => best = Some(entry),
                    Some(current) if entry.area < current.area => best = Some(entry),
                    _ => {}
                }
            }
        }

        best.map(|e| e.sector)
    }
}

/// Parses a `GeoJSON` document into tagged vector features.
///
/// Polygons contribute their exterior ring, multi-polygons one feature
/// per member, and line strings their positions. String, number, and
/// boolean properties become tags.
///
/// # Errors
///
/// Returns [`DetectionError::VectorLayer`] if the document is not valid
/// `GeoJSON`.
pub fn features_from_geojson(source: &str) -> Result<Vec<VectorFeature>, DetectionError> {
    let geojson: GeoJson = source
        .parse()
        .map_err(|e: geojson::Error| DetectionError::VectorLayer(e.to_string()))?;

    let features = match geojson {
        GeoJson::FeatureCollection(collection) => collection.features,
        GeoJson::Feature(feature) => vec![feature],
        GeoJson::Geometry(geometry) => vec![geojson::Feature {
            bbox: None,
            geometry: Some(geometry),
            id: None,
            properties: None,
            foreign_members: None,
        }],
    };

    let mut out = Vec::new();
    for feature in features {
        let tags = feature
            .properties
            .iter()
            .flatten()
            .filter_map(|(key, value)| {
                let value = match value {
                    serde_json::Value::String(s) => s.clone(),
                    serde_json::Value::Number(n) => n.to_string(),
                    serde_json::Value::Bool(b) => b.to_string(),
                    _ => return None,
                };
                Some((key.clone(), value))
            })
            .collect::<std::collections::BTreeMap<_, _>>();

        let Some(geometry) = feature.geometry else {
            continue;
        };
        let Ok(geometry) = geo::Geometry::<f64>::try_from(geometry) else {
            log::warn!("Skipping feature with unsupported geometry");
            continue;
        };

        let rings: Vec<Vec<[f64; 2]>> = match geometry {
            geo::Geometry::Polygon(p) => vec![ring_positions(p.exterior())],
            geo::Geometry::MultiPolygon(MultiPolygon(polygons)) => polygons
                .iter()
                .map(|p| ring_positions(p.exterior()))
                .collect(),
            geo::Geometry::LineString(line) => vec![ring_positions(&line)],
            geo::Geometry::Point(point) => vec![vec![[point.x(), point.y()]]],
            _ => continue,
        };

        out.extend(rings.into_iter().map(|ring| VectorFeature {
            tags: tags.clone(),
            ring,
        }));
    }

    Ok(out)
}

fn ring_positions(line: &LineString<f64>) -> Vec<[f64; 2]> {
    line.coords().map(|c| [c.x, c.y]).collect()
}
