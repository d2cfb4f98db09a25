#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Infrastructure, damage, and sector types shared across the pipeline.
//!
//! These are the records the detector, classifier, and aggregator pass
//! between each other, and the shape of a completed
//! [`AssessmentResult`].

use std::collections::BTreeMap;

use damage_map_raster_models::GeoBounds;
use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumString};

/// Kind of detected infrastructure.
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
pub enum InfrastructureType {
    /// Residential, commercial, or industrial structure.
    Building,
    /// Paved or unpaved road segment.
    Road,
    /// Road or rail crossing over water.
    Bridge,
    /// Overhead transmission line corridor.
    PowerLine,
}

impl InfrastructureType {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Building, Self::Road, Self::Bridge, Self::PowerLine]
    }

    /// Sector assigned when no land-use hint applies.
    #[must_use]
    pub const fn default_sector(self) -> Sector {
        match self {
            Self::Building => Sector::Residential,
            Self::Road | Self::Bridge | Self::PowerLine => Sector::Infrastructure,
        }
    }

    /// Damage category used for structural change on this type.
    #[must_use]
    pub const fn structural_category(self) -> DamageCategory {
        match self {
            Self::Building => DamageCategory::Structural,
            Self::Road | Self::Bridge | Self::PowerLine => DamageCategory::Infrastructure,
        }
    }
}

/// Functional bucket used for aggregate reporting.
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
pub enum Sector {
    /// Housing.
    Residential,
    /// Retail, offices, and industry.
    Commercial,
    /// Transport and utility networks.
    Infrastructure,
    /// Farmland and related structures.
    Agricultural,
    /// Reservoirs, canals, and water supply.
    WaterResources,
}

impl Sector {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Residential,
            Self::Commercial,
            Self::Infrastructure,
            Self::Agricultural,
            Self::WaterResources,
        ]
    }
}

/// What kind of change an element suffered.
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
pub enum DamageCategory {
    /// Built-up signature change on a building.
    Structural,
    /// New open water.
    Flooding,
    /// Burn scar.
    Fire,
    /// Loss of vegetation cover.
    VegetationLoss,
    /// Built-up signature change on a road, bridge, or power line.
    Infrastructure,
}

impl DamageCategory {
    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Structural,
            Self::Flooding,
            Self::Fire,
            Self::VegetationLoss,
            Self::Infrastructure,
        ]
    }
}

/// Ordinal damage bucket derived from a damage score.
///
/// Variants are declared from most to least severe, so the derived `Ord`
/// sorts `Destroyed` first.
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
pub enum SeverityLevel {
    /// Score above 0.75.
    Destroyed,
    /// Score above 0.50 up to 0.75.
    HeavilyDamaged,
    /// Score above 0.25 up to 0.50.
    ModeratelyDamaged,
    /// Score up to 0.25.
    MinorDamage,
}

impl SeverityLevel {
    /// Lower breakpoint (exclusive) of [`Self::Destroyed`].
    pub const DESTROYED_ABOVE: f64 = 0.75;
    /// Lower breakpoint (exclusive) of [`Self::HeavilyDamaged`].
    pub const HEAVILY_DAMAGED_ABOVE: f64 = 0.50;
    /// Lower breakpoint (exclusive) of [`Self::ModeratelyDamaged`].
    pub const MODERATELY_DAMAGED_ABOVE: f64 = 0.25;

    /// Returns all variants of this enum.
    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[
            Self::Destroyed,
            Self::HeavilyDamaged,
            Self::ModeratelyDamaged,
            Self::MinorDamage,
        ]
    }

    /// Maps a damage score in [0, 1] to its bucket.
    ///
    /// A score lying exactly on a breakpoint belongs to the lower bucket:
    /// 0.75 is heavily damaged, 0.50 moderately damaged, 0.25 minor.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score > Self::DESTROYED_ABOVE {
            Self::Destroyed
        } else if score > Self::HEAVILY_DAMAGED_ABOVE {
            Self::HeavilyDamaged
        } else if score > Self::MODERATELY_DAMAGED_ABOVE {
            Self::ModeratelyDamaged
        } else {
            Self::MinorDamage
        }
    }
}

/// A longitude/latitude position in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Longitude.
    pub longitude: f64,
    /// Latitude.
    pub latitude: f64,
}

/// Geographic footprint of a detected element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeoFootprint {
    /// Mean position of the footprint pixels.
    pub centroid: GeoPoint,
    /// Bounding box of the footprint pixels (pixel edges, not centres).
    pub bounds: GeoBounds,
    /// Number of raster pixels covered.
    pub pixel_count: u64,
    /// Ground area in square metres (pixel count x resolution²).
    pub area_m2: f64,
}

impl GeoFootprint {
    /// Closed exterior ring of the bounding box as `[lon, lat]` positions.
    #[must_use]
    pub fn bounding_ring(&self) -> Vec<[f64; 2]> {
        let b = &self.bounds;
        vec![
            [b.west, b.south],
            [b.east, b.south],
            [b.east, b.north],
            [b.west, b.north],
            [b.west, b.south],
        ]
    }
}

/// A detected real-world object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InfrastructureElement {
    /// Deterministic id unique within one assessment.
    pub id: String,
    /// Kind of object.
    pub infrastructure_type: InfrastructureType,
    /// Where the object is.
    pub footprint: GeoFootprint,
    /// Detector confidence in [0, 1].
    pub confidence: f64,
    /// Reporting bucket.
    pub sector: Sector,
}

/// Mean index changes over an element's valid footprint pixels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexDeltas {
    /// Mean ΔNDVI.
    pub ndvi: f64,
    /// Mean ΔNDBI.
    pub ndbi: f64,
    /// Mean ΔMNDWI.
    pub mndwi: f64,
    /// Mean ΔNBR.
    pub nbr: f64,
    /// Share of footprint pixels valid in both snapshots.
    pub valid_fraction: f64,
}

/// The single damage classification attached to an element.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageEvent {
    /// Id of the classified element.
    pub element_id: String,
    /// Kind of damage.
    pub category: DamageCategory,
    /// Bucketed score.
    pub severity: SeverityLevel,
    /// Normalized magnitude of the triggering delta, in [0, 1].
    pub score: f64,
    /// Evidence the classification was made from.
    pub deltas: IndexDeltas,
    /// Detector confidence, carried through unmodified.
    pub confidence: f64,
}

/// An element together with its damage event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DamageRecord {
    /// The damaged element.
    pub element: InfrastructureElement,
    /// Its classification.
    pub event: DamageEvent,
}

/// Per-sector counts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SectorStatistic {
    /// The sector.
    pub sector: Sector,
    /// Elements detected in the sector.
    pub total_elements: u64,
    /// Elements with a damage event.
    pub damaged_elements: u64,
    /// Elements that could not be classified.
    pub unclassifiable_elements: u64,
    /// Damaged elements per severity; every level is present.
    pub by_severity: BTreeMap<SeverityLevel, u64>,
}

impl SectorStatistic {
    /// Empty statistic with every severity bucket at zero.
    #[must_use]
    pub fn empty(sector: Sector) -> Self {
        Self {
            sector,
            total_elements: 0,
            damaged_elements: 0,
            unclassifiable_elements: 0,
            by_severity: SeverityLevel::all().iter().map(|s| (*s, 0)).collect(),
        }
    }

    /// Count for one severity level.
    #[must_use]
    pub fn count(&self, severity: SeverityLevel) -> u64 {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    /// Share of elements damaged, in percent.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn damage_percent(&self) -> f64 {
        if self.total_elements == 0 {
            return 0.0;
        }
        self.damaged_elements as f64 / self.total_elements as f64 * 100.0
    }
}

/// Completed output of an assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssessmentResult {
    /// Elements detected.
    pub total_elements: u64,
    /// Elements with a damage event.
    pub damaged_elements: u64,
    /// Elements classified as undamaged.
    pub undamaged_elements: u64,
    /// Elements excluded for insufficient valid pixels.
    pub unclassifiable_elements: u64,
    /// Damaged elements per severity; every level is present.
    pub severity_distribution: BTreeMap<SeverityLevel, u64>,
    /// Detected elements per type; every type is present.
    pub infrastructure_by_type: BTreeMap<InfrastructureType, u64>,
    /// Damaged elements per category; every category is present.
    pub damage_by_category: BTreeMap<DamageCategory, u64>,
    /// One statistic per sector, in [`Sector::all`] order.
    pub sectors: Vec<SectorStatistic>,
    /// Damage records ordered by element id.
    pub records: Vec<DamageRecord>,
    /// Ids of unclassifiable elements, sorted.
    pub unclassifiable_ids: Vec<String>,
}

impl AssessmentResult {
    /// Statistic for one sector.
    #[must_use]
    pub fn sector(&self, sector: Sector) -> Option<&SectorStatistic> {
        self.sectors.iter().find(|s| s.sector == sector)
    }

    /// Centroids of damaged elements with their severity, in record order.
    #[must_use]
    pub fn damage_locations(&self) -> Vec<(GeoPoint, SeverityLevel)> {
        self.records
            .iter()
            .map(|r| (r.element.footprint.centroid, r.event.severity))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_breakpoints_fall_into_lower_bucket() {
        assert_eq!(SeverityLevel::from_score(0.75), SeverityLevel::HeavilyDamaged);
        assert_eq!(SeverityLevel::from_score(0.50), SeverityLevel::ModeratelyDamaged);
        assert_eq!(SeverityLevel::from_score(0.25), SeverityLevel::MinorDamage);
    }

    #[test]
    fn severity_interior_values() {
        assert_eq!(SeverityLevel::from_score(1.0), SeverityLevel::Destroyed);
        assert_eq!(SeverityLevel::from_score(0.7501), SeverityLevel::Destroyed);
        assert_eq!(SeverityLevel::from_score(0.6), SeverityLevel::HeavilyDamaged);
        assert_eq!(SeverityLevel::from_score(0.3), SeverityLevel::ModeratelyDamaged);
        assert_eq!(SeverityLevel::from_score(0.0), SeverityLevel::MinorDamage);
    }

    #[test]
    fn default_sectors_by_type() {
        assert_eq!(
            InfrastructureType::Building.default_sector(),
            Sector::Residential
        );
        for t in [
            InfrastructureType::Road,
            InfrastructureType::Bridge,
            InfrastructureType::PowerLine,
        ] {
            assert_eq!(t.default_sector(), Sector::Infrastructure);
            assert_eq!(t.structural_category(), DamageCategory::Infrastructure);
        }
    }

    #[test]
    fn enums_serialize_snake_case() {
        assert_eq!(
            serde_json::to_string(&Sector::WaterResources).unwrap(),
            "\"water_resources\""
        );
        assert_eq!(SeverityLevel::HeavilyDamaged.to_string(), "heavily_damaged");
        assert_eq!(
            "power_line".parse::<InfrastructureType>().unwrap(),
            InfrastructureType::PowerLine
        );
    }

    #[test]
    fn empty_sector_statistic_has_every_bucket() {
        let stat = SectorStatistic::empty(Sector::Commercial);
        assert_eq!(stat.by_severity.len(), SeverityLevel::all().len());
        assert!(stat.damage_percent().abs() < f64::EPSILON);
    }

    #[test]
    fn bounding_ring_is_closed() {
        let footprint = GeoFootprint {
            centroid: GeoPoint {
                longitude: 0.5,
                latitude: 0.5,
            },
            bounds: GeoBounds::new(0.0, 0.0, 1.0, 1.0),
            pixel_count: 4,
            area_m2: 400.0,
        };
        let ring = footprint.bounding_ring();
        assert_eq!(ring.first(), ring.last());
        assert_eq!(ring.len(), 5);
    }
}
