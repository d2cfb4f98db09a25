//! `GeoJSON` export of damage records.

use damage_map_damage_models::{AssessmentResult, DamageRecord};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use serde::Deserialize;
use serde_json::json;
use strum_macros::{AsRefStr, Display, EnumString};

/// Geometry emitted per damaged element.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Deserialize,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ExportGeometry {
    /// The footprint centroid as a point.
    #[default]
    Centroid,
    /// The footprint bounding box as a polygon.
    Footprint,
}

fn properties(record: &DamageRecord) -> JsonObject {
    let element = &record.element;
    let event = &record.event;
    let value = json!({
        "elementId": element.id,
        "infrastructureType": element.infrastructure_type,
        "sector": element.sector,
        "category": event.category,
        "severity": event.severity,
        "score": event.score,
        "confidence": event.confidence,
        "areaM2": element.footprint.area_m2,
    });
    match value {
        serde_json::Value::Object(map) => map,
        _ => JsonObject::new(),
    }
}

fn geometry(record: &DamageRecord, kind: ExportGeometry) -> Geometry {
    let footprint = &record.element.footprint;
    let value = match kind {
        ExportGeometry::Centroid => Value::Point(vec![
            footprint.centroid.longitude,
            footprint.centroid.latitude,
        ]),
        ExportGeometry::Footprint => Value::Polygon(vec![
            footprint
                .bounding_ring()
                .into_iter()
                .map(|[lon, lat]| vec![lon, lat])
                .collect(),
        ]),
    };
    Geometry::new(value)
}

/// One feature per damaged element, in element id order.
#[must_use]
pub fn damage_features(result: &AssessmentResult, kind: ExportGeometry) -> FeatureCollection {
    let features = result
        .records
        .iter()
        .map(|record| Feature {
            bbox: None,
            geometry: Some(geometry(record, kind)),
            id: None,
            properties: Some(properties(record)),
            foreign_members: None,
        })
        .collect();

    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use damage_map_damage_models::{
        DamageCategory, DamageEvent, GeoFootprint, GeoPoint, IndexDeltas, InfrastructureElement,
        InfrastructureType, Sector, SeverityLevel,
    };
    use damage_map_raster_models::GeoBounds;

    fn result() -> AssessmentResult {
        let element = InfrastructureElement {
            id: "el-0001".to_string(),
            infrastructure_type: InfrastructureType::Bridge,
            footprint: GeoFootprint {
                centroid: GeoPoint {
                    longitude: 20.5,
                    latitude: 40.5,
                },
                bounds: GeoBounds::new(20.0, 40.0, 21.0, 41.0),
                pixel_count: 12,
                area_m2: 1200.0,
            },
            confidence: 0.7,
            sector: Sector::Infrastructure,
        };
        let event = DamageEvent {
            element_id: element.id.clone(),
            category: DamageCategory::Flooding,
            severity: SeverityLevel::Destroyed,
            score: 0.9,
            deltas: IndexDeltas::default(),
            confidence: 0.7,
        };
        damage_map_aggregate::aggregate(&[element], &[event], &[])
    }

    #[test]
    fn centroid_export_has_point_and_properties() {
        let collection = damage_features(&result(), ExportGeometry::Centroid);
        assert_eq!(collection.features.len(), 1);

        let feature = &collection.features[0];
        let Some(Geometry {
            value: Value::Point(position),
            ..
        }) = &feature.geometry
        else {
            panic!("expected a point");
        };
        assert_eq!(position, &vec![20.5, 40.5]);

        let properties = feature.properties.as_ref().unwrap();
        assert_eq!(properties["severity"], "destroyed");
        assert_eq!(properties["category"], "flooding");
        assert_eq!(properties["infrastructureType"], "bridge");
        assert_eq!(properties["elementId"], "el-0001");
    }

    #[test]
    fn footprint_export_has_closed_ring() {
        let collection = damage_features(&result(), ExportGeometry::Footprint);
        let Some(Geometry {
            value: Value::Polygon(rings),
            ..
        }) = &collection.features[0].geometry
        else {
            panic!("expected a polygon");
        };
        assert_eq!(rings[0].len(), 5);
        assert_eq!(rings[0].first(), rings[0].last());
    }

    #[test]
    fn export_geometry_parses_from_query_values() {
        assert_eq!("footprint".parse::<ExportGeometry>().unwrap(), ExportGeometry::Footprint);
        assert_eq!(ExportGeometry::default(), ExportGeometry::Centroid);
    }
}
