#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Sector aggregation.
//!
//! A pure reduction over the detected elements, their damage events, and
//! the ids of unclassifiable elements. Everything is keyed through ordered
//! maps and records are sorted by element id, so the result depends only
//! on the input sets and never on their order.

use std::collections::{BTreeMap, BTreeSet};

use damage_map_damage_models::{
    AssessmentResult, DamageCategory, DamageEvent, DamageRecord, InfrastructureElement,
    InfrastructureType, Sector, SectorStatistic, SeverityLevel,
};

fn zeroed<K: Ord + Copy>(keys: &[K]) -> BTreeMap<K, u64> {
    keys.iter().map(|k| (*k, 0)).collect()
}

/// Keeps the stronger of two events for the same element.
fn stronger<'a>(a: &'a DamageEvent, b: &'a DamageEvent) -> &'a DamageEvent {
    let key = |e: &DamageEvent| (e.score, std::cmp::Reverse(e.category));
    match key(a).partial_cmp(&key(b)) {
        Some(std::cmp::Ordering::Less) => b,
        _ => a,
    }
}

/// Builds the assessment result.
///
/// Events referring to unknown elements are ignored. Should an element
/// carry more than one event, the highest-scoring one is kept.
#[must_use]
pub fn aggregate(
    elements: &[InfrastructureElement],
    events: &[DamageEvent],
    unclassifiable: &[String],
) -> AssessmentResult {
    let by_id: BTreeMap<&str, &InfrastructureElement> =
        elements.iter().map(|e| (e.id.as_str(), e)).collect();

    let mut event_by_id: BTreeMap<&str, &DamageEvent> = BTreeMap::new();
    for event in events {
        if !by_id.contains_key(event.element_id.as_str()) {
            log::warn!("Ignoring damage event for unknown element {}", event.element_id);
            continue;
        }
        event_by_id
            .entry(event.element_id.as_str())
            .and_modify(|current| *current = stronger(*current, event))
            .or_insert(event);
    }

    let unclassifiable: BTreeSet<&str> = unclassifiable
        .iter()
        .map(String::as_str)
        .filter(|id| by_id.contains_key(id) && !event_by_id.contains_key(id))
        .collect();

    let mut severity_distribution = zeroed(SeverityLevel::all());
    let mut infrastructure_by_type = zeroed(InfrastructureType::all());
    let mut damage_by_category = zeroed(DamageCategory::all());
    let mut sectors: BTreeMap<Sector, SectorStatistic> = Sector::all()
        .iter()
        .map(|s| (*s, SectorStatistic::empty(*s)))
        .collect();
    let mut records = Vec::with_capacity(event_by_id.len());

    for (id, element) in &by_id {
        *infrastructure_by_type
            .entry(element.infrastructure_type)
            .or_insert(0) += 1;
        let sector = sectors
            .entry(element.sector)
            .or_insert_with(|| SectorStatistic::empty(element.sector));
        sector.total_elements += 1;

        if let Some(event) = event_by_id.get(id) {
            sector.damaged_elements += 1;
            *sector.by_severity.entry(event.severity).or_insert(0) += 1;
            *severity_distribution.entry(event.severity).or_insert(0) += 1;
            *damage_by_category.entry(event.category).or_insert(0) += 1;
            records.push(DamageRecord {
                element: (*element).clone(),
                event: (*event).clone(),
            });
        } else if unclassifiable.contains(id) {
            sector.unclassifiable_elements += 1;
        }
    }

    let total_elements = by_id.len() as u64;
    let damaged_elements = records.len() as u64;
    let unclassifiable_elements = unclassifiable.len() as u64;

    AssessmentResult {
        total_elements,
        damaged_elements,
        undamaged_elements: total_elements - damaged_elements - unclassifiable_elements,
        unclassifiable_elements,
        severity_distribution,
        infrastructure_by_type,
        damage_by_category,
        sectors: sectors.into_values().collect(),
        records,
        unclassifiable_ids: unclassifiable.into_iter().map(str::to_string).collect(),
    }
}
