//! # Amount Attribution
//!
//! Runs once when a session is finished and allocates the session's total across the
//! fields that were worked and the storages that were drawn from.
//!
//! ## Totals
//!
//! - Fertilization: `Σ loads × load size` of the activity's fertilizer.
//! - Tillage / harvest: total area of every field that received at least one
//!   spreading point, independent of how many points fell in it.
//!
//! ## Distribution
//!
//! Fertilization amounts are split by point density: a field's share is its number of
//! spreading points over all spreading points that fell inside some field. Each
//! field's amount is further split by the storage the points were loaded from.
//! Amounts are rounded to one decimal.
//!
//! Manual records carry no track; [`estimate_field_amounts`] falls back to splitting
//! their amount by field area for display.

use std::collections::{BTreeMap, HashMap};

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::classifier::FieldIndex;
use crate::config::TrackerSettings;
use crate::farm::{ActivityType, Field};
use crate::record::ActivityRecord;
use crate::TrackPoint;

/// Result of attributing a session's track.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attribution {
    pub total_amount: f64,
    pub unit: String,
    /// Loads drawn over the whole session
    pub load_count: u32,
    /// Touched fields, in snapshot order
    pub field_ids: Vec<String>,
    pub field_distribution: HashMap<String, f64>,
    pub storage_distribution: HashMap<String, f64>,
    /// Storages whose loads were spread on each field (sorted ids)
    pub field_sources: HashMap<String, Vec<String>>,
    /// Per field, the amount contributed by each storage
    pub detailed_field_sources: HashMap<String, HashMap<String, f64>>,
}

#[inline]
fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Field id for each spreading point that lies inside a field.
fn spreading_hits<'a>(points: &'a [TrackPoint], fields: &FieldIndex) -> Vec<(&'a TrackPoint, String)> {
    let locate = |p: &'a TrackPoint| -> Option<(&'a TrackPoint, String)> {
        if !p.is_spreading {
            return None;
        }
        fields.find_containing(&p.position()).map(|f| (p, f.id.clone()))
    };

    #[cfg(feature = "parallel")]
    {
        use rayon::prelude::*;
        points.par_iter().filter_map(locate).collect()
    }

    #[cfg(not(feature = "parallel"))]
    {
        points.iter().filter_map(locate).collect()
    }
}

/// Attribute a finished session's track.
///
/// `load_counts` maps storage ids to the number of loads drawn from them.
pub fn attribute(
    points: &[TrackPoint],
    fields: &FieldIndex,
    activity: &ActivityType,
    settings: &TrackerSettings,
    load_counts: &HashMap<String, u32>,
) -> Attribution {
    let hits = spreading_hits(points, fields);

    // field -> load source -> point count
    let mut per_field: BTreeMap<&str, BTreeMap<Option<&str>, u32>> = BTreeMap::new();
    for (point, field_id) in &hits {
        *per_field
            .entry(field_id.as_str())
            .or_default()
            .entry(point.storage_id.as_deref())
            .or_insert(0) += 1;
    }

    let field_ids: Vec<String> = fields
        .fields()
        .iter()
        .filter(|f| per_field.contains_key(f.id.as_str()))
        .map(|f| f.id.clone())
        .collect();

    let load_count: u32 = load_counts.values().sum();
    let mut attribution = Attribution {
        unit: activity.unit().to_string(),
        load_count,
        ..Default::default()
    };

    match activity.fertilizer() {
        Some(fertilizer) => {
            let load_size = settings.load_size(fertilizer);
            attribution.total_amount = load_count as f64 * load_size;
            attribution.storage_distribution = load_counts
                .iter()
                .filter(|(_, count)| **count > 0)
                .map(|(id, count)| (id.clone(), *count as f64 * load_size))
                .collect();

            let in_field = hits.len() as f64;
            for (field_id, sources) in &per_field {
                let field_points: u32 = sources.values().sum();
                let field_amount = attribution.total_amount * field_points as f64 / in_field;
                attribution
                    .field_distribution
                    .insert(field_id.to_string(), round1(field_amount));

                let storage_ids: Vec<String> = sources.keys().flatten().map(|s| s.to_string()).collect();
                let detailed: HashMap<String, f64> = sources
                    .iter()
                    .filter_map(|(storage, count)| {
                        let storage = (*storage)?;
                        Some((storage.to_string(), round1(field_amount * *count as f64 / field_points as f64)))
                    })
                    .collect();

                if !storage_ids.is_empty() {
                    attribution.field_sources.insert(field_id.to_string(), storage_ids);
                    attribution.detailed_field_sources.insert(field_id.to_string(), detailed);
                }
            }
        }
        None => {
            for id in &field_ids {
                if let Some(field) = fields.get(id) {
                    attribution.field_distribution.insert(id.clone(), field.area_ha);
                    attribution.total_amount += field.area_ha;
                }
            }
        }
    }

    attribution.field_ids = field_ids;

    debug!(
        "[Attribution] {} of {} points spreading inside a field",
        hits.len(),
        points.len()
    );
    info!(
        "[Attribution] {:.1} {} over {} fields from {} loads",
        attribution.total_amount,
        attribution.unit,
        attribution.field_ids.len(),
        attribution.load_count
    );

    attribution
}

/// Per-field amounts of a record for display.
///
/// Uses the record's own distribution when it has one; otherwise splits the amount
/// over the record's fields in proportion to their area. The result is never written
/// back to the record.
pub fn estimate_field_amounts(record: &ActivityRecord, fields: &[Field]) -> HashMap<String, f64> {
    if record.has_field_attribution() {
        return record.field_distribution.clone();
    }

    let selected: Vec<&Field> = fields
        .iter()
        .filter(|f| record.field_ids.contains(&f.id))
        .collect();
    let total_area: f64 = selected.iter().map(|f| f.area_ha).sum();
    if total_area <= 0.0 {
        return HashMap::new();
    }

    selected
        .iter()
        .map(|f| (f.id.clone(), round1(f.area_ha / total_area * record.amount)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farm::{FertilizerType, FieldKind, HarvestKind};
    use crate::record::ManualEntry;
    use crate::GeoPoint;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn square(id: &str, lng: f64, size_deg: f64) -> Field {
        Field::new(
            id,
            id,
            FieldKind::Acker,
            vec![
                GeoPoint::new(52.0, lng),
                GeoPoint::new(52.0, lng + size_deg),
                GeoPoint::new(52.0 + size_deg, lng + size_deg),
                GeoPoint::new(52.0 + size_deg, lng),
            ],
        )
    }

    /// "west" spans 8.000..8.002, "east" spans 8.010..8.014
    fn index() -> FieldIndex {
        FieldIndex::new(vec![square("west", 8.000, 0.002), square("east", 8.010, 0.004)])
    }

    fn point(lng: f64, is_spreading: bool, storage: Option<&str>) -> TrackPoint {
        TrackPoint {
            lat: 52.001,
            lng,
            timestamp: 0,
            speed: 6.0,
            is_spreading,
            storage_id: storage.map(str::to_string),
            load_index: storage.map(|_| 1),
        }
    }

    fn slurry() -> ActivityType {
        ActivityType::Fertilization { fertilizer: FertilizerType::Slurry }
    }

    fn loads(entries: &[(&str, u32)]) -> HashMap<String, u32> {
        entries.iter().map(|(id, n)| (id.to_string(), *n)).collect()
    }

    #[test]
    fn test_single_field_gets_everything() {
        let points: Vec<TrackPoint> = (0..5).map(|i| point(8.0005 + i as f64 * 0.0001, true, Some("pit"))).collect();
        let a = attribute(&points, &index(), &slurry(), &TrackerSettings::default(), &loads(&[("pit", 1)]));

        assert_eq!(a.total_amount, 12.0);
        assert_eq!(a.unit, "m³");
        assert_eq!(a.field_ids, vec!["west".to_string()]);
        assert_eq!(a.field_distribution.get("west"), Some(&12.0));
        assert_eq!(a.storage_distribution.get("pit"), Some(&12.0));
        assert_eq!(a.field_sources.get("west"), Some(&vec!["pit".to_string()]));
    }

    #[test]
    fn test_point_density_split_and_conservation() {
        let mut points = Vec::new();
        for i in 0..3 {
            points.push(point(8.0005 + i as f64 * 0.0001, true, Some("pit-a")));
        }
        for i in 0..7 {
            points.push(point(8.011 + i as f64 * 0.0001, true, Some("pit-b")));
        }
        // Transit and outside-field points are ignored
        points.push(point(8.012, false, Some("pit-b")));
        points.push(point(8.005, true, Some("pit-b")));

        let counts = loads(&[("pit-a", 1), ("pit-b", 2)]);
        let a = attribute(&points, &index(), &slurry(), &TrackerSettings::default(), &counts);

        assert_eq!(a.total_amount, 36.0);
        assert_eq!(a.load_count, 3);
        assert_eq!(a.field_distribution.get("west"), Some(&10.8));
        assert_eq!(a.field_distribution.get("east"), Some(&25.2));
        let sum: f64 = a.field_distribution.values().sum();
        assert!(approx_eq(sum, a.total_amount, 0.1));
        assert_eq!(a.storage_distribution.get("pit-b"), Some(&24.0));
    }

    #[test]
    fn test_detailed_sources_split_by_storage() {
        let mut points = Vec::new();
        for i in 0..4 {
            points.push(point(8.0005 + i as f64 * 0.0001, true, Some("pit-a")));
        }
        for i in 0..4 {
            points.push(point(8.0010 + i as f64 * 0.0001, true, Some("pit-b")));
        }
        let counts = loads(&[("pit-a", 1), ("pit-b", 1)]);
        let a = attribute(&points, &index(), &slurry(), &TrackerSettings::default(), &counts);

        assert_eq!(
            a.field_sources.get("west"),
            Some(&vec!["pit-a".to_string(), "pit-b".to_string()])
        );
        let detailed = a.detailed_field_sources.get("west").unwrap();
        assert_eq!(detailed.get("pit-a"), Some(&12.0));
        assert_eq!(detailed.get("pit-b"), Some(&12.0));
    }

    #[test]
    fn test_no_spreading_points_keeps_amount() {
        let points = vec![point(8.0005, false, Some("pit")), point(8.0006, false, Some("pit"))];
        let a = attribute(&points, &index(), &slurry(), &TrackerSettings::default(), &loads(&[("pit", 2)]));

        assert_eq!(a.total_amount, 24.0);
        assert!(a.field_distribution.is_empty());
        assert!(a.field_ids.is_empty());
        assert_eq!(a.storage_distribution.get("pit"), Some(&24.0));
    }

    #[test]
    fn test_harvest_uses_touched_area() {
        let fields = index();
        // One point in west, many in east: totals depend on area only
        let mut points = vec![point(8.001, true, None)];
        for i in 0..20 {
            points.push(point(8.011 + i as f64 * 0.0001, true, None));
        }
        let harvest = ActivityType::Harvest { crop: HarvestKind::Silage };
        let a = attribute(&points, &fields, &harvest, &TrackerSettings::default(), &HashMap::new());

        let west = fields.get("west").unwrap().area_ha;
        let east = fields.get("east").unwrap().area_ha;
        assert!(approx_eq(a.total_amount, west + east, 1e-9));
        assert_eq!(a.unit, "ha");
        assert_eq!(a.field_distribution.get("west"), Some(&west));
        assert!(a.storage_distribution.is_empty());
        assert!(a.field_sources.is_empty());
    }

    #[test]
    fn test_estimate_prefers_record_distribution() {
        let fields = vec![square("west", 8.000, 0.002), square("east", 8.010, 0.004)];
        let points: Vec<TrackPoint> = (0..5).map(|i| point(8.0005 + i as f64 * 0.0001, true, Some("pit"))).collect();
        let a = attribute(&points, &index(), &slurry(), &TrackerSettings::default(), &loads(&[("pit", 1)]));
        let record = ActivityRecord::tracked(slurry(), a, points, None, 0, 1);

        let estimate = estimate_field_amounts(&record, &fields);
        assert_eq!(estimate, record.field_distribution);
    }

    #[test]
    fn test_estimate_falls_back_to_area() {
        let fields = vec![square("west", 8.000, 0.002), square("east", 8.010, 0.004)];
        let entry = ManualEntry {
            date: "2024-05-01".to_string(),
            activity: slurry(),
            field_ids: vec!["west".to_string(), "east".to_string()],
            amount: Some(50.0),
            load_count: None,
            storage_id: None,
            notes: None,
        };
        let record = ActivityRecord::manual(entry, &fields, &TrackerSettings::default());

        let estimate = estimate_field_amounts(&record, &fields);
        // East is four times the area of west
        assert!(approx_eq(estimate["west"], 10.0, 0.1));
        assert!(approx_eq(estimate["east"], 40.0, 0.1));
        assert!(record.field_distribution.is_empty());
    }
}
