//! Proximity and field classification.
//!
//! Maps a position plus the session's read-only context (fields, storages, activity)
//! to a semantic reading: which field the vehicle is in and whether it is close to a
//! storage it could load from. Nothing here holds state between fixes.
//!
//! Field lookup goes through a [`FieldIndex`]: an R-tree over field bounding boxes
//! narrows the candidates before the exact ray-casting test.

use rstar::{RTree, RTreeObject, AABB};

use crate::farm::{ActivityType, FertilizerType, Field, StorageLocation};
use crate::geo_utils::distance_meters;
use crate::GeoPoint;

// ============================================================================
// Field Lookup
// ============================================================================

/// Bounding box of one field (used for spatial indexing).
#[derive(Debug, Clone)]
struct FieldEnvelope {
    index: usize,
    min_lat: f64,
    max_lat: f64,
    min_lng: f64,
    max_lng: f64,
}

impl RTreeObject for FieldEnvelope {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners([self.min_lng, self.min_lat], [self.max_lng, self.max_lat])
    }
}

/// Spatial index over a snapshot of fields.
///
/// Fields with fewer than three boundary points are kept in the snapshot but never
/// match a position.
#[derive(Debug, Clone)]
pub struct FieldIndex {
    fields: Vec<Field>,
    tree: RTree<FieldEnvelope>,
}

impl FieldIndex {
    pub fn new(fields: Vec<Field>) -> Self {
        let envelopes: Vec<FieldEnvelope> = fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.has_valid_boundary())
            .filter_map(|(index, f)| {
                let b = f.bounds()?;
                Some(FieldEnvelope {
                    index,
                    min_lat: b.min_lat,
                    max_lat: b.max_lat,
                    min_lng: b.min_lng,
                    max_lng: b.max_lng,
                })
            })
            .collect();

        Self {
            fields,
            tree: RTree::bulk_load(envelopes),
        }
    }

    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    pub fn get(&self, field_id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == field_id)
    }

    /// The field containing `point`, if any.
    ///
    /// Overlapping fields resolve to the smallest area; equal areas resolve to the
    /// earlier field in the snapshot.
    pub fn find_containing(&self, point: &GeoPoint) -> Option<&Field> {
        let query = AABB::from_point([point.lng, point.lat]);

        self.tree
            .locate_in_envelope_intersecting(&query)
            .filter(|e| self.fields[e.index].contains(point))
            .map(|e| e.index)
            .min_by(|&a, &b| {
                self.fields[a]
                    .area_ha
                    .total_cmp(&self.fields[b].area_ha)
                    .then(a.cmp(&b))
            })
            .map(|i| &self.fields[i])
    }
}

/// Linear-scan variant of [`FieldIndex::find_containing`] for one-off lookups.
///
/// Same tie-break: smallest area first, then list order.
pub fn find_containing_field<'a>(point: &GeoPoint, fields: &'a [Field]) -> Option<&'a Field> {
    fields
        .iter()
        .enumerate()
        .filter(|(_, f)| f.contains(point))
        .min_by(|(ia, a), (ib, b)| a.area_ha.total_cmp(&b.area_ha).then(ia.cmp(ib)))
        .map(|(_, f)| f)
}

// ============================================================================
// Storage Proximity
// ============================================================================

/// The storage with the minimum great-circle distance to `point`, and that distance.
pub fn find_nearest_storage<'a>(
    point: &GeoPoint,
    storages: &'a [StorageLocation],
) -> Option<(&'a StorageLocation, f64)> {
    storages
        .iter()
        .map(|s| (s, distance_meters(point, &s.geo)))
        .min_by(|a, b| a.1.total_cmp(&b.1))
}

/// Where the vehicle stands relative to the storages.
#[derive(Debug, Clone, PartialEq)]
pub enum StorageProximity {
    /// No storage within the detection radius.
    Away,
    /// Within radius of a storage holding the activity's material.
    Matching { storage_id: String, distance_m: f64 },
    /// Within radius, but only of storages holding a different material.
    Mismatch {
        storage_id: String,
        found: FertilizerType,
        expected: FertilizerType,
    },
    /// Within radius of a storage while running an activity that never loads.
    Nearby { storage_id: String, distance_m: f64 },
}

impl StorageProximity {
    /// Whether any storage is within the detection radius.
    pub fn is_near(&self) -> bool {
        !matches!(self, StorageProximity::Away)
    }
}

/// Classify a position against the storages for the given activity.
///
/// The nearest storage decides: outside the radius the vehicle is `Away`, and a
/// nearest storage holding the wrong material is a `Mismatch` even when a matching
/// one is also in range.
pub fn classify_storage(
    point: &GeoPoint,
    storages: &[StorageLocation],
    activity: &ActivityType,
    radius_m: f64,
) -> StorageProximity {
    let Some((nearest, distance_m)) = find_nearest_storage(point, storages) else {
        return StorageProximity::Away;
    };
    if distance_m > radius_m {
        return StorageProximity::Away;
    }

    match activity.fertilizer() {
        None => StorageProximity::Nearby {
            storage_id: nearest.id.clone(),
            distance_m,
        },
        Some(expected) if nearest.storage_type == expected => StorageProximity::Matching {
            storage_id: nearest.id.clone(),
            distance_m,
        },
        Some(expected) => StorageProximity::Mismatch {
            storage_id: nearest.id.clone(),
            found: nearest.storage_type,
            expected,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::farm::{FieldKind, TillageMethod};

    fn square(id: &str, lat: f64, lng: f64, size_deg: f64) -> Field {
        Field::new(
            id,
            id,
            FieldKind::Acker,
            vec![
                GeoPoint::new(lat, lng),
                GeoPoint::new(lat, lng + size_deg),
                GeoPoint::new(lat + size_deg, lng + size_deg),
                GeoPoint::new(lat + size_deg, lng),
            ],
        )
    }

    fn slurry() -> ActivityType {
        ActivityType::Fertilization { fertilizer: FertilizerType::Slurry }
    }

    #[test]
    fn test_index_finds_containing_field() {
        let index = FieldIndex::new(vec![
            square("a", 52.0, 8.0, 0.002),
            square("b", 52.01, 8.01, 0.002),
        ]);

        assert_eq!(index.find_containing(&GeoPoint::new(52.011, 8.011)).unwrap().id, "b");
        assert_eq!(index.find_containing(&GeoPoint::new(52.001, 8.001)).unwrap().id, "a");
        assert!(index.find_containing(&GeoPoint::new(52.005, 8.005)).is_none());
    }

    #[test]
    fn test_overlap_smallest_area_wins() {
        let big = square("big", 52.0, 8.0, 0.01);
        let small = square("small", 52.004, 8.004, 0.002);
        let p = GeoPoint::new(52.005, 8.005);

        let index = FieldIndex::new(vec![big.clone(), small.clone()]);
        assert_eq!(index.find_containing(&p).unwrap().id, "small");
        assert_eq!(find_containing_field(&p, &[big, small]).unwrap().id, "small");
    }

    #[test]
    fn test_overlap_equal_area_first_wins() {
        let first = square("first", 52.0, 8.0, 0.002);
        let mut second = first.clone();
        second.id = "second".to_string();
        let p = GeoPoint::new(52.001, 8.001);

        let index = FieldIndex::new(vec![first.clone(), second.clone()]);
        assert_eq!(index.find_containing(&p).unwrap().id, "first");
        assert_eq!(find_containing_field(&p, &[first, second]).unwrap().id, "first");
    }

    #[test]
    fn test_degenerate_field_never_matches() {
        let mut broken = square("broken", 52.0, 8.0, 0.002);
        broken.boundary.truncate(2);
        let index = FieldIndex::new(vec![broken]);
        assert!(index.find_containing(&GeoPoint::new(52.001, 8.0005)).is_none());
        assert_eq!(index.fields().len(), 1);
    }

    #[test]
    fn test_empty_index() {
        let index = FieldIndex::new(vec![]);
        assert!(index.find_containing(&GeoPoint::new(52.0, 8.0)).is_none());
    }

    #[test]
    fn test_find_nearest_storage() {
        let storages = vec![
            StorageLocation::new("far", "Far", FertilizerType::Slurry, GeoPoint::new(52.01, 8.0)),
            StorageLocation::new("near", "Near", FertilizerType::Slurry, GeoPoint::new(52.0001, 8.0)),
        ];
        let (storage, distance) = find_nearest_storage(&GeoPoint::new(52.0, 8.0), &storages).unwrap();
        assert_eq!(storage.id, "near");
        assert!(distance < 12.0);
        assert!(find_nearest_storage(&GeoPoint::new(52.0, 8.0), &[]).is_none());
    }

    #[test]
    fn test_classify_storage_matching() {
        let storages = vec![StorageLocation::new("s", "Grube", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0))];
        let p = GeoPoint::new(52.00004, 8.0); // ~4.5m
        match classify_storage(&p, &storages, &slurry(), 15.0) {
            StorageProximity::Matching { storage_id, distance_m } => {
                assert_eq!(storage_id, "s");
                assert!(distance_m < 5.0);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_classify_storage_mismatch() {
        let storages = vec![StorageLocation::new("m", "Mist", FertilizerType::Manure, GeoPoint::new(52.0, 8.0))];
        let p = GeoPoint::new(52.00004, 8.0);
        let proximity = classify_storage(&p, &storages, &slurry(), 15.0);
        assert_eq!(
            proximity,
            StorageProximity::Mismatch {
                storage_id: "m".to_string(),
                found: FertilizerType::Manure,
                expected: FertilizerType::Slurry,
            }
        );
        assert!(proximity.is_near());
    }

    #[test]
    fn test_classify_nearest_mismatch_wins_over_farther_match() {
        let storages = vec![
            StorageLocation::new("pile", "Mist", FertilizerType::Manure, GeoPoint::new(52.00002, 8.0)),
            StorageLocation::new("pit", "Grube", FertilizerType::Slurry, GeoPoint::new(51.99989, 8.0)),
        ];
        // Pile ~2.2m away, pit ~12.2m away, both inside the radius
        let p = GeoPoint::new(52.0, 8.0);
        assert_eq!(
            classify_storage(&p, &storages, &slurry(), 15.0),
            StorageProximity::Mismatch {
                storage_id: "pile".to_string(),
                found: FertilizerType::Manure,
                expected: FertilizerType::Slurry,
            }
        );

        // Closer to the pit, the pit decides
        let q = GeoPoint::new(51.99990, 8.0);
        assert!(matches!(
            classify_storage(&q, &storages, &slurry(), 15.0),
            StorageProximity::Matching { ref storage_id, .. } if storage_id == "pit"
        ));
    }

    #[test]
    fn test_classify_storage_out_of_range() {
        let storages = vec![StorageLocation::new("s", "Grube", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0))];
        let p = GeoPoint::new(52.001, 8.0); // ~111m
        assert_eq!(classify_storage(&p, &storages, &slurry(), 15.0), StorageProximity::Away);
        assert_eq!(classify_storage(&p, &[], &slurry(), 15.0), StorageProximity::Away);
    }

    #[test]
    fn test_classify_storage_non_fertilization() {
        let storages = vec![StorageLocation::new("s", "Grube", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0))];
        let tillage = ActivityType::Tillage { method: TillageMethod::Cultivator };
        assert!(matches!(
            classify_storage(&GeoPoint::new(52.0, 8.0), &storages, &tillage, 15.0),
            StorageProximity::Nearby { .. }
        ));
    }
}
