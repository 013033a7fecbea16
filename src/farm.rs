//! Farm entities the tracker reads: fields, storage locations and activity types.
//!
//! Fields and storages are owned by the surrounding application; the tracker receives
//! snapshots of them at session start. The helpers here keep the derived values honest
//! (a field's area is always recomputed from its boundary) and implement the storage
//! level bookkeeping applied after a session is saved.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::geo_utils::{compute_bounds, point_in_polygon, polygon_area_ha, split_polygon};
use crate::{Bounds, GeoPoint};

// ============================================================================
// Activity Types
// ============================================================================

/// Material held in a storage and spread by a fertilization activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FertilizerType {
    /// Liquid manure, measured in m³.
    Slurry,
    /// Solid manure, measured in t.
    Manure,
}

impl FertilizerType {
    /// Unit of one load of this material.
    pub fn unit(&self) -> &'static str {
        match self {
            FertilizerType::Slurry => "m³",
            FertilizerType::Manure => "t",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TillageMethod {
    Plough,
    Cultivator,
    Harrow,
    Roller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum HarvestKind {
    Silage,
    Hay,
    Straw,
    Grain,
}

/// What a tracking session (or manual entry) records.
///
/// Only fertilization draws from storages and is measured in loads; tillage and
/// harvest are measured by the area of the fields worked.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum ActivityType {
    Fertilization { fertilizer: FertilizerType },
    Tillage { method: TillageMethod },
    Harvest { crop: HarvestKind },
}

impl ActivityType {
    /// The fertilizer spread by this activity, if it is a fertilization.
    pub fn fertilizer(&self) -> Option<FertilizerType> {
        match self {
            ActivityType::Fertilization { fertilizer } => Some(*fertilizer),
            ActivityType::Tillage { .. } | ActivityType::Harvest { .. } => None,
        }
    }

    /// Unit of the recorded amount.
    pub fn unit(&self) -> &'static str {
        match self {
            ActivityType::Fertilization { fertilizer } => fertilizer.unit(),
            ActivityType::Tillage { .. } | ActivityType::Harvest { .. } => "ha",
        }
    }
}

// ============================================================================
// Fields
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FieldKind {
    /// Arable land.
    Acker,
    /// Grassland.
    #[serde(rename = "Grünland")]
    Gruenland,
}

/// A geofenced field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Field {
    pub id: String,
    pub name: String,
    /// Area in hectares, derived from `boundary`
    pub area_ha: f64,
    #[serde(rename = "type")]
    pub kind: FieldKind,
    /// Boundary ring, implicitly closed
    pub boundary: Vec<GeoPoint>,
    pub color: Option<String>,
    #[serde(default)]
    pub usage: String,
    pub codes: Option<String>,
}

impl Field {
    /// Create a field with its area computed from the boundary.
    pub fn new(id: &str, name: &str, kind: FieldKind, boundary: Vec<GeoPoint>) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            area_ha: polygon_area_ha(&boundary),
            kind,
            boundary,
            color: None,
            usage: String::new(),
            codes: None,
        }
    }

    /// Replace the boundary and recompute the area.
    pub fn set_boundary(&mut self, boundary: Vec<GeoPoint>) {
        self.area_ha = polygon_area_ha(&boundary);
        self.boundary = boundary;
    }

    /// A usable geofence needs at least three vertices.
    pub fn has_valid_boundary(&self) -> bool {
        self.boundary.len() >= 3
    }

    /// Whether the boundary contains the point.
    #[inline]
    pub fn contains(&self, point: &GeoPoint) -> bool {
        point_in_polygon(point, &self.boundary)
    }

    pub fn bounds(&self) -> Option<Bounds> {
        compute_bounds(&self.boundary)
    }

    /// Split this field along a cutter line into two new fields.
    ///
    /// Both parts keep the name, kind, usage and codes of the original, get the
    /// supplied ids and a recomputed area. Returns `None` when the cut is degenerate;
    /// the field is left untouched either way.
    pub fn split(&self, cutter: &[GeoPoint], first_id: &str, second_id: &str) -> Option<(Field, Field)> {
        let (a, b) = split_polygon(&self.boundary, cutter)?;

        let part = |id: &str, suffix: &str, ring: Vec<GeoPoint>| {
            let mut field = self.clone();
            field.id = id.to_string();
            field.name = format!("{} ({})", self.name, suffix);
            field.set_boundary(ring);
            field
        };

        Some((part(first_id, "A", a), part(second_id, "B", b)))
    }
}

// ============================================================================
// Storage Locations
// ============================================================================

/// A slurry pit or manure pile that loads are drawn from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct StorageLocation {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub storage_type: FertilizerType,
    pub capacity: f64,
    pub current_level: f64,
    /// Growth of `current_level` per day
    pub daily_growth: f64,
    pub geo: GeoPoint,
}

impl StorageLocation {
    pub fn new(id: &str, name: &str, storage_type: FertilizerType, geo: GeoPoint) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            storage_type,
            capacity: 0.0,
            current_level: 0.0,
            daily_growth: 0.0,
            geo,
        }
    }

    /// Advance the fill level by `days` of growth, capped at capacity.
    pub fn apply_daily_growth(&mut self, days: f64) {
        if days <= 0.0 {
            return;
        }
        self.current_level = (self.current_level + self.daily_growth * days).min(self.capacity);
    }

    /// Remove `amount` from the storage, never going below empty.
    ///
    /// Returns the amount actually withdrawn.
    pub fn withdraw(&mut self, amount: f64) -> f64 {
        let taken = amount.max(0.0).min(self.current_level);
        self.current_level -= taken;
        taken
    }

    /// Fill level as a fraction of capacity (0.0 when capacity is unknown).
    pub fn fill_ratio(&self) -> f64 {
        if self.capacity > 0.0 {
            (self.current_level / self.capacity).clamp(0.0, 1.0)
        } else {
            0.0
        }
    }
}

/// Apply a session's storage distribution to a set of storages.
///
/// Unknown storage ids are ignored. Returns the total amount withdrawn.
pub fn apply_withdrawals(storages: &mut [StorageLocation], withdrawals: &HashMap<String, f64>) -> f64 {
    storages
        .iter_mut()
        .filter_map(|s| withdrawals.get(&s.id).map(|amount| s.withdraw(*amount)))
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn square_field() -> Field {
        Field::new(
            "f1",
            "Nordacker",
            FieldKind::Acker,
            vec![
                GeoPoint::new(52.0, 8.0),
                GeoPoint::new(52.0, 8.002),
                GeoPoint::new(52.002, 8.002),
                GeoPoint::new(52.002, 8.0),
            ],
        )
    }

    #[test]
    fn test_field_area_computed() {
        let field = square_field();
        assert!(field.area_ha > 0.0);
        assert!(field.has_valid_boundary());
    }

    #[test]
    fn test_set_boundary_recomputes_area() {
        let mut field = square_field();
        let old_area = field.area_ha;
        let mut smaller = field.boundary.clone();
        smaller[2] = GeoPoint::new(52.001, 8.001);
        field.set_boundary(smaller);
        assert!(field.area_ha < old_area);
    }

    #[test]
    fn test_field_bounds() {
        let bounds = square_field().bounds().unwrap();
        assert_eq!(bounds.min_lat, 52.0);
        assert_eq!(bounds.max_lat, 52.002);
        assert_eq!(bounds.min_lng, 8.0);
        assert_eq!(bounds.max_lng, 8.002);

        let empty = Field::new("f2", "Leer", FieldKind::Acker, vec![]);
        assert!(empty.bounds().is_none());
    }

    #[test]
    fn test_field_split_conserves_area() {
        let field = square_field();
        let cutter = vec![GeoPoint::new(51.999, 8.001), GeoPoint::new(52.003, 8.001)];
        let (a, b) = field.split(&cutter, "f1a", "f1b").unwrap();
        assert_eq!(a.id, "f1a");
        assert_eq!(b.name, "Nordacker (B)");
        assert!(((a.area_ha + b.area_ha) - field.area_ha).abs() < 1e-6);
    }

    #[test]
    fn test_field_split_degenerate_is_none() {
        let field = square_field();
        let cutter = vec![GeoPoint::new(51.0, 9.0), GeoPoint::new(51.1, 9.0)];
        assert!(field.split(&cutter, "a", "b").is_none());
    }

    #[test]
    fn test_storage_growth_capped() {
        let mut storage = StorageLocation::new("s1", "Güllegrube", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0));
        storage.capacity = 100.0;
        storage.current_level = 90.0;
        storage.daily_growth = 4.0;
        storage.apply_daily_growth(2.0);
        assert_eq!(storage.current_level, 98.0);
        storage.apply_daily_growth(5.0);
        assert_eq!(storage.current_level, 100.0);
        assert_eq!(storage.fill_ratio(), 1.0);
    }

    #[test]
    fn test_storage_withdraw_floored() {
        let mut storage = StorageLocation::new("s1", "Mistplatte", FertilizerType::Manure, GeoPoint::new(52.0, 8.0));
        storage.current_level = 15.0;
        assert_eq!(storage.withdraw(10.0), 10.0);
        assert_eq!(storage.withdraw(10.0), 5.0);
        assert_eq!(storage.current_level, 0.0);
    }

    #[test]
    fn test_apply_withdrawals() {
        let mut a = StorageLocation::new("a", "A", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0));
        a.current_level = 50.0;
        let mut b = StorageLocation::new("b", "B", FertilizerType::Slurry, GeoPoint::new(52.0, 8.0));
        b.current_level = 50.0;
        let mut storages = vec![a, b];

        let withdrawals: HashMap<String, f64> =
            [("a".to_string(), 24.0), ("missing".to_string(), 12.0)].into_iter().collect();
        let total = apply_withdrawals(&mut storages, &withdrawals);

        assert_eq!(total, 24.0);
        assert_eq!(storages[0].current_level, 26.0);
        assert_eq!(storages[1].current_level, 50.0);
    }

    #[test]
    fn test_activity_type_serde_tags() {
        let activity = ActivityType::Fertilization { fertilizer: FertilizerType::Slurry };
        let json = serde_json::to_string(&activity).unwrap();
        assert_eq!(json, r#"{"category":"fertilization","fertilizer":"Slurry"}"#);
        let back: ActivityType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, activity);
    }

    #[test]
    fn test_field_kind_serde_name() {
        assert_eq!(serde_json::to_string(&FieldKind::Gruenland).unwrap(), "\"Grünland\"");
    }

    #[test]
    fn test_activity_units() {
        assert_eq!(ActivityType::Fertilization { fertilizer: FertilizerType::Slurry }.unit(), "m³");
        assert_eq!(ActivityType::Fertilization { fertilizer: FertilizerType::Manure }.unit(), "t");
        assert_eq!(ActivityType::Tillage { method: TillageMethod::Plough }.unit(), "ha");
        assert_eq!(ActivityType::Harvest { crop: HarvestKind::Hay }.fertilizer(), None);
    }
}
