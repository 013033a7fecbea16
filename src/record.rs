//! Activity records, the persisted output of a session or a manual entry.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use log::info;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attribution::Attribution;
use crate::config::TrackerSettings;
use crate::farm::{ActivityType, Field};
use crate::TrackPoint;

/// A finished activity.
///
/// Created once per finished session or manual entry and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ActivityRecord {
    pub id: String,
    /// Calendar day of the activity, `YYYY-MM-DD` (UTC)
    pub date: String,
    #[serde(rename = "type")]
    pub activity_type: ActivityType,
    pub field_ids: Vec<String>,
    pub amount: f64,
    pub unit: String,
    pub load_count: Option<u32>,
    #[serde(default)]
    pub track_points: Vec<TrackPoint>,
    #[serde(default)]
    pub field_distribution: HashMap<String, f64>,
    #[serde(default)]
    pub storage_distribution: HashMap<String, f64>,
    #[serde(default)]
    pub field_sources: HashMap<String, Vec<String>>,
    #[serde(default)]
    pub detailed_field_sources: HashMap<String, HashMap<String, f64>>,
    pub notes: Option<String>,
    pub start_time: Option<u64>,
    pub end_time: Option<u64>,
}

/// Form input for an activity recorded without tracking.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct ManualEntry {
    /// `YYYY-MM-DD`
    pub date: String,
    pub activity: ActivityType,
    pub field_ids: Vec<String>,
    /// Explicit amount; derived from loads or field area when absent
    pub amount: Option<f64>,
    pub load_count: Option<u32>,
    /// Storage the loads came from, if known
    pub storage_id: Option<String>,
    pub notes: Option<String>,
}

/// `YYYY-MM-DD` for a millisecond epoch timestamp.
pub(crate) fn date_from_millis(timestamp_ms: u64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp_ms as i64)
        .map(|dt| dt.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| "1970-01-01".to_string())
}

impl ActivityRecord {
    /// Record of a finished tracking session.
    pub fn tracked(
        activity: ActivityType,
        attribution: Attribution,
        track_points: Vec<TrackPoint>,
        notes: Option<String>,
        start_time_ms: u64,
        end_time_ms: u64,
    ) -> Self {
        let load_count = activity.fertilizer().map(|_| attribution.load_count);
        Self {
            id: Uuid::new_v4().to_string(),
            date: date_from_millis(start_time_ms),
            activity_type: activity,
            field_ids: attribution.field_ids,
            amount: attribution.total_amount,
            unit: attribution.unit,
            load_count,
            track_points,
            field_distribution: attribution.field_distribution,
            storage_distribution: attribution.storage_distribution,
            field_sources: attribution.field_sources,
            detailed_field_sources: attribution.detailed_field_sources,
            notes: notes.filter(|n| !n.trim().is_empty()),
            start_time: Some(start_time_ms),
            end_time: Some(end_time_ms),
        }
    }

    /// Record synthesized from a manual-entry form.
    ///
    /// The amount is taken from the form when given; otherwise fertilization uses
    /// `load_count × load size` and tillage/harvest the total area of the chosen
    /// fields. Unknown field ids are dropped. No track and no field distribution are
    /// stored; displays fall back to [`crate::estimate_field_amounts`].
    ///
    /// # Example
    /// ```
    /// use field_tracker::{ActivityRecord, ActivityType, FertilizerType, ManualEntry, TrackerSettings};
    ///
    /// let entry = ManualEntry {
    ///     date: "2024-03-18".to_string(),
    ///     activity: ActivityType::Fertilization { fertilizer: FertilizerType::Manure },
    ///     field_ids: vec![],
    ///     amount: None,
    ///     load_count: Some(3),
    ///     storage_id: None,
    ///     notes: None,
    /// };
    /// let record = ActivityRecord::manual(entry, &[], &TrackerSettings::default());
    /// assert_eq!(record.amount, 30.0);
    /// assert_eq!(record.unit, "t");
    /// ```
    pub fn manual(entry: ManualEntry, fields: &[Field], settings: &TrackerSettings) -> Self {
        let field_ids: Vec<String> = entry
            .field_ids
            .into_iter()
            .filter(|id| fields.iter().any(|f| &f.id == id))
            .collect();

        let (amount, load_count) = match entry.activity.fertilizer() {
            Some(fertilizer) => {
                let loads = entry.load_count.unwrap_or(0);
                let amount = entry
                    .amount
                    .unwrap_or(loads as f64 * settings.load_size(fertilizer));
                (amount, Some(loads))
            }
            None => {
                let area: f64 = fields
                    .iter()
                    .filter(|f| field_ids.contains(&f.id))
                    .map(|f| f.area_ha)
                    .sum();
                (entry.amount.unwrap_or(area), None)
            }
        };

        let mut storage_distribution = HashMap::new();
        if let (Some(storage_id), true) = (entry.storage_id, amount > 0.0) {
            if entry.activity.fertilizer().is_some() {
                storage_distribution.insert(storage_id, amount);
            }
        }

        info!(
            "[Record] Manual {:?} on {} fields: {:.1} {}",
            entry.activity,
            field_ids.len(),
            amount,
            entry.activity.unit()
        );

        Self {
            id: Uuid::new_v4().to_string(),
            date: entry.date,
            unit: entry.activity.unit().to_string(),
            activity_type: entry.activity,
            field_ids,
            amount,
            load_count,
            track_points: Vec::new(),
            field_distribution: HashMap::new(),
            storage_distribution,
            field_sources: HashMap::new(),
            detailed_field_sources: HashMap::new(),
            notes: entry.notes.filter(|n| !n.trim().is_empty()),
            start_time: None,
            end_time: None,
        }
    }

    /// Whether the record carries a GPS-derived field distribution.
    pub fn has_field_attribution(&self) -> bool {
        !self.field_distribution.is_empty()
    }

    pub fn duration_ms(&self) -> Option<u64> {
        Some(self.end_time?.saturating_sub(self.start_time?))
    }
}
