//! # Field Tracker
//!
//! Real-time GPS tracking of field work for farm record keeping.
//!
//! While a vehicle works, the tracker consumes a stream of raw location fixes and
//! derives:
//! - which geofenced field the vehicle is in
//! - whether material is being spread (inside a field, within the working speed window)
//! - which storage a load was drawn from (slow stop next to a matching storage)
//! - a thinned track split into segments per source, and at the end a per-field and
//!   per-storage attribution of the spread amount
//!
//! Noisy, gapped or simulated input is tolerated: low-accuracy fixes are dropped,
//! missing speeds are derived from position changes, and degenerate geometry never
//! panics.
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel per-point classification with rayon
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use field_tracker::{
//!     ActivityType, FertilizerType, Field, FieldKind, GeoPoint, LocationFix,
//!     ManualLocationSource, MemoryFarm, RecordingSink, StorageLocation, Tracker,
//!     TrackerSettings, TrackingState,
//! };
//!
//! let field = Field::new("f1", "Nordacker", FieldKind::Acker, vec![
//!     GeoPoint::new(52.000, 8.000),
//!     GeoPoint::new(52.000, 8.003),
//!     GeoPoint::new(52.003, 8.003),
//!     GeoPoint::new(52.003, 8.000),
//! ]);
//! let pit = StorageLocation::new("s1", "Güllegrube", FertilizerType::Slurry, GeoPoint::new(51.999, 8.000));
//! let farm = MemoryFarm::new(vec![field], vec![pit], TrackerSettings::default());
//!
//! let mut tracker = Tracker::new(
//!     Box::new(ManualLocationSource::default()),
//!     Box::new(RecordingSink::default()),
//! );
//! let slurry = ActivityType::Fertilization { fertilizer: FertilizerType::Slurry };
//! tracker.start(slurry, &farm, 0).unwrap();
//!
//! // Stop at the pit, then drive into the field at 6 km/h
//! tracker.on_location(LocationFix::live(51.99902, 8.000, 5.0, 1_000).with_speed(0.0));
//! assert_eq!(tracker.state(), TrackingState::Loading);
//! tracker.on_location(LocationFix::live(52.001, 8.001, 5.0, 60_000).with_speed(6.0 / 3.6));
//! assert_eq!(tracker.state(), TrackingState::Spreading);
//!
//! let record = tracker.finish(None, 120_000).unwrap();
//! assert_eq!(record.amount, 12.0);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackerError};

// Tracker configuration (user settings + internal thresholds)
pub mod config;
pub use config::{TrackerSettings, TrackingConfig};

// Geometry kernel (distance, containment, area, splitting)
pub mod geo_utils;

// Fields, storages and activity types
pub mod farm;
pub use farm::{
    ActivityType, FertilizerType, Field, FieldKind, HarvestKind, StorageLocation,
    TillageMethod, apply_withdrawals,
};

// Stateless field / storage classification
pub mod classifier;
pub use classifier::{
    FieldIndex, StorageProximity, classify_storage, find_containing_field,
    find_nearest_storage,
};

// Per-fix state machine and path recorder
pub mod session;
pub use session::{
    FixDisposition, FixOutcome, Session, SessionStats, TrackerWarning, TrackingContext,
    TrackingState, transition,
};

// Segment grouping and coloring
pub mod segments;
pub use segments::{TrackSegment, build_segments, simplify_segment, source_color};

// Amount attribution at session end
pub mod attribution;
pub use attribution::{Attribution, attribute, estimate_field_amounts};

// Activity records (tracked and manual)
pub mod record;
pub use record::{ActivityRecord, ManualEntry};

// Synthetic fixes from map drags
pub mod simulation;
pub use simulation::Simulator;

// Collaborator interfaces (location watch, farm data, persistence)
pub mod external;
pub use external::{
    ActivitySink, FarmData, LocationSource, ManualLocationSource, MemoryFarm, RecordingSink,
};

// Session controller
pub mod tracker;
pub use tracker::Tracker;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("FieldTrackerRust")
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate in degrees.
///
/// # Example
/// ```
/// use field_tracker::GeoPoint;
/// let point = GeoPoint::new(52.0302, 8.5325); // Bielefeld
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GeoPoint {
    pub lat: f64,
    pub lng: f64,
}

impl GeoPoint {
    /// Create a new point.
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.lat.is_finite()
            && self.lng.is_finite()
            && self.lat >= -90.0
            && self.lat <= 90.0
            && self.lng >= -180.0
            && self.lng <= 180.0
    }
}

/// Bounding box of a set of points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from points.
    pub fn from_points(points: &[GeoPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.lat);
            max_lat = max_lat.max(p.lat);
            min_lng = min_lng.min(p.lng);
            max_lng = max_lng.max(p.lng);
        }

        Some(Self { min_lat, max_lat, min_lng, max_lng })
    }

    /// Get the center point of the bounds.
    pub fn center(&self) -> GeoPoint {
        GeoPoint::new(
            (self.min_lat + self.max_lat) / 2.0,
            (self.min_lng + self.max_lng) / 2.0,
        )
    }
}

/// Where a fix came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FixSource {
    /// Platform geolocation watch.
    Live,
    /// Synthesized from a map drag in test mode.
    Simulated,
}

/// One raw position sample.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct LocationFix {
    pub lat: f64,
    pub lng: f64,
    /// Ground speed reported by the platform, if any (m/s)
    pub speed_mps: Option<f64>,
    /// Horizontal accuracy radius (meters)
    pub accuracy_m: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp_ms: u64,
    /// Course over ground in degrees clockwise from north, if known
    pub heading: Option<f64>,
    pub source: FixSource,
}

impl LocationFix {
    /// A live fix without speed or heading.
    pub fn live(lat: f64, lng: f64, accuracy_m: f64, timestamp_ms: u64) -> Self {
        Self {
            lat,
            lng,
            speed_mps: None,
            accuracy_m,
            timestamp_ms,
            heading: None,
            source: FixSource::Live,
        }
    }

    /// Attach a reported ground speed (m/s).
    pub fn with_speed(mut self, speed_mps: f64) -> Self {
        self.speed_mps = Some(speed_mps);
        self
    }

    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }

    /// Reported speed in km/h, ignoring the negative or non-finite values some
    /// platforms use for "unknown".
    pub fn reported_speed_kmh(&self) -> Option<f64> {
        self.speed_mps
            .filter(|v| v.is_finite() && *v >= 0.0)
            .map(|v| v * 3.6)
    }
}

/// A recorded point of an activity's track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackPoint {
    pub lat: f64,
    pub lng: f64,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
    /// Speed at this point (km/h)
    pub speed: f64,
    pub is_spreading: bool,
    /// Storage the current load was drawn from
    pub storage_id: Option<String>,
    /// Sequence number of the current load within the session (1-based)
    pub load_index: Option<u32>,
}

impl TrackPoint {
    pub fn position(&self) -> GeoPoint {
        GeoPoint::new(self.lat, self.lng)
    }
}

// ============================================================================
// FFI Exports (only when feature enabled)
// ============================================================================

#[cfg(feature = "ffi")]
mod ffi {
    use super::*;
    use log::info;
    use std::sync::Mutex;

    /// Thread-safe tracker handle for the mobile shell.
    ///
    /// The platform owns the geolocation watch and pushes fixes through
    /// [`FfiTracker::on_location`]; persistence happens through the sink callbacks.
    #[derive(uniffi::Object)]
    pub struct FfiTracker {
        inner: Mutex<Tracker>,
    }

    #[uniffi::export]
    impl FfiTracker {
        #[uniffi::constructor]
        pub fn new(source: Box<dyn LocationSource>, sink: Box<dyn ActivitySink>) -> Self {
            init_logging();
            info!("[FieldTrackerRust] tracker created");
            Self { inner: Mutex::new(Tracker::new(source, sink)) }
        }

        pub fn start(&self, activity: ActivityType, farm: Box<dyn FarmData>, now_ms: u64) -> Result<()> {
            self.lock().start(activity, farm.as_ref(), now_ms)
        }

        pub fn on_location(&self, fix: LocationFix) -> Option<FixOutcome> {
            self.lock().on_location(fix)
        }

        pub fn simulate_move(&self, lat: f64, lng: f64, now_ms: u64) -> Result<Option<FixOutcome>> {
            self.lock().simulate_move(lat, lng, now_ms)
        }

        pub fn pause(&self) -> Result<()> {
            self.lock().pause()
        }

        pub fn resume(&self) -> Result<()> {
            self.lock().resume()
        }

        pub fn set_test_mode(&self, enabled: bool) {
            self.lock().set_test_mode(enabled)
        }

        pub fn state(&self) -> TrackingState {
            self.lock().state()
        }

        pub fn stats(&self, now_ms: u64) -> Option<SessionStats> {
            self.lock().stats(now_ms)
        }

        pub fn segments(&self) -> Vec<TrackSegment> {
            self.lock().segments()
        }

        pub fn finish(&self, notes: Option<String>, now_ms: u64) -> Result<ActivityRecord> {
            self.lock().finish(notes, now_ms)
        }

        pub fn discard(&self) {
            self.lock().discard()
        }
    }

    impl FfiTracker {
        fn lock(&self) -> std::sync::MutexGuard<'_, Tracker> {
            // A panic inside the tracker leaves plain data behind; keep serving it
            self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
        }
    }

    /// Great-circle distance in meters.
    #[uniffi::export]
    pub fn ffi_distance_meters(p1: GeoPoint, p2: GeoPoint) -> f64 {
        geo_utils::distance_meters(&p1, &p2)
    }

    /// Field area in hectares for a boundary ring.
    #[uniffi::export]
    pub fn ffi_polygon_area_ha(ring: Vec<GeoPoint>) -> f64 {
        geo_utils::polygon_area_ha(&ring)
    }

    /// Split a field along a cutter line; `None` when the cut is degenerate.
    #[uniffi::export]
    pub fn ffi_split_field(field: Field, cutter: Vec<GeoPoint>, first_id: String, second_id: String) -> Option<Vec<Field>> {
        init_logging();
        let (a, b) = field.split(&cutter, &first_id, &second_id)?;
        info!("[FieldTrackerRust] split {} into {:.2} ha + {:.2} ha", field.id, a.area_ha, b.area_ha);
        Some(vec![a, b])
    }

    /// Segments of a stored activity's track, for rendering.
    #[uniffi::export]
    pub fn ffi_build_segments(
        points: Vec<TrackPoint>,
        storages: Vec<StorageLocation>,
        activity: ActivityType,
    ) -> Vec<TrackSegment> {
        build_segments(&points, &storages, &activity)
    }

    /// Per-field amounts for display, falling back to area proportion.
    #[uniffi::export]
    pub fn ffi_estimate_field_amounts(record: ActivityRecord, fields: Vec<Field>) -> std::collections::HashMap<String, f64> {
        estimate_field_amounts(&record, &fields)
    }

    /// Build a record from a manual-entry form.
    #[uniffi::export]
    pub fn ffi_manual_record(entry: ManualEntry, fields: Vec<Field>, settings: TrackerSettings) -> ActivityRecord {
        ActivityRecord::manual(entry, &fields, &settings)
    }

    /// Get default tracker settings
    #[uniffi::export]
    pub fn default_settings() -> TrackerSettings {
        TrackerSettings::default()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_geo_point_validation() {
        assert!(GeoPoint::new(52.03, 8.53).is_valid());
        assert!(!GeoPoint::new(91.0, 0.0).is_valid());
        assert!(!GeoPoint::new(0.0, 181.0).is_valid());
        assert!(!GeoPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_center() {
        let bounds = Bounds::from_points(&[GeoPoint::new(52.0, 8.0), GeoPoint::new(52.2, 8.4)]).unwrap();
        let center = bounds.center();
        assert!((center.lat - 52.1).abs() < 1e-9);
        assert!((center.lng - 8.2).abs() < 1e-9);
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_reported_speed_conversion() {
        let fix = LocationFix::live(52.0, 8.0, 5.0, 0).with_speed(10.0);
        assert!((fix.reported_speed_kmh().unwrap() - 36.0).abs() < 1e-9);

        // Some platforms report -1 for "unknown"
        let unknown = LocationFix::live(52.0, 8.0, 5.0, 0).with_speed(-1.0);
        assert_eq!(unknown.reported_speed_kmh(), None);
        assert_eq!(LocationFix::live(52.0, 8.0, 5.0, 0).reported_speed_kmh(), None);
    }

    #[test]
    fn test_location_fix_camel_case_json() {
        let fix = LocationFix::live(52.0, 8.0, 4.0, 1_700_000_000_000).with_speed(1.5);
        let json = serde_json::to_value(&fix).unwrap();
        assert_eq!(json["speedMps"], 1.5);
        assert_eq!(json["accuracyM"], 4.0);
        assert_eq!(json["source"], "Live");
    }
}
