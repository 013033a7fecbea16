//! # Tracking State Machine
//!
//! A [`Session`] is the in-memory state of one recording. Fixes advance it through
//! [`transition`], a by-value function `(Session, Fix, Context) -> (Session, Outcome)`;
//! live and simulated fixes take the same path and differ only in their
//! [`FixSource`] tag.
//!
//! ## Rules (per fix, in order)
//!
//! 1. Speed: reported m/s × 3.6, or derived from the previous accepted fix.
//! 2. Loading: in range of a matching storage, below the loading speed, and either a
//!    different storage than the active source or the current load has already been
//!    spread → `Loading`, one more load from that storage.
//! 3. Leaving: away from every storage and above the moving speed while `Loading`
//!    → `Transit`.
//! 4. Working: inside a field within the speed window → `Spreading`; otherwise stay
//!    `Loading` if loading, else `Transit`.
//!
//! Fixes with a non-finite or out-of-range position are always dropped. Fixes with a
//! poor or unknown accuracy are dropped too (except in test mode), and a paused
//! session only tracks the displayed position.
//!
//! ## Path Thinning
//!
//! Every processed fix becomes a candidate [`TrackPoint`], recorded only when it lies
//! further than the thinning distance from the last recorded point. An idling vehicle
//! therefore adds nothing, while a moving one keeps its full geometry.

use std::collections::HashMap;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::classifier::{classify_storage, FieldIndex, StorageProximity};
use crate::config::{TrackerSettings, TrackingConfig};
use crate::farm::{ActivityType, FertilizerType, Field, StorageLocation};
use crate::geo_utils::{distance_meters, polyline_length};
use crate::{FixSource, GeoPoint, LocationFix, TrackPoint};

/// Semantic state of the vehicle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrackingState {
    /// No session is recording.
    Idle,
    /// Stopped at a storage taking on material.
    Loading,
    /// Moving without working.
    Transit,
    /// Inside a field within the working speed window.
    Spreading,
}

/// Read-only snapshot the state machine classifies against.
///
/// Taken at session start; edits to fields or storages made afterwards do not affect
/// the running session.
#[derive(Debug, Clone)]
pub struct TrackingContext {
    pub activity: ActivityType,
    pub fields: FieldIndex,
    pub storages: Vec<StorageLocation>,
    pub settings: TrackerSettings,
    pub config: TrackingConfig,
}

impl TrackingContext {
    pub fn new(
        activity: ActivityType,
        fields: Vec<Field>,
        storages: Vec<StorageLocation>,
        settings: TrackerSettings,
    ) -> Self {
        Self {
            activity,
            fields: FieldIndex::new(fields),
            storages,
            settings,
            config: TrackingConfig::default(),
        }
    }

    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.config = config;
        self
    }

    /// Minimum movement before a point from `source` is recorded.
    fn thinning_distance(&self, source: FixSource) -> f64 {
        match source {
            FixSource::Live => self.config.live_thinning_m,
            FixSource::Simulated => self.config.simulated_thinning_m,
        }
    }
}

/// Non-fatal advisories raised while processing fixes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum TrackerWarning {
    /// Stopped at a storage holding a different material than the activity spreads.
    StorageTypeMismatch {
        storage_id: String,
        found: FertilizerType,
        expected: FertilizerType,
    },
}

/// What happened to a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FixDisposition {
    /// Classified and offered to the path recorder.
    Processed,
    /// Reported accuracy was worse than the tolerance or unknown.
    DroppedLowAccuracy,
    /// Position was not a finite WGS84 coordinate.
    DroppedInvalid,
    /// Session is paused; only the displayed position moved.
    Paused,
}

/// Result of feeding one fix to the state machine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct FixOutcome {
    pub disposition: FixDisposition,
    /// State after the fix
    pub state: TrackingState,
    /// Speed used for classification (km/h)
    pub speed_kmh: f64,
    /// Field containing the fix, if any
    pub field_id: Option<String>,
    /// Whether a track point was appended
    pub point_recorded: bool,
    /// Storage a new load was registered from
    pub load_registered: Option<String>,
    pub warnings: Vec<TrackerWarning>,
}

impl FixOutcome {
    fn skipped(disposition: FixDisposition, state: TrackingState) -> Self {
        Self {
            disposition,
            state,
            speed_kmh: 0.0,
            field_id: None,
            point_recorded: false,
            load_registered: None,
            warnings: Vec::new(),
        }
    }
}

/// Live statistics of a running session.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct SessionStats {
    pub duration_ms: u64,
    /// Length of the recorded track (meters)
    pub distance_m: f64,
    /// Length of the track recorded while spreading (meters)
    pub working_distance_m: f64,
    /// Working distance times spread width; only for fertilization
    pub worked_area_ha: Option<f64>,
    pub point_count: u32,
    pub total_loads: u32,
}

/// In-memory state of one recording.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub state: TrackingState,
    pub start_time_ms: u64,
    pub track_points: Vec<TrackPoint>,
    /// Loads drawn per storage id
    pub load_counts: HashMap<String, u32>,
    /// Storage the material currently on board came from
    pub active_source_id: Option<String>,
    /// Number of loads registered so far; the current load's 1-based index
    pub load_index: u32,
    pub is_paused: bool,
    pub is_test_mode: bool,
    /// Last displayed position (also updated while paused)
    pub current_position: Option<GeoPoint>,
    pub current_speed_kmh: f64,
    pub current_field_id: Option<String>,
    /// Last accepted fix, for deriving speed when the platform reports none
    last_fix: Option<(GeoPoint, u64)>,
    /// Whether the current load has been spread, allowing a reload from the same storage
    spread_since_load: bool,
    /// Storage a type-mismatch advisory was last raised for
    mismatch_warned: Option<String>,
}

impl Session {
    /// A fresh session, moving but not yet working.
    pub fn new(start_time_ms: u64, is_test_mode: bool) -> Self {
        Self {
            state: TrackingState::Transit,
            start_time_ms,
            track_points: Vec::new(),
            load_counts: HashMap::new(),
            active_source_id: None,
            load_index: 0,
            is_paused: false,
            is_test_mode,
            current_position: None,
            current_speed_kmh: 0.0,
            current_field_id: None,
            last_fix: None,
            spread_since_load: false,
            mismatch_warned: None,
        }
    }

    pub fn total_loads(&self) -> u32 {
        self.load_counts.values().sum()
    }

    /// Statistics as of `now_ms`.
    pub fn stats(&self, ctx: &TrackingContext, now_ms: u64) -> SessionStats {
        let positions = |run: &[TrackPoint]| run.iter().map(TrackPoint::position).collect::<Vec<_>>();

        let distance_m = polyline_length(&positions(&self.track_points));
        let working_distance_m: f64 = self
            .track_points
            .chunk_by(|a, b| a.is_spreading == b.is_spreading)
            .filter(|run| run[0].is_spreading)
            .map(|run| polyline_length(&positions(run)))
            .sum();

        let worked_area_ha = ctx
            .activity
            .fertilizer()
            .map(|f| working_distance_m * ctx.settings.spread_width(f) / 10_000.0);

        SessionStats {
            duration_ms: now_ms.saturating_sub(self.start_time_ms),
            distance_m,
            working_distance_m,
            worked_area_ha,
            point_count: self.track_points.len() as u32,
            total_loads: self.total_loads(),
        }
    }

    /// Speed for this fix: reported when available, otherwise derived from the
    /// previous accepted fix.
    fn speed_for(&self, fix: &LocationFix) -> f64 {
        if let Some(kmh) = fix.reported_speed_kmh() {
            return kmh;
        }
        match self.last_fix {
            Some((last, last_ts)) if fix.timestamp_ms > last_ts => {
                let elapsed_s = (fix.timestamp_ms - last_ts) as f64 / 1000.0;
                distance_meters(&last, &fix.position()) / elapsed_s * 3.6
            }
            _ => 0.0,
        }
    }

    fn register_load(&mut self, storage_id: &str) {
        *self.load_counts.entry(storage_id.to_string()).or_insert(0) += 1;
        self.active_source_id = Some(storage_id.to_string());
        self.load_index += 1;
        self.spread_since_load = false;
    }

    /// Append `point` unless it is within `min_distance` of the last recorded point.
    fn record_point(&mut self, point: TrackPoint, min_distance: f64) -> bool {
        if let Some(last) = self.track_points.last() {
            if distance_meters(&last.position(), &point.position()) <= min_distance {
                return false;
            }
        }
        self.track_points.push(point);
        true
    }
}

/// Advance `session` by one fix.
///
/// This is the single entry point for live and simulated fixes.
pub fn transition(mut session: Session, fix: &LocationFix, ctx: &TrackingContext) -> (Session, FixOutcome) {
    let position = fix.position();

    if !position.is_valid() {
        debug!("[Session] Dropping fix at {} with invalid position", fix.timestamp_ms);
        let outcome = FixOutcome::skipped(FixDisposition::DroppedInvalid, session.state);
        return (session, outcome);
    }

    if session.is_paused {
        session.current_position = Some(position);
        let outcome = FixOutcome::skipped(FixDisposition::Paused, session.state);
        return (session, outcome);
    }

    if !session.is_test_mode && (!fix.accuracy_m.is_finite() || fix.accuracy_m > ctx.config.max_accuracy_m) {
        debug!(
            "[Session] Dropping fix at {} with accuracy {:.0}m",
            fix.timestamp_ms, fix.accuracy_m
        );
        let outcome = FixOutcome::skipped(FixDisposition::DroppedLowAccuracy, session.state);
        return (session, outcome);
    }

    // Rule 1: speed
    let speed_kmh = session.speed_for(fix);
    session.last_fix = Some((position, fix.timestamp_ms));
    session.current_position = Some(position);
    session.current_speed_kmh = speed_kmh;

    let previous_state = session.state;
    let mut warnings = Vec::new();
    let mut load_registered = None;

    // Rule 2: loading at a matching storage
    let proximity = classify_storage(&position, &ctx.storages, &ctx.activity, ctx.settings.storage_radius);
    match &proximity {
        StorageProximity::Matching { storage_id, distance_m } => {
            session.mismatch_warned = None;
            let new_source = session.active_source_id.as_deref() != Some(storage_id.as_str());
            if speed_kmh < ctx.config.loading_speed_kmh && (new_source || session.spread_since_load) {
                session.register_load(storage_id);
                session.state = TrackingState::Loading;
                info!(
                    "[Session] Load #{} from {} ({:.1}m away)",
                    session.load_index, storage_id, distance_m
                );
                load_registered = Some(storage_id.clone());
            }
        }
        StorageProximity::Mismatch { storage_id, found, expected } => {
            let stopped = speed_kmh < ctx.config.loading_speed_kmh;
            if stopped && session.mismatch_warned.as_deref() != Some(storage_id.as_str()) {
                warn!(
                    "[Session] Storage {} holds {:?} but the activity spreads {:?}; no load registered",
                    storage_id, found, expected
                );
                session.mismatch_warned = Some(storage_id.clone());
                warnings.push(TrackerWarning::StorageTypeMismatch {
                    storage_id: storage_id.clone(),
                    found: *found,
                    expected: *expected,
                });
            }
        }
        StorageProximity::Nearby { .. } | StorageProximity::Away => {
            session.mismatch_warned = None;
        }
    }

    // Rule 3: leaving the storage
    if session.state == TrackingState::Loading
        && !proximity.is_near()
        && speed_kmh > ctx.config.moving_speed_kmh
    {
        session.state = TrackingState::Transit;
    }

    // Rule 4: working inside a field
    let field_id = ctx.fields.find_containing(&position).map(|f| f.id.clone());
    session.state = if field_id.is_some() && ctx.settings.is_working_speed(speed_kmh) {
        TrackingState::Spreading
    } else if session.state == TrackingState::Loading {
        TrackingState::Loading
    } else {
        TrackingState::Transit
    };

    if session.state == TrackingState::Spreading {
        session.spread_since_load = true;
    }
    if session.state != previous_state {
        debug!(
            "[Session] {:?} -> {:?} at {:.1} km/h (field: {:?})",
            previous_state, session.state, speed_kmh, field_id
        );
    }
    session.current_field_id = field_id.clone();

    let candidate = TrackPoint {
        lat: position.lat,
        lng: position.lng,
        timestamp: fix.timestamp_ms,
        speed: speed_kmh,
        is_spreading: session.state == TrackingState::Spreading,
        storage_id: session.active_source_id.clone(),
        load_index: (session.load_index > 0).then_some(session.load_index),
    };
    let point_recorded = session.record_point(candidate, ctx.thinning_distance(fix.source));

    let outcome = FixOutcome {
        disposition: FixDisposition::Processed,
        state: session.state,
        speed_kmh,
        field_id,
        point_recorded,
        load_registered,
        warnings,
    };
    (session, outcome)
}
