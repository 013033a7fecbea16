//! Session controller.
//!
//! [`Tracker`] owns at most one [`Session`] and is the control surface the app talks
//! to: start, pause, resume, finish and discard, plus the single fix entry point
//! [`Tracker::on_location`] shared by live GPS and simulated drags.

use log::{debug, info, warn};

use crate::attribution::attribute;
use crate::config::TrackingConfig;
use crate::error::{Result, TrackerError};
use crate::external::{ActivitySink, FarmData, LocationSource};
use crate::farm::ActivityType;
use crate::record::ActivityRecord;
use crate::segments::{build_segments, TrackSegment};
use crate::session::{transition, FixOutcome, Session, SessionStats, TrackingContext, TrackingState};
use crate::simulation::Simulator;
use crate::LocationFix;

pub struct Tracker {
    source: Box<dyn LocationSource>,
    sink: Box<dyn ActivitySink>,
    config: TrackingConfig,
    session: Option<Session>,
    context: Option<TrackingContext>,
    simulator: Simulator,
    watch_id: Option<u64>,
    test_mode: bool,
}

impl Tracker {
    pub fn new(source: Box<dyn LocationSource>, sink: Box<dyn ActivitySink>) -> Self {
        let config = TrackingConfig::default();
        Self {
            source,
            sink,
            simulator: Simulator::new(config.simulation_throttle_ms),
            config,
            session: None,
            context: None,
            watch_id: None,
            test_mode: false,
        }
    }

    /// Replace the internal thresholds. Applies from the next session on.
    pub fn with_config(mut self, config: TrackingConfig) -> Self {
        self.simulator = Simulator::new(config.simulation_throttle_ms);
        self.config = config;
        self
    }

    /// Current state; `Idle` without a session.
    pub fn state(&self) -> TrackingState {
        self.session.as_ref().map_or(TrackingState::Idle, |s| s.state)
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_test_mode(&self) -> bool {
        self.test_mode
    }

    /// Start recording `activity`.
    ///
    /// Fields, storages and settings are read from `farm` once and kept for the whole
    /// session. Fails when a session is already active or the settings are invalid.
    pub fn start(&mut self, activity: ActivityType, farm: &dyn FarmData, now_ms: u64) -> Result<()> {
        if self.session.is_some() {
            return Err(TrackerError::SessionActive);
        }

        let settings = farm.settings();
        settings.validate()?;

        let context = TrackingContext::new(activity, farm.fields(), farm.storage_locations(), settings)
            .with_config(self.config.clone());

        info!(
            "[Tracker] Starting {:?} with {} fields, {} storages (test mode: {})",
            activity,
            context.fields.fields().len(),
            context.storages.len(),
            self.test_mode
        );
        if context.fields.fields().is_empty() {
            warn!("[Tracker] No fields defined; nothing will be attributed");
        }

        self.simulator.reset();
        self.session = Some(Session::new(now_ms, self.test_mode));
        self.context = Some(context);
        self.watch_id = Some(self.source.watch());
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(TrackerError::NoActiveSession)?;
        session.is_paused = true;
        info!("[Tracker] Paused");
        Ok(())
    }

    pub fn resume(&mut self) -> Result<()> {
        let session = self.session.as_mut().ok_or(TrackerError::NoActiveSession)?;
        session.is_paused = false;
        info!("[Tracker] Resumed");
        Ok(())
    }

    /// Toggle test mode: lifts the accuracy filter and allows [`Tracker::simulate_move`].
    pub fn set_test_mode(&mut self, enabled: bool) {
        self.test_mode = enabled;
        if let Some(session) = self.session.as_mut() {
            session.is_test_mode = enabled;
        }
        self.simulator.reset();
        info!("[Tracker] Test mode {}", if enabled { "on" } else { "off" });
    }

    /// Feed one fix.
    ///
    /// Returns `None` when no session is recording or no watch is active.
    pub fn on_location(&mut self, fix: LocationFix) -> Option<FixOutcome> {
        if self.watch_id.is_none() {
            debug!("[Tracker] Ignoring fix without an active watch");
            return None;
        }
        let context = self.context.as_ref()?;
        let session = self.session.take()?;

        let (session, outcome) = transition(session, &fix, context);
        self.session = Some(session);
        Some(outcome)
    }

    /// Move the simulated vehicle to a dragged position.
    ///
    /// `Ok(None)` when the drag is throttled.
    pub fn simulate_move(&mut self, lat: f64, lng: f64, now_ms: u64) -> Result<Option<FixOutcome>> {
        if !self.test_mode {
            return Err(TrackerError::TestModeDisabled);
        }
        if self.session.is_none() {
            return Err(TrackerError::NoActiveSession);
        }

        Ok(self
            .simulator
            .drag_to(lat, lng, now_ms)
            .and_then(|fix| self.on_location(fix)))
    }

    /// Finish the session: attribute, save the record and report withdrawals.
    pub fn finish(&mut self, notes: Option<String>, now_ms: u64) -> Result<ActivityRecord> {
        let (Some(session), Some(context)) = (self.session.take(), self.context.take()) else {
            return Err(TrackerError::NoActiveSession);
        };
        self.clear_watch();

        let attribution = attribute(
            &session.track_points,
            &context.fields,
            &context.activity,
            &context.settings,
            &session.load_counts,
        );
        let record = ActivityRecord::tracked(
            context.activity,
            attribution,
            session.track_points,
            notes,
            session.start_time_ms,
            now_ms,
        );

        info!(
            "[Tracker] Finished {}: {:.1} {} on {} fields, {} points",
            record.id,
            record.amount,
            record.unit,
            record.field_ids.len(),
            record.track_points.len()
        );

        self.sink.save_activity(record.clone());
        if !record.storage_distribution.is_empty() {
            self.sink.update_storage_levels(record.storage_distribution.clone());
        }
        Ok(record)
    }

    /// Drop the session without saving anything.
    pub fn discard(&mut self) {
        self.clear_watch();
        if let Some(session) = self.session.take() {
            info!("[Tracker] Discarded session with {} points", session.track_points.len());
        }
        self.context = None;
    }

    pub fn stats(&self, now_ms: u64) -> Option<SessionStats> {
        let session = self.session.as_ref()?;
        let context = self.context.as_ref()?;
        Some(session.stats(context, now_ms))
    }

    /// Colored segments of the track recorded so far.
    pub fn segments(&self) -> Vec<TrackSegment> {
        match (&self.session, &self.context) {
            (Some(session), Some(context)) => {
                build_segments(&session.track_points, &context.storages, &context.activity)
            }
            _ => Vec::new(),
        }
    }

    fn clear_watch(&mut self) {
        if let Some(id) = self.watch_id.take() {
            self.source.clear_watch(id);
        }
    }
}
