//! Tracker configuration.
//!
//! Two layers, both with sensible defaults:
//! - [`TrackerSettings`] are the user-editable values read from the settings
//!   collaborator (speed window, storage radius, load sizes, spread widths). They
//!   arrive as camelCase JSON and are validated before a session starts.
//! - [`TrackingConfig`] holds the internal thresholds of the state machine (loading and
//!   moving speeds, accuracy tolerance, point thinning, simulation throttle).

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::farm::FertilizerType;

/// User-facing tracker settings, snapshotted at session start.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackerSettings {
    /// Lower bound of the spreading speed window (km/h).
    /// Default: 2.0
    pub min_speed: f64,
    /// Upper bound of the spreading speed window (km/h).
    /// Default: 15.0
    pub max_speed: f64,
    /// Detection radius around a storage location (meters).
    /// Default: 20.0
    pub storage_radius: f64,
    /// Volume of one slurry load (m³).
    /// Default: 12.0
    pub slurry_load_size: f64,
    /// Mass of one manure load (t).
    /// Default: 10.0
    pub manure_load_size: f64,
    /// Working width of the slurry spreader (meters).
    /// Default: 12.0
    pub slurry_spread_width: f64,
    /// Working width of the manure spreader (meters).
    /// Default: 10.0
    pub manure_spread_width: f64,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self {
            min_speed: 2.0,
            max_speed: 15.0,
            storage_radius: 20.0,
            slurry_load_size: 12.0,
            manure_load_size: 10.0,
            slurry_spread_width: 12.0,
            manure_spread_width: 10.0,
        }
    }
}

impl TrackerSettings {
    /// Parse settings from the JSON document stored by the settings page.
    ///
    /// Missing keys take their default value. The result is validated.
    ///
    /// # Example
    /// ```
    /// use field_tracker::TrackerSettings;
    ///
    /// let settings = TrackerSettings::from_json(r#"{"minSpeed": 3.0, "storageRadius": 15}"#).unwrap();
    /// assert_eq!(settings.min_speed, 3.0);
    /// assert_eq!(settings.storage_radius, 15.0);
    /// assert_eq!(settings.max_speed, 15.0);
    /// ```
    pub fn from_json(json: &str) -> Result<Self> {
        let settings: Self = serde_json::from_str(json)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check that the settings describe a usable configuration.
    pub fn validate(&self) -> Result<()> {
        let values = [
            ("minSpeed", self.min_speed),
            ("maxSpeed", self.max_speed),
            ("storageRadius", self.storage_radius),
            ("slurryLoadSize", self.slurry_load_size),
            ("manureLoadSize", self.manure_load_size),
            ("slurrySpreadWidth", self.slurry_spread_width),
            ("manureSpreadWidth", self.manure_spread_width),
        ];
        for (name, value) in values {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackerError::InvalidSettings(format!(
                    "{} must be a non-negative number, got {}",
                    name, value
                )));
            }
        }
        if self.min_speed > self.max_speed {
            return Err(TrackerError::InvalidSettings(format!(
                "minSpeed ({}) exceeds maxSpeed ({})",
                self.min_speed, self.max_speed
            )));
        }
        Ok(())
    }

    /// Amount carried by one load of the given fertilizer.
    pub fn load_size(&self, fertilizer: FertilizerType) -> f64 {
        match fertilizer {
            FertilizerType::Slurry => self.slurry_load_size,
            FertilizerType::Manure => self.manure_load_size,
        }
    }

    /// Working width for the given fertilizer.
    pub fn spread_width(&self, fertilizer: FertilizerType) -> f64 {
        match fertilizer {
            FertilizerType::Slurry => self.slurry_spread_width,
            FertilizerType::Manure => self.manure_spread_width,
        }
    }

    /// Whether a speed (km/h) falls inside the spreading window.
    #[inline]
    pub fn is_working_speed(&self, speed_kmh: f64) -> bool {
        speed_kmh >= self.min_speed && speed_kmh <= self.max_speed
    }
}

/// Internal thresholds of the tracking state machine.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackingConfig {
    /// Below this speed near a matching storage a load is registered (km/h).
    /// Default: 2.0
    pub loading_speed_kmh: f64,
    /// Above this speed outside every storage radius, loading ends (km/h).
    /// Default: 3.0
    pub moving_speed_kmh: f64,
    /// Live fixes reporting a worse accuracy are dropped (meters).
    /// Default: 50.0
    pub max_accuracy_m: f64,
    /// Minimum movement before a live point is recorded (meters).
    /// Default: 0.5
    pub live_thinning_m: f64,
    /// Minimum movement before a simulated point is recorded (meters).
    /// Default: 0.2
    pub simulated_thinning_m: f64,
    /// Minimum interval between simulated drag updates (milliseconds).
    /// Default: 80
    pub simulation_throttle_ms: u64,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            loading_speed_kmh: 2.0,
            moving_speed_kmh: 3.0,
            max_accuracy_m: 50.0,
            live_thinning_m: 0.5,
            simulated_thinning_m: 0.2,
            simulation_throttle_ms: 80,
        }
    }
}
