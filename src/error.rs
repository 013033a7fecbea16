//! Errors returned by the session control surface.
//!
//! Geometry, classification and per-fix processing never fail: noisy input is dropped
//! and degenerate geometry yields a default. Only misuse of the controller (or an
//! unreadable settings payload) surfaces as a [`TrackerError`].

use thiserror::Error;

/// Result type used throughout the crate.
pub type Result<T> = std::result::Result<T, TrackerError>;

#[derive(Debug, Error)]
#[cfg_attr(feature = "ffi", derive(uniffi::Error))]
#[cfg_attr(feature = "ffi", uniffi(flat_error))]
pub enum TrackerError {
    /// `start` was called while a session is already recording.
    #[error("a tracking session is already active")]
    SessionActive,

    /// An operation that needs a session was called while idle.
    #[error("no tracking session is active")]
    NoActiveSession,

    /// `simulate_move` was called outside test mode.
    #[error("simulated movement requires test mode")]
    TestModeDisabled,

    /// Settings failed validation.
    #[error("invalid settings: {0}")]
    InvalidSettings(String),

    /// Settings payload could not be parsed.
    #[error("failed to parse settings: {0}")]
    SettingsFormat(#[from] serde_json::Error),
}
