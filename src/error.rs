//! Unified error handling for the trail-recorder library.
//!
//! Gate rejections, missing altitudes and degenerate geometry are expected
//! outcomes and never surface here. Out-of-range settings are clamped, so the
//! only configuration failure is unparseable JSON. Otherwise this type covers
//! lifecycle misuse and collaborator failures.

use thiserror::Error;

/// Unified error type for trail-recorder operations.
#[derive(Debug, Error)]
pub enum TrackError {
    /// `start` was called while a session is still recording
    #[error("A recording session is already active (started at {started_at_ms})")]
    SessionActive { started_at_ms: i64 },

    /// An operation needs a session but none is active
    #[error("No recording session is active")]
    NoActiveSession,

    /// Configuration JSON could not be parsed
    #[error("Invalid configuration JSON: {0}")]
    ConfigJson(#[from] serde_json::Error),

    /// The positioning subsystem refused a cadence change
    #[error("Positioning unavailable: {message}")]
    PositioningUnavailable { message: String },
}

/// Result type alias for trail-recorder operations.
pub type Result<T> = std::result::Result<T, TrackError>;

impl TrackError {
    /// Shorthand used by positioning collaborators.
    pub fn positioning(message: impl Into<String>) -> Self {
        TrackError::PositioningUnavailable {
            message: message.into(),
        }
    }
}
