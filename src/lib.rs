//! # Trail Recorder
//!
//! Noise-resistant GPS recording core for hiking apps.
//!
//! This library provides:
//! - Fix gating with cold-start, stale-fix and anti-teleport handling
//! - Battery-aware adaptive sampling tiers
//! - Elevation smoothing with hysteresis gain/loss (live and batch)
//! - Point-to-polyline distance for off-trail checks and trace editing
//! - Debounced off-trail alerts per reference path
//!
//! ## Features
//!
//! - **`parallel`** - Summarize many stored tracks in parallel with rayon
//! - **`ffi`** - Enable FFI bindings for mobile platforms (iOS/Android)
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_recorder::{Fix, IngestOutcome, RecordingSession, TrackerConfig};
//!
//! let now = 1_700_000_000_000;
//! let mut session = RecordingSession::start(TrackerConfig::default(), now);
//!
//! // The first fix is held until a second one confirms it
//! let first = session.submit(Fix::new(45.8326, 6.8652, now), now);
//! assert_eq!(first.outcome, IngestOutcome::PendingStart);
//!
//! let second = session.submit(Fix::new(45.8327, 6.8652, now + 5_000), now + 5_000);
//! assert_eq!(second.outcome, IngestOutcome::Accepted);
//! assert_eq!(session.track().len(), 2);
//! ```

use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{Result, TrackError};

// Externally owned, validated configuration
pub mod config;
pub use config::{
    ElevationConfig, GateConfig, OffTrailConfig, SamplingConfig, TierCadence, TrackerConfig,
};

// Geographic utilities (distance, local projection, bounds)
pub mod geo_utils;

// Point-to-polyline distance
pub mod projection;
pub use projection::{distance_to_path, insertion_index, project_onto_path, PathProjection};

// Fix gating
pub mod gate;
pub use gate::{Admission, GateDecision, IngestOutcome, LocationIngestGate};

// Adaptive sampling tiers
pub mod sampling;
pub use sampling::{AdaptiveSamplingController, CadenceRequest, SamplingTier};

// Elevation smoothing and gain/loss
pub mod elevation;
pub use elevation::{ElevationFilter, ElevationSummary};

// Off-trail alerts
pub mod off_trail;
pub use off_trail::{
    AlertSink, OffTrailAlert, OffTrailMonitor, OffTrailPhase, OffTrailSource, OffTrailTicker,
    PathKind, ReferencePath, WatchContext,
};

// Recording session and process-wide recorder
pub mod session;
pub use session::{
    notify, with_recorder, PositioningControl, Recorder, RecordingSession, SessionStats,
    StoppedSession, SubmitReport, TrackEvent, TrackListener, RECORDER,
};

// Batch statistics for stored tracks
pub mod summary;
pub use summary::{summarize_tracks, TrackSummary};

// Algorithm toolbox - standalone access to the pure algorithms
// Use trail_recorder::algorithms::{...}
pub mod algorithms;

// FFI bindings for mobile platforms (iOS/Android)
#[cfg(feature = "ffi")]
pub mod ffi;

#[cfg(feature = "ffi")]
uniffi::setup_scaffolding!();

/// Initialize logging for Android (only used in FFI)
#[cfg(all(feature = "ffi", target_os = "android"))]
pub(crate) fn init_logging() {
    use android_logger::Config;
    use log::LevelFilter;

    android_logger::init_once(
        Config::default()
            .with_max_level(LevelFilter::Debug)
            .with_tag("TrailRecorder"),
    );
}

#[cfg(all(feature = "ffi", not(target_os = "android")))]
pub(crate) fn init_logging() {
    // No-op on non-Android platforms
}

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trail_recorder::GpsPoint;
/// let point = GpsPoint::new(45.8326, 6.8652); // Chamonix
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box for a track or path.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }
}

/// Which positioning provider produced a fix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Enum))]
pub enum FixSource {
    #[default]
    Gnss,
    Network,
}

/// One raw positioning sample as delivered by the platform.
///
/// `timestamp_ms <= 0` means the platform did not report a time; the gate
/// substitutes the ingestion time.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct Fix {
    pub latitude: f64,
    pub longitude: f64,
    /// Altitude above sea level (meters)
    pub altitude: Option<f64>,
    /// Horizontal accuracy radius (meters)
    pub accuracy: Option<f64>,
    /// Platform-reported ground speed (m/s)
    pub speed: Option<f64>,
    /// Unix epoch milliseconds
    pub timestamp_ms: i64,
    #[serde(default)]
    pub source: FixSource,
}

impl Fix {
    /// A GNSS fix with only a position and a timestamp.
    pub fn new(latitude: f64, longitude: f64, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude: None,
            accuracy: None,
            speed: None,
            timestamp_ms,
            source: FixSource::Gnss,
        }
    }

    pub fn at(point: GpsPoint, timestamp_ms: i64) -> Self {
        Self::new(point.latitude, point.longitude, timestamp_ms)
    }

    pub fn with_altitude(mut self, altitude: f64) -> Self {
        self.altitude = Some(altitude);
        self
    }

    pub fn with_accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_speed(mut self, speed: f64) -> Self {
        self.speed = Some(speed);
        self
    }

    pub fn with_source(mut self, source: FixSource) -> Self {
        self.source = source;
        self
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }

    /// Reduce to a trajectory point.
    pub fn to_track_point(&self) -> TrackPoint {
        TrackPoint {
            latitude: self.latitude,
            longitude: self.longitude,
            altitude: self.altitude.filter(|a| a.is_finite()),
            timestamp_ms: self.timestamp_ms,
        }
    }
}

/// An accepted fix, as appended to a trajectory.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    pub timestamp_ms: i64,
}

impl TrackPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: Option<f64>, timestamp_ms: i64) -> Self {
        Self {
            latitude,
            longitude,
            altitude,
            timestamp_ms,
        }
    }

    pub fn position(&self) -> GpsPoint {
        GpsPoint::new(self.latitude, self.longitude)
    }
}
