//! # Algorithm Toolbox
//!
//! Direct access to the pure algorithms, without a recording session.
//! Use these when recomputing statistics after editing a track, or when
//! embedding one piece (say, the elevation filter) in another pipeline.
//!
//! ## Core Algorithms
//!
//! - **Fix Gating**: cold start, stale fixes, long gaps, minimum movement
//! - **Adaptive Sampling**: movement tiers and delivery cadence
//! - **Elevation Filter**: median + exponential smoothing with leg hysteresis
//! - **Path Projection**: nearest point on a polyline
//! - **Off-Trail Monitor**: debounced excursion alerts
//!
//! ## Geographic Utilities
//!
//! - **Haversine Distance**: Great-circle distance between GPS points
//! - **Polyline Length**: Total distance along a path
//! - **Local Projection**: Tangent-plane meters around an origin
//!
//! # Example
//!
//! ```rust
//! use trail_recorder::algorithms::{
//!     distance_to_path, offset_meters, ElevationConfig, ElevationFilter, GpsPoint, TrackPoint,
//! };
//!
//! let start = GpsPoint::new(45.9237, 6.8694);
//! let path = vec![start, offset_meters(&start, 0.0, 500.0)];
//! let me = offset_meters(&start, 30.0, 250.0);
//! let off_by = distance_to_path(&me, &path).unwrap();
//! assert!((off_by - 30.0).abs() < 0.5);
//!
//! let track: Vec<TrackPoint> = path
//!     .iter()
//!     .enumerate()
//!     .map(|(i, p)| TrackPoint::new(p.latitude, p.longitude, Some(1_000.0), i as i64 * 60_000))
//!     .collect();
//! let filter = ElevationFilter::replay(&track, &ElevationConfig::default());
//! assert_eq!(filter.summary().gain_m, 0.0);
//! ```

// =============================================================================
// Core Types (re-exported from lib)
// =============================================================================

pub use crate::{Bounds, Fix, FixSource, GpsPoint, TrackPoint};

// =============================================================================
// Configuration
// =============================================================================

pub use crate::config::{
    ElevationConfig, GateConfig, OffTrailConfig, SamplingConfig, TierCadence, TrackerConfig,
};

// =============================================================================
// Geographic Utilities
// =============================================================================

pub use crate::geo_utils::{
    haversine_distance, offset_meters, polyline_length, LocalProjection, EARTH_RADIUS_M,
};

// =============================================================================
// Path Projection
// =============================================================================

pub use crate::projection::{distance_to_path, insertion_index, project_onto_path, PathProjection};

// =============================================================================
// Fix Gating and Sampling
// =============================================================================

pub use crate::gate::{Admission, GateDecision, IngestOutcome, LocationIngestGate};
pub use crate::sampling::{AdaptiveSamplingController, CadenceRequest, SamplingTier};

// =============================================================================
// Elevation
// =============================================================================

pub use crate::elevation::{ElevationFilter, ElevationSummary, Leg};

// =============================================================================
// Off-Trail
// =============================================================================

pub use crate::off_trail::{
    OffTrailAlert, OffTrailMonitor, OffTrailPhase, PathKind, ReferencePath, WatchContext,
};

// =============================================================================
// Batch Statistics
// =============================================================================

pub use crate::summary::{summarize_tracks, TrackSummary, MOVING_SPEED_MPS};
