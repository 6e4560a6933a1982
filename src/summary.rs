//! Batch statistics for a stored trajectory.
//!
//! Used after editing or importing a track, where the live session numbers
//! no longer apply. Elevation goes through the same filter as live
//! recording, so an untouched track reports the same totals it was recorded
//! with.

#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ElevationConfig;
use crate::elevation::{ElevationFilter, ElevationSummary};
use crate::geo_utils::haversine_distance;
use crate::{Bounds, GpsPoint, TrackPoint};

/// Segments at or above this speed count as moving (m/s).
pub const MOVING_SPEED_MPS: f64 = 0.5;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct TrackSummary {
    pub point_count: u32,
    pub distance_m: f64,
    pub elevation: ElevationSummary,
    /// First to last timestamp (ms)
    pub duration_ms: i64,
    /// Sum of segments walked at or above [`MOVING_SPEED_MPS`] (ms)
    pub moving_time_ms: i64,
    /// Distance over total duration (m/s)
    pub average_speed_mps: f64,
    /// Distance over moving time (m/s)
    pub moving_speed_mps: f64,
    pub bounds: Option<Bounds>,
}

impl TrackSummary {
    pub fn from_points(points: &[TrackPoint], config: &ElevationConfig) -> Self {
        let mut distance_m = 0.0;
        let mut moving_time_ms = 0i64;

        for pair in points.windows(2) {
            let d = haversine_distance(&pair[0].position(), &pair[1].position()).max(0.0);
            distance_m += d;

            let dt_ms = pair[1].timestamp_ms - pair[0].timestamp_ms;
            if dt_ms > 0 && d / (dt_ms as f64 / 1000.0) >= MOVING_SPEED_MPS {
                moving_time_ms += dt_ms;
            }
        }

        let duration_ms = match (points.first(), points.last()) {
            (Some(first), Some(last)) => (last.timestamp_ms - first.timestamp_ms).max(0),
            _ => 0,
        };

        let positions: Vec<GpsPoint> = points.iter().map(TrackPoint::position).collect();

        Self {
            point_count: points.len() as u32,
            distance_m,
            elevation: ElevationFilter::replay(points, config).summary(),
            duration_ms,
            moving_time_ms,
            average_speed_mps: speed(distance_m, duration_ms),
            moving_speed_mps: speed(distance_m, moving_time_ms),
            bounds: Bounds::from_points(&positions),
        }
    }
}

fn speed(distance_m: f64, ms: i64) -> f64 {
    if ms > 0 {
        distance_m / (ms as f64 / 1000.0)
    } else {
        0.0
    }
}

/// Summarize many stored tracks.
#[cfg(feature = "parallel")]
pub fn summarize_tracks(tracks: &[Vec<TrackPoint>], config: &ElevationConfig) -> Vec<TrackSummary> {
    tracks
        .par_iter()
        .map(|points| TrackSummary::from_points(points, config))
        .collect()
}

/// Summarize many stored tracks.
#[cfg(not(feature = "parallel"))]
pub fn summarize_tracks(tracks: &[Vec<TrackPoint>], config: &ElevationConfig) -> Vec<TrackSummary> {
    tracks
        .iter()
        .map(|points| TrackSummary::from_points(points, config))
        .collect()
}
