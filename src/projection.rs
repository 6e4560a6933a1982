//! # Point-to-Polyline Projection
//!
//! Distance from a query point to a reference polyline, plus the segment and
//! fractional position of the nearest point.
//!
//! Coordinates are projected onto a plane tangent at the query point
//! (equirectangular, R = 6 371 km). At hiking scales this is accurate to well
//! under a meter and avoids a geodesic per segment.
//!
//! A polyline with fewer than two points has no defined distance: every
//! function here returns `None` rather than zero.

use serde::{Deserialize, Serialize};

use crate::geo_utils::LocalProjection;
use crate::GpsPoint;

/// Nearest point on a polyline to a query point.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "ffi", derive(uniffi::Record))]
pub struct PathProjection {
    /// Planar distance to the nearest point (meters)
    pub distance_m: f64,
    /// Index of the segment start (segment runs `segment_index -> segment_index + 1`)
    pub segment_index: u32,
    /// Position along the segment, 0.0 at its start and 1.0 at its end
    pub t: f64,
    /// The nearest point itself
    pub nearest: GpsPoint,
}

/// Project `query` onto `path`.
///
/// Ties keep the earliest segment.
///
/// # Example
/// ```
/// use trail_recorder::{project_onto_path, GpsPoint};
/// use trail_recorder::geo_utils::offset_meters;
///
/// let a = GpsPoint::new(45.0, 6.0);
/// let b = offset_meters(&a, 0.0, 100.0);
/// let query = offset_meters(&a, 50.0, 50.0);
///
/// let projection = project_onto_path(&query, &[a, b]).unwrap();
/// assert!((projection.distance_m - 50.0).abs() < 0.5);
/// assert!((projection.t - 0.5).abs() < 0.01);
/// ```
pub fn project_onto_path(query: &GpsPoint, path: &[GpsPoint]) -> Option<PathProjection> {
    if path.len() < 2 {
        return None;
    }

    let plane = LocalProjection::centered_on(query);
    // The query sits at the origin of its own tangent plane
    let (px, py) = (0.0, 0.0);

    let mut best: Option<(f64, usize, f64, f64, f64)> = None;
    let mut a = plane.to_xy(&path[0]);

    for (i, next) in path.iter().enumerate().skip(1) {
        let b = plane.to_xy(next);
        let (vx, vy) = (b.0 - a.0, b.1 - a.1);
        let vv = vx * vx + vy * vy;

        let t = if vv <= 0.0 {
            0.0
        } else {
            (((px - a.0) * vx + (py - a.1) * vy) / vv).clamp(0.0, 1.0)
        };

        let nx = a.0 + t * vx;
        let ny = a.1 + t * vy;
        let d2 = (px - nx).powi(2) + (py - ny).powi(2);

        if best.map_or(true, |(best_d2, ..)| d2 < best_d2) {
            best = Some((d2, i - 1, t, nx, ny));
        }
        a = b;
    }

    best.map(|(d2, segment, t, nx, ny)| PathProjection {
        distance_m: d2.sqrt(),
        segment_index: segment as u32,
        t,
        nearest: plane.from_xy(nx, ny),
    })
}

/// Minimum distance from `query` to `path` in meters.
pub fn distance_to_path(query: &GpsPoint, path: &[GpsPoint]) -> Option<f64> {
    project_onto_path(query, path).map(|p| p.distance_m)
}

/// Index at which `query` should be inserted into `path` when editing a
/// trace: right after the start of the nearest segment.
pub fn insertion_index(query: &GpsPoint, path: &[GpsPoint]) -> Option<usize> {
    project_onto_path(query, path).map(|p| p.segment_index as usize + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo_utils::offset_meters;

    fn origin() -> GpsPoint {
        GpsPoint::new(46.5, 7.5)
    }

    /// Path heading 100 m north, then 100 m east.
    fn l_shaped_path() -> Vec<GpsPoint> {
        let o = origin();
        vec![
            o,
            offset_meters(&o, 0.0, 100.0),
            offset_meters(&o, 100.0, 100.0),
        ]
    }

    #[test]
    fn test_perpendicular_to_midpoint() {
        let o = origin();
        let path = vec![o, offset_meters(&o, 0.0, 100.0)];
        let query = offset_meters(&o, 50.0, 50.0);

        let p = project_onto_path(&query, &path).unwrap();
        assert!((p.distance_m - 50.0).abs() < 0.5, "got {}", p.distance_m);
        assert!((p.t - 0.5).abs() < 0.01, "got t={}", p.t);
        assert_eq!(p.segment_index, 0);
    }

    #[test]
    fn test_beyond_segment_end_clamps() {
        let o = origin();
        let path = vec![o, offset_meters(&o, 0.0, 100.0)];
        let query = offset_meters(&o, 0.0, -30.0);

        let p = project_onto_path(&query, &path).unwrap();
        assert_eq!(p.t, 0.0);
        assert!((p.distance_m - 30.0).abs() < 0.5);
    }

    #[test]
    fn test_picks_nearest_segment() {
        let o = origin();
        let query = offset_meters(&o, 60.0, 110.0);
        let p = project_onto_path(&query, &l_shaped_path()).unwrap();
        assert_eq!(p.segment_index, 1);
        assert!((p.distance_m - 10.0).abs() < 0.5);
        assert!((p.t - 0.6).abs() < 0.01);
    }

    #[test]
    fn test_degenerate_paths_undefined() {
        let o = origin();
        assert!(project_onto_path(&o, &[]).is_none());
        assert!(project_onto_path(&o, &[o]).is_none());
        assert!(distance_to_path(&o, &[o]).is_none());
        assert!(insertion_index(&o, &[]).is_none());
    }

    #[test]
    fn test_zero_length_segment() {
        let o = origin();
        let query = offset_meters(&o, 20.0, 0.0);
        let p = project_onto_path(&query, &[o, o]).unwrap();
        assert_eq!(p.t, 0.0);
        assert!((p.distance_m - 20.0).abs() < 0.5);
    }

    #[test]
    fn test_on_path_is_zero() {
        let o = origin();
        let query = offset_meters(&o, 0.0, 40.0);
        let d = distance_to_path(&query, &l_shaped_path()).unwrap();
        assert!(d < 0.01, "got {d}");
    }

    #[test]
    fn test_insertion_index_after_segment_start() {
        let o = origin();
        let query = offset_meters(&o, 50.0, 95.0);
        assert_eq!(insertion_index(&query, &l_shaped_path()), Some(2));
    }

    #[test]
    fn test_nearest_point_lies_on_segment() {
        let o = origin();
        let path = vec![o, offset_meters(&o, 0.0, 100.0)];
        let query = offset_meters(&o, 50.0, 25.0);
        let p = project_onto_path(&query, &path).unwrap();
        let expected = offset_meters(&o, 0.0, 25.0);
        assert!((p.nearest.latitude - expected.latitude).abs() < 1e-6);
        assert!((p.nearest.longitude - expected.longitude).abs() < 1e-6);
    }
}
