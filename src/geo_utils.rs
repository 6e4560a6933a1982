//! Geographic utilities: great-circle distance, local planar projection and
//! polyline length.

use geo::{Distance, Haversine, Point};

use crate::GpsPoint;

/// Earth radius used by the local tangent-plane projection (meters).
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Calculate haversine distance between two GPS points in meters.
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|pair| haversine_distance(&pair[0], &pair[1]))
        .sum()
}

/// Equirectangular projection onto a plane tangent at an origin.
///
/// Accurate to well under a meter over the few kilometres that matter for
/// off-trail checks and trace editing, and far cheaper than geodesics.
#[derive(Debug, Clone, Copy)]
pub struct LocalProjection {
    lat0: f64,
    lon0: f64,
    cos_lat0: f64,
}

impl LocalProjection {
    /// Create a projection centered on `origin`.
    pub fn centered_on(origin: &GpsPoint) -> Self {
        let lat0 = origin.latitude.to_radians();
        Self {
            lat0,
            lon0: origin.longitude.to_radians(),
            cos_lat0: lat0.cos(),
        }
    }

    /// Project a point to planar (x east, y north) meters.
    pub fn to_xy(&self, p: &GpsPoint) -> (f64, f64) {
        let lat = p.latitude.to_radians();
        let lon = p.longitude.to_radians();
        let x = (lon - self.lon0) * self.cos_lat0 * EARTH_RADIUS_M;
        let y = (lat - self.lat0) * EARTH_RADIUS_M;
        (x, y)
    }

    /// Inverse of [`LocalProjection::to_xy`].
    pub fn from_xy(&self, x: f64, y: f64) -> GpsPoint {
        let lat = (y / EARTH_RADIUS_M + self.lat0).to_degrees();
        let lon = (x / (EARTH_RADIUS_M * self.cos_lat0) + self.lon0).to_degrees();
        GpsPoint::new(lat, lon)
    }
}

/// Move a point by planar offsets in meters. Handy for building test paths.
pub fn offset_meters(origin: &GpsPoint, east_m: f64, north_m: f64) -> GpsPoint {
    LocalProjection::centered_on(origin).from_xy(east_m, north_m)
}
