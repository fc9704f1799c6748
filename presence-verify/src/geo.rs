//! Great-circle distance between two WGS-84 coordinates
//!
//! Haversine on a spherical Earth of radius 6,371,000 m. Accurate to well
//! under a meter at geofence scales, which is far below GPS noise.

use serde::{Deserialize, Serialize};

/// Mean Earth radius in meters
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// A point in WGS-84 decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

impl From<&presence_common::AttendanceAnchor> for Coordinate {
    fn from(anchor: &presence_common::AttendanceAnchor) -> Self {
        Self::new(anchor.latitude, anchor.longitude)
    }
}

/// Distance in meters between `a` and `b`
///
/// Total and symmetric; `distance(a, a) == 0.0`.
pub fn distance(a: Coordinate, b: Coordinate) -> f64 {
    let phi1 = a.latitude.to_radians();
    let phi2 = b.latitude.to_radians();
    let delta_phi = (b.latitude - a.latitude).to_radians();
    let delta_lambda = (b.longitude - a.longitude).to_radians();

    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1.0 for antipodal points
    let c = 2.0 * h.sqrt().min(1.0).asin();

    EARTH_RADIUS_METERS * c
}
