//! Attendance policy configuration
//!
//! Both values are supplied from outside the verification core and are
//! read-only to it: the geofence anchor (institution location plus radius)
//! and the clock-hour window during which attendance may be marked.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Default anchor latitude (institution campus)
pub const DEFAULT_ANCHOR_LATITUDE: f64 = 12.9716;
/// Default anchor longitude (institution campus)
pub const DEFAULT_ANCHOR_LONGITUDE: f64 = 77.5946;
/// Default geofence radius in meters
pub const DEFAULT_RADIUS_METERS: f64 = 100.0;
/// Default window opening hour (local time)
pub const DEFAULT_START_HOUR: u32 = 9;
/// Default window closing hour (local time, inclusive)
pub const DEFAULT_END_HOUR: u32 = 10;

/// Expected institution location and the acceptable geofence radius
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AttendanceAnchor {
    /// WGS-84 latitude in decimal degrees
    pub latitude: f64,
    /// WGS-84 longitude in decimal degrees
    pub longitude: f64,
    /// Geofence radius in meters
    #[serde(rename = "radius_m")]
    pub radius_meters: f64,
}

impl AttendanceAnchor {
    pub fn new(latitude: f64, longitude: f64, radius_meters: f64) -> Self {
        Self {
            latitude,
            longitude,
            radius_meters,
        }
    }

    /// Reject anchors that can never be satisfied or lie off the globe
    pub fn validate(&self) -> Result<()> {
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(Error::Config(format!(
                "Anchor latitude {} outside -90..=90",
                self.latitude
            )));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(Error::Config(format!(
                "Anchor longitude {} outside -180..=180",
                self.longitude
            )));
        }
        if !self.radius_meters.is_finite() || self.radius_meters <= 0.0 {
            return Err(Error::Config(format!(
                "Geofence radius must be positive, got {}",
                self.radius_meters
            )));
        }
        Ok(())
    }
}

impl Default for AttendanceAnchor {
    fn default() -> Self {
        Self::new(
            DEFAULT_ANCHOR_LATITUDE,
            DEFAULT_ANCHOR_LONGITUDE,
            DEFAULT_RADIUS_METERS,
        )
    }
}

/// Allowed clock-hour range in local time, both ends inclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttendanceWindow {
    pub start_hour: u32,
    pub end_hour: u32,
}

impl AttendanceWindow {
    pub fn new(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_hour,
            end_hour,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_hour > 24 || self.end_hour > 24 {
            return Err(Error::Config(format!(
                "Window hours must be within 0..=24, got {}..{}",
                self.start_hour, self.end_hour
            )));
        }
        if self.start_hour > self.end_hour {
            return Err(Error::Config(format!(
                "Window start {} is after end {}",
                self.start_hour, self.end_hour
            )));
        }
        Ok(())
    }
}

impl Default for AttendanceWindow {
    fn default() -> Self {
        Self::new(DEFAULT_START_HOUR, DEFAULT_END_HOUR)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_valid() {
        assert!(AttendanceAnchor::default().validate().is_ok());
        assert!(AttendanceWindow::default().validate().is_ok());
    }

    #[test]
    fn test_anchor_rejects_non_positive_radius() {
        let anchor = AttendanceAnchor::new(12.9716, 77.5946, 0.0);
        assert!(matches!(anchor.validate(), Err(Error::Config(_))));

        let anchor = AttendanceAnchor::new(12.9716, 77.5946, f64::NAN);
        assert!(anchor.validate().is_err());
    }

    #[test]
    fn test_anchor_rejects_out_of_range_coordinates() {
        assert!(AttendanceAnchor::new(91.0, 0.0, 50.0).validate().is_err());
        assert!(AttendanceAnchor::new(0.0, -180.5, 50.0).validate().is_err());
    }

    #[test]
    fn test_window_rejects_inverted_range() {
        assert!(AttendanceWindow::new(11, 9).validate().is_err());
        assert!(AttendanceWindow::new(9, 25).validate().is_err());
        assert!(AttendanceWindow::new(9, 9).validate().is_ok());
    }
}
