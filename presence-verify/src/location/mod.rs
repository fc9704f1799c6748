//! Geolocation: device fix acquisition and geofence verification

mod geocode;
mod relay;
mod verifier;

pub use geocode::{CoordinateGeocoder, ReverseGeocoder};
pub use relay::RelayLocationProvider;
pub use verifier::{GeolocationVerifier, LocationError, VerifiedLocation};

use crate::geo::Coordinate;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;

/// Default bounded wait for a one-shot fix
pub const DEFAULT_FIX_TIMEOUT: Duration = Duration::from_secs(10);

/// Parameters for one fix request
#[derive(Debug, Clone, Copy)]
pub struct PositionRequest {
    pub high_accuracy: bool,
    /// Bounded wait, measured from `issued_at`
    pub timeout: Duration,
    /// Oldest acceptable fix relative to `issued_at`; zero disables caching
    pub maximum_age: Duration,
    pub issued_at: Instant,
}

impl PositionRequest {
    /// High-accuracy, uncached fix issued now
    pub fn fresh(timeout: Duration) -> Self {
        Self {
            high_accuracy: true,
            timeout,
            maximum_age: Duration::ZERO,
            issued_at: Instant::now(),
        }
    }

    /// Whether a fix taken at `taken_at` satisfies the caching bound
    pub fn accepts_fix_from(&self, taken_at: Instant) -> bool {
        taken_at + self.maximum_age >= self.issued_at
    }

    pub fn deadline(&self) -> Instant {
        self.issued_at + self.timeout
    }
}

/// A device position fix
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub latitude: f64,
    pub longitude: f64,
    /// Reported horizontal accuracy in meters, if the device gives one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accuracy_meters: Option<f64>,
}

impl Position {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
            accuracy_meters: None,
        }
    }

    pub fn coordinate(&self) -> Coordinate {
        Coordinate::new(self.latitude, self.longitude)
    }
}

/// Categorized device-level failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionError {
    #[error("Location permission denied")]
    PermissionDenied,

    #[error("Location unavailable")]
    Unavailable,

    #[error("Location request timed out")]
    Timeout,
}

/// Device location provider: one-shot fix requests
#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Resolve one fix honouring `request.maximum_age`
    ///
    /// Implementations need not enforce the timeout; the verifier bounds the
    /// wait at `request.deadline()`.
    async fn current_position(&self, request: &PositionRequest) -> Result<Position, PositionError>;
}
