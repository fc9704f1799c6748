//! Geofence verification of a fresh device fix

use super::{LocationProvider, PositionError, PositionRequest};
use crate::geo::{self, Coordinate};
use presence_common::AttendanceAnchor;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

/// A fix that lies inside the geofence
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct VerifiedLocation {
    pub coordinate: Coordinate,
    /// Distance from the anchor in meters
    pub distance_meters: f64,
}

/// Why location verification failed
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LocationError {
    /// Device or permission problem; retryable once the user fixes settings
    #[error("{0}. Please enable location services and try again")]
    Device(PositionError),

    /// Fix obtained but too far from the anchor
    #[error(
        "You are {excess_meters:.0}m outside the allowed area \
         ({distance_meters:.0}m from the institution, limit {radius_meters:.0}m)"
    )]
    OutsideGeofence {
        distance_meters: f64,
        radius_meters: f64,
        excess_meters: f64,
    },
}

/// Acquires a fresh fix and checks it against an anchor
#[derive(Clone)]
pub struct GeolocationVerifier {
    provider: Arc<dyn LocationProvider>,
}

impl GeolocationVerifier {
    pub fn new(provider: Arc<dyn LocationProvider>) -> Self {
        Self { provider }
    }

    /// Request one fix and verify it lies within `anchor.radius_meters`
    ///
    /// The wait is bounded by `request.deadline()`; running out of time is
    /// reported as `PositionError::Timeout`.
    pub async fn acquire_and_verify(
        &self,
        anchor: &AttendanceAnchor,
        request: PositionRequest,
    ) -> Result<VerifiedLocation, LocationError> {
        let fix = tokio::time::timeout_at(
            request.deadline(),
            self.provider.current_position(&request),
        )
        .await
        .map_err(|_| LocationError::Device(PositionError::Timeout))?
        .map_err(LocationError::Device)?;

        verify_fix(anchor, fix.coordinate())
    }
}

/// Geofence check for an already acquired coordinate
pub(crate) fn verify_fix(
    anchor: &AttendanceAnchor,
    coordinate: Coordinate,
) -> Result<VerifiedLocation, LocationError> {
    let distance_meters = geo::distance(Coordinate::from(anchor), coordinate);
    debug!(
        distance_m = distance_meters,
        radius_m = anchor.radius_meters,
        "Location fix evaluated"
    );

    if distance_meters <= anchor.radius_meters {
        info!(distance_m = distance_meters, "Location inside geofence");
        Ok(VerifiedLocation {
            coordinate,
            distance_meters,
        })
    } else {
        Err(LocationError::OutsideGeofence {
            distance_meters,
            radius_meters: anchor.radius_meters,
            excess_meters: distance_meters - anchor.radius_meters,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::EARTH_RADIUS_METERS;
    use crate::location::Position;
    use async_trait::async_trait;
    use std::time::Duration;

    struct FixedProvider(Result<Position, PositionError>);

    #[async_trait]
    impl LocationProvider for FixedProvider {
        async fn current_position(&self, _: &PositionRequest) -> Result<Position, PositionError> {
            self.0
        }
    }

    struct SilentProvider;

    #[async_trait]
    impl LocationProvider for SilentProvider {
        async fn current_position(&self, _: &PositionRequest) -> Result<Position, PositionError> {
            std::future::pending().await
        }
    }

    fn anchor() -> AttendanceAnchor {
        AttendanceAnchor::new(12.9716, 77.5946, 100.0)
    }

    fn north(meters: f64) -> Position {
        let delta = (meters / EARTH_RADIUS_METERS).to_degrees();
        Position::new(12.9716 + delta, 77.5946)
    }

    fn verifier(result: Result<Position, PositionError>) -> GeolocationVerifier {
        GeolocationVerifier::new(Arc::new(FixedProvider(result)))
    }

    #[tokio::test]
    async fn test_fix_at_anchor_verifies() {
        let verified = verifier(Ok(Position::new(12.9716, 77.5946)))
            .acquire_and_verify(&anchor(), PositionRequest::fresh(Duration::from_secs(10)))
            .await
            .unwrap();
        assert_eq!(verified.distance_meters, 0.0);
    }

    #[tokio::test]
    async fn test_fix_150m_away_reports_excess() {
        let err = verifier(Ok(north(150.0)))
            .acquire_and_verify(&anchor(), PositionRequest::fresh(Duration::from_secs(10)))
            .await
            .unwrap_err();

        match &err {
            LocationError::OutsideGeofence { excess_meters, .. } => {
                assert!((excess_meters - 50.0).abs() < 0.5, "excess {}", excess_meters);
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(err.to_string().starts_with("You are 50m outside the allowed area"));
    }

    #[test]
    fn test_boundary_radius_is_inside() {
        let at_edge = verify_fix(&anchor(), north(99.99).coordinate());
        assert!(at_edge.is_ok());
    }

    #[tokio::test]
    async fn test_device_error_is_distinct() {
        let err = verifier(Err(PositionError::PermissionDenied))
            .acquire_and_verify(&anchor(), PositionRequest::fresh(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert_eq!(err, LocationError::Device(PositionError::PermissionDenied));
        assert!(err.to_string().contains("enable location services"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_silent_provider_times_out() {
        let verifier = GeolocationVerifier::new(Arc::new(SilentProvider));
        let err = verifier
            .acquire_and_verify(&anchor(), PositionRequest::fresh(Duration::from_secs(10)))
            .await
            .unwrap_err();
        assert_eq!(err, LocationError::Device(PositionError::Timeout));
    }
}
