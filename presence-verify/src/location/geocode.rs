//! Reverse geocoding seam
//!
//! Address resolution is best-effort enrichment: a failure never fails
//! verification, the record just carries raw coordinates.

use crate::geo::Coordinate;
use async_trait::async_trait;

/// Turns a coordinate into a human-readable address
#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// `None` when no address could be resolved
    async fn resolve(&self, coordinate: Coordinate) -> Option<String>;
}

/// Labels a coordinate with its own decimal degrees
///
/// Shipped default until a real geocoding backend is configured.
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateGeocoder;

#[async_trait]
impl ReverseGeocoder for CoordinateGeocoder {
    async fn resolve(&self, coordinate: Coordinate) -> Option<String> {
        Some(format!(
            "Lat: {:.6}, Lng: {:.6}",
            coordinate.latitude, coordinate.longitude
        ))
    }
}
