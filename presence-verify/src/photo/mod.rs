//! Optional photo capture
//!
//! One still from the front camera, then the stream is released. The camera
//! is a scoped resource: every exit path (success, failure, cancellation)
//! stops the stream.

mod capture;
mod relay;

pub use capture::{PhotoCapture, StillImage};
pub use relay::RelayCamera;

use async_trait::async_trait;
use thiserror::Error;

/// Camera failures, phrased for the user
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CameraError {
    #[error("Camera permission denied. Please allow camera access and try again")]
    PermissionDenied,

    #[error("Unable to access camera. Please check that a camera is available")]
    Unavailable,

    #[error("Camera did not start in time. Please try again")]
    Timeout,

    #[error("Failed to capture photo: {0}")]
    Capture(String),

    #[error("Captured image is not a supported still image format")]
    UnsupportedFormat,
}

/// Camera device: opens video streams
#[async_trait]
pub trait Camera: Send + Sync {
    /// Open the front-facing (selfie) camera
    async fn open_stream(&self) -> Result<Box<dyn CameraStream>, CameraError>;
}

/// An open video stream
#[async_trait]
pub trait CameraStream: Send {
    /// Resolves once stream metadata is loaded and frames can be read
    async fn ready(&mut self) -> Result<(), CameraError>;

    /// Grab the current frame encoded as a compressed still (e.g. JPEG)
    async fn capture_still(&mut self, quality: f32) -> Result<Vec<u8>, CameraError>;

    /// Stop all tracks. Must be idempotent.
    fn stop(&mut self);
}
