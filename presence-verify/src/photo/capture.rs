//! Single-frame capture with guaranteed stream release

use super::{Camera, CameraError, CameraStream};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Encoder quality passed to the stream (0.0 - 1.0)
const STILL_QUALITY: f32 = 0.8;

/// Default wait for stream metadata
pub const DEFAULT_READY_TIMEOUT: Duration = Duration::from_secs(10);

/// Encoded still image
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StillImage {
    pub mime_type: String,
    #[serde(skip)]
    pub bytes: Vec<u8>,
}

impl StillImage {
    /// Accept bytes only if they sniff as an image
    pub fn from_encoded(bytes: Vec<u8>) -> Result<Self, CameraError> {
        let kind = infer::get(&bytes).ok_or(CameraError::UnsupportedFormat)?;
        if kind.matcher_type() != infer::MatcherType::Image {
            return Err(CameraError::UnsupportedFormat);
        }
        Ok(Self {
            mime_type: kind.mime_type().to_string(),
            bytes,
        })
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Stops the wrapped stream when dropped
struct StreamGuard(Box<dyn CameraStream>);

impl StreamGuard {
    fn stream(&mut self) -> &mut dyn CameraStream {
        self.0.as_mut()
    }
}

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.stop();
        debug!("Camera stream stopped");
    }
}

/// Captures one still from the front camera
#[derive(Clone)]
pub struct PhotoCapture {
    camera: Arc<dyn Camera>,
    ready_timeout: Duration,
}

impl PhotoCapture {
    pub fn new(camera: Arc<dyn Camera>) -> Self {
        Self {
            camera,
            ready_timeout: DEFAULT_READY_TIMEOUT,
        }
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Open the stream, wait for metadata, grab one frame, release
    ///
    /// If this future is dropped mid-way the guard still stops the stream.
    pub async fn capture(&self) -> Result<StillImage, CameraError> {
        let stream = self.camera.open_stream().await.map_err(|e| {
            warn!("Camera open failed: {}", e);
            e
        })?;
        let mut guard = StreamGuard(stream);

        tokio::time::timeout(self.ready_timeout, guard.stream().ready())
            .await
            .map_err(|_| CameraError::Timeout)??;

        let encoded = guard.stream().capture_still(STILL_QUALITY).await?;
        drop(guard);

        let image = StillImage::from_encoded(encoded)?;
        info!(
            mime_type = %image.mime_type,
            bytes = image.len(),
            "Photo captured"
        );
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Minimal JPEG header (SOI + APP0 marker start)
    pub(crate) const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];

    #[derive(Clone, Copy)]
    enum Behaviour {
        Works,
        NeverReady,
        CaptureFails,
        ReturnsText,
    }

    struct MockCamera {
        behaviour: Behaviour,
        stops: Arc<AtomicUsize>,
    }

    struct MockStream {
        behaviour: Behaviour,
        stops: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Camera for MockCamera {
        async fn open_stream(&self) -> Result<Box<dyn CameraStream>, CameraError> {
            Ok(Box::new(MockStream {
                behaviour: self.behaviour,
                stops: self.stops.clone(),
            }))
        }
    }

    #[async_trait]
    impl CameraStream for MockStream {
        async fn ready(&mut self) -> Result<(), CameraError> {
            match self.behaviour {
                Behaviour::NeverReady => std::future::pending().await,
                _ => Ok(()),
            }
        }

        async fn capture_still(&mut self, _quality: f32) -> Result<Vec<u8>, CameraError> {
            match self.behaviour {
                Behaviour::CaptureFails => Err(CameraError::Capture("sensor fault".into())),
                Behaviour::ReturnsText => Ok(b"not an image".to_vec()),
                _ => Ok(JPEG_BYTES.to_vec()),
            }
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn capture_with(behaviour: Behaviour) -> (PhotoCapture, Arc<AtomicUsize>) {
        let stops = Arc::new(AtomicUsize::new(0));
        let camera = MockCamera {
            behaviour,
            stops: stops.clone(),
        };
        (PhotoCapture::new(Arc::new(camera)), stops)
    }

    #[tokio::test]
    async fn test_capture_success_releases_stream() {
        let (capture, stops) = capture_with(Behaviour::Works);
        let image = capture.capture().await.unwrap();
        assert_eq!(image.mime_type, "image/jpeg");
        assert_eq!(image.bytes, JPEG_BYTES);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_capture_failure_releases_stream() {
        let (capture, stops) = capture_with(Behaviour::CaptureFails);
        assert!(matches!(capture.capture().await, Err(CameraError::Capture(_))));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ready_timeout_releases_stream() {
        let (capture, stops) = capture_with(Behaviour::NeverReady);
        let capture = capture.with_ready_timeout(Duration::from_secs(2));
        assert_eq!(capture.capture().await, Err(CameraError::Timeout));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_capture_releases_stream() {
        let (capture, stops) = capture_with(Behaviour::NeverReady);
        let abandoned = tokio::time::timeout(Duration::from_millis(100), capture.capture()).await;
        assert!(abandoned.is_err());
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_non_image_rejected_after_release() {
        let (capture, stops) = capture_with(Behaviour::ReturnsText);
        assert_eq!(capture.capture().await, Err(CameraError::UnsupportedFormat));
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
