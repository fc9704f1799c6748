//! Camera fed by a still uploaded from the client device

use super::{Camera, CameraError, CameraStream};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// One-shot camera: each staged upload backs exactly one stream
#[derive(Default)]
pub struct RelayCamera {
    staged: Mutex<Option<Vec<u8>>>,
    open_streams: Arc<AtomicUsize>,
}

impl RelayCamera {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stage the bytes the next stream will deliver, replacing any earlier upload
    pub fn stage(&self, bytes: Vec<u8>) {
        if let Ok(mut staged) = self.staged.lock() {
            *staged = Some(bytes);
        }
    }

    /// Streams opened and not yet stopped
    pub fn open_streams(&self) -> usize {
        self.open_streams.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Camera for RelayCamera {
    async fn open_stream(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        let frame = self
            .staged
            .lock()
            .ok()
            .and_then(|mut staged| staged.take())
            .ok_or(CameraError::Unavailable)?;

        debug!(bytes = frame.len(), "Relay camera stream opened");
        self.open_streams.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(RelayStream {
            frame: Some(frame),
            open_streams: self.open_streams.clone(),
            stopped: false,
        }))
    }
}

struct RelayStream {
    frame: Option<Vec<u8>>,
    open_streams: Arc<AtomicUsize>,
    stopped: bool,
}

#[async_trait]
impl CameraStream for RelayStream {
    async fn ready(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    async fn capture_still(&mut self, _quality: f32) -> Result<Vec<u8>, CameraError> {
        self.frame
            .take()
            .ok_or_else(|| CameraError::Capture("frame already consumed".to_string()))
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.frame = None;
            self.open_streams.fetch_sub(1, Ordering::SeqCst);
        }
    }
}
