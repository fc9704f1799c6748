//! QR decoding backends

use super::validator::TOKEN_PREFIX;
use chrono::Utc;
use rand::distributions::Alphanumeric;
use rand::Rng;

const SIMULATED_NONCE_LEN: usize = 9;

/// Turns one raw camera frame into a decoded payload, if a code is visible
pub trait QrDecoder: Send + Sync {
    fn decode(&self, frame: &[u8]) -> Option<String>;
}

/// Frame already carries the decoded payload as UTF-8
///
/// Used when the client decodes the code itself and relays the text.
#[derive(Debug, Clone, Copy, Default)]
pub struct PassthroughDecoder;

impl QrDecoder for PassthroughDecoder {
    fn decode(&self, frame: &[u8]) -> Option<String> {
        let text = std::str::from_utf8(frame).ok()?.trim();
        if text.is_empty() {
            None
        } else {
            Some(text.to_string())
        }
    }
}

/// Reports a freshly issued attendance code for every non-empty frame
///
/// Stand-in for camera-based decoding on installs without a decoder.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedDecoder;

impl QrDecoder for SimulatedDecoder {
    fn decode(&self, frame: &[u8]) -> Option<String> {
        if frame.is_empty() {
            return None;
        }
        let nonce: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(SIMULATED_NONCE_LEN)
            .map(char::from)
            .collect();
        Some(format!(
            "{}{}_{}",
            TOKEN_PREFIX,
            Utc::now().timestamp_millis(),
            nonce
        ))
    }
}
