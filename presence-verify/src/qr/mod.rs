//! QR proof-of-location
//!
//! Decoding (camera frame → payload string) and validation (payload shape
//! and freshness) are separate: the orchestrator depends only on the
//! decoded-string contract, so any decoding backend can be plugged in.

mod decoder;
mod validator;

pub use decoder::{PassthroughDecoder, QrDecoder, SimulatedDecoder};
pub use validator::{QrRejection, QrValidator, QrVerdict, TOKEN_PREFIX};
