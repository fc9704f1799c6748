//! # Presence Common Library
//!
//! Shared code for the presence services including:
//! - Error type
//! - Bootstrap configuration loading
//! - Attendance policy types (geofence anchor, time window)
//! - Event types (AttendanceEvent enum) and the EventBus
//! - SSE helpers

pub mod config;
pub mod error;
pub mod events;
pub mod policy;
pub mod sse;

pub use error::{Error, Result};
pub use policy::{AttendanceAnchor, AttendanceWindow};
