//! Time-window gate
//!
//! Decides whether a local instant falls inside the attendance window.
//! Evaluated once per session open (and again when the location step is
//! redone); never polled.

use chrono::{DateTime, TimeZone, Timelike};
use presence_common::AttendanceWindow;
use serde::Serialize;

/// Outcome of a time-window evaluation
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimeCheck {
    pub passed: bool,
    /// User-facing reason when `passed` is false
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Fractional local hour, including seconds
fn fractional_hour<Tz: TimeZone>(now: &DateTime<Tz>) -> f64 {
    f64::from(now.hour())
        + f64::from(now.minute()) / 60.0
        + f64::from(now.second()) / 3600.0
}

/// True when `now` lies in `[start_hour, end_hour]`, both ends inclusive
pub fn is_within_window<Tz: TimeZone>(now: &DateTime<Tz>, window: &AttendanceWindow) -> bool {
    let hour = fractional_hour(now);
    f64::from(window.start_hour) <= hour && hour <= f64::from(window.end_hour)
}

/// Evaluate the gate and produce user feedback naming the boundaries
pub fn check<Tz: TimeZone>(now: &DateTime<Tz>, window: &AttendanceWindow) -> TimeCheck {
    if is_within_window(now, window) {
        TimeCheck {
            passed: true,
            reason: None,
        }
    } else {
        TimeCheck {
            passed: false,
            reason: Some(format!(
                "Attendance can only be marked between {:02}:00 and {:02}:00",
                window.start_hour, window.end_hour
            )),
        }
    }
}
