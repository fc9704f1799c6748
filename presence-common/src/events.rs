//! Event types for the presence event system
//!
//! Provides the shared event definitions and the broadcast EventBus.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use uuid::Uuid;

/// Ordered steps of the attendance verification workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum VerificationStep {
    /// Scan the institution QR code
    Qr,
    /// Location fix and time-window gate
    Location,
    /// Optional photo capture
    Photo,
    /// Review and submit
    Confirm,
}

impl VerificationStep {
    /// Next step in the linear workflow, `None` at the terminal step
    pub fn next(self) -> Option<Self> {
        match self {
            VerificationStep::Qr => Some(VerificationStep::Location),
            VerificationStep::Location => Some(VerificationStep::Photo),
            VerificationStep::Photo => Some(VerificationStep::Confirm),
            VerificationStep::Confirm => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            VerificationStep::Qr => "QR",
            VerificationStep::Location => "LOCATION",
            VerificationStep::Photo => "PHOTO",
            VerificationStep::Confirm => "CONFIRM",
        }
    }
}

impl std::fmt::Display for VerificationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Individual checks tracked by the verification status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Check {
    QrCode,
    Location,
    Time,
    Photo,
}

impl Check {
    /// Required for submission (photo is the only optional check)
    pub fn is_required(self) -> bool {
        !matches!(self, Check::Photo)
    }
}

impl std::fmt::Display for Check {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Check::QrCode => "QR code",
            Check::Location => "location",
            Check::Time => "time window",
            Check::Photo => "photo",
        })
    }
}

/// Presence event types
///
/// Events are broadcast via EventBus and serialized for SSE transmission.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AttendanceEvent {
    /// Verification session opened
    SessionOpened {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },

    /// A check passed
    StepPassed {
        session_id: Uuid,
        check: Check,
        timestamp: DateTime<Utc>,
    },

    /// A check failed; `reason` is the user-facing status text
    StepFailed {
        session_id: Uuid,
        check: Check,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// Workflow moved to another step
    StepChanged {
        session_id: Uuid,
        from: VerificationStep,
        to: VerificationStep,
        timestamp: DateTime<Utc>,
    },

    /// Attendance record emitted to the completion callback
    AttendanceSubmitted {
        session_id: Uuid,
        with_photo: bool,
        timestamp: DateTime<Utc>,
    },

    /// Session discarded without submission
    SessionClosed {
        session_id: Uuid,
        timestamp: DateTime<Utc>,
    },
}

impl AttendanceEvent {
    /// Event name used as the SSE `event:` field
    pub fn event_type(&self) -> &'static str {
        match self {
            AttendanceEvent::SessionOpened { .. } => "SessionOpened",
            AttendanceEvent::StepPassed { .. } => "StepPassed",
            AttendanceEvent::StepFailed { .. } => "StepFailed",
            AttendanceEvent::StepChanged { .. } => "StepChanged",
            AttendanceEvent::AttendanceSubmitted { .. } => "AttendanceSubmitted",
            AttendanceEvent::SessionClosed { .. } => "SessionClosed",
        }
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            AttendanceEvent::SessionOpened { session_id, .. }
            | AttendanceEvent::StepPassed { session_id, .. }
            | AttendanceEvent::StepFailed { session_id, .. }
            | AttendanceEvent::StepChanged { session_id, .. }
            | AttendanceEvent::AttendanceSubmitted { session_id, .. }
            | AttendanceEvent::SessionClosed { session_id, .. } => *session_id,
        }
    }
}

/// Broadcast bus for AttendanceEvent
///
/// Cloning is cheap; all clones share one channel. Slow subscribers lose
/// the oldest events once `capacity` is exceeded.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<AttendanceEvent>,
}

impl EventBus {
    /// Creates a new EventBus with specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<AttendanceEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: AttendanceEvent,
    ) -> Result<usize, broadcast::error::SendError<AttendanceEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: AttendanceEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}
