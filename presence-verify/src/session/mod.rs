//! Verification session: state owned by the orchestrator for one attempt

mod error;
mod orchestrator;
mod record;

pub use error::SessionError;
pub use orchestrator::{
    CompletionCallback, Devices, LocationOutcome, LocationProbe, LocationReport, PhotoOutcome,
    PhotoProbe, SubmissionReceipt, VerificationOrchestrator, VerificationSettings,
};
pub use presence_common::events::{Check, VerificationStep};
pub use record::{AttendanceRecord, DeviceFingerprint, RecordLocation};

use crate::enrichment::Enrichment;
use crate::geo::Coordinate;
use crate::photo::StillImage;
use chrono::{DateTime, FixedOffset};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Which checks have passed in the current session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct VerificationStatus {
    pub qr_code: bool,
    pub location: bool,
    pub time: bool,
    pub photo: bool,
    /// Always true once a session is open
    pub device: bool,
}

impl VerificationStatus {
    /// Status at session open
    pub fn opened() -> Self {
        Self {
            device: true,
            ..Self::default()
        }
    }

    /// Required checks that have not passed, in workflow order
    pub fn missing_required(&self) -> Vec<Check> {
        [
            (Check::QrCode, self.qr_code),
            (Check::Location, self.location),
            (Check::Time, self.time),
            (Check::Photo, self.photo),
        ]
        .into_iter()
        .filter(|(check, _)| check.is_required())
        .filter_map(|(check, passed)| (!passed).then_some(check))
        .collect()
    }

    /// Photo is the only check allowed to remain false at submit
    pub fn is_submit_ready(&self) -> bool {
        self.device && self.missing_required().is_empty()
    }
}

/// Verified location captured by the session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionLocation {
    pub coordinate: Coordinate,
    pub distance_meters: f64,
    /// Resolved address, once the enrichment task delivers one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

/// Last user-facing message per check
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StepMessages {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qr_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub photo: Option<String>,
}

impl StepMessages {
    pub fn set(&mut self, check: Check, message: Option<String>) {
        let slot = match check {
            Check::QrCode => &mut self.qr_code,
            Check::Location => &mut self.location,
            Check::Time => &mut self.time,
            Check::Photo => &mut self.photo,
        };
        *slot = message;
    }
}

/// One open workflow instance
///
/// Created empty on open, mutated only by the orchestrator's step handlers,
/// consumed once at submit. Nothing carries over between sessions.
#[derive(Debug)]
pub struct VerificationSession {
    pub id: Uuid,
    pub current_step: VerificationStep,
    pub qr_token: Option<String>,
    pub location: Option<SessionLocation>,
    pub photo: Option<StillImage>,
    pub status: VerificationStatus,
    pub messages: StepMessages,
    pub opened_at: DateTime<FixedOffset>,
    /// Latest location attempt; older outcomes are stale
    pub(crate) location_attempt: u64,
    pub(crate) address: Option<Enrichment<Option<String>>>,
    pub(crate) source_ip: Option<Enrichment<String>>,
    pub(crate) cancel: CancellationToken,
}

impl VerificationSession {
    pub(crate) fn new(opened_at: DateTime<FixedOffset>) -> Self {
        Self {
            id: Uuid::new_v4(),
            current_step: VerificationStep::Qr,
            qr_token: None,
            location: None,
            photo: None,
            status: VerificationStatus::opened(),
            messages: StepMessages::default(),
            opened_at,
            location_attempt: 0,
            address: None,
            source_ip: None,
            cancel: CancellationToken::new(),
        }
    }

    /// Pull in an address that has arrived since the last look
    pub(crate) fn absorb_address(&mut self) {
        let Some(enrichment) = self.address.as_mut() else {
            return;
        };
        if let Some(resolved) = enrichment.peek().cloned() {
            if let (Some(address), Some(location)) = (resolved, self.location.as_mut()) {
                location.address = Some(address);
            }
            self.address = None;
        }
    }

    /// Read-only view for rendering
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            session_id: self.id,
            current_step: self.current_step,
            status: self.status,
            qr_token: self.qr_token.clone(),
            location: self.location.clone(),
            photo: self.photo.as_ref().map(|p| PhotoSummary {
                mime_type: p.mime_type.clone(),
                bytes: p.len(),
            }),
            messages: self.messages.clone(),
            can_submit: self.current_step == VerificationStep::Confirm
                && self.status.is_submit_ready(),
            opened_at: self.opened_at,
        }
    }
}

/// Captured photo, without the image data
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhotoSummary {
    pub mime_type: String,
    pub bytes: usize,
}

/// Serializable view of a session
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionSnapshot {
    pub session_id: Uuid,
    pub current_step: VerificationStep,
    pub status: VerificationStatus,
    pub qr_token: Option<String>,
    pub location: Option<SessionLocation>,
    pub photo: Option<PhotoSummary>,
    pub messages: StepMessages,
    pub can_submit: bool,
    pub opened_at: DateTime<FixedOffset>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> VerificationStatus {
        VerificationStatus {
            qr_code: true,
            location: true,
            time: true,
            photo: false,
            device: true,
        }
    }

    #[test]
    fn test_opened_status_only_device() {
        let status = VerificationStatus::opened();
        assert!(status.device);
        assert!(!status.is_submit_ready());
        assert_eq!(
            status.missing_required(),
            vec![Check::QrCode, Check::Location, Check::Time]
        );
    }

    #[test]
    fn test_photo_optional_for_submit() {
        assert!(ready().is_submit_ready());
        assert!(VerificationStatus { photo: true, ..ready() }.is_submit_ready());
    }

    #[test]
    fn test_each_required_flag_blocks_submit() {
        let without_qr = VerificationStatus { qr_code: false, ..ready() };
        let without_location = VerificationStatus { location: false, ..ready() };
        let without_time = VerificationStatus { time: false, ..ready() };

        for (status, missing) in [
            (without_qr, Check::QrCode),
            (without_location, Check::Location),
            (without_time, Check::Time),
        ] {
            assert!(!status.is_submit_ready());
            assert_eq!(status.missing_required(), vec![missing]);
        }
    }

    #[test]
    fn test_messages_set_and_clear() {
        let mut messages = StepMessages::default();
        messages.set(Check::Time, Some("too late".into()));
        assert_eq!(messages.time.as_deref(), Some("too late"));
        messages.set(Check::Time, None);
        assert_eq!(messages, StepMessages::default());
    }
}
