//! Verification workflow state machine
//!
//! Steps run strictly in order `QR → LOCATION → PHOTO → CONFIRM`:
//! - QR → LOCATION when a scanned token is accepted
//! - LOCATION → PHOTO on "continue", only with location and time verified
//! - PHOTO → CONFIRM on "continue", photo or not
//! - CONFIRM submits only when QR, location and time are all verified
//!
//! Sensor work is split in two so nothing holds the orchestrator while a
//! device is slow: a *probe* is an owned future tagged with the session and
//! attempt it was issued for, and its outcome is *applied* afterwards.
//! Outcomes for a closed session or a superseded attempt are discarded.

use super::record::{AttendanceRecord, DeviceFingerprint, RecordLocation};
use super::{
    Check, SessionError, SessionLocation, SessionSnapshot, VerificationSession, VerificationStep,
};
use crate::clock::Clock;
use crate::enrichment::{self, Enrichment, IpLookup};
use crate::location::{
    GeolocationVerifier, LocationError, LocationProvider, PositionRequest, ReverseGeocoder,
    VerifiedLocation, DEFAULT_FIX_TIMEOUT,
};
use crate::photo::{Camera, CameraError, PhotoCapture, StillImage};
use crate::qr::{QrDecoder, QrRejection, QrValidator, QrVerdict};
use crate::time_window;
use chrono::{DateTime, Utc};
use presence_common::config::PolicyConfig;
use presence_common::events::{AttendanceEvent, EventBus};
use presence_common::{AttendanceAnchor, AttendanceWindow};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Receives each finished record; the orchestrator keeps no copy
pub type CompletionCallback = Box<dyn Fn(AttendanceRecord) + Send + Sync>;

/// Device and network capabilities the workflow drives
#[derive(Clone)]
pub struct Devices {
    pub location: Arc<dyn LocationProvider>,
    pub camera: Arc<dyn Camera>,
    pub qr_decoder: Arc<dyn QrDecoder>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    /// `None` disables IP enrichment entirely
    pub ip_lookup: Option<Arc<dyn IpLookup>>,
}

/// Timing knobs for one orchestrator
#[derive(Debug, Clone)]
pub struct VerificationSettings {
    pub location_timeout: Duration,
    pub enrichment_grace: Duration,
    pub qr_max_age: Option<Duration>,
}

impl Default for VerificationSettings {
    fn default() -> Self {
        Self {
            location_timeout: DEFAULT_FIX_TIMEOUT,
            enrichment_grace: Duration::from_millis(1_500),
            qr_max_age: None,
        }
    }
}

impl From<&PolicyConfig> for VerificationSettings {
    fn from(policy: &PolicyConfig) -> Self {
        Self {
            location_timeout: policy.location_timeout(),
            enrichment_grace: policy.enrichment_grace(),
            qr_max_age: policy.qr_max_age(),
        }
    }
}

/// Pending location fix for one session attempt
pub struct LocationProbe {
    session_id: Uuid,
    attempt: u64,
    anchor: AttendanceAnchor,
    request: PositionRequest,
    verifier: GeolocationVerifier,
}

impl std::fmt::Debug for LocationProbe {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationProbe")
            .field("session_id", &self.session_id)
            .field("attempt", &self.attempt)
            .field("anchor", &self.anchor)
            .field("request", &self.request)
            .finish_non_exhaustive()
    }
}

impl LocationProbe {
    pub fn session_id(&self) -> Uuid {
        self.session_id
    }

    pub async fn run(self) -> LocationOutcome {
        let result = self
            .verifier
            .acquire_and_verify(&self.anchor, self.request)
            .await;
        LocationOutcome {
            session_id: self.session_id,
            attempt: self.attempt,
            result,
        }
    }
}

/// Result of a location probe, to be applied to its session
#[derive(Debug)]
pub struct LocationOutcome {
    session_id: Uuid,
    attempt: u64,
    result: Result<VerifiedLocation, LocationError>,
}

/// What the combined location/time step looks like after an outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LocationReport {
    pub location_verified: bool,
    pub time_verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location_message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub time_message: Option<String>,
    /// Both checks passed, so "continue" will leave the location step
    pub can_continue: bool,
}

/// Pending photo capture for one session
pub struct PhotoProbe {
    session_id: Uuid,
    capture: PhotoCapture,
}

impl PhotoProbe {
    pub async fn run(self) -> PhotoOutcome {
        PhotoOutcome {
            session_id: self.session_id,
            result: self.capture.capture().await,
        }
    }
}

#[derive(Debug)]
pub struct PhotoOutcome {
    session_id: Uuid,
    result: Result<StillImage, CameraError>,
}

/// Acknowledgement of a submission; the record itself went to the callback
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubmissionReceipt {
    pub session_id: Uuid,
    pub submitted_at: DateTime<Utc>,
    pub with_photo: bool,
}

struct ActiveSession {
    session: VerificationSession,
    anchor: AttendanceAnchor,
    window: AttendanceWindow,
}

/// Drives one verification session at a time
pub struct VerificationOrchestrator {
    devices: Devices,
    settings: VerificationSettings,
    clock: Arc<dyn Clock>,
    events: EventBus,
    on_success: CompletionCallback,
    active: Option<ActiveSession>,
}

impl VerificationOrchestrator {
    pub fn new(
        devices: Devices,
        settings: VerificationSettings,
        clock: Arc<dyn Clock>,
        events: EventBus,
        on_success: CompletionCallback,
    ) -> Self {
        Self {
            devices,
            settings,
            clock,
            events,
            on_success,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn session(&self) -> Option<&VerificationSession> {
        self.active.as_ref().map(|a| &a.session)
    }

    /// Current view, with any address that has arrived folded in
    pub fn snapshot(&mut self) -> Option<SessionSnapshot> {
        let active = self.active.as_mut()?;
        active.session.absorb_address();
        Some(active.session.snapshot())
    }

    /// Submission is enabled only at CONFIRM with every required check passed
    pub fn can_submit(&self) -> bool {
        self.session().is_some_and(|s| {
            s.current_step == VerificationStep::Confirm && s.status.is_submit_ready()
        })
    }

    fn active_mut(&mut self) -> Result<&mut ActiveSession, SessionError> {
        self.active.as_mut().ok_or(SessionError::NoActiveSession)
    }

    fn emit(&self, event: AttendanceEvent) {
        self.events.emit_lossy(event);
    }

    fn emit_check(&self, session_id: Uuid, check: Check, failure: Option<&str>) {
        let timestamp = Utc::now();
        self.emit(match failure {
            None => AttendanceEvent::StepPassed {
                session_id,
                check,
                timestamp,
            },
            Some(reason) => AttendanceEvent::StepFailed {
                session_id,
                check,
                reason: reason.to_string(),
                timestamp,
            },
        });
    }

    /// Evaluate the time gate now and record the result on the session
    fn evaluate_time(&mut self) -> Result<(), SessionError> {
        let now = self.clock.now();
        let active = self.active_mut()?;
        let check = time_window::check(&now, &active.window);
        active.session.status.time = check.passed;
        active.session.messages.set(Check::Time, check.reason.clone());
        let session_id = active.session.id;

        debug!(session_id = %session_id, passed = check.passed, "Time window evaluated");
        self.emit_check(session_id, Check::Time, check.reason.as_deref());
        Ok(())
    }

    fn issue_location_probe(&mut self) -> Result<LocationProbe, SessionError> {
        let verifier = GeolocationVerifier::new(self.devices.location.clone());
        let timeout = self.settings.location_timeout;
        let active = self.active_mut()?;
        active.session.location_attempt += 1;

        Ok(LocationProbe {
            session_id: active.session.id,
            attempt: active.session.location_attempt,
            anchor: active.anchor,
            request: PositionRequest::fresh(timeout),
            verifier,
        })
    }

    /// Open a fresh session
    ///
    /// Evaluates the time window immediately and returns the location probe
    /// that must be run proactively; IP lookup starts in the background.
    /// Must be called from within a tokio runtime.
    pub fn open(
        &mut self,
        anchor: AttendanceAnchor,
        window: AttendanceWindow,
    ) -> Result<LocationProbe, SessionError> {
        if let Some(active) = &self.active {
            return Err(SessionError::AlreadyActive(active.session.id));
        }
        anchor
            .validate()
            .and_then(|_| window.validate())
            .map_err(|e| SessionError::InvalidPolicy(e.to_string()))?;

        let mut session = VerificationSession::new(self.clock.now());
        if let Some(lookup) = self.devices.ip_lookup.clone() {
            session.source_ip = Some(Enrichment::spawn(session.cancel.clone(), async move {
                enrichment::lookup_or_unknown(lookup.as_ref()).await
            }));
        }

        let session_id = session.id;
        info!(
            session_id = %session_id,
            anchor_lat = anchor.latitude,
            anchor_lng = anchor.longitude,
            radius_m = anchor.radius_meters,
            window_start = window.start_hour,
            window_end = window.end_hour,
            "Verification session opened"
        );

        self.active = Some(ActiveSession {
            session,
            anchor,
            window,
        });
        self.emit(AttendanceEvent::SessionOpened {
            session_id,
            timestamp: Utc::now(),
        });

        self.evaluate_time()?;
        self.issue_location_probe()
    }

    /// Decode a camera frame and validate the payload
    pub fn scan_frame(&mut self, frame: &[u8]) -> Result<QrVerdict, SessionError> {
        match self.devices.qr_decoder.decode(frame) {
            Some(token) => self.submit_qr_token(&token),
            None => {
                debug!("No QR payload decoded from frame");
                self.record_qr_rejection(QrRejection::InvalidCode)
            }
        }
    }

    /// Validate a decoded payload; acceptance moves QR → LOCATION
    pub fn submit_qr_token(&mut self, token: &str) -> Result<QrVerdict, SessionError> {
        self.require_step(VerificationStep::Qr)?;

        let validator = QrValidator::with_max_age(self.settings.qr_max_age);
        let now = self.clock.now().with_timezone(&Utc);
        if let Err(rejection) = validator.check(token, now) {
            return self.record_qr_rejection(rejection);
        }

        let active = self.active_mut()?;
        active.session.qr_token = Some(token.trim().to_string());
        active.session.status.qr_code = true;
        active.session.messages.set(Check::QrCode, None);
        let session_id = active.session.id;

        info!(session_id = %session_id, "QR code accepted");
        self.emit_check(session_id, Check::QrCode, None);
        self.move_to(VerificationStep::Location)?;

        Ok(QrVerdict {
            accepted: true,
            reason: None,
        })
    }

    /// A failed scan leaves any earlier accepted token in place
    fn record_qr_rejection(&mut self, rejection: QrRejection) -> Result<QrVerdict, SessionError> {
        self.require_step(VerificationStep::Qr)?;
        let reason = rejection.to_string();
        let active = self.active_mut()?;
        active.session.messages.set(Check::QrCode, Some(reason.clone()));
        let session_id = active.session.id;

        debug!(session_id = %session_id, reason = %reason, "QR code rejected");
        self.emit_check(session_id, Check::QrCode, Some(&reason));
        Ok(QrVerdict {
            accepted: false,
            reason: Some(reason),
        })
    }

    /// Redo the combined location/time step
    ///
    /// Re-evaluates the time window and issues a fresh, uncached fix
    /// request. Allowed until the workflow has moved past LOCATION.
    pub fn location_probe(&mut self) -> Result<LocationProbe, SessionError> {
        let step = self.active_mut()?.session.current_step;
        if step > VerificationStep::Location {
            return Err(SessionError::WrongStep {
                expected: VerificationStep::Location,
                actual: step,
            });
        }
        self.evaluate_time()?;
        self.issue_location_probe()
    }

    /// Apply a finished location probe
    pub fn apply_location(&mut self, outcome: LocationOutcome) -> Result<LocationReport, SessionError> {
        let geocoder = self.devices.geocoder.clone();
        let active = match self.active.as_mut() {
            Some(active)
                if active.session.id == outcome.session_id
                    && active.session.location_attempt == outcome.attempt =>
            {
                active
            }
            _ => {
                debug!(session_id = %outcome.session_id, "Discarding stale location result");
                return Err(SessionError::Stale(outcome.session_id));
            }
        };
        let session = &mut active.session;

        let failure = match outcome.result {
            Ok(verified) => {
                let coordinate = verified.coordinate;
                session.location = Some(SessionLocation {
                    coordinate,
                    distance_meters: verified.distance_meters,
                    address: None,
                });
                session.status.location = true;
                session.messages.set(Check::Location, None);
                session.address = Some(Enrichment::spawn(session.cancel.clone(), async move {
                    geocoder.resolve(coordinate).await
                }));
                None
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(session_id = %session.id, "Location verification failed: {}", reason);
                session.location = None;
                session.address = None;
                session.status.location = false;
                session.messages.set(Check::Location, Some(reason.clone()));
                Some(reason)
            }
        };

        let report = LocationReport {
            location_verified: session.status.location,
            time_verified: session.status.time,
            location_message: session.messages.location.clone(),
            time_message: session.messages.time.clone(),
            can_continue: session.status.location && session.status.time,
        };
        let session_id = session.id;
        self.emit_check(session_id, Check::Location, failure.as_deref());
        Ok(report)
    }

    /// Probe and apply in one go
    pub async fn verify_location(&mut self) -> Result<LocationReport, SessionError> {
        let probe = self.location_probe()?;
        let outcome = probe.run().await;
        self.apply_location(outcome)
    }

    /// Single-frame capture for the optional photo step
    pub fn photo_probe(&mut self) -> Result<PhotoProbe, SessionError> {
        self.require_step(VerificationStep::Photo)?;
        Ok(PhotoProbe {
            session_id: self.active_mut()?.session.id,
            capture: PhotoCapture::new(self.devices.camera.clone()),
        })
    }

    /// Apply a finished capture; a failure keeps any earlier photo
    pub fn apply_photo(&mut self, outcome: PhotoOutcome) -> Result<bool, SessionError> {
        let session = match self.active.as_mut() {
            Some(active) if active.session.id == outcome.session_id => &mut active.session,
            _ => {
                debug!(session_id = %outcome.session_id, "Discarding stale photo result");
                return Err(SessionError::Stale(outcome.session_id));
            }
        };

        let failure = match outcome.result {
            Ok(image) => {
                session.photo = Some(image);
                session.status.photo = true;
                session.messages.set(Check::Photo, None);
                None
            }
            Err(e) => {
                let reason = e.to_string();
                warn!(session_id = %session.id, "Photo capture failed: {}", reason);
                session.messages.set(Check::Photo, Some(reason.clone()));
                Some(reason)
            }
        };
        let session_id = session.id;
        self.emit_check(session_id, Check::Photo, failure.as_deref());
        Ok(failure.is_none())
    }

    pub async fn capture_photo(&mut self) -> Result<bool, SessionError> {
        let probe = self.photo_probe()?;
        let outcome = probe.run().await;
        self.apply_photo(outcome)
    }

    /// The user's "continue" action
    pub fn advance(&mut self) -> Result<VerificationStep, SessionError> {
        let session = &self.active_mut()?.session;
        let step = session.current_step;

        let missing: Vec<Check> = match step {
            VerificationStep::Qr => (!session.status.qr_code)
                .then_some(Check::QrCode)
                .into_iter()
                .collect(),
            VerificationStep::Location => [
                (Check::Location, session.status.location),
                (Check::Time, session.status.time),
            ]
            .into_iter()
            .filter_map(|(check, passed)| (!passed).then_some(check))
            .collect(),
            VerificationStep::Photo => Vec::new(),
            VerificationStep::Confirm => return Err(SessionError::AtFinalStep),
        };
        if !missing.is_empty() {
            return Err(SessionError::StepIncomplete { step, missing });
        }

        let next = step.next().ok_or(SessionError::AtFinalStep)?;
        self.move_to(next)?;
        Ok(next)
    }

    /// Manual back-navigation; captured data is kept until a step is redone
    pub fn go_back(&mut self, to: VerificationStep) -> Result<(), SessionError> {
        let from = self.active_mut()?.session.current_step;
        if to >= from {
            return Err(SessionError::CannotGoBack { from, to });
        }
        self.move_to(to)
    }

    fn move_to(&mut self, to: VerificationStep) -> Result<(), SessionError> {
        let active = self.active_mut()?;
        let from = active.session.current_step;
        if from == to {
            return Ok(());
        }
        active.session.current_step = to;
        let session_id = active.session.id;

        debug!(session_id = %session_id, from = %from, to = %to, "Step changed");
        self.emit(AttendanceEvent::StepChanged {
            session_id,
            from,
            to,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    fn require_step(&mut self, expected: VerificationStep) -> Result<(), SessionError> {
        let actual = self.active_mut()?.session.current_step;
        if actual != expected {
            return Err(SessionError::WrongStep { expected, actual });
        }
        Ok(())
    }

    /// Assemble the record, hand it to the completion callback, tear down
    ///
    /// Waits at most the enrichment grace period for a pending address or
    /// IP; whatever has not arrived falls back to raw coordinates or
    /// `"unknown"`.
    pub async fn submit(&mut self, device: DeviceFingerprint) -> Result<SubmissionReceipt, SessionError> {
        let session = &self.active_mut()?.session;
        if session.current_step != VerificationStep::Confirm {
            return Err(SessionError::WrongStep {
                expected: VerificationStep::Confirm,
                actual: session.current_step,
            });
        }
        let missing = session.status.missing_required();
        if !missing.is_empty() {
            return Err(SessionError::SubmitBlocked { missing });
        }

        let ActiveSession { mut session, .. } =
            self.active.take().ok_or(SessionError::NoActiveSession)?;
        let grace = self.settings.enrichment_grace;

        let (qr_code, location) = match (session.qr_token.take(), session.location.take()) {
            (Some(qr), Some(location)) => (qr, location),
            _ => {
                // Flags and data are set together; reaching here is a bug
                session.cancel.cancel();
                return Err(SessionError::SubmitBlocked {
                    missing: vec![Check::QrCode, Check::Location],
                });
            }
        };

        // Both enrichments share one grace period
        let known_address = location.address;
        let pending_address = session.address.take();
        let pending_ip = session.source_ip.take();
        let (address, source_ip) = tokio::join!(
            async move {
                match (known_address, pending_address) {
                    (Some(address), _) => Some(address),
                    (None, Some(pending)) => pending.settle(grace).await.flatten(),
                    (None, None) => None,
                }
            },
            async move {
                match pending_ip {
                    Some(pending) => Some(
                        pending
                            .settle(grace)
                            .await
                            .unwrap_or_else(|| enrichment::UNKNOWN_IP.to_string()),
                    ),
                    None => None,
                }
            },
        );
        session.cancel.cancel();

        let submitted_at = self.clock.now().with_timezone(&Utc);
        let with_photo = session.photo.is_some();
        let record = AttendanceRecord {
            qr_code,
            location: RecordLocation {
                latitude: location.coordinate.latitude,
                longitude: location.coordinate.longitude,
                address,
            },
            timestamp: submitted_at,
            photo: session.photo.take(),
            device_fingerprint: device.as_str().to_string(),
            source_ip,
        };

        info!(
            session_id = %session.id,
            with_photo,
            "Attendance submitted"
        );
        (self.on_success)(record);
        self.emit(AttendanceEvent::AttendanceSubmitted {
            session_id: session.id,
            with_photo,
            timestamp: Utc::now(),
        });

        Ok(SubmissionReceipt {
            session_id: session.id,
            submitted_at,
            with_photo,
        })
    }

    /// Discard the session from any step; nothing is emitted
    pub fn close(&mut self) -> Result<Uuid, SessionError> {
        let active = self.active.take().ok_or(SessionError::NoActiveSession)?;
        active.session.cancel.cancel();
        let session_id = active.session.id;

        info!(session_id = %session_id, "Verification session closed without submission");
        self.emit(AttendanceEvent::SessionClosed {
            session_id,
            timestamp: Utc::now(),
        });
        Ok(session_id)
    }
}
