//! Shared fakes for workflow and API tests
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use presence_common::events::EventBus;
use presence_common::{AttendanceAnchor, AttendanceWindow};
use presence_verify::clock::Clock;
use presence_verify::enrichment::{IpLookup, IpLookupError};
use presence_verify::geo::EARTH_RADIUS_METERS;
use presence_verify::geo::Coordinate;
use presence_verify::location::{
    CoordinateGeocoder, LocationProvider, Position, PositionError, PositionRequest,
    ReverseGeocoder,
};
use presence_verify::photo::{Camera, CameraError, CameraStream};
use presence_verify::qr::PassthroughDecoder;
use presence_verify::session::{
    AttendanceRecord, Devices, VerificationOrchestrator, VerificationSettings,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

pub const ANCHOR_LAT: f64 = 12.9716;
pub const ANCHOR_LNG: f64 = 77.5946;
pub const VALID_TOKEN: &str = "ATTENDANCE_1700000000000_ab12cd";
pub const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, b'J', b'F', b'I', b'F'];
pub const TEST_IP: &str = "203.0.113.7";

pub fn anchor() -> AttendanceAnchor {
    AttendanceAnchor::new(ANCHOR_LAT, ANCHOR_LNG, 100.0)
}

pub fn window() -> AttendanceWindow {
    AttendanceWindow::new(9, 10)
}

/// Position `meters` due north of the anchor
pub fn north_of_anchor(meters: f64) -> Position {
    let delta = (meters / EARTH_RADIUS_METERS).to_degrees();
    Position::new(ANCHOR_LAT + delta, ANCHOR_LNG)
}

/// Location provider answering every request with the configured reading
pub struct FakeLocation {
    reading: Mutex<Result<Position, PositionError>>,
    pub requests: AtomicUsize,
}

impl FakeLocation {
    pub fn new(reading: Result<Position, PositionError>) -> Self {
        Self {
            reading: Mutex::new(reading),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn set(&self, reading: Result<Position, PositionError>) {
        *self.reading.lock().unwrap() = reading;
    }
}

#[async_trait]
impl LocationProvider for FakeLocation {
    async fn current_position(&self, request: &PositionRequest) -> Result<Position, PositionError> {
        assert!(request.high_accuracy);
        assert!(request.maximum_age.is_zero());
        self.requests.fetch_add(1, Ordering::SeqCst);
        *self.reading.lock().unwrap()
    }
}

/// Camera whose streams return a configured still
pub struct FakeCamera {
    still: Mutex<Result<Vec<u8>, CameraError>>,
    pub stops: Arc<AtomicUsize>,
}

impl FakeCamera {
    pub fn new(still: Result<Vec<u8>, CameraError>) -> Self {
        Self {
            still: Mutex::new(still),
            stops: Arc::new(AtomicUsize::new(0)),
        }
    }
}

struct FakeStream {
    still: Result<Vec<u8>, CameraError>,
    stops: Arc<AtomicUsize>,
}

#[async_trait]
impl Camera for FakeCamera {
    async fn open_stream(&self) -> Result<Box<dyn CameraStream>, CameraError> {
        let still = self.still.lock().unwrap().clone();
        if let Err(CameraError::PermissionDenied) = still {
            return Err(CameraError::PermissionDenied);
        }
        Ok(Box::new(FakeStream {
            still,
            stops: self.stops.clone(),
        }))
    }
}

#[async_trait]
impl CameraStream for FakeStream {
    async fn ready(&mut self) -> Result<(), CameraError> {
        Ok(())
    }

    async fn capture_still(&mut self, _quality: f32) -> Result<Vec<u8>, CameraError> {
        self.still.clone()
    }

    fn stop(&mut self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }
}

/// IP lookup with a canned answer
pub struct StaticIp(pub Option<&'static str>);

#[async_trait]
impl IpLookup for StaticIp {
    async fn public_ip(&self) -> Result<String, IpLookupError> {
        self.0.map(str::to_string).ok_or(IpLookupError::Empty)
    }
}

/// IP lookup that takes the given time to answer
pub struct SlowIp(pub Duration);

#[async_trait]
impl IpLookup for SlowIp {
    async fn public_ip(&self) -> Result<String, IpLookupError> {
        tokio::time::sleep(self.0).await;
        Ok(TEST_IP.to_string())
    }
}

/// Geocoder that never finds an address
pub struct NoAddress;

#[async_trait]
impl ReverseGeocoder for NoAddress {
    async fn resolve(&self, _coordinate: Coordinate) -> Option<String> {
        None
    }
}

/// Geocoder that takes the given time to answer
pub struct SlowGeocoder(pub Duration);

#[async_trait]
impl ReverseGeocoder for SlowGeocoder {
    async fn resolve(&self, _coordinate: Coordinate) -> Option<String> {
        tokio::time::sleep(self.0).await;
        Some("1 Campus Road".to_string())
    }
}

/// Clock a test can move
pub struct SharedClock(Mutex<DateTime<FixedOffset>>);

impl SharedClock {
    pub fn at(rfc3339: &str) -> Self {
        Self(Mutex::new(DateTime::parse_from_rfc3339(rfc3339).unwrap()))
    }

    pub fn set(&self, rfc3339: &str) {
        *self.0.lock().unwrap() = DateTime::parse_from_rfc3339(rfc3339).unwrap();
    }
}

impl Clock for SharedClock {
    fn now(&self) -> DateTime<FixedOffset> {
        *self.0.lock().unwrap()
    }
}

pub struct Harness {
    pub orchestrator: VerificationOrchestrator,
    pub records: Arc<Mutex<Vec<AttendanceRecord>>>,
    pub location: Arc<FakeLocation>,
    pub camera: Arc<FakeCamera>,
    pub clock: Arc<SharedClock>,
    pub events: EventBus,
}

pub struct HarnessBuilder {
    at: &'static str,
    position: Result<Position, PositionError>,
    still: Result<Vec<u8>, CameraError>,
    ip_lookup: Option<Arc<dyn IpLookup>>,
    geocoder: Arc<dyn ReverseGeocoder>,
}

impl HarnessBuilder {
    pub fn new() -> Self {
        Self {
            at: "2025-03-10T09:30:00+05:30",
            position: Ok(Position::new(ANCHOR_LAT, ANCHOR_LNG)),
            still: Ok(JPEG_BYTES.to_vec()),
            ip_lookup: Some(Arc::new(StaticIp(Some(TEST_IP)))),
            geocoder: Arc::new(CoordinateGeocoder),
        }
    }

    pub fn at(mut self, rfc3339: &'static str) -> Self {
        self.at = rfc3339;
        self
    }

    pub fn position(mut self, position: Result<Position, PositionError>) -> Self {
        self.position = position;
        self
    }

    pub fn still(mut self, still: Result<Vec<u8>, CameraError>) -> Self {
        self.still = still;
        self
    }

    pub fn ip(mut self, ip: Option<StaticIp>) -> Self {
        self.ip_lookup = ip.map(|ip| Arc::new(ip) as Arc<dyn IpLookup>);
        self
    }

    pub fn ip_lookup(mut self, lookup: Arc<dyn IpLookup>) -> Self {
        self.ip_lookup = Some(lookup);
        self
    }

    pub fn geocoder(mut self, geocoder: Arc<dyn ReverseGeocoder>) -> Self {
        self.geocoder = geocoder;
        self
    }

    pub fn build(self) -> Harness {
        let location = Arc::new(FakeLocation::new(self.position));
        let camera = Arc::new(FakeCamera::new(self.still));
        let clock = Arc::new(SharedClock::at(self.at));
        let events = EventBus::new(64);
        let records = Arc::new(Mutex::new(Vec::new()));

        let devices = Devices {
            location: location.clone(),
            camera: camera.clone(),
            qr_decoder: Arc::new(PassthroughDecoder),
            geocoder: self.geocoder,
            ip_lookup: self.ip_lookup,
        };
        let sink = records.clone();
        let orchestrator = VerificationOrchestrator::new(
            devices,
            VerificationSettings::default(),
            clock.clone(),
            events.clone(),
            Box::new(move |record| sink.lock().unwrap().push(record)),
        );

        Harness {
            orchestrator,
            records,
            location,
            camera,
            clock,
            events,
        }
    }
}

impl Harness {
    /// Open and run the proactive location probe to completion
    pub async fn open_and_locate(&mut self) {
        let probe = self.orchestrator.open(anchor(), window()).unwrap();
        let outcome = probe.run().await;
        self.orchestrator.apply_location(outcome).unwrap();
    }

    pub fn records(&self) -> Vec<AttendanceRecord> {
        self.records.lock().unwrap().clone()
    }
}
