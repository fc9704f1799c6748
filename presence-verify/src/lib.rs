//! presence-verify: multi-factor attendance verification
//!
//! Proves a user is at the institution during the allowed window by
//! combining a QR scan, a GPS geofence check, a time-window gate and an
//! optional photo into one attendance submission. The HTTP surface relays
//! device sensor results from the client into the workflow.

pub mod api;
pub mod clock;
pub mod enrichment;
pub mod error;
pub mod geo;
pub mod ledger;
pub mod location;
pub mod photo;
pub mod qr;
pub mod session;
pub mod time_window;

pub use crate::error::{ApiError, ApiResult};

use crate::clock::Clock;
use crate::enrichment::{HttpIpLookup, IpLookup};
use crate::ledger::AttendanceLedger;
use crate::location::{CoordinateGeocoder, RelayLocationProvider};
use crate::photo::RelayCamera;
use crate::qr::{PassthroughDecoder, QrDecoder, SimulatedDecoder};
use crate::session::{AttendanceRecord, Devices, VerificationOrchestrator, VerificationSettings};
use axum::Router;
use chrono::{DateTime, Utc};
use presence_common::config::{PolicyConfig, QrDecoderKind, TomlConfig};
use presence_common::events::EventBus;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tower_http::trace::TraceLayer;

const EVENT_BUS_CAPACITY: usize = 256;

/// Orchestrator plus the calling-layer context of the open session
pub struct Workflow {
    pub orchestrator: VerificationOrchestrator,
    /// Records handed to the completion callback
    pub completed: mpsc::UnboundedReceiver<AttendanceRecord>,
    /// User the open session belongs to
    pub user_id: Option<String>,
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub workflow: Arc<Mutex<Workflow>>,
    pub ledger: Arc<AttendanceLedger>,
    pub location_relay: Arc<RelayLocationProvider>,
    pub camera_relay: Arc<RelayCamera>,
    pub event_bus: EventBus,
    pub policy: PolicyConfig,
    pub clock: Arc<dyn Clock>,
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(
        config: &TomlConfig,
        clock: Arc<dyn Clock>,
        ip_lookup: Option<Arc<dyn IpLookup>>,
    ) -> Self {
        let location_relay = Arc::new(RelayLocationProvider::new());
        let camera_relay = Arc::new(RelayCamera::new());
        let qr_decoder: Arc<dyn QrDecoder> = match config.qr.decoder {
            QrDecoderKind::Passthrough => Arc::new(PassthroughDecoder),
            QrDecoderKind::Simulated => Arc::new(SimulatedDecoder),
        };
        let devices = Devices {
            location: location_relay.clone(),
            camera: camera_relay.clone(),
            qr_decoder,
            geocoder: Arc::new(CoordinateGeocoder),
            ip_lookup,
        };

        let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
        let (tx, completed) = mpsc::unbounded_channel();
        let orchestrator = VerificationOrchestrator::new(
            devices,
            VerificationSettings::from(&config.policy),
            clock.clone(),
            event_bus.clone(),
            Box::new(move |record| {
                let _ = tx.send(record);
            }),
        );

        Self {
            workflow: Arc::new(Mutex::new(Workflow {
                orchestrator,
                completed,
                user_id: None,
            })),
            ledger: Arc::new(AttendanceLedger::new()),
            location_relay,
            camera_relay,
            event_bus,
            policy: config.policy.clone(),
            clock,
            startup_time: Utc::now(),
        }
    }
}

/// IP lookup configured by `[ip_lookup]`, if enabled
pub fn ip_lookup_from_config(config: &TomlConfig) -> presence_common::Result<Option<Arc<dyn IpLookup>>> {
    if !config.ip_lookup.enabled {
        return Ok(None);
    }
    let lookup = HttpIpLookup::new(config.ip_lookup.url.clone())
        .map_err(|e| presence_common::Error::Config(format!("IP lookup client: {}", e)))?;
    Ok(Some(Arc::new(lookup)))
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    use axum::routing::get;

    Router::new()
        .merge(api::session_routes())
        .merge(api::attendance_routes())
        .merge(api::health_routes())
        .route("/events", get(api::event_stream))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
