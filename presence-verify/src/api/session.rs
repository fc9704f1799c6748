//! Verification session endpoints
//!
//! Device sensors live on the client: fixes and photos are relayed in and
//! fed to the orchestrator through the relay providers. Slow sensor work
//! runs without holding the workflow lock.

use crate::error::{ApiError, ApiResult};
use crate::ledger::LedgerEntry;
use crate::location::{Position, PositionError};
use crate::qr::QrVerdict;
use crate::session::{
    AttendanceRecord, DeviceFingerprint, LocationProbe, SessionError, SessionSnapshot,
    VerificationStep,
};
use crate::AppState;
use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{debug, info};

#[derive(Debug, Deserialize)]
pub struct OpenRequest {
    pub user_id: String,
}

#[derive(Debug, Deserialize)]
pub struct QrRequest {
    /// Payload decoded on the client
    #[serde(default)]
    pub token: Option<String>,
    /// Raw frame for the configured decoder
    #[serde(default)]
    pub frame_base64: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct QrResponse {
    pub verdict: QrVerdict,
    pub session: SessionSnapshot,
}

/// Fix or failure reported by the client device
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum LocationRelayRequest {
    Fix {
        latitude: f64,
        longitude: f64,
        #[serde(default)]
        accuracy_meters: Option<f64>,
    },
    Failure {
        error: PositionError,
    },
}

#[derive(Debug, Deserialize)]
pub struct PhotoRequest {
    pub image_base64: String,
}

#[derive(Debug, Serialize)]
pub struct PhotoResponse {
    pub captured: bool,
    pub session: SessionSnapshot,
}

#[derive(Debug, Deserialize)]
pub struct BackRequest {
    pub step: VerificationStep,
}

fn snapshot_of(state: &mut crate::Workflow) -> ApiResult<SessionSnapshot> {
    state
        .orchestrator
        .snapshot()
        .ok_or(ApiError::Session(SessionError::NoActiveSession))
}

/// Run a location probe off-lock and apply its outcome
fn spawn_location_probe(state: AppState, probe: LocationProbe) {
    tokio::spawn(async move {
        let session_id = probe.session_id();
        let outcome = probe.run().await;
        let mut workflow = state.workflow.lock().await;
        match workflow.orchestrator.apply_location(outcome) {
            Ok(report) => debug!(session_id = %session_id, ?report, "Location step updated"),
            Err(e) => debug!(session_id = %session_id, "Location result not applied: {}", e),
        }
    });
}

/// POST /session/open
pub async fn open_session(
    State(state): State<AppState>,
    Json(request): Json<OpenRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let user_id = request.user_id.trim();
    if user_id.is_empty() {
        return Err(ApiError::BadRequest("user_id is required".to_string()));
    }
    let today = state.clock.now().date_naive();
    state.ledger.ensure_unmarked(user_id, today).await?;

    let mut workflow = state.workflow.lock().await;
    let probe = workflow
        .orchestrator
        .open(state.policy.anchor, state.policy.window)?;
    workflow.user_id = Some(user_id.to_string());
    let snapshot = snapshot_of(&mut workflow)?;
    drop(workflow);

    info!(user_id = %user_id, session_id = %snapshot.session_id, "Session opened via API");
    spawn_location_probe(state.clone(), probe);
    Ok(Json(snapshot))
}

/// GET /session
pub async fn get_session(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    let mut workflow = state.workflow.lock().await;
    Ok(Json(snapshot_of(&mut workflow)?))
}

/// POST /session/qr
pub async fn scan_qr(
    State(state): State<AppState>,
    Json(request): Json<QrRequest>,
) -> ApiResult<Json<QrResponse>> {
    let mut workflow = state.workflow.lock().await;
    let verdict = match (request.token, request.frame_base64) {
        (Some(token), _) => workflow.orchestrator.submit_qr_token(&token)?,
        (None, Some(frame)) => {
            let frame = STANDARD
                .decode(frame.trim())
                .map_err(|e| ApiError::BadRequest(format!("frame_base64: {}", e)))?;
            workflow.orchestrator.scan_frame(&frame)?
        }
        (None, None) => {
            return Err(ApiError::BadRequest(
                "either token or frame_base64 is required".to_string(),
            ))
        }
    };
    let session = snapshot_of(&mut workflow)?;
    Ok(Json(QrResponse { verdict, session }))
}

/// POST /session/location - relay a device fix to the pending request
pub async fn relay_location(
    State(state): State<AppState>,
    Json(request): Json<LocationRelayRequest>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    if !state.workflow.lock().await.orchestrator.is_active() {
        return Err(SessionError::NoActiveSession.into());
    }

    let reading = match request {
        LocationRelayRequest::Fix {
            latitude,
            longitude,
            accuracy_meters,
        } => {
            if !(-90.0..=90.0).contains(&latitude) || !(-180.0..=180.0).contains(&longitude) {
                return Err(ApiError::BadRequest(format!(
                    "coordinate out of range: {}, {}",
                    latitude, longitude
                )));
            }
            Ok(Position {
                latitude,
                longitude,
                accuracy_meters,
            })
        }
        LocationRelayRequest::Failure { error } => Err(error),
    };
    state.location_relay.report(reading);

    Ok((StatusCode::ACCEPTED, Json(json!({ "accepted": true }))))
}

/// POST /session/location/retry - redo the location and time checks
pub async fn retry_location(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    let mut workflow = state.workflow.lock().await;
    let probe = workflow.orchestrator.location_probe()?;
    let snapshot = snapshot_of(&mut workflow)?;
    drop(workflow);

    spawn_location_probe(state.clone(), probe);
    Ok(Json(snapshot))
}

/// POST /session/photo
pub async fn capture_photo(
    State(state): State<AppState>,
    Json(request): Json<PhotoRequest>,
) -> ApiResult<Json<PhotoResponse>> {
    let bytes = STANDARD
        .decode(request.image_base64.trim())
        .map_err(|e| ApiError::BadRequest(format!("image_base64: {}", e)))?;

    let probe = state.workflow.lock().await.orchestrator.photo_probe()?;
    state.camera_relay.stage(bytes);
    let outcome = probe.run().await;

    let mut workflow = state.workflow.lock().await;
    let captured = workflow.orchestrator.apply_photo(outcome)?;
    let session = snapshot_of(&mut workflow)?;
    Ok(Json(PhotoResponse { captured, session }))
}

/// POST /session/continue
pub async fn continue_session(State(state): State<AppState>) -> ApiResult<Json<SessionSnapshot>> {
    let mut workflow = state.workflow.lock().await;
    workflow.orchestrator.advance()?;
    Ok(Json(snapshot_of(&mut workflow)?))
}

/// POST /session/back
pub async fn go_back(
    State(state): State<AppState>,
    Json(request): Json<BackRequest>,
) -> ApiResult<Json<SessionSnapshot>> {
    let mut workflow = state.workflow.lock().await;
    workflow.orchestrator.go_back(request.step)?;
    Ok(Json(snapshot_of(&mut workflow)?))
}

/// POST /session/submit
pub async fn submit_session(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<AttendanceRecord>> {
    let user_agent = headers
        .get(USER_AGENT)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let platform = headers
        .get("sec-ch-ua-platform")
        .and_then(|v| v.to_str().ok())
        .map(|p| p.trim_matches('"'));
    let device = DeviceFingerprint::new(user_agent, platform);

    let mut workflow = state.workflow.lock().await;
    if !workflow.orchestrator.is_active() {
        return Err(SessionError::NoActiveSession.into());
    }
    let user_id = workflow
        .user_id
        .clone()
        .ok_or_else(|| ApiError::Internal("open session has no user".to_string()))?;
    let today = state.clock.now().date_naive();
    state.ledger.ensure_unmarked(&user_id, today).await?;

    let receipt = workflow.orchestrator.submit(device).await?;
    workflow.user_id = None;
    let record = workflow
        .completed
        .try_recv()
        .map_err(|_| ApiError::Internal("completion callback delivered no record".to_string()))?;
    drop(workflow);

    state
        .ledger
        .file(LedgerEntry {
            user_id,
            date: today,
            session_id: receipt.session_id,
            record: record.clone(),
        })
        .await?;
    Ok(Json(record))
}

/// POST /session/close
pub async fn close_session(State(state): State<AppState>) -> ApiResult<Json<Value>> {
    let mut workflow = state.workflow.lock().await;
    let session_id = workflow.orchestrator.close()?;
    workflow.user_id = None;
    Ok(Json(json!({ "closed": session_id })))
}

pub fn session_routes() -> Router<AppState> {
    Router::new()
        .route("/session", get(get_session))
        .route("/session/open", post(open_session))
        .route("/session/qr", post(scan_qr))
        .route("/session/location", post(relay_location))
        .route("/session/location/retry", post(retry_location))
        .route("/session/photo", post(capture_photo))
        .route("/session/continue", post(continue_session))
        .route("/session/back", post(go_back))
        .route("/session/submit", post(submit_session))
        .route("/session/close", post(close_session))
}
