//! Recorded attendance (read-only)

use crate::ledger::LedgerEntry;
use crate::AppState;
use axum::{
    extract::{Query, State},
    routing::get,
    Json, Router,
};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct AttendanceQuery {
    pub user_id: Option<String>,
}

/// GET /attendance[?user_id=]
pub async fn list_attendance(
    State(state): State<AppState>,
    Query(query): Query<AttendanceQuery>,
) -> Json<Vec<LedgerEntry>> {
    Json(state.ledger.list(query.user_id.as_deref()).await)
}

pub fn attendance_routes() -> Router<AppState> {
    Router::new().route("/attendance", get(list_attendance))
}
