//! HTTP error mapping

use crate::ledger::LedgerError;
use crate::session::SessionError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Workflow misuse or state conflict
    #[error(transparent)]
    Session(#[from] SessionError),

    /// Attendance already filed (409)
    #[error(transparent)]
    Ledger(#[from] LedgerError),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code) = match &self {
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            ApiError::Session(err) => match err {
                SessionError::NoActiveSession => (StatusCode::NOT_FOUND, "NO_SESSION"),
                SessionError::AlreadyActive(_) => (StatusCode::CONFLICT, "SESSION_ACTIVE"),
                SessionError::InvalidPolicy(_) => {
                    (StatusCode::INTERNAL_SERVER_ERROR, "INVALID_POLICY")
                }
                SessionError::SubmitBlocked { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "SUBMIT_BLOCKED")
                }
                SessionError::StepIncomplete { .. } => {
                    (StatusCode::UNPROCESSABLE_ENTITY, "STEP_INCOMPLETE")
                }
                SessionError::WrongStep { .. }
                | SessionError::CannotGoBack { .. }
                | SessionError::AtFinalStep => (StatusCode::CONFLICT, "WRONG_STEP"),
                SessionError::Stale(_) => (StatusCode::CONFLICT, "STALE"),
            },
            ApiError::Ledger(_) => (StatusCode::CONFLICT, "ALREADY_MARKED"),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": self.to_string(),
            }
        }));

        (status, body).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
