use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::models::package::PackageStatus;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("invalid state transition: {from:?} -> {to:?}")]
    InvalidStateTransition {
        from: PackageStatus,
        to: PackageStatus,
    },

    #[error("location update rejected: {0}")]
    LocationUpdateRejected(String),

    #[error("no courier available")]
    NoCourierAvailable,

    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::InvalidStateTransition { .. } => (StatusCode::CONFLICT, self.to_string()),
            AppError::LocationUpdateRejected(msg) => {
                (StatusCode::UNPROCESSABLE_ENTITY, msg.clone())
            }
            AppError::NoCourierAvailable => (
                StatusCode::SERVICE_UNAVAILABLE,
                "no courier available".to_string(),
            ),
            AppError::CapacityExceeded(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Internal(msg) => {
                // The cause stays in the logs; callers get a generic failure.
                tracing::error!(error = %msg, "internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal error".to_string(),
                )
            }
        };

        let body = Json(json!({
            "error": message
        }));

        (status, body).into_response()
    }
}
