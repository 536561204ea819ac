//! HTTP error responses
//!
//! Every failed request answers `{ "error": <message>, "code": <status> }`
//! plus a stable machine-readable `reason`.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

use crate::verification::VerificationError;

/// Error body
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: u16,
    pub reason: &'static str,
}

/// An error ready to be rendered as a response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiError {
    status: u16,
    message: String,
    reason: &'static str,
}

impl ApiError {
    pub fn unauthorized() -> Self {
        Self {
            status: 401,
            message: "Missing or invalid scheduler secret".to_string(),
            reason: "UNAUTHORIZED",
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self {
            status: 500,
            message: message.into(),
            reason: "INTERNAL_ERROR",
        }
    }

    pub fn status(&self) -> u16 {
        self.status
    }
}

impl From<VerificationError> for ApiError {
    fn from(e: VerificationError) -> Self {
        let status = e.status_code();
        // Infrastructure details stay in the log.
        let message = if status >= 500 {
            tracing::error!(error = %e, "verification request failed");
            "Internal server error".to_string()
        } else {
            e.to_string()
        };
        Self {
            status,
            message,
            reason: e.code(),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(e: tokio::task::JoinError) -> Self {
        tracing::error!(error = %e, "blocking task failed");
        Self::internal("Internal server error")
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: self.message,
            code: status.as_u16(),
            reason: self.reason,
        };
        (status, Json(body)).into_response()
    }
}
