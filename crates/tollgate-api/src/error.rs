//! # API Error Types
//!
//! Structured error type implementing `axum::response::IntoResponse`.
//! Maps gateway, session and registry errors to HTTP status codes with the
//! JSON body `{"status": "error", "message": ...}`. Internal error details
//! are logged, never returned.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tollgate_core::GatewayError;
use tollgate_gateway::RegistryError;
use tollgate_store::{SessionError, StorageError};

/// JSON error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    /// Always `"error"`.
    pub status: String,
    /// Human-readable reason.
    pub message: String,
}

/// Application-level error type that implements [`IntoResponse`] for Axum.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found (404).
    #[error("{0}")]
    NotFound(String),

    /// Request could not be parsed or is invalid (400).
    #[error("{0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401).
    #[error("{0}")]
    Unauthorized(String),

    /// Credentials valid but access refused (403).
    #[error("{0}")]
    Forbidden(String),

    /// Request body over the configured limit (413).
    #[error("{0}")]
    PayloadTooLarge(String),

    /// Quota or rate limit exhausted (429).
    #[error("{0}")]
    TooManyRequests(String),

    /// Internal server error (500). Message is logged but not returned.
    #[error("internal error: {0}")]
    Internal(String),

    /// Upstream unreachable or failed mid-response (502).
    #[error("upstream error: {0}")]
    BadGateway(String),

    /// Storage backend unavailable (503).
    #[error("service unavailable: {0}")]
    Unavailable(String),
}

impl AppError {
    /// HTTP status for this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::TooManyRequests(_) => StatusCode::TOO_MANY_REQUESTS,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BadGateway(_) => StatusCode::BAD_GATEWAY,
            Self::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self, status = status.as_u16(), "request failed");
        }

        let message = match &self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Unavailable(_) => "Storage backend unavailable".to_string(),
            other => other.to_string(),
        };

        let body = ErrorBody {
            status: "error".to_string(),
            message,
        };
        (status, Json(body)).into_response()
    }
}

impl From<GatewayError> for AppError {
    fn from(err: GatewayError) -> Self {
        let message = err.to_string();
        match err {
            GatewayError::NoMatchingApi { .. } => Self::NotFound(message),
            GatewayError::InvalidPath { .. } => Self::BadRequest(message),
            GatewayError::MissingKey { .. }
            | GatewayError::UnknownKey
            | GatewayError::KeyExpired => Self::Unauthorized(message),
            GatewayError::Forbidden { .. }
            | GatewayError::VersionForbidden { .. }
            | GatewayError::VersionNotFound { .. }
            | GatewayError::VersionExpired { .. }
            | GatewayError::Denied { .. } => Self::Forbidden(message),
            GatewayError::QuotaExceeded | GatewayError::RateExceeded => {
                Self::TooManyRequests(message)
            }
            GatewayError::CorruptRecord(_) => Self::Internal(message),
            GatewayError::Backend(_) => Self::Unavailable(message),
        }
    }
}

impl From<SessionError> for AppError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => Self::NotFound("key not found".to_string()),
            SessionError::QuotaExceeded | SessionError::RateExceeded => {
                Self::TooManyRequests(err.to_string())
            }
            SessionError::Corrupt(_) | SessionError::Encode(_) => Self::Internal(err.to_string()),
            SessionError::Storage(e) => e.into(),
        }
    }
}

impl From<StorageError> for AppError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::KeyNotFound => Self::NotFound("key not found".to_string()),
            other => Self::Unavailable(other.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        Self::BadRequest(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_body_util::BodyExt;

    #[test]
    fn gateway_errors_map_to_statuses() {
        let cases = [
            (
                GatewayError::InvalidPath { path: "/..".into() },
                StatusCode::BAD_REQUEST,
            ),
            (
                GatewayError::NoMatchingApi { path: "/x".into() },
                StatusCode::NOT_FOUND,
            ),
            (
                GatewayError::MissingKey {
                    header: "authorization".into(),
                },
                StatusCode::UNAUTHORIZED,
            ),
            (GatewayError::UnknownKey, StatusCode::UNAUTHORIZED),
            (GatewayError::KeyExpired, StatusCode::UNAUTHORIZED),
            (
                GatewayError::Forbidden { api_id: "1".into() },
                StatusCode::FORBIDDEN,
            ),
            (
                GatewayError::Denied { path: "/a".into() },
                StatusCode::FORBIDDEN,
            ),
            (GatewayError::QuotaExceeded, StatusCode::TOO_MANY_REQUESTS),
            (GatewayError::RateExceeded, StatusCode::TOO_MANY_REQUESTS),
            (
                GatewayError::CorruptRecord("x".into()),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                GatewayError::Backend("down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(AppError::from(err.clone()).status(), status, "{err:?}");
        }
    }

    #[test]
    fn session_errors_map_to_statuses() {
        assert_eq!(
            AppError::from(SessionError::NotFound).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::from(SessionError::Storage(StorageError::Backend("x".into()))).status(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            AppError::from(SessionError::Corrupt("x".into())).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[tokio::test]
    async fn body_has_status_and_message() {
        let response = AppError::Forbidden("nope".into()).into_response();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body.status, "error");
        assert_eq!(body.message, "nope");
    }

    #[tokio::test]
    async fn internal_details_are_hidden() {
        let response = AppError::Internal("db password wrong".into()).into_response();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let body: ErrorBody = serde_json::from_slice(&bytes).unwrap();
        assert!(!body.message.contains("password"));
    }
}
