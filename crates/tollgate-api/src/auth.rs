//! # Management API Authentication
//!
//! The management routes (`/tyk/apis`, `/tyk/keys`, `/tyk/reload`,
//! `/tyk/metrics`) require the configured admin secret in the
//! `x-tyk-authorization` header. The comparison is constant-time.
//!
//! When no secret is configured, the management API is open; bootstrap
//! logs a warning in that case.

use std::fmt;
use std::sync::Arc;

use axum::extract::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;
use zeroize::Zeroizing;

use crate::error::AppError;

/// Header carrying the admin secret.
pub const ADMIN_HEADER: &str = "x-tyk-authorization";

/// The admin secret. Zeroed on drop; never printed.
#[derive(Clone)]
pub struct AdminSecret(Arc<Zeroizing<String>>);

impl AdminSecret {
    /// Wrap a secret value.
    pub fn new(secret: impl Into<String>) -> Self {
        Self(Arc::new(Zeroizing::new(secret.into())))
    }

    /// Constant-time comparison against a provided value.
    pub fn verify(&self, provided: &str) -> bool {
        constant_time_token_eq(provided, self.0.as_str())
    }
}

impl fmt::Debug for AdminSecret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AdminSecret([REDACTED])")
    }
}

/// Auth configuration injected into request extensions.
#[derive(Debug, Clone, Default)]
pub struct AdminAuth {
    /// `None` disables management authentication.
    pub secret: Option<AdminSecret>,
}

fn constant_time_token_eq(provided: &str, expected: &str) -> bool {
    let provided = provided.as_bytes();
    let expected = expected.as_bytes();
    if provided.len() != expected.len() {
        // Keep timing independent of where the lengths differ.
        let _ = expected.ct_eq(expected);
        return false;
    }
    provided.ct_eq(expected).into()
}

/// Reject management requests without the admin secret.
pub async fn admin_auth_middleware(request: Request, next: Next) -> Response {
    let auth = request.extensions().get::<AdminAuth>().cloned();

    let Some(AdminAuth {
        secret: Some(secret),
    }) = auth
    else {
        return next.run(request).await;
    };

    let verdict = request
        .headers()
        .get(ADMIN_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| secret.verify(v));

    let reason = match verdict {
        Some(true) => return next.run(request).await,
        Some(false) => "bad admin secret",
        None => "no admin secret",
    };
    tracing::warn!(path = %request.uri().path(), reason, "rejected management request");
    AppError::Unauthorized("attempted administrative access with invalid or missing key".into())
        .into_response()
}
