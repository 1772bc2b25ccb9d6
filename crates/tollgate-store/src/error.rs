//! Storage and session errors.

use std::time::Duration;

use thiserror::Error;
use tollgate_core::{ChargeRejection, GatewayError};

/// Failure of a key-value backend operation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The key does not exist (or has expired).
    #[error("key not found")]
    KeyNotFound,

    /// The backend did not answer within the configured bound.
    #[error("storage operation timed out after {0:?}")]
    Timeout(Duration),

    /// The backend reported an error.
    #[error("storage backend error: {0}")]
    Backend(String),

    /// A compare-and-swap loop gave up after too many lost races.
    #[error("gave up after {attempts} contended update attempts")]
    Contention {
        /// Attempts made before giving up.
        attempts: usize,
    },
}

/// Failure of a session store operation.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    /// No session is stored under the key.
    #[error("session not found")]
    NotFound,

    /// The stored payload is not a valid session record.
    #[error("session record is corrupt: {0}")]
    Corrupt(String),

    /// The session could not be serialised.
    #[error("failed to encode session: {0}")]
    Encode(String),

    /// Quota exhausted for the current window.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// Token bucket empty.
    #[error("rate limit exceeded")]
    RateExceeded,

    /// Backend failure.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl From<ChargeRejection> for SessionError {
    fn from(rejection: ChargeRejection) -> Self {
        match rejection {
            ChargeRejection::QuotaExceeded => Self::QuotaExceeded,
            ChargeRejection::RateExceeded => Self::RateExceeded,
        }
    }
}

impl From<SessionError> for GatewayError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::NotFound => GatewayError::UnknownKey,
            SessionError::Corrupt(detail) => GatewayError::CorruptRecord(detail),
            SessionError::QuotaExceeded => GatewayError::QuotaExceeded,
            SessionError::RateExceeded => GatewayError::RateExceeded,
            SessionError::Encode(detail) => GatewayError::Backend(detail),
            SessionError::Storage(e) => GatewayError::Backend(e.to_string()),
        }
    }
}
