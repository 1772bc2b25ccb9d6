//! # Error Taxonomy
//!
//! Structured per-request errors, built with `thiserror`.
//! Every way the gateway can refuse a request maps to exactly one variant;
//! the HTTP layer owns the mapping to status codes.
//!
//! All variants are terminal for the request that produced them. None of
//! them is retried inside the request path.

use thiserror::Error;

/// Why a proxied request was refused.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// No registered listen path matches the request path.
    #[error("no API is registered for path {path}")]
    NoMatchingApi {
        /// The request path that failed to match.
        path: String,
    },

    /// The request path climbs above the root with `..` segments.
    #[error("request path {path} escapes the root")]
    InvalidPath {
        /// The path as received.
        path: String,
    },

    /// The request carries no access key.
    #[error("authorization field missing: expected key in '{header}'")]
    MissingKey {
        /// Header (or query parameter) the key was expected in.
        header: String,
    },

    /// The access key is not known to the session store.
    #[error("key not authorised")]
    UnknownKey,

    /// The access key exists but has expired.
    #[error("key has expired, please renew")]
    KeyExpired,

    /// The key carries no access rights for this API.
    #[error("access to API {api_id} has been disallowed for this key")]
    Forbidden {
        /// The API the key tried to reach.
        api_id: String,
    },

    /// The key may use this API but not this version of it.
    #[error("access to version '{version}' has been disallowed for this key")]
    VersionForbidden {
        /// The resolved version.
        version: String,
    },

    /// The request named no version, or a version the API does not define.
    #[error("version information not found: {version}")]
    VersionNotFound {
        /// The version the client asked for, or `<none>`.
        version: String,
    },

    /// The resolved version has passed its expiry.
    #[error("API version '{version}' has expired")]
    VersionExpired {
        /// The expired version.
        version: String,
    },

    /// The path is black-listed, or absent from a non-empty white list.
    #[error("requested path {path} is not allowed")]
    Denied {
        /// Path relative to the listen path.
        path: String,
    },

    /// The key has used up its quota for the current window.
    #[error("quota exceeded")]
    QuotaExceeded,

    /// The key has exhausted its rate-limit allowance.
    #[error("rate limit exceeded")]
    RateExceeded,

    /// The stored session could not be decoded.
    #[error("stored session record is corrupt: {0}")]
    CorruptRecord(String),

    /// The storage backend failed or timed out.
    #[error("storage backend unavailable: {0}")]
    Backend(String),
}

impl GatewayError {
    /// Whether the error reflects a gateway-side fault rather than a
    /// refused request.
    pub fn is_server_fault(&self) -> bool {
        matches!(self, Self::CorruptRecord(_) | Self::Backend(_))
    }
}
