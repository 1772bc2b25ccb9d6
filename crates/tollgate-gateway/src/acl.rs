//! # Version and Path ACL
//!
//! Two steps run for every dispatched request, before any key is looked at:
//!
//! 1. [`resolve_version`] reads the requested version from the channel the
//!    API declares (header, query parameter or first path segment), falling
//!    back to the default version.
//! 2. [`evaluate`] checks that version exists and has not expired, then runs
//!    the path lists: `ignored` first, then `white_list`, then `black_list`.
//!
//! Patterns see the request path with the listen path removed (and, for
//! path-segment versioning, the version segment too).

use chrono::{DateTime, Utc};
use http::{HeaderMap, Uri};
use tollgate_core::{GatewayError, VersionLocation};

use crate::matcher::matches_any;
use crate::registry::ApiSpec;
use crate::table::strip_prefix;

/// Why the ACL refused a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    /// The version is not defined by the API.
    UnknownVersion,
    /// The version's expiry has passed.
    VersionExpired,
    /// The path matched the black list.
    BlackListed,
    /// The white list is non-empty and the path is not on it.
    NotWhiteListed,
}

/// Outcome of ACL evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AclDecision {
    /// Forward without key validation.
    Ignored,
    /// Continue with key validation.
    Allowed,
    /// Refuse the request.
    Denied(DenialReason),
}

impl DenialReason {
    /// The request error for this denial.
    pub fn into_error(self, version: &str, path: &str) -> GatewayError {
        match self {
            Self::UnknownVersion => GatewayError::VersionNotFound {
                version: version.to_string(),
            },
            Self::VersionExpired => GatewayError::VersionExpired {
                version: version.to_string(),
            },
            Self::BlackListed | Self::NotWhiteListed => GatewayError::Denied {
                path: path.to_string(),
            },
        }
    }
}

/// Determine the version a request targets.
pub fn resolve_version(
    spec: &ApiSpec,
    headers: &HeaderMap,
    uri: &Uri,
) -> Result<String, GatewayError> {
    let definition = spec.definition();
    let requested = if definition.version_data.not_versioned {
        None
    } else {
        let key = definition.definition.key.as_str();
        match definition.definition.location {
            VersionLocation::Header => headers
                .get(key)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string()),
            VersionLocation::UrlParam => query_param(uri, key),
            // A first segment that names no version is part of the path.
            VersionLocation::UrlPathSegment => strip_prefix(spec.listen_path(), uri.path())
                .split('/')
                .find(|s| !s.is_empty())
                .filter(|s| spec.version(s).is_some())
                .map(str::to_string),
        }
    };

    match requested.filter(|v| !v.is_empty()) {
        Some(version) => Ok(version),
        None => spec
            .default_version()
            .map(str::to_string)
            .ok_or_else(|| GatewayError::VersionNotFound {
                version: "<none>".to_string(),
            }),
    }
}

/// The path the lists are evaluated against.
pub fn policy_path<'a>(spec: &ApiSpec, request_path: &'a str) -> &'a str {
    let relative = strip_prefix(spec.listen_path(), request_path);
    if spec.definition().definition.location != VersionLocation::UrlPathSegment
        || spec.definition().version_data.not_versioned
    {
        return relative;
    }
    let trimmed = relative.trim_start_matches('/');
    let (first, rest) = trimmed.split_once('/').unwrap_or((trimmed, ""));
    if spec.version(first).is_some() {
        // Keep the slash that preceded the remainder.
        &relative[relative.len() - rest.len() - usize::from(!rest.is_empty())..]
    } else {
        relative
    }
}

/// Evaluate the version's expiry and path lists for `request_path`.
pub fn evaluate(
    spec: &ApiSpec,
    version: &str,
    request_path: &str,
    now: DateTime<Utc>,
) -> AclDecision {
    let Some(compiled) = spec.version(version) else {
        return AclDecision::Denied(DenialReason::UnknownVersion);
    };
    if compiled.expires.is_expired(now) {
        return AclDecision::Denied(DenialReason::VersionExpired);
    }

    let path = policy_path(spec, request_path);
    if matches_any(&compiled.ignored, path) {
        return AclDecision::Ignored;
    }
    if !compiled.white_list.is_empty() {
        return if matches_any(&compiled.white_list, path) {
            AclDecision::Allowed
        } else {
            AclDecision::Denied(DenialReason::NotWhiteListed)
        };
    }
    if matches_any(&compiled.black_list, path) {
        return AclDecision::Denied(DenialReason::BlackListed);
    }
    AclDecision::Allowed
}

/// First value of the query parameter `name`, percent-decoded.
pub fn query_param(uri: &Uri, name: &str) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.into_owned())
}
