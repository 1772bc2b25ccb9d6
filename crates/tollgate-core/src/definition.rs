//! # API Definitions
//!
//! Typed model of one managed upstream API. Definitions are authored as JSON
//! (one file per API, or posted to the management API) and loaded into the
//! gateway registry, which validates them and compiles their path lists.
//!
//! Unknown JSON fields are ignored so that definition files carrying extra
//! operator metadata (database ids, descriptions) load without changes.
//!
//! ## Versioning
//!
//! Every definition carries at least one version. Clients select a version
//! through the channel named by [`VersionLocator`]; unversioned APIs always
//! resolve to their default version. Each version owns its own expiry and
//! its own [`PathLists`].

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};

/// Name of the version used when a client does not ask for one.
pub const DEFAULT_VERSION: &str = "Default";

/// Minute-precision format used by hand-written definition files.
const LEGACY_EXPIRY_FORMAT: &str = "%Y-%m-%d %H:%M";

/// A registered upstream route configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiDefinition {
    /// Human-readable name.
    #[serde(default)]
    pub name: String,
    /// Unique identifier referenced by session access rights.
    pub api_id: String,
    /// Tenant scope. Prefixes generated keys.
    #[serde(default)]
    pub org_id: String,
    /// Where the access key is carried.
    #[serde(default)]
    pub auth: AuthSettings,
    /// Where the client signals the requested version.
    #[serde(default)]
    pub definition: VersionLocator,
    /// Version table.
    pub version_data: VersionData,
    /// Listen path and upstream target.
    pub proxy: ProxySettings,
}

impl ApiDefinition {
    /// The version used for unversioned APIs and for requests that do not
    /// name a version.
    ///
    /// `Default` wins when present. Otherwise an unversioned API, or an API
    /// with exactly one version, resolves to its first version by name.
    pub fn default_version(&self) -> Option<&str> {
        let versions = &self.version_data.versions;
        if versions.contains_key(DEFAULT_VERSION) {
            return Some(DEFAULT_VERSION);
        }
        if self.version_data.not_versioned || versions.len() == 1 {
            return versions.keys().next().map(String::as_str);
        }
        None
    }
}

/// Access-key location for an API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    /// Header carrying the key (case-insensitive).
    #[serde(default = "default_auth_header")]
    pub auth_header_name: String,
    /// Also accept the key as a URL query parameter named `auth_header_name`.
    #[serde(default)]
    pub use_param: bool,
}

impl Default for AuthSettings {
    fn default() -> Self {
        Self {
            auth_header_name: default_auth_header(),
            use_param: false,
        }
    }
}

fn default_auth_header() -> String {
    "authorization".to_string()
}

/// Request channel that carries the version name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionLocation {
    /// A request header named by [`VersionLocator::key`].
    #[default]
    Header,
    /// A URL query parameter named by [`VersionLocator::key`].
    UrlParam,
    /// The first path segment after the listen path.
    #[serde(alias = "url")]
    UrlPathSegment,
}

/// How a client signals its requested version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionLocator {
    /// Which part of the request to read.
    #[serde(default)]
    pub location: VersionLocation,
    /// Header or parameter name. Unused for path segments.
    #[serde(default = "default_version_key")]
    pub key: String,
}

impl Default for VersionLocator {
    fn default() -> Self {
        Self {
            location: VersionLocation::default(),
            key: default_version_key(),
        }
    }
}

fn default_version_key() -> String {
    "version".to_string()
}

/// Version table of an API.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VersionData {
    /// When set, every request resolves to the default version.
    #[serde(default)]
    pub not_versioned: bool,
    /// Version name to version settings.
    #[serde(default)]
    pub versions: BTreeMap<String, VersionInfo>,
}

/// Settings of a single API version.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct VersionInfo {
    /// Display name; the map key is authoritative.
    #[serde(default)]
    pub name: String,
    /// Moment after which the version refuses traffic.
    #[serde(default)]
    pub expires: VersionExpiry,
    /// Path access control lists.
    #[serde(default)]
    pub paths: PathLists,
}

/// The three path lists of a version.
///
/// Patterns are evaluated against the request path with the listen path
/// removed. `ignored` takes precedence over both other lists.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PathLists {
    /// Paths that bypass key validation entirely.
    #[serde(default)]
    pub ignored: Vec<String>,
    /// When non-empty, only these paths are allowed.
    #[serde(default)]
    pub white_list: Vec<String>,
    /// Paths that are always denied.
    #[serde(default)]
    pub black_list: Vec<String>,
}

/// Listen path and upstream target of an API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProxySettings {
    /// Inbound path prefix selecting this API.
    pub listen_path: String,
    /// Absolute URL requests are forwarded to.
    pub target_url: String,
    /// Remove the listen path before forwarding.
    #[serde(default)]
    pub strip_listen_path: bool,
}

// -- Version expiry -----------------------------------------------------------

/// Expiry of an API version. `None` means the version never expires.
///
/// Accepted on input: an empty string, `"-1"`, `0`, `-1` or `null` (never),
/// `"YYYY-MM-DD HH:MM"` (UTC), RFC 3339, or integer Unix seconds.
/// Serialized as RFC 3339, or `""` for never.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VersionExpiry(Option<DateTime<Utc>>);

impl VersionExpiry {
    /// A version that never expires.
    pub const NEVER: Self = Self(None);

    /// A version expiring at `when`.
    pub fn at(when: DateTime<Utc>) -> Self {
        Self(Some(when))
    }

    /// The expiry instant, if any.
    pub fn instant(&self) -> Option<DateTime<Utc>> {
        self.0
    }

    /// Whether the version has expired at `now`.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        matches!(self.0, Some(when) if when <= now)
    }

    /// Build an expiry from Unix seconds. Non-positive values mean never.
    pub fn from_unix(secs: i64) -> Result<Self, String> {
        if secs <= 0 {
            return Ok(Self::NEVER);
        }
        Utc.timestamp_opt(secs, 0)
            .single()
            .map(Self::at)
            .ok_or_else(|| format!("expiry timestamp out of range: {secs}"))
    }

    /// Parse the textual forms accepted in definition files.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let raw = raw.trim();
        if raw.is_empty() || raw == "-1" || raw == "0" {
            return Ok(Self::NEVER);
        }
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, LEGACY_EXPIRY_FORMAT) {
            return Ok(Self::at(Utc.from_utc_datetime(&naive)));
        }
        if let Ok(parsed) = DateTime::parse_from_rfc3339(raw) {
            return Ok(Self::at(parsed.with_timezone(&Utc)));
        }
        if let Ok(secs) = raw.parse::<i64>() {
            return Self::from_unix(secs);
        }
        Err(format!(
            "invalid version expiry \"{raw}\" (expected \"YYYY-MM-DD HH:MM\", RFC 3339 or Unix seconds)"
        ))
    }
}

impl Serialize for VersionExpiry {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self.0 {
            Some(when) => {
                serializer.serialize_str(&when.to_rfc3339_opts(SecondsFormat::Secs, true))
            }
            None => serializer.serialize_str(""),
        }
    }
}

impl<'de> Deserialize<'de> for VersionExpiry {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Unix(i64),
            Text(String),
        }

        match Option::<Raw>::deserialize(deserializer)? {
            None => Ok(Self::NEVER),
            Some(Raw::Unix(secs)) => Self::from_unix(secs).map_err(de::Error::custom),
            Some(Raw::Text(text)) => Self::parse(&text).map_err(de::Error::custom),
        }
    }
}
