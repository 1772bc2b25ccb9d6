//! # Session State
//!
//! The record stored behind every access key. A session grants access to a
//! set of APIs (optionally restricted to some versions) and carries two
//! independent throttles:
//!
//! - **Quota**: a fixed budget of requests, renewed every
//!   `quota_renewal_rate` seconds. `quota_max = -1` disables it.
//! - **Rate limit**: a token bucket holding at most `rate` tokens and
//!   refilled at `rate / per` tokens per second. `rate <= 0` or `per <= 0`
//!   disables it.
//!
//! Both must pass for a request to be charged. The arithmetic here is pure:
//! every charge returns the next state instead of mutating in place, so the
//! store can commit it with compare-and-swap and discard it on rejection.
//!
//! All timestamps are Unix seconds.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Access record for one key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionState {
    /// Last time the token bucket was refilled.
    #[serde(default)]
    pub last_check: i64,
    /// Tokens currently in the bucket.
    #[serde(default)]
    pub allowance: f64,
    /// Bucket capacity, in requests per `per` seconds.
    #[serde(default)]
    pub rate: f64,
    /// Rate window in seconds.
    #[serde(default)]
    pub per: f64,
    /// Key expiry. `0` means the key never expires.
    #[serde(default)]
    pub expires: i64,
    /// Requests per quota window. `-1` means unlimited.
    #[serde(default = "unlimited_quota")]
    pub quota_max: i64,
    /// When the current quota window ends.
    #[serde(default)]
    pub quota_renews: i64,
    /// Requests left in the current quota window.
    #[serde(default)]
    pub quota_remaining: i64,
    /// Quota window length in seconds. `0` means the quota never renews.
    #[serde(default)]
    pub quota_renewal_rate: i64,
    /// API id to the access granted on that API.
    #[serde(default)]
    pub access_rights: BTreeMap<String, AccessDefinition>,
    /// Owning organisation.
    #[serde(default)]
    pub org_id: String,
}

fn unlimited_quota() -> i64 {
    -1
}

impl Default for SessionState {
    fn default() -> Self {
        Self {
            last_check: 0,
            allowance: 0.0,
            rate: 0.0,
            per: 0.0,
            expires: 0,
            quota_max: unlimited_quota(),
            quota_renews: 0,
            quota_remaining: 0,
            quota_renewal_rate: 0,
            access_rights: BTreeMap::new(),
            org_id: String::new(),
        }
    }
}

/// Why a charge was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChargeRejection {
    /// No quota left in the current window.
    QuotaExceeded,
    /// The token bucket is empty.
    RateExceeded,
}

/// Throttle state after a successful charge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ChargeOutcome {
    /// Requests left in the quota window, if the quota is enabled.
    pub quota_remaining: Option<i64>,
    /// Quota window size (`-1` when unlimited).
    pub quota_max: i64,
    /// End of the current quota window.
    pub quota_renews: i64,
    /// Tokens left in the bucket, if rate limiting is enabled.
    pub allowance: Option<f64>,
}

impl SessionState {
    /// Whether the key has expired at `now`.
    pub fn is_expired(&self, now: i64) -> bool {
        self.expires > 0 && self.expires <= now
    }

    /// Whether the quota gate applies to this key.
    pub fn quota_enabled(&self) -> bool {
        self.quota_max >= 0
    }

    /// Whether the token-bucket gate applies to this key.
    pub fn rate_limit_enabled(&self) -> bool {
        self.rate > 0.0 && self.per > 0.0
    }

    /// Access granted on `api_id`, if any.
    pub fn access_for(&self, api_id: &str) -> Option<&AccessDefinition> {
        self.access_rights.get(api_id)
    }

    /// Prepare a session received from the management API for storage.
    ///
    /// Fills missing `api_id`s from the access-rights keys and primes an
    /// untouched token bucket with a full allowance.
    pub fn normalize(&mut self, now: i64) {
        for (api_id, access) in self.access_rights.iter_mut() {
            if access.api_id.is_empty() {
                access.api_id = api_id.clone();
            }
        }
        if self.rate_limit_enabled() && self.last_check == 0 {
            self.allowance = self.rate;
            self.last_check = now;
        }
    }

    /// Charge `cost` requests against the quota.
    ///
    /// Returns the next state and the remaining quota (`None` when the quota
    /// is disabled). Renews the window first when it has elapsed.
    pub fn quota_charged(
        &self,
        now: i64,
        cost: u32,
    ) -> Result<(Self, Option<i64>), ChargeRejection> {
        let mut next = self.clone();
        if !next.quota_enabled() {
            return Ok((next, None));
        }
        next.renew_quota(now);
        let cost = i64::from(cost);
        if next.quota_remaining < cost {
            return Err(ChargeRejection::QuotaExceeded);
        }
        next.quota_remaining -= cost;
        let remaining = next.quota_remaining;
        Ok((next, Some(remaining)))
    }

    /// Take one token from the bucket after refilling it for the time
    /// elapsed since `last_check`.
    ///
    /// Returns the next state and the tokens left (`None` when rate limiting
    /// is disabled).
    pub fn rate_token_consumed(&self, now: i64) -> Result<(Self, Option<f64>), ChargeRejection> {
        let mut next = self.clone();
        if !next.rate_limit_enabled() {
            return Ok((next, None));
        }
        next.refill(now);
        if next.allowance < 1.0 {
            return Err(ChargeRejection::RateExceeded);
        }
        next.allowance -= 1.0;
        let allowance = next.allowance;
        Ok((next, Some(allowance)))
    }

    /// Charge one request against the quota, then the rate limit.
    ///
    /// Both gates must pass; on rejection `self` is the state to keep.
    pub fn charged(&self, now: i64) -> Result<(Self, ChargeOutcome), ChargeRejection> {
        let (next, quota_remaining) = self.quota_charged(now, 1)?;
        let (next, allowance) = next.rate_token_consumed(now)?;
        let outcome = ChargeOutcome {
            quota_remaining,
            quota_max: next.quota_max,
            quota_renews: next.quota_renews,
            allowance,
        };
        Ok((next, outcome))
    }

    fn renew_quota(&mut self, now: i64) {
        if self.quota_renewal_rate > 0 && now >= self.quota_renews {
            self.quota_remaining = self.quota_max;
            self.quota_renews = now + self.quota_renewal_rate;
        }
    }

    fn refill(&mut self, now: i64) {
        let elapsed = (now - self.last_check).max(0) as f64;
        self.allowance = (self.allowance + elapsed * self.rate / self.per).min(self.rate);
        self.last_check = now;
    }
}

// -- Access rights ------------------------------------------------------------

/// Access granted to a key on one API.
///
/// Accepted on input as a full object, a single version name
/// (`"Default"`) or a list of version names (`["v1", "v2"]`).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "RawAccess")]
pub struct AccessDefinition {
    /// Display name of the API.
    pub api_name: String,
    /// The API id (mirrors the map key).
    pub api_id: String,
    /// Allowed versions. Empty allows every version.
    pub versions: Vec<String>,
}

impl AccessDefinition {
    /// Access to the listed versions of `api_id`.
    pub fn new(api_id: impl Into<String>, versions: Vec<String>) -> Self {
        Self {
            api_name: String::new(),
            api_id: api_id.into(),
            versions,
        }
    }

    /// Whether `version` may be used.
    pub fn allows_version(&self, version: &str) -> bool {
        self.versions.is_empty() || self.versions.iter().any(|v| v == version)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawAccess {
    Version(String),
    Versions(Vec<String>),
    Full {
        #[serde(default)]
        api_name: String,
        #[serde(default)]
        api_id: String,
        #[serde(default)]
        versions: Vec<String>,
    },
}

impl From<RawAccess> for AccessDefinition {
    fn from(raw: RawAccess) -> Self {
        match raw {
            RawAccess::Version(version) => Self {
                versions: vec![version],
                ..Self::default()
            },
            RawAccess::Versions(versions) => Self {
                versions,
                ..Self::default()
            },
            RawAccess::Full {
                api_name,
                api_id,
                versions,
            } => Self {
                api_name,
                api_id,
                versions,
            },
        }
    }
}
