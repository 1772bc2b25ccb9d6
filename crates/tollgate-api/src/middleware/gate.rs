//! # Key Validation and Quota/Rate Gate
//!
//! Admission of one dispatched data-plane request runs in two phases:
//!
//! ```text
//! check:  ResolveVersion → ACL ─┬─ Ignored ─────────────────────────────→ Forward
//!                               └─ Allowed → ExtractKey → LoadSession → Expiry
//!                                          → AccessRights
//! charge: Charge(quota, rate) ───────────────────────────────────────────→ Forward
//! ```
//!
//! [`check`] never mutates the session. The proxy reads the request body
//! between the phases, so a request refused for any reason is never charged.
//! [`charge`] commits quota and rate in a single atomic update. A charge is
//! never refunded, even when forwarding later fails.

use axum::http::{HeaderMap, HeaderName, HeaderValue, Uri};
use chrono::{DateTime, Utc};
use tollgate_core::{AuthSettings, ChargeOutcome, GatewayError};
use tollgate_gateway::acl::{self, AclDecision};
use tollgate_gateway::RouteMatch;
use tollgate_store::{SessionError, SessionStore};

/// A request that passed the gate's checks.
#[derive(Debug, Clone)]
pub struct Admission {
    /// Resolved API version.
    pub version: String,
    /// The key to charge; `None` for ignored paths.
    pub key: Option<String>,
    /// Throttle state after the charge; `None` until charged, and for
    /// ignored paths.
    pub charge: Option<ChargeOutcome>,
}

/// Run every admission check for `route` without touching quota or rate.
pub async fn check(
    sessions: &SessionStore,
    route: &RouteMatch,
    headers: &HeaderMap,
    uri: &Uri,
    now: DateTime<Utc>,
) -> Result<Admission, GatewayError> {
    let spec = &route.spec;
    let version = acl::resolve_version(spec, headers, uri)?;

    match acl::evaluate(spec, &version, uri.path(), now) {
        AclDecision::Ignored => {
            return Ok(Admission {
                version,
                key: None,
                charge: None,
            })
        }
        AclDecision::Allowed => {}
        AclDecision::Denied(reason) => {
            return Err(reason.into_error(&version, acl::policy_path(spec, uri.path())))
        }
    }

    let auth = &spec.definition().auth;
    let key = extract_key(auth, headers, uri).ok_or_else(|| GatewayError::MissingKey {
        header: auth.auth_header_name.clone(),
    })?;

    let session = sessions
        .get_session(&key)
        .await
        .map_err(|e| session_error(spec.api_id(), e))?;

    if session.is_expired(now.timestamp()) {
        return Err(GatewayError::KeyExpired);
    }

    let access = session
        .access_for(spec.api_id())
        .ok_or_else(|| GatewayError::Forbidden {
            api_id: spec.api_id().to_string(),
        })?;
    if !access.allows_version(&version) {
        return Err(GatewayError::VersionForbidden { version });
    }

    Ok(Admission {
        version,
        key: Some(key),
        charge: None,
    })
}

/// Charge quota and rate for a checked request. Ignored paths pass through
/// uncharged.
pub async fn charge(
    sessions: &SessionStore,
    api_id: &str,
    admission: Admission,
    now: DateTime<Utc>,
) -> Result<Admission, GatewayError> {
    let Some(key) = admission.key.as_deref() else {
        return Ok(admission);
    };
    let outcome = sessions
        .charge(key, now.timestamp())
        .await
        .map_err(|e| session_error(api_id, e))?;
    Ok(Admission {
        charge: Some(outcome),
        ..admission
    })
}

/// The access key carried by the request, if any.
///
/// Read from the configured header (an optional `Bearer ` prefix is
/// stripped), falling back to the query parameter of the same name when
/// `use_param` is set.
pub fn extract_key(auth: &AuthSettings, headers: &HeaderMap, uri: &Uri) -> Option<String> {
    let from_header = headers
        .get(auth.auth_header_name.as_str())
        .and_then(|v| v.to_str().ok())
        .map(|v| v.trim())
        .map(|v| v.strip_prefix("Bearer ").unwrap_or(v).trim())
        .filter(|v| !v.is_empty())
        .map(str::to_string);

    from_header.or_else(|| {
        if auth.use_param {
            acl::query_param(uri, &auth.auth_header_name).filter(|v| !v.is_empty())
        } else {
            None
        }
    })
}

fn session_error(api_id: &str, err: SessionError) -> GatewayError {
    match err {
        SessionError::Corrupt(detail) => {
            tracing::warn!(api_id, error = %detail, "corrupt session record; treating key as unknown");
            GatewayError::UnknownKey
        }
        other => other.into(),
    }
}

/// `X-RateLimit-*` headers for a charged request with a quota.
pub fn rate_limit_headers(charge: &ChargeOutcome) -> Vec<(HeaderName, HeaderValue)> {
    let Some(remaining) = charge.quota_remaining else {
        return Vec::new();
    };
    vec![
        (
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from(charge.quota_max),
        ),
        (
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from(remaining),
        ),
        (
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from(charge.quota_renews),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::TimeZone;
    use tollgate_core::{AccessDefinition, ApiDefinition, SessionState};
    use tollgate_gateway::{ApiRegistry, RouteTable};
    use tollgate_store::{InMemoryBackend, Namespace, StorageBackend, StorageError};

    use super::*;

    /// A backend that times out on every call.
    #[derive(Debug)]
    struct StalledBackend;

    #[async_trait]
    impl StorageBackend for StalledBackend {
        async fn get(&self, _key: &str) -> Result<String, StorageError> {
            Err(StorageError::Timeout(Duration::from_millis(50)))
        }

        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StorageError> {
            Err(StorageError::Timeout(Duration::from_millis(50)))
        }

        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Timeout(Duration::from_millis(50)))
        }

        async fn increment(&self, _key: &str, _delta: i64) -> Result<i64, StorageError> {
            Err(StorageError::Timeout(Duration::from_millis(50)))
        }

        async fn compare_and_swap(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Option<Duration>,
        ) -> Result<bool, StorageError> {
            Err(StorageError::Timeout(Duration::from_millis(50)))
        }
    }

    /// Reads succeed, every write fails.
    #[derive(Debug)]
    struct ReadOnlyBackend(InMemoryBackend);

    #[async_trait]
    impl StorageBackend for ReadOnlyBackend {
        async fn get(&self, key: &str) -> Result<String, StorageError> {
            self.0.get(key).await
        }

        async fn set(&self, _: &str, _: &str, _: Option<Duration>) -> Result<(), StorageError> {
            Err(StorageError::Backend("read-only replica".into()))
        }

        async fn delete(&self, _key: &str) -> Result<(), StorageError> {
            Err(StorageError::Backend("read-only replica".into()))
        }

        async fn increment(&self, _key: &str, _delta: i64) -> Result<i64, StorageError> {
            Err(StorageError::Backend("read-only replica".into()))
        }

        async fn compare_and_swap(
            &self,
            _: &str,
            _: &str,
            _: &str,
            _: Option<Duration>,
        ) -> Result<bool, StorageError> {
            Err(StorageError::Backend("read-only replica".into()))
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn definition(paths: serde_json::Value) -> ApiDefinition {
        serde_json::from_value(serde_json::json!({
            "name": "Test API",
            "api_id": "1",
            "org_id": "default",
            "auth": { "auth_header_name": "authorization", "use_param": true },
            "version_data": {
                "not_versioned": true,
                "versions": { "Default": { "name": "Default", "expires": "", "paths": paths } }
            },
            "proxy": { "listen_path": "/v1", "target_url": "http://upstream.local" }
        }))
        .unwrap()
    }

    fn route(paths: serde_json::Value, path: &str) -> RouteMatch {
        let registry = ApiRegistry::load(vec![definition(paths)]).unwrap();
        RouteTable::build(&registry).dispatch(path).unwrap()
    }

    fn uri(s: &str) -> Uri {
        s.parse().unwrap()
    }

    fn auth_headers(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", key.parse().unwrap());
        headers
    }

    fn session_for(api_id: &str) -> SessionState {
        let mut s = SessionState::default();
        s.access_rights
            .insert(api_id.into(), AccessDefinition::new(api_id, vec![]));
        s
    }

    async fn store_with(key: &str, session: &SessionState) -> (SessionStore, Arc<InMemoryBackend>) {
        let backend = Arc::new(InMemoryBackend::new());
        let store = SessionStore::new(Namespace::new(backend.clone(), "apikey-"), false);
        store.set_session(key, session, 0).await.unwrap();
        (store, backend)
    }

    async fn admit_path(
        store: &SessionStore,
        path: &str,
        headers: &HeaderMap,
    ) -> Result<Admission, GatewayError> {
        let route = route(serde_json::json!({ "ignored": ["/health"] }), path);
        let admission = check(store, &route, headers, &uri(path), now()).await?;
        charge(store, route.spec.api_id(), admission, now()).await
    }

    #[tokio::test]
    async fn valid_key_is_admitted_and_charged() {
        let mut session = session_for("1");
        session.quota_max = 5;
        session.quota_remaining = 5;
        let (store, _) = store_with("1234", &session).await;

        let admission = admit_path(&store, "/v1/anything", &auth_headers("1234"))
            .await
            .unwrap();
        assert_eq!(admission.version, "Default");
        assert_eq!(admission.key.as_deref(), Some("1234"));
        assert_eq!(admission.charge.unwrap().quota_remaining, Some(4));
        assert_eq!(store.get_session("1234").await.unwrap().quota_remaining, 4);
    }

    #[tokio::test]
    async fn ignored_path_needs_no_key() {
        let (store, _) = store_with("1234", &session_for("1")).await;
        let admission = admit_path(&store, "/v1/health", &HeaderMap::new())
            .await
            .unwrap();
        assert!(admission.key.is_none());
        assert!(admission.charge.is_none());
    }

    #[tokio::test]
    async fn missing_key_is_rejected() {
        let (store, _) = store_with("1234", &session_for("1")).await;
        assert_eq!(
            admit_path(&store, "/v1/x", &HeaderMap::new()).await.unwrap_err(),
            GatewayError::MissingKey {
                header: "authorization".into()
            }
        );
    }

    #[tokio::test]
    async fn unknown_key_is_rejected() {
        let (store, _) = store_with("1234", &session_for("1")).await;
        assert_eq!(
            admit_path(&store, "/v1/x", &auth_headers("9999")).await.unwrap_err(),
            GatewayError::UnknownKey
        );
    }

    #[tokio::test]
    async fn corrupt_record_is_treated_as_unknown() {
        let (store, backend) = store_with("1234", &session_for("1")).await;
        backend.set("apikey-1234", "garbage", None).await.unwrap();
        assert_eq!(
            admit_path(&store, "/v1/x", &auth_headers("1234")).await.unwrap_err(),
            GatewayError::UnknownKey
        );
    }

    #[tokio::test]
    async fn expired_key_is_rejected() {
        let mut session = session_for("1");
        session.expires = now().timestamp() - 1;
        let (store, _) = store_with("1234", &session).await;
        assert_eq!(
            admit_path(&store, "/v1/x", &auth_headers("1234")).await.unwrap_err(),
            GatewayError::KeyExpired
        );
    }

    #[tokio::test]
    async fn key_without_rights_is_forbidden() {
        let (store, _) = store_with("1234", &session_for("other")).await;
        assert_eq!(
            admit_path(&store, "/v1/x", &auth_headers("1234")).await.unwrap_err(),
            GatewayError::Forbidden { api_id: "1".into() }
        );
    }

    #[tokio::test]
    async fn disallowed_version_is_forbidden() {
        let mut session = SessionState::default();
        session
            .access_rights
            .insert("1".into(), AccessDefinition::new("1", vec!["v2".into()]));
        let (store, _) = store_with("1234", &session).await;
        assert!(matches!(
            admit_path(&store, "/v1/x", &auth_headers("1234")).await,
            Err(GatewayError::VersionForbidden { .. })
        ));
    }

    #[tokio::test]
    async fn exhausted_quota_is_rejected() {
        let mut session = session_for("1");
        session.quota_max = 1;
        session.quota_remaining = 1;
        let (store, _) = store_with("1234", &session).await;
        admit_path(&store, "/v1/x", &auth_headers("1234"))
            .await
            .unwrap();
        assert_eq!(
            admit_path(&store, "/v1/x", &auth_headers("1234")).await.unwrap_err(),
            GatewayError::QuotaExceeded
        );
    }

    #[tokio::test]
    async fn check_leaves_quota_untouched() {
        let mut session = session_for("1");
        session.quota_max = 1;
        session.quota_remaining = 1;
        let (store, _) = store_with("1234", &session).await;

        let route = route(serde_json::json!({}), "/v1/x");
        let admission = check(&store, &route, &auth_headers("1234"), &uri("/v1/x"), now())
            .await
            .unwrap();
        assert!(admission.charge.is_none());
        assert_eq!(store.get_session("1234").await.unwrap().quota_remaining, 1);

        let charged = charge(&store, "1", admission, now()).await.unwrap();
        assert_eq!(charged.charge.unwrap().quota_remaining, Some(0));
    }

    #[tokio::test]
    async fn stalled_backend_fails_closed() {
        let store = SessionStore::new(Namespace::new(Arc::new(StalledBackend), "apikey-"), false);
        let err = admit_path(&store, "/v1/x", &auth_headers("1234"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Backend(_)), "{err:?}");
        assert!(err.is_server_fault());
    }

    #[tokio::test]
    async fn failed_charge_commit_fails_closed() {
        let inner = InMemoryBackend::new();
        let payload = serde_json::to_string(&session_for("1")).unwrap();
        inner.set("apikey-1234", &payload, None).await.unwrap();
        let store = SessionStore::new(
            Namespace::new(Arc::new(ReadOnlyBackend(inner)), "apikey-"),
            false,
        );

        let err = admit_path(&store, "/v1/x", &auth_headers("1234"))
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Backend(_)), "{err:?}");
    }

    #[tokio::test]
    async fn denied_path_is_rejected_before_key_lookup() {
        let store = SessionStore::new(
            Namespace::new(Arc::new(InMemoryBackend::new()), "apikey-"),
            false,
        );
        let route = route(serde_json::json!({ "black_list": ["/admin"] }), "/v1/admin");
        let err = check(&store, &route, &HeaderMap::new(), &uri("/v1/admin"), now())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            GatewayError::Denied {
                path: "/admin".into()
            }
        );
    }

    #[test]
    fn key_extraction_sources() {
        let auth = AuthSettings {
            auth_header_name: "authorization".into(),
            use_param: true,
        };
        assert_eq!(
            extract_key(&auth, &auth_headers("Bearer abc"), &uri("/")).as_deref(),
            Some("abc")
        );
        assert_eq!(
            extract_key(&auth, &HeaderMap::new(), &uri("/x?authorization=q1")).as_deref(),
            Some("q1")
        );

        let header_only = AuthSettings {
            use_param: false,
            ..auth
        };
        assert_eq!(
            extract_key(&header_only, &HeaderMap::new(), &uri("/x?authorization=q1")),
            None
        );
    }

    #[test]
    fn rate_limit_headers_only_with_quota() {
        let unlimited = ChargeOutcome {
            quota_remaining: None,
            quota_max: -1,
            quota_renews: 0,
            allowance: None,
        };
        assert!(rate_limit_headers(&unlimited).is_empty());

        let limited = ChargeOutcome {
            quota_remaining: Some(9),
            quota_max: 10,
            quota_renews: 1_700_000_000,
            allowance: None,
        };
        let headers = rate_limit_headers(&limited);
        assert_eq!(headers.len(), 3);
        assert_eq!(headers[1].1, HeaderValue::from(9i64));
    }
}
