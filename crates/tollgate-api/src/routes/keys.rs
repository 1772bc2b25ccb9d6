//! Access key management.
//!
//! `POST /tyk/keys/{key}` creates or overwrites, `PUT` updates an existing
//! key, `DELETE` revokes, `GET` returns the stored session, and
//! `POST /tyk/keys/create` generates a fresh key. An optional `api_id`
//! query parameter must name a loaded API. A body without
//! `quota_remaining` starts the key on its full quota.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tollgate_core::SessionState;
use tollgate_store::generate_key;

use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

/// Optional query parameters of key routes.
#[derive(Debug, Default, Deserialize)]
pub struct KeyQuery {
    /// API the operation is scoped to.
    pub api_id: Option<String>,
}

/// Session body of key writes.
#[derive(Debug, Deserialize)]
pub struct SessionBody {
    /// Everything but the remaining quota.
    #[serde(flatten)]
    pub session: SessionState,
    /// Remaining quota; `quota_max` when absent.
    pub quota_remaining: Option<i64>,
}

impl SessionBody {
    /// The session to store.
    pub fn into_session(self) -> SessionState {
        let mut session = self.session;
        let full = session.quota_max.max(0);
        session.quota_remaining = self.quota_remaining.unwrap_or(full);
        session
    }
}

/// Response for key mutations.
#[derive(Debug, Serialize, Deserialize)]
pub struct KeyModifyResponse {
    /// The key (as given by the client, never the stored digest).
    pub key: String,
    /// Always `"ok"`.
    pub status: String,
    /// `added`, `modified`, `deleted` or `create`.
    pub action: String,
}

impl KeyModifyResponse {
    fn new(key: String, action: &str) -> Self {
        Self {
            key,
            status: "ok".to_string(),
            action: action.to_string(),
        }
    }
}

/// Build the key management router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tyk/keys/create", post(create_key))
        .route(
            "/tyk/keys/:key",
            get(get_key).post(add_key).put(update_key).delete(delete_key),
        )
}

fn check_api(state: &AppState, query: &KeyQuery) -> Result<(), AppError> {
    match query.api_id.as_deref() {
        Some(api_id) if !state.coordinator.snapshot().registry().contains(api_id) => {
            Err(AppError::NotFound(format!("API {api_id} not found")))
        }
        _ => Ok(()),
    }
}

async fn get_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<SessionState>, AppError> {
    check_api(&state, &query)?;
    Ok(Json(state.sessions.get_session(&key).await?))
}

async fn add_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KeyQuery>,
    body: Result<Json<SessionBody>, JsonRejection>,
) -> Result<Json<KeyModifyResponse>, AppError> {
    check_api(&state, &query)?;
    let session = extract_json(body)?.into_session();
    store(&state, &key, session).await?;
    tracing::info!(api_id = ?query.api_id, "key added");
    Ok(Json(KeyModifyResponse::new(key, "added")))
}

async fn update_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KeyQuery>,
    body: Result<Json<SessionBody>, JsonRejection>,
) -> Result<Json<KeyModifyResponse>, AppError> {
    check_api(&state, &query)?;
    let session = extract_json(body)?.into_session();
    state.sessions.get_session(&key).await?;
    store(&state, &key, session).await?;
    tracing::info!(api_id = ?query.api_id, "key modified");
    Ok(Json(KeyModifyResponse::new(key, "modified")))
}

async fn delete_key(
    State(state): State<AppState>,
    Path(key): Path<String>,
    Query(query): Query<KeyQuery>,
) -> Result<Json<KeyModifyResponse>, AppError> {
    check_api(&state, &query)?;
    state.sessions.delete_session(&key).await?;
    tracing::info!(api_id = ?query.api_id, "key deleted");
    Ok(Json(KeyModifyResponse::new(key, "deleted")))
}

async fn create_key(
    State(state): State<AppState>,
    Query(query): Query<KeyQuery>,
    body: Result<Json<SessionBody>, JsonRejection>,
) -> Result<Json<KeyModifyResponse>, AppError> {
    check_api(&state, &query)?;
    let session = extract_json(body)?.into_session();
    let key = generate_key(&session.org_id);
    store(&state, &key, session).await?;
    tracing::info!(api_id = ?query.api_id, "key generated");
    Ok(Json(KeyModifyResponse::new(key, "create")))
}

async fn store(state: &AppState, key: &str, mut session: SessionState) -> Result<(), AppError> {
    let now = Utc::now().timestamp();
    session.normalize(now);
    state.sessions.set_session(key, &session, now).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(value: serde_json::Value) -> SessionState {
        serde_json::from_value::<SessionBody>(value)
            .unwrap()
            .into_session()
    }

    #[test]
    fn missing_remaining_quota_starts_full() {
        let session = body(serde_json::json!({ "quota_max": 3, "rate": 2.0 }));
        assert_eq!(session.quota_remaining, 3);
        assert_eq!(session.rate, 2.0);
    }

    #[test]
    fn explicit_remaining_quota_is_kept() {
        let session = body(serde_json::json!({ "quota_max": 3, "quota_remaining": 0 }));
        assert_eq!(session.quota_remaining, 0);
    }

    #[test]
    fn unlimited_quota_keeps_zero_remaining() {
        let session = body(serde_json::json!({ "access_rights": { "1": "Default" } }));
        assert_eq!(session.quota_max, -1);
        assert_eq!(session.quota_remaining, 0);
        assert_eq!(session.access_rights["1"].versions, vec!["Default"]);
    }
}
