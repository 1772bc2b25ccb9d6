//! Reload of API definitions from `app_path`.

use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::bootstrap::{reload_from_dir, ReloadError};
use crate::error::AppError;
use crate::state::AppState;

/// Response for a completed reload.
#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// Generation now serving requests.
    pub generation: u64,
    /// Number of loaded APIs.
    pub apis: usize,
    /// When the generation was built.
    pub loaded_at: DateTime<Utc>,
}

/// Build the reload router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tyk/reload", get(reload).post(reload))
        .route("/tyk/reload/", get(reload).post(reload))
}

async fn reload(State(state): State<AppState>) -> Result<Json<ReloadResponse>, AppError> {
    let dir = state
        .config
        .app_path
        .clone()
        .ok_or_else(|| AppError::BadRequest("no app_path configured".into()))?;

    let worker = state.clone();
    let dispatcher = tokio::task::spawn_blocking(move || reload_from_dir(&worker, &dir))
        .await
        .map_err(|e| AppError::Internal(format!("reload task failed: {e}")))?
        .map_err(|e| match e {
            ReloadError::Load(e) => AppError::Internal(e.to_string()),
            ReloadError::Registry(e) => AppError::Internal(format!("invalid API definitions: {e}")),
        })?;

    Ok(Json(ReloadResponse {
        status: "ok",
        generation: dispatcher.generation(),
        apis: dispatcher.registry().len(),
        loaded_at: dispatcher.loaded_at(),
    }))
}
