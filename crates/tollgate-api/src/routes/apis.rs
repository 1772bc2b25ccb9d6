//! API definition management.
//!
//! Definitions added here live in the active generation only; the next
//! reload from `app_path` replaces them with the directory contents.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tollgate_core::ApiDefinition;

use crate::error::AppError;
use crate::extractors::extract_json;
use crate::state::AppState;

/// Response for definition edits.
#[derive(Debug, Serialize)]
pub struct ApiModifyResponse {
    /// Always `"ok"`.
    pub status: &'static str,
    /// `added`, `modified` or `deleted`.
    pub action: &'static str,
    /// The affected API.
    pub api_id: String,
    /// Generation installed by the edit.
    pub generation: u64,
}

/// Build the API definition router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/tyk/apis", get(list_apis).post(add_api))
        .route("/tyk/apis/", get(list_apis).post(add_api))
        .route("/tyk/apis/:api_id", get(get_api).delete(delete_api))
}

async fn list_apis(State(state): State<AppState>) -> Json<Vec<ApiDefinition>> {
    Json(state.coordinator.snapshot().registry().definitions())
}

async fn get_api(
    State(state): State<AppState>,
    Path(api_id): Path<String>,
) -> Result<Json<ApiDefinition>, AppError> {
    let snapshot = state.coordinator.snapshot();
    let spec = snapshot
        .registry()
        .get(&api_id)
        .ok_or_else(|| AppError::NotFound(format!("API {api_id} not found")))?;
    Ok(Json(spec.definition().clone()))
}

async fn add_api(
    State(state): State<AppState>,
    body: Result<Json<ApiDefinition>, JsonRejection>,
) -> Result<Json<ApiModifyResponse>, AppError> {
    let mut definition = extract_json(body)?;
    definition.api_id = definition.api_id.trim().to_string();
    let api_id = definition.api_id.clone();

    let (dispatcher, action) = state
        .coordinator
        .update(move |defs| {
            let action = match defs.iter_mut().find(|d| d.api_id == definition.api_id) {
                Some(existing) => {
                    *existing = definition;
                    "modified"
                }
                None => {
                    defs.push(definition);
                    "added"
                }
            };
            Some(action)
        })?
        .ok_or_else(|| AppError::Internal("definition update was abandoned".into()))?;

    tracing::info!(api_id = %api_id, action, generation = dispatcher.generation(), "API definition stored");
    Ok(Json(ApiModifyResponse {
        status: "ok",
        action,
        api_id,
        generation: dispatcher.generation(),
    }))
}

async fn delete_api(
    State(state): State<AppState>,
    Path(api_id): Path<String>,
) -> Result<Json<ApiModifyResponse>, AppError> {
    let removed = state.coordinator.update(|defs| {
        let before = defs.len();
        defs.retain(|d| d.api_id != api_id);
        (defs.len() < before).then_some(())
    })?;
    let Some((dispatcher, ())) = removed else {
        return Err(AppError::NotFound(format!("API {api_id} not found")));
    };

    tracing::info!(api_id = %api_id, generation = dispatcher.generation(), "API definition removed");
    Ok(Json(ApiModifyResponse {
        status: "ok",
        action: "deleted",
        api_id,
        generation: dispatcher.generation(),
    }))
}
