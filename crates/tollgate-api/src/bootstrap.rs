//! # Gateway Bootstrap
//!
//! Builds [`AppState`] from a [`GatewayConfig`]:
//!
//! 1. **Connect storage**: in-memory, or Redis bounded by the storage timeout.
//! 2. **Assemble state**: session store, upstream client, empty generation.
//! 3. **Load definitions**: every `*.json` in `app_path`, installed as
//!    generation 1. A broken definition set aborts startup.
//! 4. **Warn** when the management API has no admin secret.

use std::path::Path;
use std::sync::Arc;

use tollgate_gateway::{load_definitions, Dispatcher, LoadError, RegistryError};
use tollgate_store::{InMemoryBackend, RedisBackend, StorageBackend, StorageError};

use crate::config::{GatewayConfig, StorageKind};
use crate::state::AppState;

/// Errors during bootstrap.
#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// The storage backend could not be reached.
    #[error("storage backend: {0}")]
    Storage(#[from] StorageError),

    /// Definition files could not be read.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The definition set is invalid.
    #[error("invalid API definitions: {0}")]
    Registry(#[from] RegistryError),

    /// The upstream HTTP client could not be built.
    #[error("upstream HTTP client: {0}")]
    HttpClient(String),
}

/// Failure of an on-demand reload from the definition directory.
#[derive(Debug, thiserror::Error)]
pub enum ReloadError {
    /// Definition files could not be read.
    #[error(transparent)]
    Load(#[from] LoadError),

    /// The definition set is invalid.
    #[error("invalid API definitions: {0}")]
    Registry(#[from] RegistryError),
}

/// Build the application state for `config`.
pub async fn bootstrap(config: GatewayConfig) -> Result<AppState, BootstrapError> {
    let backend: Arc<dyn StorageBackend> = match config.storage.backend {
        StorageKind::Memory => {
            tracing::info!("using in-memory session storage");
            Arc::new(InMemoryBackend::new())
        }
        StorageKind::Redis => Arc::new(
            RedisBackend::connect(&config.storage.redis_url, config.storage.timeout()).await?,
        ),
    };

    let state = AppState::new(config, backend)?;

    if let Some(dir) = state.config.app_path.as_deref() {
        let dispatcher = reload_from_dir(&state, dir).map_err(|e| match e {
            ReloadError::Load(e) => BootstrapError::Load(e),
            ReloadError::Registry(e) => BootstrapError::Registry(e),
        })?;
        tracing::info!(
            app_path = %dir.display(),
            apis = dispatcher.registry().len(),
            "loaded API definitions"
        );
    } else {
        tracing::info!("no app_path configured; starting with no APIs");
    }

    if state.config.secret.is_none() {
        tracing::warn!("no admin secret configured; management API is unauthenticated");
    }

    Ok(state)
}

/// Read every definition in `dir` and install it as a new generation.
pub fn reload_from_dir(state: &AppState, dir: &Path) -> Result<Arc<Dispatcher>, ReloadError> {
    let definitions = load_definitions(dir)?;
    Ok(state.coordinator.reload(definitions)?)
}
