//! # Application State
//!
//! Shared state for the Axum application, passed to all route handlers
//! via the `State` extractor. Cloning is cheap: every field is a handle.
//!
//! - **Dispatcher generations** live in the [`ReloadCoordinator`].
//! - **Sessions** live in the [`SessionStore`]; nothing is cached here.
//! - **Upstream client** and **metrics** are shared by all requests.

use std::sync::Arc;

use tollgate_gateway::ReloadCoordinator;
use tollgate_store::{Namespace, SessionStore, StorageBackend};

use crate::bootstrap::BootstrapError;
use crate::config::GatewayConfig;
use crate::middleware::metrics::ApiMetrics;
use crate::proxy::UpstreamClient;

/// Shared application state.
#[derive(Debug, Clone)]
pub struct AppState {
    /// Effective configuration.
    pub config: Arc<GatewayConfig>,
    /// Session/key store.
    pub sessions: SessionStore,
    /// Active API definitions and routes.
    pub coordinator: Arc<ReloadCoordinator>,
    /// Client for upstream targets.
    pub upstream: UpstreamClient,
    /// Request counters.
    pub metrics: ApiMetrics,
}

impl AppState {
    /// Assemble state over `backend` with no APIs loaded.
    pub fn new(
        config: GatewayConfig,
        backend: Arc<dyn StorageBackend>,
    ) -> Result<Self, BootstrapError> {
        let namespace = Namespace::new(backend, config.storage.key_prefix.clone());
        let sessions = SessionStore::new(namespace, config.hash_keys);
        let upstream = UpstreamClient::new(config.upstream_timeout())
            .map_err(|e| BootstrapError::HttpClient(e.to_string()))?;
        Ok(Self {
            config: Arc::new(config),
            sessions,
            coordinator: Arc::new(ReloadCoordinator::new()),
            upstream,
            metrics: ApiMetrics::new(),
        })
    }
}
