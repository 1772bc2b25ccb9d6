//! # tollgate-api — Axum HTTP Surface for the Tollgate Gateway
//!
//! One listener serves both planes:
//!
//! | Prefix                 | Module                  | Plane                    |
//! |------------------------|-------------------------|--------------------------|
//! | `/tyk/apis/*`          | [`routes::apis`]        | Management (admin)       |
//! | `/tyk/keys/*`          | [`routes::keys`]        | Management (admin)       |
//! | `/tyk/reload/`         | [`routes::reload`]      | Management (admin)       |
//! | `/tyk/metrics`         | [`routes::health`]      | Management (admin)       |
//! | `/tyk/health/*`        | [`routes::health`]      | Probes (unauthenticated) |
//! | anything else          | [`proxy`]               | Data plane               |
//!
//! ## Middleware Stack (execution order)
//!
//! ```text
//! TraceLayer → MetricsMiddleware → AdminAuth (management only) → Handler
//! ```
//!
//! Data-plane requests never pass the admin check; they are gated per API
//! by [`middleware::gate`] inside the proxy handler.

pub mod auth;
pub mod bootstrap;
pub mod config;
pub mod error;
pub mod extractors;
pub mod middleware;
pub mod proxy;
pub mod routes;
pub mod state;

use axum::middleware::from_fn;
use axum::routing::get;
use axum::Router;
use tower_http::trace::TraceLayer;

use crate::auth::{AdminAuth, AdminSecret};
use crate::state::AppState;

/// Assemble the full application router with all routes and middleware.
pub fn app(state: AppState) -> Router {
    let admin = AdminAuth {
        secret: state.config.secret.clone().map(AdminSecret::new),
    };

    // Admin-protected management routes. `route_layer` keeps the check off
    // the data-plane fallback.
    let management = Router::new()
        .merge(routes::apis::router())
        .merge(routes::keys::router())
        .merge(routes::reload::router())
        .route("/tyk/metrics", get(routes::health::metrics))
        .route_layer(from_fn(auth::admin_auth_middleware))
        .route_layer(axum::Extension(admin));

    let health = Router::new()
        .route("/tyk/health/liveness", get(routes::health::liveness))
        .route("/tyk/health/readiness", get(routes::health::readiness));

    Router::new()
        .merge(health)
        .merge(management)
        .fallback(proxy::handle)
        .layer(from_fn(middleware::metrics::metrics_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(axum::Extension(state.metrics.clone()))
        .with_state(state)
}
