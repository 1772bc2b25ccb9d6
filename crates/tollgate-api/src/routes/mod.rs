//! # Management API Routes
//!
//! - `apis`: list, fetch, add/replace and remove API definitions. Edits
//!   install a new dispatcher generation immediately.
//! - `keys`: create, inspect, update and revoke access keys.
//! - `reload`: rebuild the active generation from `app_path`.
//! - `health`: unauthenticated liveness/readiness probes and the
//!   admin-protected metrics endpoint.
//!
//! Every route lives under the reserved `/tyk` prefix, which API listen
//! paths may not use.

pub mod apis;
pub mod health;
pub mod keys;
pub mod reload;

