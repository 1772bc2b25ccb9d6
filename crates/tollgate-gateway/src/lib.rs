//! # tollgate-gateway — Request Dispatch
//!
//! Everything between "a request arrived" and "this key must now be
//! checked" that does not touch storage:
//!
//! - [`registry`] validates [`ApiDefinition`](tollgate_core::ApiDefinition)s
//!   and compiles their path lists.
//! - [`table`] selects the API for a request path (longest listen path wins).
//! - [`acl`] resolves the requested version and evaluates the path lists.
//! - [`reload`] publishes immutable [`Dispatcher`] generations behind an
//!   `ArcSwap`, so reloads never disturb in-flight requests.
//! - [`loader`] reads definition files from a directory.
//!
//! The crate is synchronous; the HTTP layer lives in `tollgate-api`.

pub mod acl;
pub mod loader;
pub mod matcher;
pub mod registry;
pub mod reload;
pub mod table;

pub use acl::{evaluate, resolve_version, AclDecision, DenialReason};
pub use loader::{load_definitions, LoadError};
pub use matcher::PathPattern;
pub use registry::{ApiRegistry, ApiSpec, CompiledVersion, RegistryError, RESERVED_PREFIX};
pub use reload::{Dispatcher, ReloadCoordinator};
pub use table::{normalize_request_path, RouteMatch, RouteTable};
