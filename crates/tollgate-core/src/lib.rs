#![deny(missing_docs)]

//! # tollgate-core — Shared Types for the Tollgate Gateway
//!
//! This crate defines the data model every other crate in the workspace
//! depends on. It has no internal crate dependencies, only `serde`,
//! `serde_json`, `thiserror` and `chrono` from the external ecosystem.
//!
//! ## Contents
//!
//! 1. **[`ApiDefinition`]**: one managed upstream: listen path, target,
//!    auth header, version table and per-version path lists. Deserializes the
//!    JSON definition files operators already write.
//!
//! 2. **[`SessionState`]**: the record behind an access key: expiry,
//!    per-API access rights, token-bucket rate limit and fixed-window quota.
//!    Quota and rate arithmetic is pure (see [`SessionState::charged`]) so the
//!    storage layer can apply it inside a compare-and-swap loop.
//!
//! 3. **[`GatewayError`]**: the per-request error taxonomy. Every way a
//!    request can be refused maps to exactly one variant.

pub mod definition;
pub mod error;
pub mod session;

// Re-export primary types at crate root for ergonomic imports.
pub use definition::{
    ApiDefinition, AuthSettings, PathLists, ProxySettings, VersionData, VersionExpiry,
    VersionInfo, VersionLocation, VersionLocator, DEFAULT_VERSION,
};
pub use error::GatewayError;
pub use session::{AccessDefinition, ChargeOutcome, ChargeRejection, SessionState};
