//! # Request Middleware
//!
//! - [`metrics`] counts every request and its outcome.
//! - [`gate`] admits data-plane requests: version and path ACL, key
//!   validation, quota and rate charging.

pub mod gate;
pub mod metrics;
