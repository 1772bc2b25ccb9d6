//! # tollgate-store — Key and Session Storage
//!
//! Two layers:
//!
//! - [`StorageBackend`] is the key-value capability every backend provides:
//!   get/set/delete with optional TTL, atomic `increment` and atomic
//!   `compare_and_swap`. [`InMemoryBackend`] and [`RedisBackend`] implement
//!   it. A [`Namespace`] scopes a backend to one key prefix.
//!
//! - [`SessionStore`] stores [`tollgate_core::SessionState`] records as JSON
//!   and applies quota and rate charges through compare-and-swap retry loops,
//!   so concurrent requests on the same key never over-spend it, even across
//!   gateway instances sharing one Redis.
//!
//! Nothing is cached in process: every read goes to the backend.

pub mod backend;
pub mod error;
pub mod keys;
pub mod memory;
pub mod redis_store;
pub mod session;

pub use backend::{Namespace, StorageBackend};
pub use error::{SessionError, StorageError};
pub use keys::{generate_key, hash_token, storage_token};
pub use memory::InMemoryBackend;
pub use redis_store::RedisBackend;
pub use session::SessionStore;

/// Default key prefix for session records.
pub const DEFAULT_KEY_PREFIX: &str = "apikey-";
