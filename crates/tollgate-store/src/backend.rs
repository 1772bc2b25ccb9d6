//! # Storage Backend Capability
//!
//! The key-value contract shared by all backends, plus [`Namespace`] which
//! pins a backend to one key prefix.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::StorageError;

/// Key-value storage with atomic update primitives.
///
/// Implementations must be safe for concurrent use. `increment` and
/// `compare_and_swap` must be atomic at the backend, not just in process.
#[async_trait]
pub trait StorageBackend: Send + Sync + fmt::Debug {
    /// Read a value. Missing or expired keys yield [`StorageError::KeyNotFound`].
    async fn get(&self, key: &str) -> Result<String, StorageError>;

    /// Write a value, replacing any existing one. `ttl = None` stores it
    /// without expiry.
    async fn set(&self, key: &str, value: &str, ttl: Option<Duration>)
        -> Result<(), StorageError>;

    /// Remove a key. Missing keys yield [`StorageError::KeyNotFound`].
    async fn delete(&self, key: &str) -> Result<(), StorageError>;

    /// Add `delta` to an integer value (missing keys start at 0) and return
    /// the new value.
    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError>;

    /// Replace the value with `new` only if it currently equals `expected`.
    ///
    /// Returns whether the swap happened. A missing key never swaps.
    /// `ttl = None` keeps the key's existing expiry.
    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError>;

    /// Check that the backend is reachable.
    async fn ping(&self) -> Result<(), StorageError> {
        Ok(())
    }
}

/// A backend scoped to one key prefix.
#[derive(Clone)]
pub struct Namespace {
    backend: Arc<dyn StorageBackend>,
    prefix: String,
}

impl fmt::Debug for Namespace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Namespace")
            .field("prefix", &self.prefix)
            .field("backend", &self.backend)
            .finish()
    }
}

impl Namespace {
    /// Scope `backend` to keys starting with `prefix`.
    pub fn new(backend: Arc<dyn StorageBackend>, prefix: impl Into<String>) -> Self {
        Self {
            backend,
            prefix: prefix.into(),
        }
    }

    /// The key prefix.
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Full backend key for `key`.
    pub fn key(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }

    /// See [`StorageBackend::get`].
    pub async fn get(&self, key: &str) -> Result<String, StorageError> {
        self.backend.get(&self.key(key)).await
    }

    /// See [`StorageBackend::set`].
    pub async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.backend.set(&self.key(key), value, ttl).await
    }

    /// See [`StorageBackend::delete`].
    pub async fn delete(&self, key: &str) -> Result<(), StorageError> {
        self.backend.delete(&self.key(key)).await
    }

    /// See [`StorageBackend::increment`].
    pub async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
        self.backend.increment(&self.key(key), delta).await
    }

    /// See [`StorageBackend::compare_and_swap`].
    pub async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError> {
        self.backend
            .compare_and_swap(&self.key(key), expected, new, ttl)
            .await
    }

    /// See [`StorageBackend::ping`].
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.backend.ping().await
    }
}
