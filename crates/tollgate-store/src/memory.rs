//! # In-Memory Backend
//!
//! A process-local [`StorageBackend`] used for single-instance deployments
//! and tests.
//!
//! All operations are synchronous under a `parking_lot::RwLock`; the lock is
//! never held across `.await`. Expired entries are treated as absent on read
//! and pruned on the next write that touches them.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::backend::StorageBackend;
use crate::error::StorageError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<Instant>,
}

impl Entry {
    fn new(value: &str, ttl: Option<Duration>) -> Self {
        Self {
            value: value.to_string(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |at| at > now)
    }
}

/// Thread-safe in-memory key-value store with lazy TTL expiry.
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    entries: RwLock<HashMap<String, Entry>>,
}

impl InMemoryBackend {
    /// Create an empty backend.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live entries.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries.read().values().filter(|e| e.is_live(now)).count()
    }

    /// Whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl StorageBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<String, StorageError> {
        let guard = self.entries.read();
        match guard.get(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(entry.value.clone()),
            _ => Err(StorageError::KeyNotFound),
        }
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        self.entries
            .write()
            .insert(key.to_string(), Entry::new(value, ttl));
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        match self.entries.write().remove(key) {
            Some(entry) if entry.is_live(Instant::now()) => Ok(()),
            _ => Err(StorageError::KeyNotFound),
        }
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
        let now = Instant::now();
        let mut guard = self.entries.write();
        let (current, expires_at) = match guard.get(key) {
            Some(entry) if entry.is_live(now) => {
                let current = entry.value.parse::<i64>().map_err(|_| {
                    StorageError::Backend(format!("value at {key} is not an integer"))
                })?;
                (current, entry.expires_at)
            }
            _ => (0, None),
        };
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StorageError::Backend(format!("increment overflow at {key}")))?;
        guard.insert(
            key.to_string(),
            Entry {
                value: next.to_string(),
                expires_at,
            },
        );
        Ok(next)
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError> {
        let now = Instant::now();
        let mut guard = self.entries.write();
        let Some(entry) = guard.get_mut(key) else {
            return Ok(false);
        };
        if !entry.is_live(now) {
            guard.remove(key);
            return Ok(false);
        }
        if entry.value != expected {
            return Ok(false);
        }
        entry.value = new.to_string();
        if let Some(ttl) = ttl {
            entry.expires_at = Some(now + ttl);
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = InMemoryBackend::new();
        store.set("k", "v", None).await.unwrap();
        assert_eq!(store.get("k").await.unwrap(), "v");
        store.delete("k").await.unwrap();
        assert_eq!(store.get("k").await.unwrap_err(), StorageError::KeyNotFound);
        assert_eq!(
            store.delete("k").await.unwrap_err(),
            StorageError::KeyNotFound
        );
    }

    #[tokio::test]
    async fn expired_entries_are_absent() {
        let store = InMemoryBackend::new();
        store
            .set("short", "v", Some(Duration::from_millis(20)))
            .await
            .unwrap();
        store.set("long", "v", None).await.unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;

        assert_eq!(
            store.get("short").await.unwrap_err(),
            StorageError::KeyNotFound
        );
        assert_eq!(store.len(), 1);
        assert!(!store
            .compare_and_swap("short", "v", "w", None)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn increment_starts_at_zero() {
        let store = InMemoryBackend::new();
        assert_eq!(store.increment("n", 5).await.unwrap(), 5);
        assert_eq!(store.increment("n", -2).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn increment_rejects_non_integers() {
        let store = InMemoryBackend::new();
        store.set("n", "abc", None).await.unwrap();
        assert!(matches!(
            store.increment("n", 1).await,
            Err(StorageError::Backend(_))
        ));
    }

    #[tokio::test]
    async fn compare_and_swap_requires_expected_value() {
        let store = InMemoryBackend::new();
        assert!(!store.compare_and_swap("k", "a", "b", None).await.unwrap());

        store.set("k", "a", None).await.unwrap();
        assert!(!store.compare_and_swap("k", "x", "b", None).await.unwrap());
        assert!(store.compare_and_swap("k", "a", "b", None).await.unwrap());
        assert_eq!(store.get("k").await.unwrap(), "b");
    }

    #[tokio::test]
    async fn compare_and_swap_keeps_ttl_when_none_given() {
        let store = InMemoryBackend::new();
        store
            .set("k", "a", Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(store.compare_and_swap("k", "a", "b", None).await.unwrap());
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(store.get("k").await.unwrap_err(), StorageError::KeyNotFound);
    }
}
