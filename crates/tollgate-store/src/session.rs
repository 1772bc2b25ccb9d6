//! # Session Store
//!
//! Sole owner of session mutation. Records are stored as JSON under
//! `<prefix><token>` (or `<prefix><sha256(token)>` with key hashing on).
//!
//! Quota and rate charges are read-modify-write cycles committed with
//! `compare_and_swap`: read the raw record, apply the pure charge from
//! [`SessionState`], swap only if the record is still byte-identical, retry
//! otherwise. A charge that loses every race fails closed with
//! [`StorageError::Contention`].

use std::time::Duration;

use tollgate_core::{ChargeOutcome, ChargeRejection, SessionState};

use crate::backend::Namespace;
use crate::error::{SessionError, StorageError};
use crate::keys::storage_token;

/// Upper bound on compare-and-swap attempts per mutation.
pub const MAX_CAS_ATTEMPTS: usize = 128;

/// Session records on top of a namespaced backend.
#[derive(Debug, Clone)]
pub struct SessionStore {
    ns: Namespace,
    hash_keys: bool,
}

impl SessionStore {
    /// Store sessions in `ns`, hashing tokens when `hash_keys` is set.
    pub fn new(ns: Namespace, hash_keys: bool) -> Self {
        Self { ns, hash_keys }
    }

    /// Whether tokens are hashed before storage.
    pub fn hash_keys(&self) -> bool {
        self.hash_keys
    }

    /// Check that the backend is reachable.
    pub async fn ping(&self) -> Result<(), StorageError> {
        self.ns.ping().await
    }

    /// Load the session for `token`.
    pub async fn get_session(&self, token: &str) -> Result<SessionState, SessionError> {
        let raw = self.read_raw(&self.stored(token)).await?;
        decode(&raw)
    }

    /// Create or overwrite the session for `token`. The record expires with
    /// the session when `expires` lies in the future.
    pub async fn set_session(
        &self,
        token: &str,
        state: &SessionState,
        now: i64,
    ) -> Result<(), SessionError> {
        let payload = encode(state)?;
        self.ns
            .set(&self.stored(token), &payload, ttl_for(state, now))
            .await?;
        Ok(())
    }

    /// Remove the session for `token`.
    pub async fn delete_session(&self, token: &str) -> Result<(), SessionError> {
        self.ns
            .delete(&self.stored(token))
            .await
            .map_err(not_found)
    }

    /// Charge `cost` requests against the quota only. Returns the remaining
    /// quota, or `None` when the key has no quota.
    pub async fn update_quota(
        &self,
        token: &str,
        cost: u32,
        now: i64,
    ) -> Result<Option<i64>, SessionError> {
        self.mutate(token, |s| s.quota_charged(now, cost)).await
    }

    /// Consume one rate-limit token only. Returns the tokens left, or
    /// `None` when the key is not rate limited.
    pub async fn check_rate_limit(
        &self,
        token: &str,
        now: i64,
    ) -> Result<Option<f64>, SessionError> {
        self.mutate(token, |s| s.rate_token_consumed(now)).await
    }

    /// Charge one request against quota and rate limit in a single commit.
    pub async fn charge(&self, token: &str, now: i64) -> Result<ChargeOutcome, SessionError> {
        self.mutate(token, |s| s.charged(now)).await
    }

    fn stored(&self, token: &str) -> String {
        storage_token(token, self.hash_keys)
    }

    async fn read_raw(&self, key: &str) -> Result<String, SessionError> {
        self.ns.get(key).await.map_err(not_found)
    }

    async fn mutate<R, F>(&self, token: &str, apply: F) -> Result<R, SessionError>
    where
        F: Fn(&SessionState) -> Result<(SessionState, R), ChargeRejection>,
    {
        let key = self.stored(token);
        for attempt in 1..=MAX_CAS_ATTEMPTS {
            let raw = self.read_raw(&key).await?;
            let current = decode(&raw)?;
            let (next, result) = apply(&current)?;
            let payload = encode(&next)?;
            if self.ns.compare_and_swap(&key, &raw, &payload, None).await? {
                if attempt > 1 {
                    tracing::debug!(attempt, "session update committed after contention");
                }
                return Ok(result);
            }
        }
        tracing::warn!(
            attempts = MAX_CAS_ATTEMPTS,
            "session update abandoned under contention"
        );
        Err(StorageError::Contention {
            attempts: MAX_CAS_ATTEMPTS,
        }
        .into())
    }
}

fn not_found(err: StorageError) -> SessionError {
    match err {
        StorageError::KeyNotFound => SessionError::NotFound,
        other => SessionError::Storage(other),
    }
}

fn decode(raw: &str) -> Result<SessionState, SessionError> {
    serde_json::from_str(raw).map_err(|e| SessionError::Corrupt(e.to_string()))
}

fn encode(state: &SessionState) -> Result<String, SessionError> {
    serde_json::to_string(state).map_err(|e| SessionError::Encode(e.to_string()))
}

fn ttl_for(state: &SessionState, now: i64) -> Option<Duration> {
    (state.expires > now).then(|| Duration::from_secs((state.expires - now) as u64))
}
