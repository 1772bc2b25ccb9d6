//! # Redis Backend
//!
//! [`StorageBackend`] over a shared Redis, so several gateway instances see
//! the same sessions and charge the same quotas.
//!
//! Uses a `ConnectionManager` (reconnects automatically; cloned per call).
//! Every call is bounded by the configured timeout and surfaces as
//! [`StorageError::Timeout`] when it elapses. Compare-and-swap runs as a Lua
//! script so the read-compare-write is atomic on the server.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, RedisError, RedisResult, Script};

use crate::backend::StorageBackend;
use crate::error::StorageError;

// KEYS[1] = key, ARGV[1] = expected, ARGV[2] = new, ARGV[3] = ttl in ms (0 keeps the TTL)
const CAS_SCRIPT: &str = r#"
local current = redis.call('GET', KEYS[1])
if current ~= ARGV[1] then
    return 0
end
if tonumber(ARGV[3]) > 0 then
    redis.call('SET', KEYS[1], ARGV[2], 'PX', ARGV[3])
else
    redis.call('SET', KEYS[1], ARGV[2], 'KEEPTTL')
end
return 1
"#;

/// Redis-backed storage.
#[derive(Clone)]
pub struct RedisBackend {
    conn: ConnectionManager,
    timeout: Duration,
    cas: Script,
}

impl fmt::Debug for RedisBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisBackend")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl RedisBackend {
    /// Connect to `url` (`redis://` or `rediss://`). The connection attempt
    /// is bounded by `timeout` as well.
    pub async fn connect(url: &str, timeout: Duration) -> Result<Self, StorageError> {
        let client = redis::Client::open(url).map_err(backend_error)?;
        let conn = bounded(timeout, ConnectionManager::new(client)).await?;
        tracing::info!(timeout_ms = timeout.as_millis() as u64, "connected to redis");
        Ok(Self {
            conn,
            timeout,
            cas: Script::new(CAS_SCRIPT),
        })
    }
}

fn backend_error(err: RedisError) -> StorageError {
    StorageError::Backend(err.to_string())
}

fn ttl_millis(ttl: Duration) -> u64 {
    // PX 0 is rejected by Redis.
    (ttl.as_millis() as u64).max(1)
}

async fn bounded<T, F>(timeout: Duration, fut: F) -> Result<T, StorageError>
where
    F: Future<Output = RedisResult<T>>,
{
    match tokio::time::timeout(timeout, fut).await {
        Ok(result) => result.map_err(backend_error),
        Err(_) => Err(StorageError::Timeout(timeout)),
    }
}

#[async_trait]
impl StorageBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<String, StorageError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = bounded(self.timeout, conn.get(key)).await?;
        value.ok_or(StorageError::KeyNotFound)
    }

    async fn set(
        &self,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        match ttl {
            Some(ttl) => {
                bounded::<(), _>(self.timeout, conn.pset_ex(key, value, ttl_millis(ttl))).await
            }
            None => bounded::<(), _>(self.timeout, conn.set(key, value)).await,
        }
    }

    async fn delete(&self, key: &str) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let removed: i64 = bounded(self.timeout, conn.del(key)).await?;
        if removed == 0 {
            return Err(StorageError::KeyNotFound);
        }
        Ok(())
    }

    async fn increment(&self, key: &str, delta: i64) -> Result<i64, StorageError> {
        let mut conn = self.conn.clone();
        bounded(self.timeout, conn.incr(key, delta)).await
    }

    async fn compare_and_swap(
        &self,
        key: &str,
        expected: &str,
        new: &str,
        ttl: Option<Duration>,
    ) -> Result<bool, StorageError> {
        let mut conn = self.conn.clone();
        let ttl_ms = ttl.map_or(0, ttl_millis);
        let mut invocation = self.cas.prepare_invoke();
        invocation.key(key).arg(expected).arg(new).arg(ttl_ms);
        let swapped: i64 = bounded(self.timeout, invocation.invoke_async(&mut conn)).await?;
        Ok(swapped == 1)
    }

    async fn ping(&self) -> Result<(), StorageError> {
        let mut conn = self.conn.clone();
        let _: String = bounded(self.timeout, redis::cmd("PING").query_async(&mut conn)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests require a running Redis instance:
    //   docker run -d -p 6379:6379 redis:7
    const URL: &str = "redis://127.0.0.1:6379";

    #[tokio::test]
    async fn bounded_surfaces_timeouts() {
        let slow = async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, RedisError>(())
        };
        let err = bounded(Duration::from_millis(10), slow).await.unwrap_err();
        assert_eq!(err, StorageError::Timeout(Duration::from_millis(10)));
    }

    #[test]
    fn ttl_is_never_zero() {
        assert_eq!(ttl_millis(Duration::ZERO), 1);
        assert_eq!(ttl_millis(Duration::from_secs(2)), 2_000);
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn round_trip_and_cas() {
        let store = RedisBackend::connect(URL, Duration::from_secs(2))
            .await
            .unwrap();
        let key = format!("tollgate-test-{}", uuid::Uuid::new_v4().simple());

        store.set(&key, "a", Some(Duration::from_secs(30))).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap(), "a");
        assert!(!store.compare_and_swap(&key, "x", "b", None).await.unwrap());
        assert!(store.compare_and_swap(&key, "a", "b", None).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), "b");

        store.delete(&key).await.unwrap();
        assert_eq!(store.get(&key).await.unwrap_err(), StorageError::KeyNotFound);
        assert_eq!(store.delete(&key).await.unwrap_err(), StorageError::KeyNotFound);
        store.ping().await.unwrap();
    }

    #[tokio::test]
    #[ignore] // Requires Redis
    async fn increment_is_atomic() {
        let store = RedisBackend::connect(URL, Duration::from_secs(2))
            .await
            .unwrap();
        let key = format!("tollgate-test-{}", uuid::Uuid::new_v4().simple());
        assert_eq!(store.increment(&key, 3).await.unwrap(), 3);
        assert_eq!(store.increment(&key, 4).await.unwrap(), 7);
        store.delete(&key).await.unwrap();
    }
}
