//! # Gateway Configuration
//!
//! Loaded from an optional JSON file, then overridden by `TOLLGATE_*`
//! environment variables. Every field has a default, so an empty file (or no
//! file) yields a working in-memory gateway on port 8080.
//!
//! | Variable              | Field                 |
//! |-----------------------|-----------------------|
//! | `TOLLGATE_PORT`       | `listen_port`         |
//! | `TOLLGATE_SECRET`     | `secret`              |
//! | `TOLLGATE_APP_PATH`   | `app_path`            |
//! | `TOLLGATE_STORAGE`    | `storage.backend`     |
//! | `TOLLGATE_REDIS_URL`  | `storage.redis_url`   |
//! | `TOLLGATE_HASH_KEYS`  | `hash_keys`           |

use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use tollgate_store::DEFAULT_KEY_PREFIX;

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file could not be read.
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Config file path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The config file is not valid JSON for [`GatewayConfig`].
    #[error("invalid config file {path}: {source}")]
    Parse {
        /// Config file path.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },

    /// An environment override has an unusable value.
    #[error("invalid value '{value}' for {var}: expected {expected}")]
    InvalidEnv {
        /// Variable name.
        var: &'static str,
        /// Value found.
        value: String,
        /// What was expected.
        expected: &'static str,
    },
}

/// Which key-value backend holds sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    /// Process-local; sessions are lost on restart.
    #[default]
    Memory,
    /// Shared Redis.
    Redis,
}

/// Session storage settings.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Backend kind.
    pub backend: StorageKind,
    /// Redis connection URL (`redis://` or `rediss://`).
    pub redis_url: String,
    /// Prefix of session keys.
    pub key_prefix: String,
    /// Bound on every storage call, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageKind::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
            timeout_ms: 500,
        }
    }
}

impl StorageConfig {
    /// Storage call timeout.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Gateway configuration.
///
/// Custom `Debug` redacts the admin secret.
#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Port to bind the HTTP server to.
    pub listen_port: u16,
    /// Admin secret for the management API. `None` disables management auth.
    pub secret: Option<String>,
    /// Directory of API definition files.
    pub app_path: Option<PathBuf>,
    /// Store SHA-256 digests of keys instead of the keys themselves.
    pub hash_keys: bool,
    /// Upstream request timeout in seconds.
    pub upstream_timeout_secs: u64,
    /// Largest request body forwarded upstream.
    pub max_body_bytes: usize,
    /// Session storage.
    pub storage: StorageConfig,
}

impl fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("listen_port", &self.listen_port)
            .field("secret", &self.secret.as_ref().map(|_| "[REDACTED]"))
            .field("app_path", &self.app_path)
            .field("hash_keys", &self.hash_keys)
            .field("upstream_timeout_secs", &self.upstream_timeout_secs)
            .field("max_body_bytes", &self.max_body_bytes)
            .field("storage", &self.storage)
            .finish()
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            listen_port: 8080,
            secret: None,
            app_path: None,
            hash_keys: false,
            upstream_timeout_secs: 30,
            max_body_bytes: 10 * 1024 * 1024,
            storage: StorageConfig::default(),
        }
    }
}

impl GatewayConfig {
    /// Load from `path` (when given) and apply process environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let base = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        base.with_env_overrides(|var| std::env::var(var).ok())
    }

    /// Parse a JSON config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply `TOLLGATE_*` overrides read through `lookup`.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup("TOLLGATE_PORT") {
            self.listen_port = value.parse().map_err(|_| ConfigError::InvalidEnv {
                var: "TOLLGATE_PORT",
                value,
                expected: "a port number",
            })?;
        }
        if let Some(value) = lookup("TOLLGATE_SECRET") {
            self.secret = (!value.is_empty()).then_some(value);
        }
        if let Some(value) = lookup("TOLLGATE_APP_PATH") {
            self.app_path = (!value.is_empty()).then(|| PathBuf::from(value));
        }
        if let Some(value) = lookup("TOLLGATE_STORAGE") {
            self.storage.backend = match value.to_ascii_lowercase().as_str() {
                "memory" => StorageKind::Memory,
                "redis" => StorageKind::Redis,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "TOLLGATE_STORAGE",
                        value,
                        expected: "'memory' or 'redis'",
                    })
                }
            };
        }
        if let Some(value) = lookup("TOLLGATE_REDIS_URL") {
            self.storage.redis_url = value;
        }
        if let Some(value) = lookup("TOLLGATE_HASH_KEYS") {
            self.hash_keys = match value.to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" => true,
                "0" | "false" | "no" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "TOLLGATE_HASH_KEYS",
                        value,
                        expected: "a boolean",
                    })
                }
            };
        }
        Ok(self)
    }

    /// Upstream request timeout.
    pub fn upstream_timeout(&self) -> Duration {
        Duration::from_secs(self.upstream_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |var| map.get(var).cloned()
    }

    #[test]
    fn defaults() {
        let config = GatewayConfig::default();
        assert_eq!(config.listen_port, 8080);
        assert_eq!(config.storage.backend, StorageKind::Memory);
        assert_eq!(config.storage.key_prefix, "apikey-");
        assert_eq!(config.storage.timeout(), Duration::from_millis(500));
        assert_eq!(config.upstream_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tollgate.json");
        std::fs::write(
            &path,
            r#"{ "listen_port": 9000, "secret": "352d20ee67be67f6340b4c0605b044b7", "storage": { "backend": "redis" } }"#,
        )
        .unwrap();

        let config = GatewayConfig::from_file(&path).unwrap();
        assert_eq!(config.listen_port, 9000);
        assert_eq!(config.storage.backend, StorageKind::Redis);
        assert_eq!(config.storage.key_prefix, "apikey-");
        assert_eq!(config.max_body_bytes, 10 * 1024 * 1024);
    }

    #[test]
    fn bad_file_is_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tollgate.json");
        std::fs::write(&path, "{ listen_port").unwrap();
        assert!(matches!(
            GatewayConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn env_overrides_apply() {
        let config = GatewayConfig::default()
            .with_env_overrides(env(&[
                ("TOLLGATE_PORT", "7070"),
                ("TOLLGATE_SECRET", "s3cret"),
                ("TOLLGATE_APP_PATH", "/etc/tollgate/apps"),
                ("TOLLGATE_STORAGE", "Redis"),
                ("TOLLGATE_REDIS_URL", "redis://cache:6379"),
                ("TOLLGATE_HASH_KEYS", "true"),
            ]))
            .unwrap();
        assert_eq!(config.listen_port, 7070);
        assert_eq!(config.secret.as_deref(), Some("s3cret"));
        assert_eq!(config.app_path, Some(PathBuf::from("/etc/tollgate/apps")));
        assert_eq!(config.storage.backend, StorageKind::Redis);
        assert_eq!(config.storage.redis_url, "redis://cache:6379");
        assert!(config.hash_keys);
    }

    #[test]
    fn invalid_env_values_are_rejected() {
        let err = GatewayConfig::default()
            .with_env_overrides(env(&[("TOLLGATE_PORT", "eighty")]))
            .unwrap_err();
        assert!(err.to_string().contains("TOLLGATE_PORT"));

        assert!(GatewayConfig::default()
            .with_env_overrides(env(&[("TOLLGATE_STORAGE", "etcd")]))
            .is_err());
    }

    #[test]
    fn debug_redacts_secret() {
        let config = GatewayConfig {
            secret: Some("super-secret".into()),
            ..GatewayConfig::default()
        };
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
