//! # API Definition Registry
//!
//! Validates a set of [`ApiDefinition`]s and compiles each into an
//! [`ApiSpec`]: normalised listen path, parsed target URL and compiled path
//! lists per version. Loading is all-or-nothing; one invalid definition
//! rejects the whole set.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use thiserror::Error;
use tollgate_core::{ApiDefinition, PathLists, VersionExpiry};
use url::Url;

use crate::matcher::{segments, PathPattern};

/// Listen paths under this prefix belong to the management API.
pub const RESERVED_PREFIX: &str = "/tyk";

/// Why a definition set was rejected.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// A definition has a blank `api_id`.
    #[error("API definition '{name}' has an empty api_id")]
    EmptyApiId {
        /// The definition's display name.
        name: String,
    },

    /// Two definitions share an `api_id`.
    #[error("duplicate api_id '{0}'")]
    DuplicateApiId(String),

    /// The listen path cannot be used.
    #[error("API {api_id}: invalid listen path '{listen_path}': {reason}")]
    InvalidListenPath {
        /// Offending API.
        api_id: String,
        /// Listen path as written.
        listen_path: String,
        /// What is wrong with it.
        reason: &'static str,
    },

    /// The listen path falls under [`RESERVED_PREFIX`].
    #[error("API {api_id}: listen path '{listen_path}' is reserved for the management API")]
    ReservedListenPath {
        /// Offending API.
        api_id: String,
        /// Normalised listen path.
        listen_path: String,
    },

    /// Two definitions normalise to the same listen path.
    #[error("APIs {first} and {second} both listen on '{listen_path}'")]
    DuplicateListenPath {
        /// Normalised listen path.
        listen_path: String,
        /// API that claimed it first.
        first: String,
        /// API that claimed it again.
        second: String,
    },

    /// The target is not an absolute http(s) URL.
    #[error("API {api_id}: invalid target URL '{target}': {reason}")]
    InvalidTarget {
        /// Offending API.
        api_id: String,
        /// Target as written.
        target: String,
        /// What is wrong with it.
        reason: String,
    },

    /// The version table is empty.
    #[error("API {api_id} defines no versions")]
    NoVersions {
        /// Offending API.
        api_id: String,
    },

    /// A path list contains a blank pattern.
    #[error("API {api_id}, version '{version}': empty path pattern")]
    EmptyPattern {
        /// Offending API.
        api_id: String,
        /// Version holding the pattern.
        version: String,
    },
}

/// Path lists and expiry of one version, ready for evaluation.
#[derive(Debug, Clone)]
pub struct CompiledVersion {
    /// When the version stops serving.
    pub expires: VersionExpiry,
    /// Paths bypassing key validation.
    pub ignored: Vec<PathPattern>,
    /// Only-allowed paths (when non-empty).
    pub white_list: Vec<PathPattern>,
    /// Always-denied paths.
    pub black_list: Vec<PathPattern>,
}

/// A validated, compiled API definition.
#[derive(Debug, Clone)]
pub struct ApiSpec {
    definition: ApiDefinition,
    listen_path: String,
    target: Url,
    versions: BTreeMap<String, CompiledVersion>,
}

impl ApiSpec {
    /// Validate and compile a single definition.
    pub fn compile(mut definition: ApiDefinition) -> Result<Self, RegistryError> {
        let api_id = definition.api_id.trim().to_string();
        if api_id.is_empty() {
            return Err(RegistryError::EmptyApiId {
                name: definition.name.clone(),
            });
        }
        // Registered, compared and served under the trimmed id.
        definition.api_id.clone_from(&api_id);
        let api_id = api_id.as_str();

        let listen_path = normalize_listen_path(api_id, &definition.proxy.listen_path)?;
        let target = parse_target(api_id, &definition.proxy.target_url)?;

        if definition.version_data.versions.is_empty() {
            return Err(RegistryError::NoVersions {
                api_id: api_id.to_string(),
            });
        }
        let mut versions = BTreeMap::new();
        for (name, info) in &definition.version_data.versions {
            let compiled = compile_version(api_id, name, info.expires, &info.paths)?;
            versions.insert(name.clone(), compiled);
        }

        Ok(Self {
            definition,
            listen_path,
            target,
            versions,
        })
    }

    /// The definition this spec was compiled from.
    pub fn definition(&self) -> &ApiDefinition {
        &self.definition
    }

    /// The API id.
    pub fn api_id(&self) -> &str {
        &self.definition.api_id
    }

    /// Normalised listen path.
    pub fn listen_path(&self) -> &str {
        &self.listen_path
    }

    /// Upstream base URL.
    pub fn target(&self) -> &Url {
        &self.target
    }

    /// A compiled version by name.
    pub fn version(&self, name: &str) -> Option<&CompiledVersion> {
        self.versions.get(name)
    }

    /// See [`ApiDefinition::default_version`].
    pub fn default_version(&self) -> Option<&str> {
        self.definition.default_version()
    }
}

/// All compiled APIs of one generation.
#[derive(Debug, Clone, Default)]
pub struct ApiRegistry {
    specs: Vec<Arc<ApiSpec>>,
    by_id: HashMap<String, usize>,
}

impl ApiRegistry {
    /// Validate and compile `definitions`. Order is preserved.
    pub fn load(definitions: Vec<ApiDefinition>) -> Result<Self, RegistryError> {
        let mut specs: Vec<Arc<ApiSpec>> = Vec::with_capacity(definitions.len());
        let mut by_id = HashMap::new();
        let mut by_listen_path: HashMap<String, String> = HashMap::new();

        for definition in definitions {
            let spec = ApiSpec::compile(definition)?;
            let api_id = spec.api_id().to_string();
            if by_id.contains_key(&api_id) {
                return Err(RegistryError::DuplicateApiId(api_id));
            }
            if let Some(first) = by_listen_path.get(spec.listen_path()) {
                return Err(RegistryError::DuplicateListenPath {
                    listen_path: spec.listen_path().to_string(),
                    first: first.clone(),
                    second: api_id,
                });
            }
            by_listen_path.insert(spec.listen_path().to_string(), api_id.clone());
            by_id.insert(api_id, specs.len());
            specs.push(Arc::new(spec));
        }

        Ok(Self { specs, by_id })
    }

    /// Spec by API id.
    pub fn get(&self, api_id: &str) -> Option<&Arc<ApiSpec>> {
        self.by_id.get(api_id).map(|&i| &self.specs[i])
    }

    /// Whether an API with this id is loaded.
    pub fn contains(&self, api_id: &str) -> bool {
        self.by_id.contains_key(api_id)
    }

    /// All specs in load order.
    pub fn specs(&self) -> &[Arc<ApiSpec>] {
        &self.specs
    }

    /// The source definitions in load order.
    pub fn definitions(&self) -> Vec<ApiDefinition> {
        self.specs.iter().map(|s| s.definition().clone()).collect()
    }

    /// Number of loaded APIs.
    pub fn len(&self) -> usize {
        self.specs.len()
    }

    /// Whether no APIs are loaded.
    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }
}

/// Normalise a listen path: leading `/`, no empty segments, no trailing `/`
/// except for the root.
pub fn normalize_listen_path(api_id: &str, raw: &str) -> Result<String, RegistryError> {
    let invalid = |reason| RegistryError::InvalidListenPath {
        api_id: api_id.to_string(),
        listen_path: raw.to_string(),
        reason,
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(invalid("listen path is empty"));
    }
    if trimmed.contains(['?', '#', '*']) || trimmed.chars().any(char::is_whitespace) {
        return Err(invalid("listen path may not contain '?', '#', '*' or whitespace"));
    }

    let parts: Vec<&str> = segments(trimmed).collect();
    let normalized = format!("/{}", parts.join("/"));
    if parts.first() == Some(&RESERVED_PREFIX.trim_start_matches('/')) {
        return Err(RegistryError::ReservedListenPath {
            api_id: api_id.to_string(),
            listen_path: normalized,
        });
    }
    Ok(normalized)
}

fn parse_target(api_id: &str, raw: &str) -> Result<Url, RegistryError> {
    let invalid = |reason: String| RegistryError::InvalidTarget {
        api_id: api_id.to_string(),
        target: raw.to_string(),
        reason,
    };
    let url = Url::parse(raw.trim()).map_err(|e| invalid(e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(invalid(format!("unsupported scheme '{}'", url.scheme())));
    }
    if url.host_str().is_none() {
        return Err(invalid("missing host".to_string()));
    }
    Ok(url)
}

fn compile_version(
    api_id: &str,
    version: &str,
    expires: VersionExpiry,
    paths: &PathLists,
) -> Result<CompiledVersion, RegistryError> {
    let compile = |list: &[String]| -> Result<Vec<PathPattern>, RegistryError> {
        list.iter()
            .map(|raw| {
                PathPattern::parse(raw).ok_or_else(|| RegistryError::EmptyPattern {
                    api_id: api_id.to_string(),
                    version: version.to_string(),
                })
            })
            .collect()
    };
    Ok(CompiledVersion {
        expires,
        ignored: compile(&paths.ignored)?,
        white_list: compile(&paths.white_list)?,
        black_list: compile(&paths.black_list)?,
    })
}
