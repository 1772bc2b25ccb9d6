//! Definition directory loader.
//!
//! Every `*.json` file in the application directory holds one
//! [`ApiDefinition`]. Files are read in name order so the load order (and
//! therefore error reporting) is deterministic.

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tollgate_core::ApiDefinition;

/// Failure reading definition files.
#[derive(Error, Debug)]
pub enum LoadError {
    /// The directory or a file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        /// Path being read.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A file is not a valid API definition.
    #[error("invalid API definition in {path}: {source}")]
    Parse {
        /// File being parsed.
        path: PathBuf,
        /// Underlying JSON error.
        source: serde_json::Error,
    },
}

/// Read every `*.json` definition in `dir`.
pub fn load_definitions(dir: &Path) -> Result<Vec<ApiDefinition>, LoadError> {
    let io_error = |path: &Path| {
        let path = path.to_path_buf();
        move |source| LoadError::Io { path, source }
    };

    let mut files = Vec::new();
    for entry in fs::read_dir(dir).map_err(io_error(dir))? {
        let path = entry.map_err(io_error(dir))?.path();
        if path.is_file() && path.extension().is_some_and(|ext| ext == "json") {
            files.push(path);
        }
    }
    files.sort();

    let mut definitions = Vec::with_capacity(files.len());
    for path in files {
        let raw = fs::read_to_string(&path).map_err(io_error(&path))?;
        let definition: ApiDefinition =
            serde_json::from_str(&raw).map_err(|source| LoadError::Parse {
                path: path.clone(),
                source,
            })?;
        tracing::debug!(path = %path.display(), "read API definition");
        definitions.push(definition);
    }
    Ok(definitions)
}
