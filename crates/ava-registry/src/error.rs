//! Error types for registry operations.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading the model registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The registry file exists but could not be read.
    #[error("failed to read model config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The registry file is not valid JSON or its `models` is not a list.
    #[error("failed to parse model config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}
