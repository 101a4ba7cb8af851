//! Error types for local AI operations.

use ava_registry::RegistryError;
use thiserror::Error;

/// Errors that can occur while supervising model processes.
///
/// The stdio boundary logs these and carries on; callers holding a
/// [`ProcessSupervisor`](crate::ProcessSupervisor) directly get them back.
#[derive(Debug, Error)]
pub enum SupervisorError {
    /// The registry could not be read.
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// No model with this id in the registry.
    #[error("model '{0}' not found in model config")]
    ModelNotFound(String),

    /// The model is served remotely and has nothing to launch.
    #[error("model '{0}' is not a gguf model, nothing to launch")]
    NotLocalModel(String),

    /// The model has no weights path configured.
    #[error("model '{0}' has no gguf_path set")]
    WeightsPathMissing(String),

    /// llamafile was not located at startup.
    #[error("cannot launch model, llamafile executable not found")]
    RuntimeBinaryNotFound,

    /// Every port above the base port is taken.
    #[error("no free port left above {0}")]
    PortsExhausted(u16),

    /// The OS refused to start the process.
    #[error("failed to start llamafile: {0}")]
    SpawnFailed(#[source] std::io::Error),
}

/// Errors from the OpenAI-compatible chat client.
#[derive(Debug, Error)]
pub enum ChatError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Server returned an error response.
    #[error("API error: {0}")]
    Api(String),

    /// Server is not running or not reachable.
    #[error("model server not reachable at {0}")]
    ServerNotRunning(String),

    /// The response had no choices.
    #[error("no completion returned")]
    EmptyCompletion,
}
