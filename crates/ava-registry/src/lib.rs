//! Model registry for Ava.
//!
//! The registry is a user-editable JSON file listing every model the app
//! knows about. It is read fresh on every request and never written by Ava.
//!
//! ```json
//! {
//!   "models": [
//!     { "id": "m1", "name": "Mistral 7B", "type": "gguf",
//!       "gguf_path": "/models/mistral.gguf", "gguf_options": ["-ngl", "35"] }
//!   ]
//! }
//! ```

mod error;
mod model;
pub mod paths;
mod registry;

pub use error::RegistryError;
pub use model::{ModelAvailability, ModelConfigFile, ModelDescriptor, ModelKind};
pub use registry::read_registry;

/// Filename of the registry inside the user's documents directory.
pub const REGISTRY_FILENAME: &str = "ava-model-config.json";

/// Environment variable overriding the registry location.
pub const REGISTRY_PATH_ENV: &str = "AVA_MODEL_CONFIG";

/// Environment variable overriding the runtime binary location.
pub const LLAMAFILE_PATH_ENV: &str = "AVA_LLAMAFILE";
