//! Model descriptors as stored in the registry file.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// How a model is served.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelKind {
    /// Local GGUF weights launched through the llamafile runtime.
    #[serde(rename = "gguf")]
    LocalWeights,
    /// Hosted OpenAI-compatible API; nothing to launch.
    #[serde(rename = "api")]
    RemoteApi,
}

/// A single model entry in the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDescriptor {
    /// Unique identifier (primary key).
    pub id: String,
    /// Display name.
    pub name: String,
    /// Serving kind.
    #[serde(rename = "type")]
    pub kind: ModelKind,
    /// Path to the GGUF weights, present for local models.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_path: Option<PathBuf>,
    /// Extra runtime flags, appended verbatim after the built-in arguments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub gguf_options: Vec<String>,
    /// Advisory memory requirement shown to the user.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gguf_required_memory_gb: Option<f64>,
    /// Model id on the remote API.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_model_id: Option<String>,
    /// Remote API key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Remote API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_endpoint: Option<String>,
}

/// Whether a model can be used right now, as shown in the model picker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelAvailability {
    #[serde(rename = "notInstalled")]
    NotInstalled,
    #[serde(rename = "available")]
    Available,
    #[serde(rename = "needAPIKey")]
    NeedApiKey,
    #[serde(rename = "APIKeyInstalled")]
    ApiKeyInstalled,
}

impl ModelAvailability {
    /// Whether the model can be selected for a conversation.
    pub fn is_selectable(self) -> bool {
        matches!(self, Self::Available | Self::ApiKeyInstalled)
    }
}

impl ModelDescriptor {
    /// Create a local-weights descriptor.
    pub fn local(
        id: impl Into<String>,
        name: impl Into<String>,
        gguf_path: impl Into<PathBuf>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ModelKind::LocalWeights,
            gguf_path: Some(gguf_path.into()),
            gguf_options: Vec::new(),
            gguf_required_memory_gb: None,
            api_model_id: None,
            api_key: None,
            api_endpoint: None,
        }
    }

    /// Create a remote-API descriptor.
    pub fn remote(
        id: impl Into<String>,
        name: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            kind: ModelKind::RemoteApi,
            gguf_path: None,
            gguf_options: Vec::new(),
            gguf_required_memory_gb: None,
            api_model_id: None,
            api_key: None,
            api_endpoint: Some(endpoint.into()),
        }
    }

    /// Append runtime flags.
    pub fn with_options<I, S>(mut self, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.gguf_options.extend(options.into_iter().map(Into::into));
        self
    }

    /// Set the API key.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Whether this model needs a local runtime process.
    pub fn is_local(&self) -> bool {
        self.kind == ModelKind::LocalWeights
    }

    /// The weights path, if set.
    pub fn weights_path(&self) -> Option<&Path> {
        self.gguf_path.as_deref()
    }

    /// Advisory memory requirement, zero when unspecified.
    pub fn required_memory_gb(&self) -> f64 {
        self.gguf_required_memory_gb.unwrap_or(0.0)
    }

    /// Classify the model for the picker.
    pub fn availability(&self) -> ModelAvailability {
        match self.kind {
            ModelKind::LocalWeights => match self.weights_path() {
                Some(path) if path.exists() => ModelAvailability::Available,
                _ => ModelAvailability::NotInstalled,
            },
            ModelKind::RemoteApi => match self.api_key.as_deref() {
                Some(key) if !key.is_empty() => ModelAvailability::ApiKeyInstalled,
                _ => ModelAvailability::NeedApiKey,
            },
        }
    }
}

/// Contents of the registry file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ModelConfigFile {
    #[serde(default)]
    pub models: Vec<ModelDescriptor>,
}

impl ModelConfigFile {
    /// Look up a model by id. The first entry wins when ids repeat.
    pub fn find(&self, id: &str) -> Option<&ModelDescriptor> {
        self.models.iter().find(|model| model.id == id)
    }

    /// Ids that appear more than once, in order of their second occurrence.
    pub fn duplicate_ids(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.models
            .iter()
            .filter(|model| !seen.insert(model.id.as_str()))
            .map(|model| model.id.as_str())
            .collect()
    }
}
