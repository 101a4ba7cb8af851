//! Reading the registry file.

use std::io::ErrorKind;
use std::path::Path;

use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::RegistryError;
use crate::model::{ModelConfigFile, ModelDescriptor};

/// The file as written by the user, before entries are validated.
#[derive(Debug, Default, Deserialize)]
struct RawConfigFile {
    #[serde(default)]
    models: Vec<serde_json::Value>,
}

/// Read the registry file.
///
/// A missing file is not an error and yields an empty model list. Entries
/// that do not describe a valid model are skipped with a warning so the rest
/// of the registry stays usable.
pub async fn read_registry(path: &Path) -> Result<ModelConfigFile, RegistryError> {
    let data = match tokio::fs::read_to_string(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!(path = %path.display(), "model config file not found");
            return Ok(ModelConfigFile::default());
        }
        Err(source) => {
            return Err(RegistryError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let raw: RawConfigFile =
        serde_json::from_str(&data).map_err(|source| RegistryError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
    let file = validate(raw);

    let duplicates = file.duplicate_ids();
    if !duplicates.is_empty() {
        warn!(?duplicates, "duplicate model ids in config, first entry wins");
    }

    debug!(count = file.models.len(), "loaded model config");
    Ok(file)
}

fn validate(raw: RawConfigFile) -> ModelConfigFile {
    let models = raw
        .models
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| {
            let id = entry.get("id").and_then(|id| id.as_str()).map(str::to_string);
            match serde_json::from_value::<ModelDescriptor>(entry) {
                Ok(model) => Some(model),
                Err(e) => {
                    warn!(index, ?id, "skipping invalid model entry: {}", e);
                    None
                }
            }
        })
        .collect();
    ModelConfigFile { models }
}
