//! Path utilities for Ava data directories and the runtime binary.

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::{LLAMAFILE_PATH_ENV, REGISTRY_FILENAME, REGISTRY_PATH_ENV};

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

/// Get the Ava data directory (~/.ava/).
pub fn ava_data_dir() -> PathBuf {
    home_dir().join(".ava")
}

/// Get the bin directory (~/.ava/bin/).
pub fn bin_dir() -> PathBuf {
    ava_data_dir().join("bin")
}

/// Runtime binary filename for this platform.
pub fn llamafile_binary_name() -> &'static str {
    if cfg!(target_os = "windows") {
        "llamafile.exe"
    } else {
        "llamafile"
    }
}

/// Default registry location (~/Documents/ava-model-config.json).
pub fn default_registry_path() -> PathBuf {
    dirs::document_dir()
        .unwrap_or_else(|| home_dir().join("Documents"))
        .join(REGISTRY_FILENAME)
}

/// Registry location, honoring `AVA_MODEL_CONFIG`.
pub fn registry_path() -> PathBuf {
    std::env::var_os(REGISTRY_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(default_registry_path)
}

/// Places the runtime binary is looked for, in priority order.
pub fn llamafile_candidates() -> Vec<PathBuf> {
    let mut candidates = Vec::new();

    if let Some(path) = std::env::var_os(LLAMAFILE_PATH_ENV) {
        candidates.push(PathBuf::from(path));
    }

    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        candidates.push(exe_dir.join("llamafile").join(llamafile_binary_name()));
        candidates.push(
            exe_dir
                .join("..")
                .join("llamafile")
                .join(llamafile_binary_name()),
        );
    }

    candidates.push(bin_dir().join(llamafile_binary_name()));
    candidates
}

/// Return the first existing candidate.
pub fn find_existing(candidates: &[PathBuf]) -> Option<PathBuf> {
    candidates.iter().find(|path| path.is_file()).cloned()
}

/// Locate the llamafile runtime binary.
///
/// Called once at startup; a missing binary is logged here and local
/// launches are refused afterwards.
pub fn locate_llamafile() -> Option<PathBuf> {
    let candidates = llamafile_candidates();
    match find_existing(&candidates) {
        Some(path) => {
            debug!(path = %path.display(), "found llamafile executable");
            Some(path)
        }
        None => {
            warn!(?candidates, "cannot find llamafile executable");
            None
        }
    }
}
