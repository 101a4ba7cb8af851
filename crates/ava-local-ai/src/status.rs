//! Client-facing status of running models.

use ava_registry::ModelDescriptor;
use serde::{Deserialize, Serialize};

use crate::table::ManagedProcess;

/// A running model as reported to the UI: the registry entry merged with
/// its port, pid and readiness.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusView {
    #[serde(flatten)]
    pub model: ModelDescriptor,
    pub port: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(rename = "isInitialized")]
    pub is_initialized: bool,
}

impl StatusView {
    pub fn model_id(&self) -> &str {
        &self.model.id
    }

    /// Base URL of the server's OpenAI-compatible API.
    pub fn endpoint(&self) -> String {
        format!("http://localhost:{}/v1/", self.port)
    }
}

/// Project a table entry into its status view.
///
/// The descriptor used is the one captured at launch, so edits to the
/// registry while a model runs don't show up until it is restarted.
pub(crate) fn project(process: &ManagedProcess) -> StatusView {
    StatusView {
        model: process.descriptor.clone(),
        port: process.port,
        pid: process.pid,
        is_initialized: process.ready.is_ready(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::tests::entry;
    use crate::table::{ProcessTable, ReadyState};

    #[test]
    fn test_project_starting() {
        let mut table = ProcessTable::new();
        let (process, _stop) = entry(&mut table, "m1", 8980);
        let view = project(&process);
        assert_eq!(view.model_id(), "m1");
        assert_eq!(view.port, 8980);
        assert!(!view.is_initialized);
        assert_eq!(view.endpoint(), "http://localhost:8980/v1/");
    }

    #[test]
    fn test_project_ready() {
        let mut table = ProcessTable::new();
        let (mut process, _stop) = entry(&mut table, "m1", 8980);
        process.ready = ReadyState::Ready;
        assert!(project(&process).is_initialized);
    }

    #[test]
    fn test_json_shape() {
        let mut table = ProcessTable::new();
        let (process, _stop) = entry(&mut table, "m1", 8981);
        let value = serde_json::to_value(project(&process)).unwrap();

        assert_eq!(value["id"], "m1");
        assert_eq!(value["name"], "M1");
        assert_eq!(value["type"], "gguf");
        assert_eq!(value["gguf_path"], "/w.gguf");
        assert_eq!(value["port"], 8981);
        assert_eq!(value["pid"], 1981);
        assert_eq!(value["isInitialized"], false);
        // no handle or instance id leaks out
        assert!(value.get("handle").is_none());
        assert!(value.get("instance").is_none());
    }
}
