//! Supervisor configuration.

use std::path::PathBuf;
use std::time::Duration;

use ava_registry::paths;

use crate::{DEFAULT_BASE_PORT, DEFAULT_KILL_GRACE_SECS, READINESS_MARKER};

/// Configuration for the process supervisor.
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Registry file, re-read on every spawn/terminate.
    pub registry_path: PathBuf,
    /// llamafile executable, located once at startup.
    pub runtime_binary: Option<PathBuf>,
    /// First port handed out.
    pub base_port: u16,
    /// stderr substring that marks a server as ready.
    pub readiness_marker: String,
    /// Time a terminated process gets before it is force-killed.
    /// `None` waits indefinitely.
    pub kill_grace: Option<Duration>,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            registry_path: paths::default_registry_path(),
            runtime_binary: None,
            base_port: DEFAULT_BASE_PORT,
            readiness_marker: READINESS_MARKER.to_string(),
            kill_grace: Some(Duration::from_secs(DEFAULT_KILL_GRACE_SECS)),
        }
    }
}

impl SupervisorConfig {
    /// Create config from environment variables and locate llamafile.
    pub fn from_env() -> Self {
        let base_port = std::env::var("AVA_BASE_PORT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_BASE_PORT);

        // 0 disables escalation
        let kill_grace = match std::env::var("AVA_KILL_GRACE_SECS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
        {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => Some(Duration::from_secs(DEFAULT_KILL_GRACE_SECS)),
        };

        Self {
            registry_path: paths::registry_path(),
            runtime_binary: paths::locate_llamafile(),
            base_port,
            readiness_marker: READINESS_MARKER.to_string(),
            kill_grace,
        }
    }

    /// Create a builder for configuration.
    pub fn builder() -> SupervisorConfigBuilder {
        SupervisorConfigBuilder::default()
    }
}

/// Builder for supervisor configuration.
#[derive(Debug, Default)]
pub struct SupervisorConfigBuilder {
    config: SupervisorConfig,
}

impl SupervisorConfigBuilder {
    /// Start from an existing configuration.
    pub fn from_config(config: SupervisorConfig) -> Self {
        Self { config }
    }

    pub fn registry_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.registry_path = path.into();
        self
    }

    pub fn runtime_binary(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.runtime_binary = Some(path.into());
        self
    }

    pub fn base_port(mut self, port: u16) -> Self {
        self.config.base_port = port;
        self
    }

    pub fn readiness_marker(mut self, marker: impl Into<String>) -> Self {
        self.config.readiness_marker = marker.into();
        self
    }

    pub fn kill_grace(mut self, grace: Option<Duration>) -> Self {
        self.config.kill_grace = grace;
        self
    }

    pub fn build(self) -> SupervisorConfig {
        self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.base_port, 8980);
        assert_eq!(config.readiness_marker, "llama server listening at");
        assert!(config.runtime_binary.is_none());
        assert_eq!(config.kill_grace, Some(Duration::from_secs(10)));
    }

    #[test]
    fn test_builder() {
        let config = SupervisorConfig::builder()
            .registry_path("/tmp/models.json")
            .runtime_binary("/opt/llamafile")
            .base_port(9000)
            .kill_grace(None)
            .build();
        assert_eq!(config.registry_path, PathBuf::from("/tmp/models.json"));
        assert_eq!(config.runtime_binary, Some(PathBuf::from("/opt/llamafile")));
        assert_eq!(config.base_port, 9000);
        assert!(config.kill_grace.is_none());
    }
}
