//! Supervisor for llamafile model server processes.

use std::sync::{Arc, Weak};

use ava_registry::{read_registry, ModelConfigFile};
use serde::{Deserialize, Serialize};
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr};
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, info, warn};

use crate::config::SupervisorConfig;
use crate::error::SupervisorError;
use crate::port::next_port;
use crate::process::{self, ProcessHandle, StopSignal};
use crate::readiness::{DiagnosticEvent, ReadinessProbe, ReadinessScanner};
use crate::status::{project, StatusView};
use crate::table::{InstanceId, ManagedProcess, ProcessTable, ReadyState};

const READY_CHANNEL_CAPACITY: usize = 64;

const DIAGNOSTIC_READ_SIZE: usize = 8 * 1024;

/// Pushed once per process when its server starts accepting requests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelReady {
    #[serde(rename = "modelId")]
    pub model_id: String,
    pub port: u16,
}

/// Result of a spawn request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpawnOutcome {
    /// A new process was started.
    Launched { port: u16, pid: Option<u32> },
    /// The model was already running; nothing was started.
    AlreadyRunning { port: u16 },
}

/// Result of a terminate request that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminateOutcome {
    /// The process was signalled and its entry removed.
    Terminated { port: u16, pid: Option<u32> },
    /// No process was running for the model.
    NotRunning,
}

/// Owns every llamafile process Ava has started.
///
/// At most one process runs per model id and no two running processes share
/// a port. Dropping the supervisor stops all of its processes.
pub struct ProcessSupervisor {
    config: SupervisorConfig,
    probe: ReadinessProbe,
    table: Arc<Mutex<ProcessTable>>,
    ready_tx: broadcast::Sender<ModelReady>,
}

impl ProcessSupervisor {
    /// Create a supervisor with an empty process table.
    pub fn new(config: SupervisorConfig) -> Self {
        match &config.runtime_binary {
            Some(path) => info!(path = %path.display(), "using llamafile"),
            None => warn!("llamafile not found, local models cannot be launched"),
        }

        let (ready_tx, _) = broadcast::channel(READY_CHANNEL_CAPACITY);
        Self {
            probe: ReadinessProbe::new(config.readiness_marker.clone()),
            config,
            table: Arc::new(Mutex::new(ProcessTable::new())),
            ready_tx,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Subscribe to readiness notifications.
    pub fn subscribe(&self) -> broadcast::Receiver<ModelReady> {
        self.ready_tx.subscribe()
    }

    pub(crate) fn ready_sender(&self) -> broadcast::Sender<ModelReady> {
        self.ready_tx.clone()
    }

    /// Read the registry file fresh.
    pub async fn read_registry(&self) -> Result<ModelConfigFile, SupervisorError> {
        Ok(read_registry(&self.config.registry_path).await?)
    }

    /// Launch the model's server unless it is already running.
    ///
    /// Returns once the process is started; readiness is reported later
    /// through [`subscribe`](Self::subscribe) and [`statuses`](Self::statuses).
    pub async fn spawn(&self, model_id: &str) -> Result<SpawnOutcome, SupervisorError> {
        let registry = self.read_registry().await?;
        let descriptor = registry
            .find(model_id)
            .ok_or_else(|| SupervisorError::ModelNotFound(model_id.to_string()))?;

        let mut table = self.table.lock().await;

        if let Some(existing) = table.get(model_id) {
            info!(
                model_id,
                pid = ?existing.pid,
                port = existing.port,
                "model process already running"
            );
            return Ok(SpawnOutcome::AlreadyRunning {
                port: existing.port,
            });
        }

        if !descriptor.is_local() {
            return Err(SupervisorError::NotLocalModel(model_id.to_string()));
        }
        let binary = self
            .config
            .runtime_binary
            .as_deref()
            .ok_or(SupervisorError::RuntimeBinaryNotFound)?;
        let weights = descriptor
            .weights_path()
            .ok_or_else(|| SupervisorError::WeightsPathMissing(model_id.to_string()))?;

        let port = next_port(self.config.base_port, &table.ports())
            .ok_or(SupervisorError::PortsExhausted(self.config.base_port))?;

        info!(model_id, port, weights = %weights.display(), "launching model");
        let args = process::launch_args(weights, port, &descriptor.gguf_options);
        let mut launched = process::launch(binary, &args)?;
        let pid = launched.pid;
        let stderr = launched.child.stderr.take();

        let instance = table.next_instance();
        let observer = Observer {
            model_id: model_id.to_string(),
            instance,
            port,
            pid,
            table: Arc::downgrade(&self.table),
        };

        if let Some(stderr) = stderr {
            tokio::spawn(observer.clone().watch_diagnostics(
                stderr,
                self.probe.clone(),
                self.ready_tx.clone(),
            ));
        }

        let (handle, stop) = ProcessHandle::channel();
        let exit_task = tokio::spawn(observer.watch_exit(
            launched.child,
            stop,
            self.config.kill_grace,
        ));

        table.insert(ManagedProcess {
            descriptor: descriptor.clone(),
            port,
            pid,
            ready: ReadyState::Starting,
            instance,
            handle,
            exit_task: Some(exit_task),
        });

        info!(model_id, ?pid, port, %instance, "launched model process");
        Ok(SpawnOutcome::Launched { port, pid })
    }

    /// Stop the model's server.
    ///
    /// The entry is removed right away so the model can be launched again
    /// immediately; the old process is signalled but not waited for.
    pub async fn terminate(&self, model_id: &str) -> Result<TerminateOutcome, SupervisorError> {
        let registry = self.read_registry().await?;
        let descriptor = registry
            .find(model_id)
            .ok_or_else(|| SupervisorError::ModelNotFound(model_id.to_string()))?;

        let Some(process) = self.table.lock().await.remove(&descriptor.id) else {
            info!(model_id, "model process not running");
            return Ok(TerminateOutcome::NotRunning);
        };

        info!(
            model_id,
            pid = ?process.pid,
            port = process.port,
            "terminating model process"
        );
        let outcome = TerminateOutcome::Terminated {
            port: process.port,
            pid: process.pid,
        };
        process.handle.terminate();
        Ok(outcome)
    }

    /// Snapshot of every running model, in launch order.
    pub async fn statuses(&self) -> Vec<StatusView> {
        self.table.lock().await.iter().map(project).collect()
    }

    /// Snapshot of a single model, if running.
    pub async fn status(&self, model_id: &str) -> Option<StatusView> {
        self.table.lock().await.get(model_id).map(project)
    }

    /// Number of running processes.
    pub async fn running_count(&self) -> usize {
        self.table.lock().await.len()
    }

    /// Stop every process and clear the table.
    ///
    /// Waits until each process has been reaped. With `kill_grace` disabled
    /// a process that ignores SIGTERM keeps this waiting.
    pub async fn shutdown(&self) {
        let processes = self.table.lock().await.drain();
        if processes.is_empty() {
            return;
        }

        info!(count = processes.len(), "stopping all model processes");
        let mut exits = Vec::with_capacity(processes.len());
        for process in processes {
            debug!(model_id = process.model_id(), pid = ?process.pid, "stopping");
            process.handle.terminate();
            exits.extend(process.exit_task);
        }

        for exit in exits {
            if let Err(e) = exit.await {
                warn!("exit observer failed: {}", e);
            }
        }
    }
}

/// Context shared by the observers of one launch.
#[derive(Debug, Clone)]
struct Observer {
    model_id: String,
    instance: InstanceId,
    port: u16,
    pid: Option<u32>,
    table: Weak<Mutex<ProcessTable>>,
}

impl Observer {
    /// Reap the process and drop its entry if it still belongs to this launch.
    async fn watch_exit(
        self,
        mut child: Child,
        stop: StopSignal,
        kill_grace: Option<std::time::Duration>,
    ) {
        match process::wait_or_stop(&mut child, stop, kill_grace).await {
            Ok(status) => info!(
                model_id = %self.model_id,
                pid = ?self.pid,
                port = self.port,
                %status,
                "model process exit"
            ),
            Err(e) => warn!(
                model_id = %self.model_id,
                pid = ?self.pid,
                "failed to wait for model process: {}",
                e
            ),
        }

        let Some(table) = self.table.upgrade() else {
            return;
        };
        let removed = table
            .lock()
            .await
            .remove_instance(&self.model_id, self.instance);
        if removed.is_some() {
            debug!(model_id = %self.model_id, instance = %self.instance, "removed exited process");
        }
    }

    /// Scan stderr for the readiness marker, one read at a time.
    async fn watch_diagnostics(
        self,
        mut stderr: ChildStderr,
        probe: ReadinessProbe,
        ready_tx: broadcast::Sender<ModelReady>,
    ) {
        let mut buf = vec![0u8; DIAGNOSTIC_READ_SIZE];
        let mut scanner = ReadinessScanner::new(probe);
        let mut seen_ready = false;

        loop {
            let n = match stderr.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) => {
                    debug!(model_id = %self.model_id, "stderr closed: {}", e);
                    break;
                }
            };
            let chunk = &buf[..n];
            debug!(
                model_id = %self.model_id,
                "stderr: {}",
                String::from_utf8_lossy(chunk).trim_end()
            );

            if !seen_ready && scanner.feed(chunk) == DiagnosticEvent::Ready {
                seen_ready = true;
                self.mark_ready(&ready_tx).await;
            }
        }
    }

    async fn mark_ready(&self, ready_tx: &broadcast::Sender<ModelReady>) {
        let Some(table) = self.table.upgrade() else {
            return;
        };
        let Some(port) = table.lock().await.mark_ready(&self.model_id, self.instance) else {
            debug!(model_id = %self.model_id, instance = %self.instance, "ignoring stale readiness");
            return;
        };

        info!(model_id = %self.model_id, port, "model ready");
        // No subscribers is fine; status polling still sees the transition.
        let _ = ready_tx.send(ModelReady {
            model_id: self.model_id.clone(),
            port,
        });
    }
}
