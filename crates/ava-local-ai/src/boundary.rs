//! Command surface exposed to the UI process.
//!
//! Commands are queued and applied one at a time by [`Boundary::run`], so a
//! terminate followed by a spawn for the same model is always applied in that
//! order. Spawn, terminate and restart are fire-and-forget: failures are
//! logged and never reported back to the caller.

use ava_registry::ModelConfigFile;
use tokio::sync::{broadcast, mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::status::StatusView;
use crate::supervisor::{ModelReady, ProcessSupervisor};

enum Command {
    ReadRegistry(oneshot::Sender<Option<ModelConfigFile>>),
    Spawn(String),
    Terminate(String),
    Restart(String),
    Statuses(oneshot::Sender<Vec<StatusView>>),
    Shutdown(oneshot::Sender<()>),
}

/// Event loop owning the supervisor.
pub struct Boundary {
    supervisor: ProcessSupervisor,
    commands: mpsc::UnboundedReceiver<Command>,
}

/// Cloneable handle for sending commands to a running [`Boundary`].
#[derive(Clone)]
pub struct BoundaryHandle {
    commands: mpsc::UnboundedSender<Command>,
    ready_tx: broadcast::Sender<ModelReady>,
}

impl Boundary {
    /// Wrap a supervisor. Nothing happens until [`run`](Self::run) is polled.
    pub fn new(supervisor: ProcessSupervisor) -> (Self, BoundaryHandle) {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = BoundaryHandle {
            commands: tx,
            ready_tx: supervisor.ready_sender(),
        };
        (
            Self {
                supervisor,
                commands: rx,
            },
            handle,
        )
    }

    /// Apply commands until a shutdown is requested or every handle is
    /// dropped, then stop all model processes.
    pub async fn run(mut self) {
        while let Some(command) = self.commands.recv().await {
            match command {
                Command::ReadRegistry(reply) => {
                    let registry = match self.supervisor.read_registry().await {
                        Ok(registry) => Some(registry),
                        Err(e) => {
                            error!("{}", e);
                            None
                        }
                    };
                    let _ = reply.send(registry);
                }
                Command::Spawn(model_id) => self.spawn(&model_id).await,
                Command::Terminate(model_id) => self.terminate(&model_id).await,
                Command::Restart(model_id) => {
                    self.terminate(&model_id).await;
                    self.spawn(&model_id).await;
                }
                Command::Statuses(reply) => {
                    let _ = reply.send(self.supervisor.statuses().await);
                }
                Command::Shutdown(reply) => {
                    self.supervisor.shutdown().await;
                    let _ = reply.send(());
                    return;
                }
            }
        }

        debug!("all boundary handles dropped");
        self.supervisor.shutdown().await;
    }

    async fn spawn(&self, model_id: &str) {
        match self.supervisor.spawn(model_id).await {
            Ok(outcome) => debug!(model_id, ?outcome, "spawn handled"),
            Err(e) => error!(model_id, "cannot launch model: {}", e),
        }
    }

    async fn terminate(&self, model_id: &str) {
        match self.supervisor.terminate(model_id).await {
            Ok(outcome) => debug!(model_id, ?outcome, "terminate handled"),
            Err(e) => error!(model_id, "cannot terminate model: {}", e),
        }
    }
}

impl BoundaryHandle {
    /// Read the registry file. `None` means it could not be parsed and the
    /// caller should try again later.
    pub async fn read_registry(&self) -> Option<ModelConfigFile> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::ReadRegistry(tx));
        rx.await.ok().flatten()
    }

    /// Launch a model. Returns immediately.
    pub fn spawn_model(&self, model_id: impl Into<String>) {
        self.send(Command::Spawn(model_id.into()));
    }

    /// Stop a model. Returns immediately.
    pub fn terminate_model(&self, model_id: impl Into<String>) {
        self.send(Command::Terminate(model_id.into()));
    }

    /// Stop then launch a model. Returns immediately.
    pub fn restart_model(&self, model_id: impl Into<String>) {
        self.send(Command::Restart(model_id.into()));
    }

    /// Snapshot of every running model.
    pub async fn get_statuses(&self) -> Vec<StatusView> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Statuses(tx));
        rx.await.unwrap_or_default()
    }

    /// Readiness notifications, one per process that becomes ready.
    pub fn on_model_ready(&self) -> broadcast::Receiver<ModelReady> {
        self.ready_tx.subscribe()
    }

    /// Stop all model processes and end the event loop.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Shutdown(tx));
        let _ = rx.await;
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("boundary event loop is not running");
        }
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::supervisor::tests::{supervisor_with, READY_SCRIPT};
    use std::time::Duration;

    fn start(dir: &tempfile::TempDir) -> (BoundaryHandle, tokio::task::JoinHandle<()>) {
        let (boundary, handle) = Boundary::new(supervisor_with(dir, READY_SCRIPT));
        (handle, tokio::spawn(boundary.run()))
    }

    #[tokio::test]
    async fn test_read_registry() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _task) = start(&dir);

        let registry = handle.read_registry().await.unwrap();
        assert!(registry.find("m1").is_some());

        std::fs::write(dir.path().join("ava-model-config.json"), "not json").unwrap();
        assert!(handle.read_registry().await.is_none());

        std::fs::remove_file(dir.path().join("ava-model-config.json")).unwrap();
        assert!(handle.read_registry().await.unwrap().models.is_empty());
    }

    #[tokio::test]
    async fn test_spawn_and_ready() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start(&dir);
        let mut ready = handle.on_model_ready();

        handle.spawn_model("m1");
        let statuses = handle.get_statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].port, 8980);

        let event = tokio::time::timeout(Duration::from_secs(5), ready.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event.model_id, "m1");
        assert!(handle.get_statuses().await[0].is_initialized);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_failures_are_swallowed() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, _task) = start(&dir);

        handle.spawn_model("unknown-id");
        handle.terminate_model("unknown-id");
        handle.terminate_model("m1");
        handle.spawn_model("remote");
        assert!(handle.get_statuses().await.is_empty());
    }

    #[tokio::test]
    async fn test_restart_replaces_process() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start(&dir);

        handle.spawn_model("m1");
        let first = handle.get_statuses().await[0].pid;
        handle.restart_model("m1");
        let statuses = handle.get_statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_ne!(statuses[0].pid, first);
        assert_eq!(statuses[0].port, 8980);

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_terminate_then_spawn_applied_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start(&dir);

        handle.spawn_model("m1");
        handle.terminate_model("m1");
        handle.spawn_model("m1");
        let statuses = handle.get_statuses().await;
        assert_eq!(statuses.len(), 1);
        assert_eq!(statuses[0].model_id(), "m1");

        handle.shutdown().await;
        task.await.unwrap();
    }

    #[tokio::test]
    async fn test_loop_ends_when_handles_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start(&dir);

        handle.spawn_model("m1");
        drop(handle);
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test]
    async fn test_handle_after_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let (handle, task) = start(&dir);
        handle.shutdown().await;
        task.await.unwrap();

        handle.spawn_model("m1");
        assert!(handle.get_statuses().await.is_empty());
        assert!(handle.read_registry().await.is_none());
    }
}
