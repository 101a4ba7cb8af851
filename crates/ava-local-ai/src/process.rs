//! Launching and stopping llamafile processes.

use std::ffi::OsString;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::oneshot;
use tracing::{debug, warn};

use crate::error::SupervisorError;

/// Build the llamafile argument list.
///
/// `options` are appended verbatim and unvalidated, each as its own
/// argument. No shell is involved.
pub(crate) fn launch_args(weights: &Path, port: u16, options: &[String]) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec![
        "-m".into(),
        weights.as_os_str().to_owned(),
        "--server".into(),
        "--port".into(),
        port.to_string().into(),
        "--nobrowser".into(),
    ];
    args.extend(options.iter().map(OsString::from));
    args
}

/// A freshly started child.
pub(crate) struct LaunchedProcess {
    pub child: Child,
    pub pid: Option<u32>,
}

/// Start llamafile with stderr piped for readiness detection.
pub(crate) fn launch(binary: &Path, args: &[OsString]) -> Result<LaunchedProcess, SupervisorError> {
    let child = Command::new(binary)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        // Reaped by the exit observer; this only covers runtime teardown.
        .kill_on_drop(true)
        .spawn()
        .map_err(SupervisorError::SpawnFailed)?;

    let pid = child.id();
    Ok(LaunchedProcess { child, pid })
}

/// Exclusive handle used to ask a running process to stop.
///
/// Dropping the handle has the same effect as calling [`terminate`].
///
/// [`terminate`]: ProcessHandle::terminate
#[derive(Debug)]
pub(crate) struct ProcessHandle {
    stop_tx: oneshot::Sender<()>,
}

/// Receiving side of a [`ProcessHandle`], held by the exit observer.
pub(crate) type StopSignal = oneshot::Receiver<()>;

impl ProcessHandle {
    pub(crate) fn channel() -> (Self, StopSignal) {
        let (stop_tx, stop_rx) = oneshot::channel();
        (Self { stop_tx }, stop_rx)
    }

    /// Signal the process to stop. Does not wait for it to exit.
    pub(crate) fn terminate(self) {
        // The observer may already be gone if the process just exited.
        let _ = self.stop_tx.send(());
    }
}

enum Wake {
    Exited(std::io::Result<ExitStatus>),
    Stop,
}

/// Wait for the child to exit, stopping it when `stop` fires.
///
/// A stopped child gets SIGTERM first (plain kill on non-Unix) and is
/// force-killed once `grace` elapses.
pub(crate) async fn wait_or_stop(
    child: &mut Child,
    stop: StopSignal,
    grace: Option<Duration>,
) -> std::io::Result<ExitStatus> {
    let wake = tokio::select! {
        status = child.wait() => Wake::Exited(status),
        // Err means the handle was dropped, which also means stop.
        _ = stop => Wake::Stop,
    };

    match wake {
        Wake::Exited(status) => status,
        Wake::Stop => stop_child(child, grace).await,
    }
}

async fn stop_child(child: &mut Child, grace: Option<Duration>) -> std::io::Result<ExitStatus> {
    send_terminate(child)?;

    let Some(grace) = grace else {
        return child.wait().await;
    };

    match tokio::time::timeout(grace, child.wait()).await {
        Ok(status) => status,
        Err(_) => {
            warn!(pid = ?child.id(), ?grace, "process didn't exit gracefully, killing");
            child.start_kill()?;
            child.wait().await
        }
    }
}

#[cfg(unix)]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    let Some(pid) = child.id() else {
        // already reaped
        return Ok(());
    };
    debug!(pid, "sending SIGTERM");
    let rc = unsafe { libc::kill(pid as libc::pid_t, libc::SIGTERM) };
    if rc == -1 {
        let err = std::io::Error::last_os_error();
        // ESRCH: exited between id() and kill()
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn send_terminate(child: &mut Child) -> std::io::Result<()> {
    debug!(pid = ?child.id(), "killing process");
    child.start_kill()
}
