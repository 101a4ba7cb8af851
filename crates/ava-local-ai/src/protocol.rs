//! Newline-delimited JSON protocol between the UI process and the boundary.
//!
//! Each line on the input is one [`Request`]; each line on the output is one
//! [`Frame`]. Request/response calls may carry a numeric `id` which is echoed
//! in the reply. Readiness notifications are pushed unsolicited.
//!
//! ```text
//! > {"type":"spawnModel","modelId":"m1"}
//! > {"type":"getModelStatuses","id":7}
//! < {"type":"modelStatuses","id":7,"statuses":[{"id":"m1",...,"port":8980,"isInitialized":false}]}
//! < {"type":"modelReady","modelId":"m1","port":8980}
//! ```

use ava_registry::ModelConfigFile;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, warn};

use crate::boundary::BoundaryHandle;
use crate::status::StatusView;
use crate::supervisor::ModelReady;

/// A command from the UI process.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Request {
    ReadModelConfigFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
    SpawnModel {
        #[serde(rename = "modelId")]
        model_id: String,
    },
    TerminateModel {
        #[serde(rename = "modelId")]
        model_id: String,
    },
    RestartModel {
        #[serde(rename = "modelId")]
        model_id: String,
    },
    GetModelStatuses {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
    },
}

/// A message to the UI process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    /// Reply to `readModelConfigFile`. `config` is null when the file could
    /// not be parsed.
    ModelConfigFile {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        config: Option<ModelConfigFile>,
    },
    /// Reply to `getModelStatuses`.
    ModelStatuses {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        statuses: Vec<StatusView>,
    },
    /// Pushed when a model starts accepting requests.
    ModelReady(ModelReady),
    /// The request line could not be understood.
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<u64>,
        message: String,
    },
}

/// Handle one request line, returning the reply if the request has one.
pub async fn dispatch(handle: &BoundaryHandle, line: &str) -> Option<Frame> {
    let request = match parse_request(line) {
        Ok(request) => request,
        Err((id, e)) => {
            warn!(?id, "invalid request: {}", e);
            return Some(Frame::Error {
                id,
                message: format!("invalid request: {e}"),
            });
        }
    };
    debug!(?request, "request");

    match request {
        Request::ReadModelConfigFile { id } => Some(Frame::ModelConfigFile {
            id,
            config: handle.read_registry().await,
        }),
        Request::SpawnModel { model_id } => {
            handle.spawn_model(model_id);
            None
        }
        Request::TerminateModel { model_id } => {
            handle.terminate_model(model_id);
            None
        }
        Request::RestartModel { model_id } => {
            handle.restart_model(model_id);
            None
        }
        Request::GetModelStatuses { id } => Some(Frame::ModelStatuses {
            id,
            statuses: handle.get_statuses().await,
        }),
    }
}

/// Decode a request line. On failure the `id` is still recovered when the
/// line is a JSON object carrying one, so the error can be matched.
fn parse_request(line: &str) -> Result<Request, (Option<u64>, serde_json::Error)> {
    let value: serde_json::Value = serde_json::from_str(line).map_err(|e| (None, e))?;
    let id = value.get("id").and_then(serde_json::Value::as_u64);
    serde_json::from_value(value).map_err(|e| (id, e))
}

/// Serve requests from `reader` until EOF, writing replies and readiness
/// notifications to `writer`.
pub async fn serve<R, W>(handle: BoundaryHandle, reader: R, mut writer: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    let mut ready = handle.on_model_ready();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("input closed");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                if let Some(frame) = dispatch(&handle, &line).await {
                    write_frame(&mut writer, &frame).await?;
                }
            }
            event = ready.recv() => match event {
                Ok(event) => write_frame(&mut writer, &Frame::ModelReady(event)).await?,
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "readiness notifications dropped");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }

    Ok(())
}

async fn write_frame<W: AsyncWrite + Unpin>(writer: &mut W, frame: &Frame) -> std::io::Result<()> {
    let mut bytes = serde_json::to_vec(frame)?;
    bytes.push(b'\n');
    writer.write_all(&bytes).await?;
    writer.flush().await
}
