//! Local model supervisor for Ava using llamafile.
//!
//! Ava launches one llamafile server per local model, each on its own port,
//! and talks to them over the OpenAI-compatible HTTP API. This crate owns
//! those child processes: it assigns ports, watches the runtime's stderr for
//! the readiness line, reaps exits, and exposes a status view to the UI.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐  commands   ┌──────────────┐        ┌──────────────────┐
//! │  UI process  │ ──────────> │   Boundary   │ ─────> │ ProcessSupervisor│
//! │ (stdio JSON) │ <────────── │  (event loop)│ <───── │  (process table) │
//! └──────────────┘  statuses / └──────────────┘ ready  └────────┬─────────┘
//!                   modelReady                                  │ spawn
//!                                                       ┌───────┴────────┐
//!                                                       │ llamafile :8980│
//!                                                       │ llamafile :8981│
//!                                                       └────────────────┘
//! ```

mod boundary;
mod client;
mod config;
mod error;
pub mod port;
mod process;
pub mod protocol;
pub mod readiness;
mod status;
mod supervisor;
mod table;

pub use boundary::{Boundary, BoundaryHandle};
pub use client::{
    ChatClient, ChatCompletionChunk, ChatCompletionParams, ChatMessage, ChunkStream,
    Role, StreamAccumulator,
};
pub use config::{SupervisorConfig, SupervisorConfigBuilder};
pub use error::{ChatError, SupervisorError};
pub use status::StatusView;
pub use supervisor::{ModelReady, ProcessSupervisor, SpawnOutcome, TerminateOutcome};
pub use table::{InstanceId, ReadyState};

pub use ava_registry::{ModelConfigFile, ModelDescriptor, ModelKind};

/// First port handed out to a local model server.
pub const DEFAULT_BASE_PORT: u16 = 8980;

/// Substring llamafile prints on stderr once its HTTP server accepts requests.
pub const READINESS_MARKER: &str = "llama server listening at";

/// Default grace period before a terminated process is force-killed.
pub const DEFAULT_KILL_GRACE_SECS: u64 = 10;
