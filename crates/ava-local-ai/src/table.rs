//! The table of running model processes.

use std::collections::BTreeSet;
use std::fmt;

use ava_registry::ModelDescriptor;
use indexmap::IndexMap;
use tokio::task::JoinHandle;

use crate::process::ProcessHandle;

/// Readiness of a model server. Only ever moves from `Starting` to `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadyState {
    Starting,
    Ready,
}

impl ReadyState {
    pub fn is_ready(self) -> bool {
        self == Self::Ready
    }
}

/// Identifies one concrete process launch.
///
/// Observers carry the id of the launch they watch so that a late event
/// from a terminated process never touches the entry of its replacement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct InstanceId(u64);

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// One running model server.
#[derive(Debug)]
pub(crate) struct ManagedProcess {
    /// Registry entry as it was when the process was launched.
    pub descriptor: ModelDescriptor,
    pub port: u16,
    pub pid: Option<u32>,
    pub ready: ReadyState,
    pub instance: InstanceId,
    pub handle: ProcessHandle,
    /// Exit observer; finishes once the process has been reaped.
    pub exit_task: Option<JoinHandle<()>>,
}

impl ManagedProcess {
    pub fn model_id(&self) -> &str {
        &self.descriptor.id
    }
}

/// Running processes keyed by model id, in launch order.
#[derive(Debug, Default)]
pub(crate) struct ProcessTable {
    entries: IndexMap<String, ManagedProcess>,
    next_instance: u64,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, model_id: &str) -> Option<&ManagedProcess> {
        self.entries.get(model_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ManagedProcess> {
        self.entries.values()
    }

    /// Ports held by live entries.
    pub fn ports(&self) -> BTreeSet<u16> {
        self.entries.values().map(|p| p.port).collect()
    }

    /// Reserve an id for the next launch.
    pub fn next_instance(&mut self) -> InstanceId {
        self.next_instance += 1;
        InstanceId(self.next_instance)
    }

    /// Insert a new entry. Any existing entry for the same model is returned;
    /// the supervisor checks for one before launching so this is `None`.
    pub fn insert(&mut self, process: ManagedProcess) -> Option<ManagedProcess> {
        self.entries
            .insert(process.model_id().to_string(), process)
    }

    /// Remove the entry for a model regardless of which launch it belongs to.
    pub fn remove(&mut self, model_id: &str) -> Option<ManagedProcess> {
        self.entries.shift_remove(model_id)
    }

    /// Remove the entry only if it still belongs to `instance`.
    pub fn remove_instance(
        &mut self,
        model_id: &str,
        instance: InstanceId,
    ) -> Option<ManagedProcess> {
        match self.entries.get(model_id) {
            Some(p) if p.instance == instance => self.entries.shift_remove(model_id),
            _ => None,
        }
    }

    /// Move the entry to `Ready` if it still belongs to `instance` and is
    /// still starting. Returns the port when the transition happened.
    pub fn mark_ready(&mut self, model_id: &str, instance: InstanceId) -> Option<u16> {
        let process = self.entries.get_mut(model_id)?;
        if process.instance != instance || process.ready.is_ready() {
            return None;
        }
        process.ready = ReadyState::Ready;
        Some(process.port)
    }

    /// Remove every entry, in launch order.
    pub fn drain(&mut self) -> Vec<ManagedProcess> {
        self.entries.drain(..).map(|(_, p)| p).collect()
    }
}
