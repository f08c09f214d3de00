//! In-process registry of running batches
//!
//! Maps a batch id to its cancellation token and current phase. An entry
//! lives exactly as long as the [`TaskGuard`] returned by `register`, so it
//! disappears when the batch task exits for any reason.

use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BatchPhase {
    Pending,
    Stage1,
    Stage2,
    Reconciling,
    Completed,
    Cancelled,
}

#[derive(Debug)]
struct TaskEntry {
    token: CancellationToken,
    phase: BatchPhase,
}

#[derive(Debug, Clone, Default)]
pub struct TaskRegistry {
    inner: Arc<Mutex<HashMap<Uuid, TaskEntry>>>,
}

impl TaskRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<Uuid, TaskEntry>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Track a new batch. The entry is removed when the guard is dropped.
    pub fn register(&self, id: Uuid) -> TaskGuard {
        let token = CancellationToken::new();
        self.entries().insert(
            id,
            TaskEntry {
                token: token.clone(),
                phase: BatchPhase::Pending,
            },
        );
        debug!("Registered batch {}", id);
        TaskGuard {
            id,
            token,
            registry: self.clone(),
        }
    }

    /// Signal cancellation. Returns false if the batch is not running, in
    /// which case nothing happens.
    pub fn cancel(&self, id: Uuid) -> bool {
        match self.entries().get(&id) {
            Some(entry) => {
                info!("Cancellation requested for batch {}", id);
                entry.token.cancel();
                true
            }
            None => false,
        }
    }

    /// Cancel every running batch. Returns how many were signalled.
    pub fn cancel_all(&self) -> usize {
        let entries = self.entries();
        for entry in entries.values() {
            entry.token.cancel();
        }
        entries.len()
    }

    pub fn is_active(&self, id: Uuid) -> bool {
        self.entries().contains_key(&id)
    }

    pub fn phase(&self, id: Uuid) -> Option<BatchPhase> {
        self.entries().get(&id).map(|entry| entry.phase)
    }

    pub fn active_count(&self) -> usize {
        self.entries().len()
    }

    fn set_phase(&self, id: Uuid, phase: BatchPhase) {
        if let Some(entry) = self.entries().get_mut(&id) {
            entry.phase = phase;
        }
    }

    fn remove(&self, id: Uuid) {
        self.entries().remove(&id);
    }
}

/// Ownership of one registry entry for the lifetime of a batch task
#[derive(Debug)]
pub struct TaskGuard {
    id: Uuid,
    token: CancellationToken,
    registry: TaskRegistry,
}

impl TaskGuard {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn set_phase(&self, phase: BatchPhase) {
        debug!("Batch {} entering {:?}", self.id, phase);
        self.registry.set_phase(self.id, phase);
    }
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.registry.remove(self.id);
        debug!("Batch {} left the task registry", self.id);
    }
}
