//! Reconciliation store — the single source of truth for the in-memory task
//! collection.
//!
//! Three unordered sources mutate it: the initial bulk fetch, the local
//! optimistic path, and peer change notifications from the push channel.
//! The operation set is deliberately tolerant so that arrival order is
//! harmless: `insert` deduplicates by id (the same creation can arrive from
//! the optimistic path and from the echoed notification), and `replace` /
//! `remove` of an unknown id are silent no-ops (the record may have been
//! deleted concurrently). Both orders converge to the same final state.
//!
//! Mutations are pure in-memory transforms and cannot fail. The `error`
//! flag is set by callers when a remote call fails; the store never infers
//! errors from its own operations.

use std::sync::Mutex;

use tokio::sync::watch;
use tracing::debug;

use crate::model::Task;

/// Point-in-time view of the store for rendering.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    pub tasks: Vec<Task>,
    pub loading: bool,
    pub error: Option<String>,
}

/// Canonical ordered task collection plus the `loading` / `error` flags.
///
/// Interior mutability: operations take `&self` and are individually
/// atomic. Subscribers observe a monotonically increasing revision over a
/// `watch` channel and pull snapshots; they never hold the lock.
pub struct TaskStore {
    state: Mutex<Snapshot>,
    revision: watch::Sender<u64>,
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskStore {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            state: Mutex::new(Snapshot::default()),
            revision,
        }
    }

    // ─── Mutations ────────────────────────────────────────────────────────────

    /// Discard the current collection and install `tasks`, re-sorted.
    /// Used after the initial bulk fetch. Always succeeds.
    pub fn replace_all(&self, mut tasks: Vec<Task>) {
        sort_tasks(&mut tasks);
        {
            let mut state = self.lock();
            state.tasks = tasks;
        }
        self.bump();
    }

    /// Insert a new record, keeping the collection sorted.
    ///
    /// A record with the same id may already be present — the same creation
    /// arrives once from the optimistic path and once from the echoed push
    /// notification — in which case the call is a no-op.
    pub fn insert(&self, task: Task) {
        {
            let mut state = self.lock();
            if state.tasks.iter().any(|t| t.id == task.id) {
                debug!(id = task.id, "store: duplicate insert dropped");
                return;
            }
            state.tasks.push(task);
            sort_tasks(&mut state.tasks);
        }
        self.bump();
    }

    /// Substitute the record with a matching id wholesale (last full write
    /// wins; no field-level merge). Dropped silently when the id is absent.
    /// Re-sorts, since the replacement may carry a different priority or
    /// creation time.
    pub fn replace(&self, task: Task) {
        {
            let mut state = self.lock();
            let Some(slot) = state.tasks.iter_mut().find(|t| t.id == task.id) else {
                debug!(id = task.id, "store: replace of unknown id dropped");
                return;
            };
            *slot = task;
            sort_tasks(&mut state.tasks);
        }
        self.bump();
    }

    /// Remove the record with the given id; no-op when absent.
    /// Removal only shrinks the sequence, so no re-sort is needed.
    pub fn remove(&self, id: i64) {
        {
            let mut state = self.lock();
            let before = state.tasks.len();
            state.tasks.retain(|t| t.id != id);
            if state.tasks.len() == before {
                debug!(id, "store: remove of unknown id dropped");
                return;
            }
        }
        self.bump();
    }

    pub fn set_loading(&self, loading: bool) {
        {
            let mut state = self.lock();
            if state.loading == loading {
                return;
            }
            state.loading = loading;
        }
        self.bump();
    }

    pub fn set_error(&self, error: Option<String>) {
        {
            let mut state = self.lock();
            if state.error == error {
                return;
            }
            state.error = error;
        }
        self.bump();
    }

    // ─── Reads ────────────────────────────────────────────────────────────────

    /// Clone of the full collection in store order.
    pub fn tasks(&self) -> Vec<Task> {
        self.lock().tasks.clone()
    }

    /// Clone of the record with the given id, if present.
    pub fn get(&self, id: i64) -> Option<Task> {
        self.lock().tasks.iter().find(|t| t.id == id).cloned()
    }

    pub fn loading(&self) -> bool {
        self.lock().loading
    }

    pub fn error(&self) -> Option<String> {
        self.lock().error.clone()
    }

    /// Full point-in-time snapshot for rendering.
    pub fn snapshot(&self) -> Snapshot {
        self.lock().clone()
    }

    /// Subscribe to revision bumps. Every observable state change increments
    /// the revision; subscribers re-read via `snapshot()`.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }

    // ─── Internals ────────────────────────────────────────────────────────────

    fn lock(&self) -> std::sync::MutexGuard<'_, Snapshot> {
        // Mutations cannot panic while holding the lock, so poisoning is
        // unreachable; recover the guard rather than propagate.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn bump(&self) {
        self.revision.send_modify(|r| *r += 1);
    }
}

/// Stable sort by `(priority rank, created_at)`. Equal-priority records keep
/// their creation order relative to each other across unrelated insertions.
fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by_key(Task::sort_key);
}

// ─── Tests ────────────────────────────────────────────────────────────────────
