//! Action layer: orchestrates remote calls against the reconciliation store.
//!
//! Update and delete apply optimistically and keep the pre-mutation record
//! so a failed remote call rolls the store back instead of leaving a
//! phantom edit behind. Create is not optimistic — the server assigns the
//! id, so there is nothing to insert before the response arrives.
//!
//! Remote failures set the store's `error` flag; every action clears it on
//! entry. No retries here, and no cancellation of in-flight calls: a late
//! result still applies cleanly through the store's dedup/no-op rules.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::api::{ApiClient, ApiError};
use crate::model::{Execution, ExecutionCreate, Task, TaskCreate, TaskPatch};
use crate::store::TaskStore;

/// Remote-backed mutations over a shared [`TaskStore`].
#[derive(Clone)]
pub struct TaskActions {
    api: ApiClient,
    store: Arc<TaskStore>,
}

impl TaskActions {
    pub fn new(api: ApiClient, store: Arc<TaskStore>) -> Self {
        Self { api, store }
    }

    pub fn store(&self) -> &Arc<TaskStore> {
        &self.store
    }

    /// Initial bulk fetch. Replaces the whole collection on success.
    pub async fn load(&self) -> Result<(), ApiError> {
        self.store.set_error(None);
        self.store.set_loading(true);
        let result = self.api.fetch_all().await;
        self.store.set_loading(false);
        match result {
            Ok(tasks) => {
                debug!(count = tasks.len(), "loaded task collection");
                self.store.replace_all(tasks);
                Ok(())
            }
            Err(e) => {
                warn!(err = %e, "initial fetch failed");
                self.store.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Create a task and insert the server-assigned record. The echoed push
    /// notification for the same creation is absorbed by the insert dedup.
    pub async fn create(&self, input: TaskCreate) -> Result<Task, ApiError> {
        self.store.set_error(None);
        match self.api.create(&input).await {
            Ok(task) => {
                self.store.insert(task.clone());
                Ok(task)
            }
            Err(e) => {
                warn!(err = %e, "create failed");
                self.store.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Patch a task: apply locally first, then reconcile with the server's
    /// authoritative record, or roll back to the pre-mutation snapshot when
    /// the call fails.
    pub async fn update(&self, id: i64, patch: TaskPatch) -> Result<Task, ApiError> {
        self.store.set_error(None);

        let snapshot = self.store.get(id);
        if let Some(before) = &snapshot {
            let mut optimistic = before.clone();
            patch.apply_to(&mut optimistic);
            self.store.replace(optimistic);
        }

        match self.api.update(id, &patch).await {
            Ok(task) => {
                // Last full write wins — the server record supersedes the
                // optimistic one.
                self.store.replace(task.clone());
                Ok(task)
            }
            Err(e) => {
                warn!(id, err = %e, "update failed — rolling back");
                if let Some(before) = snapshot {
                    self.store.replace(before);
                }
                self.store.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Delete a task: remove locally first, re-insert the snapshot when the
    /// call fails. If a peer deleted the record concurrently the re-insert
    /// resurrects it briefly; record-level last-write-wins accepts that.
    pub async fn remove(&self, id: i64) -> Result<(), ApiError> {
        self.store.set_error(None);

        let snapshot = self.store.get(id);
        self.store.remove(id);

        match self.api.delete(id).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(id, err = %e, "delete failed — rolling back");
                if let Some(before) = snapshot {
                    self.store.insert(before);
                }
                self.store.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }

    /// Record an execution fact. Executions are not held in the task store,
    /// so there is no optimistic path.
    pub async fn record_execution(
        &self,
        input: ExecutionCreate,
    ) -> Result<Execution, ApiError> {
        self.store.set_error(None);
        match self.api.create_execution(&input).await {
            Ok(execution) => Ok(execution),
            Err(e) => {
                warn!(task_id = input.task_id, err = %e, "recording execution failed");
                self.store.set_error(Some(e.to_string()));
                Err(e)
            }
        }
    }
}
