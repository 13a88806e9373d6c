//! In-memory authoritative task collection.
//!
//! The store keeps insertion order, which is the default display order, and
//! publishes an immutable snapshot to subscribers after every mutation.

use crate::error::{AppError, Result};
use crate::model::{ReminderHandle, Task, TaskPatch};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::debug;

pub type Snapshot = Arc<[Task]>;

#[derive(Debug)]
pub struct TaskStore {
    tasks: Vec<Task>,
    updates: watch::Sender<Snapshot>,
}

impl TaskStore {
    pub fn new() -> Self {
        let (updates, _) = watch::channel(Snapshot::from(Vec::new()));
        Self {
            tasks: Vec::new(),
            updates,
        }
    }

    /// Builds a store from hydrated rows, keeping their order.
    pub fn from_tasks(tasks: Vec<Task>) -> Result<Self> {
        let mut store = Self::new();
        for task in tasks {
            if store.contains(&task.id) {
                return Err(AppError::DuplicateId(task.id));
            }
            store.tasks.push(task);
        }
        store.publish();
        Ok(store)
    }

    pub fn add(&mut self, task: Task) -> Result<()> {
        if self.contains(&task.id) {
            return Err(AppError::DuplicateId(task.id));
        }
        debug!(task_id = %task.id, "store add");
        self.tasks.push(task);
        self.publish();
        Ok(())
    }

    /// Removes a task; an unknown id is not an error.
    pub fn remove(&mut self, id: &str) -> Option<Task> {
        let index = self.position(id)?;
        let removed = self.tasks.remove(index);
        debug!(task_id = %id, "store remove");
        self.publish();
        Some(removed)
    }

    pub fn update(&mut self, id: &str, patch: TaskPatch) -> Result<Task> {
        let index = self
            .position(id)
            .ok_or_else(|| AppError::not_found(id))?;
        let task = &mut self.tasks[index];
        patch.apply(task);
        let updated = task.clone();
        debug!(task_id = %id, "store update");
        self.publish();
        Ok(updated)
    }

    /// Marks the task completed and drops its reminder handle in one step.
    pub fn mark_completed(&mut self, id: &str) -> Result<Task> {
        self.update(
            id,
            TaskPatch {
                is_completed: Some(true),
                reminder: Some(ReminderHandle::Absent),
                ..TaskPatch::default()
            },
        )
    }

    pub fn clear_all(&mut self) -> Vec<Task> {
        let removed = std::mem::take(&mut self.tasks);
        self.publish();
        removed
    }

    pub fn clear_completed(&mut self) -> Vec<Task> {
        let (completed, pending): (Vec<Task>, Vec<Task>) = std::mem::take(&mut self.tasks)
            .into_iter()
            .partition(|task| task.is_completed);
        self.tasks = pending;
        debug!(removed = completed.len(), "store clear completed");
        self.publish();
        completed
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Owned copy of the current collection; later mutations do not show through it.
    pub fn snapshot(&self) -> Vec<Task> {
        self.tasks.clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.updates.subscribe()
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.tasks.iter().position(|task| task.id == id)
    }

    fn publish(&self) {
        self.updates.send_replace(Snapshot::from(self.tasks.clone()));
    }
}

impl Default for TaskStore {
    fn default() -> Self {
        Self::new()
    }
}
