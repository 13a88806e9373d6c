//! Task lifecycle orchestration.
//!
//! `TaskService` is the single writer of the task store. Every user intent
//! runs its steps strictly in sequence (validate, schedule or cancel the
//! reminder, commit to the store, mirror to durable storage). Reminder and
//! storage failures are collected in the returned [`LifecycleOutcome`]
//! instead of aborting the intent; only validation and unknown ids are
//! reported as `Err`, before any side effect.

use crate::clock::Clock;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::model::{DEFAULT_REMINDER_OFFSET_MINUTES, ReminderHandle, Task, TaskDraft, TaskPatch};
use crate::notify::NotificationBackend;
use crate::query::TaskQuery;
use crate::reminder::{ReminderScheduler, RescheduleFailure};
use crate::storage::TaskRepository;
use crate::store::{Snapshot, TaskStore};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServiceSettings {
    pub default_reminder_minutes: u32,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            default_reminder_minutes: DEFAULT_REMINDER_OFFSET_MINUTES,
        }
    }
}

impl From<&Config> for ServiceSettings {
    fn from(config: &Config) -> Self {
        Self {
            default_reminder_minutes: config.reminder_minutes(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleStep {
    Scheduling,
    Cancelling,
    Persisting,
}

impl fmt::Display for LifecycleStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Scheduling => "scheduling reminder",
            Self::Cancelling => "cancelling reminder",
            Self::Persisting => "saving to storage",
        })
    }
}

/// A step that failed without aborting the intent it belonged to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepFailure {
    pub task_id: String,
    pub step: LifecycleStep,
    pub error: AppError,
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed for {}: {}", self.step, self.task_id, self.error)
    }
}

#[derive(Debug)]
pub struct LifecycleOutcome<T> {
    pub value: T,
    pub failures: Vec<StepFailure>,
}

impl<T> LifecycleOutcome<T> {
    fn new(value: T, failures: Vec<StepFailure>) -> Self {
        Self { value, failures }
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

fn record(failures: &mut Vec<StepFailure>, task_id: &str, step: LifecycleStep, error: AppError) {
    warn!(task_id = %task_id, %step, %error, "lifecycle step degraded");
    failures.push(StepFailure {
        task_id: task_id.to_string(),
        step,
        error,
    });
}

pub struct TaskService {
    store: TaskStore,
    scheduler: ReminderScheduler,
    repository: Arc<dyn TaskRepository>,
    clock: Arc<dyn Clock>,
}

impl TaskService {
    /// Hydrates the store from durable storage and reconciles reminder
    /// handles. The service does not exist until hydration succeeds, so no
    /// mutation can run against a half-loaded store.
    pub async fn start(
        repository: Arc<dyn TaskRepository>,
        backend: Arc<dyn NotificationBackend>,
        clock: Arc<dyn Clock>,
        settings: ServiceSettings,
    ) -> Result<Self> {
        let tasks = repository.load_all().await.map_err(|err| {
            error!(error = %err, "task hydration failed");
            AppError::Hydration(err.to_string())
        })?;
        let store = TaskStore::from_tasks(tasks).map_err(|err| {
            error!(error = %err, "task hydration found conflicting rows");
            AppError::Hydration(err.to_string())
        })?;
        info!(count = store.len(), "task store hydrated");

        let scheduler =
            ReminderScheduler::new(backend, clock.clone(), settings.default_reminder_minutes);
        let mut service = Self {
            store,
            scheduler,
            repository,
            clock,
        };
        let reconciled = service.reconcile_reminders().await;
        if reconciled.value > 0 {
            info!(repaired = reconciled.value, "stale reminder handles cleared");
        }
        Ok(service)
    }

    /// Brings task handles and backend alerts back into agreement:
    ///
    /// - a handle on a completed task is cancelled and cleared;
    /// - a pending task's handle the backend no longer lists is cleared;
    /// - a live alert no pending task holds (its task was deleted or completed
    ///   while the cancel failed) is cancelled.
    ///
    /// The last two need `list_scheduled`; when it fails only the first runs.
    pub async fn reconcile_reminders(&mut self) -> LifecycleOutcome<usize> {
        let mut failures = Vec::new();
        let live: Option<HashSet<String>> = match self.scheduler.list_scheduled().await {
            Ok(handles) => Some(handles.into_iter().collect()),
            Err(err) => {
                warn!(error = %err, "cannot list scheduled reminders, skipping pending check");
                None
            }
        };

        let mut repaired = 0;
        let mut cancelled = HashSet::new();
        for task in self.store.snapshot() {
            let Some(handle) = task.reminder.as_deref() else {
                continue;
            };

            if task.is_completed {
                cancelled.insert(handle.to_string());
                if let Err(err) = self.scheduler.cancel(&task.reminder).await {
                    record(&mut failures, &task.id, LifecycleStep::Cancelling, err);
                }
            } else if !live.as_ref().is_some_and(|live| !live.contains(handle)) {
                continue;
            }

            let patch = TaskPatch {
                reminder: Some(ReminderHandle::Absent),
                ..TaskPatch::default()
            };
            if let Ok(updated) = self.store.update(&task.id, patch) {
                self.persist_update(&updated, &mut failures).await;
                repaired += 1;
            }
        }

        if let Some(live) = live {
            let held: HashSet<String> = self
                .store
                .snapshot()
                .into_iter()
                .filter(|task| !task.is_completed)
                .filter_map(|task| task.reminder.as_deref().map(str::to_string))
                .collect();
            for orphan in live.iter().filter(|h| !held.contains(*h) && !cancelled.contains(*h)) {
                let handle = ReminderHandle::Present(orphan.clone());
                match self.scheduler.cancel(&handle).await {
                    Ok(()) => {
                        info!(handle = %orphan, "orphaned alert cancelled");
                        repaired += 1;
                    }
                    Err(err) => record(&mut failures, orphan, LifecycleStep::Cancelling, err),
                }
            }
        }

        LifecycleOutcome::new(repaired, failures)
    }

    pub async fn create(&mut self, draft: TaskDraft) -> Result<LifecycleOutcome<Task>> {
        let draft = draft.validate()?;
        let mut task = draft.into_task(self.next_id());
        let mut failures = Vec::new();

        match self.scheduler.schedule(&task).await {
            Ok(handle) => task.reminder = handle,
            Err(err) => record(&mut failures, &task.id, LifecycleStep::Scheduling, err),
        }

        if let Err(err) = self.store.add(task.clone()) {
            // Do not leave an alert behind for a task that was never stored.
            if let Err(cancel_err) = self.scheduler.cancel(&task.reminder).await {
                warn!(task_id = %task.id, error = %cancel_err, "alert for rejected task left scheduled");
            }
            return Err(err);
        }

        if let Err(err) = self.repository.insert(&task).await {
            record(&mut failures, &task.id, LifecycleStep::Persisting, err);
        }

        info!(task_id = %task.id, reminder = task.reminder.is_present(), "task created");
        Ok(LifecycleOutcome::new(task, failures))
    }

    /// Replaces description, due time, priority and offset, then re-derives
    /// the reminder. Completed tasks never get a new reminder.
    pub async fn edit(&mut self, id: &str, draft: TaskDraft) -> Result<LifecycleOutcome<Task>> {
        let draft = draft.validate()?;
        let existing = self.require(id)?;
        let mut failures = Vec::new();

        let mut candidate = existing.clone();
        draft.to_patch(existing.reminder.clone()).apply(&mut candidate);

        let handle = match self.scheduler.reschedule(&existing.reminder, &candidate).await {
            Ok(handle) => handle,
            Err(RescheduleFailure::Cancel(err)) => {
                record(&mut failures, id, LifecycleStep::Cancelling, err);
                existing.reminder.clone()
            }
            Err(RescheduleFailure::Schedule(err)) => {
                record(&mut failures, id, LifecycleStep::Scheduling, err);
                ReminderHandle::Absent
            }
        };

        let task = self.store.update(id, draft.to_patch(handle))?;
        self.persist_update(&task, &mut failures).await;

        info!(task_id = %id, reminder = task.reminder.is_present(), "task edited");
        Ok(LifecycleOutcome::new(task, failures))
    }

    /// Cancels the reminder and marks the task completed as one operation.
    /// Completing an already completed task changes nothing.
    pub async fn complete(&mut self, id: &str) -> Result<LifecycleOutcome<Task>> {
        let existing = self.require(id)?;
        if existing.is_completed {
            return Ok(LifecycleOutcome::new(existing, Vec::new()));
        }

        let mut failures = Vec::new();
        if let Err(err) = self.scheduler.cancel(&existing.reminder).await {
            record(&mut failures, id, LifecycleStep::Cancelling, err);
        }

        let task = self.store.mark_completed(id)?;
        self.persist_update(&task, &mut failures).await;

        info!(task_id = %id, "task completed");
        Ok(LifecycleOutcome::new(task, failures))
    }

    pub async fn delete(&mut self, id: &str) -> Result<LifecycleOutcome<Task>> {
        let existing = self.require(id)?;
        let mut failures = Vec::new();

        if let Err(err) = self.scheduler.cancel(&existing.reminder).await {
            record(&mut failures, id, LifecycleStep::Cancelling, err);
        }

        let removed = self.store.remove(id).unwrap_or(existing);

        if let Err(err) = self.repository.delete(id).await {
            record(&mut failures, id, LifecycleStep::Persisting, err);
        }

        info!(task_id = %id, "task deleted");
        Ok(LifecycleOutcome::new(removed, failures))
    }

    /// Drops every completed task. Their reminders were cancelled when they
    /// were completed, so the backend is not consulted.
    pub async fn clear_completed(&mut self) -> LifecycleOutcome<Vec<Task>> {
        let removed = self.store.clear_completed();
        let mut failures = Vec::new();

        if let Err(err) = self.repository.delete_completed().await {
            record(&mut failures, "*", LifecycleStep::Persisting, err);
        }

        info!(removed = removed.len(), "completed tasks cleared");
        LifecycleOutcome::new(removed, failures)
    }

    /// Cancels every live reminder and removes every task.
    pub async fn clear_all(&mut self) -> LifecycleOutcome<Vec<Task>> {
        let mut failures = Vec::new();
        for task in self.store.snapshot() {
            if let Err(err) = self.scheduler.cancel(&task.reminder).await {
                record(&mut failures, &task.id, LifecycleStep::Cancelling, err);
            }
        }

        let removed = self.store.clear_all();
        if let Err(err) = self.repository.delete_all().await {
            record(&mut failures, "*", LifecycleStep::Persisting, err);
        }

        info!(removed = removed.len(), "all tasks cleared");
        LifecycleOutcome::new(removed, failures)
    }

    pub fn get(&self, id: &str) -> Option<&Task> {
        self.store.get(id)
    }

    pub fn snapshot(&self) -> Vec<Task> {
        self.store.snapshot()
    }

    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.store.subscribe()
    }

    /// Runs `query` over a snapshot taken now, in local time.
    pub fn query(&self, query: &TaskQuery) -> Vec<Task> {
        query.apply(&self.store.snapshot(), self.clock.now_local())
    }

    pub fn scheduler(&self) -> &ReminderScheduler {
        &self.scheduler
    }

    fn require(&self, id: &str) -> Result<Task> {
        self.store.get(id).cloned().ok_or_else(|| {
            warn!(task_id = %id, "intent for unknown task ignored");
            AppError::not_found(id)
        })
    }

    fn next_id(&self) -> String {
        let base = format!("task-{}", self.clock.now_utc().unix_timestamp_nanos());
        let mut candidate = base.clone();
        let mut suffix = 1;
        while self.store.contains(&candidate) {
            candidate = format!("{base}-{suffix}");
            suffix += 1;
        }
        candidate
    }

    async fn persist_update(&self, task: &Task, failures: &mut Vec<StepFailure>) {
        if let Err(err) = self.repository.update(task).await {
            record(failures, &task.id, LifecycleStep::Persisting, err);
        }
    }
}
