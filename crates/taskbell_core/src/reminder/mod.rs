//! Reminder scheduling: turns a task's due time and offset into at most one
//! live alert in the notification backend.

pub mod message;

use crate::clock::Clock;
use crate::error::{AppError, Result};
use crate::model::{ReminderHandle, Task};
use crate::notify::{NotificationBackend, ReminderPayload};
use std::sync::Arc;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, warn};

/// `due_at - offset`, computed on absolute instants. `None` when the result
/// falls before the earliest representable instant.
pub fn fire_time(due_at: OffsetDateTime, offset_minutes: u32) -> Option<OffsetDateTime> {
    due_at.checked_sub(Duration::minutes(i64::from(offset_minutes)))
}

/// Why a reschedule did not end with a fresh handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RescheduleFailure {
    /// The old alert could not be cancelled and may still fire; no new alert
    /// was requested.
    Cancel(AppError),
    /// The old alert is gone but scheduling the new one failed.
    Schedule(AppError),
}

pub struct ReminderScheduler {
    backend: Arc<dyn NotificationBackend>,
    clock: Arc<dyn Clock>,
    default_offset_minutes: u32,
}

impl ReminderScheduler {
    pub fn new(
        backend: Arc<dyn NotificationBackend>,
        clock: Arc<dyn Clock>,
        default_offset_minutes: u32,
    ) -> Self {
        Self {
            backend,
            clock,
            default_offset_minutes,
        }
    }

    pub fn default_offset_minutes(&self) -> u32 {
        self.default_offset_minutes
    }

    pub fn fire_time_for(&self, task: &Task) -> Option<OffsetDateTime> {
        fire_time(task.due_at, task.offset_or(self.default_offset_minutes))
    }

    fn payload_for(&self, task: &Task) -> ReminderPayload {
        let offset_minutes = task.offset_or(self.default_offset_minutes);
        let due_local = task
            .due_at
            .checked_to_offset(self.clock.local_offset())
            .unwrap_or(task.due_at);
        ReminderPayload {
            task_id: task.id.clone(),
            description: task.description.clone(),
            priority: task.priority,
            due_at: task.due_at,
            offset_minutes,
            title: message::REMINDER_TITLE.to_string(),
            body: message::reminder_body(offset_minutes, due_local),
        }
    }

    /// Requests an alert for `task`. A fire time at or before now, or a
    /// completed task, yields `Absent` without touching the backend.
    pub async fn schedule(&self, task: &Task) -> Result<ReminderHandle> {
        if task.is_completed {
            debug!(task_id = %task.id, "completed task gets no reminder");
            return Ok(ReminderHandle::Absent);
        }

        let Some(fire_at) = self.fire_time_for(task) else {
            warn!(task_id = %task.id, due_at = %task.due_at, "reminder time out of range, not scheduling");
            return Ok(ReminderHandle::Absent);
        };
        let now = self.clock.now_utc();
        if fire_at <= now {
            warn!(task_id = %task.id, %fire_at, "reminder time already passed, not scheduling");
            return Ok(ReminderHandle::Absent);
        }

        let payload = self.payload_for(task);
        let handle = self
            .backend
            .schedule_at(fire_at, &payload)
            .await
            .map_err(|err| AppError::scheduling(format!("task {}: {err}", task.id)))?;
        info!(task_id = %task.id, %handle, %fire_at, "reminder scheduled");
        Ok(ReminderHandle::Present(handle))
    }

    /// Cancels `old` before scheduling `task`, so a failure leaves zero live
    /// alerts rather than two.
    pub async fn reschedule(
        &self,
        old: &ReminderHandle,
        task: &Task,
    ) -> std::result::Result<ReminderHandle, RescheduleFailure> {
        self.cancel(old).await.map_err(RescheduleFailure::Cancel)?;
        self.schedule(task).await.map_err(RescheduleFailure::Schedule)
    }

    /// Idempotent; `Absent` never reaches the backend.
    pub async fn cancel(&self, handle: &ReminderHandle) -> Result<()> {
        let Some(handle) = handle.as_deref() else {
            return Ok(());
        };
        self.backend
            .cancel(handle)
            .await
            .map_err(|err| AppError::scheduling(format!("cancel {handle}: {err}")))?;
        debug!(%handle, "reminder cancelled");
        Ok(())
    }

    pub async fn list_scheduled(&self) -> Result<Vec<String>> {
        self.backend.list_scheduled().await
    }
}
