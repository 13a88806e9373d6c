//! Notification plumbing: the scheduling backend contract, the durable alarm
//! queue the CLI uses as its backend, and desktop delivery.

mod alarm_queue;

pub use alarm_queue::{AlarmQueue, DeliveryFailure, DispatchOutcome, ScheduledAlarm};

use crate::error::{AppError, Result};
use crate::model::Priority;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub use linux::LinuxNotifier;

#[cfg(windows)]
mod windows;
#[cfg(windows)]
pub use windows::WindowsNotifier;

/// Data carried by a scheduled reminder and handed to the notifier when it fires.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReminderPayload {
    pub task_id: String,
    pub description: String,
    pub priority: Priority,
    #[serde(with = "time::serde::rfc3339")]
    pub due_at: OffsetDateTime,
    pub offset_minutes: u32,
    pub title: String,
    pub body: String,
}

/// External capability that fires an alert at a point in time.
#[async_trait]
pub trait NotificationBackend: Send + Sync {
    /// Schedules an alert and returns the handle used to cancel it.
    async fn schedule_at(&self, fire_at: OffsetDateTime, payload: &ReminderPayload)
    -> Result<String>;

    /// Cancels an alert. Unknown, fired or already cancelled handles are a no-op.
    async fn cancel(&self, handle: &str) -> Result<()>;

    /// Handles of alerts that have not fired yet.
    async fn list_scheduled(&self) -> Result<Vec<String>>;
}

/// Shows an alert to the user right now.
pub trait Notifier: Send + Sync {
    fn deliver(&self, payload: &ReminderPayload) -> Result<()>;
}

pub struct NoopNotifier;

impl Notifier for NoopNotifier {
    fn deliver(&self, _payload: &ReminderPayload) -> Result<()> {
        Ok(())
    }
}

pub fn notifier_from_env() -> Result<Box<dyn Notifier>> {
    if std::env::var("TASKBELL_DISABLE_NOTIFICATIONS").is_ok() {
        return Ok(Box::new(NoopNotifier));
    }

    match platform_notifier() {
        Ok(notifier) => Ok(notifier),
        Err(AppError::InvalidData(reason)) => {
            tracing::info!(%reason, "desktop notifications unavailable, using no-op notifier");
            Ok(Box::new(NoopNotifier))
        }
        Err(other) => Err(other),
    }
}

const ACTION_PREFIX: &str = "show:";

pub fn activation_argument(task_id: &str) -> String {
    format!("{ACTION_PREFIX}{task_id}")
}

pub fn parse_activation_argument(argument: &str) -> Option<String> {
    argument
        .strip_prefix(ACTION_PREFIX)
        .map(|id| id.to_string())
}

/// Opens the task behind a clicked notification in a fresh CLI process.
pub fn launch_show(task_id: &str) -> Result<()> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(exe)
        .arg("show")
        .arg(task_id)
        .spawn()?;
    Ok(())
}

#[cfg(target_os = "linux")]
pub fn platform_notifier() -> Result<Box<dyn Notifier>> {
    Ok(Box::new(LinuxNotifier))
}

#[cfg(windows)]
pub fn platform_notifier() -> Result<Box<dyn Notifier>> {
    Ok(Box::new(WindowsNotifier))
}

#[cfg(not(any(target_os = "linux", windows)))]
pub fn platform_notifier() -> Result<Box<dyn Notifier>> {
    Err(AppError::invalid_data(
        "notifications are not supported on this platform",
    ))
}
