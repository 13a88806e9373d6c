use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use time::macros::offset;
use time::{Duration, OffsetDateTime, UtcOffset};

/// Minutes before the due time a reminder fires when the task leaves it unset.
pub const DEFAULT_REMINDER_OFFSET_MINUTES: u32 = 15;

/// Widest offsets `time` can represent; a due time must be viewable in both.
const OFFSET_EXTREMES: [UtcOffset; 2] = [offset!(-25:59:59), offset!(+25:59:59)];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
}

impl Priority {
    pub fn weight(self) -> u8 {
        match self {
            Self::Low => 1,
            Self::Medium => 2,
            Self::High => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Priority {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(AppError::validation(format!(
                "priority must be low, medium or high, got '{other}'"
            ))),
        }
    }
}

/// Reference to an alert held by the notification backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "Option<String>", into = "Option<String>")]
pub enum ReminderHandle {
    Present(String),
    #[default]
    Absent,
}

impl ReminderHandle {
    /// Maps the durable encoding, where an empty string means no reminder.
    pub fn from_stored(raw: &str) -> Self {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            Self::Absent
        } else {
            Self::Present(trimmed.to_string())
        }
    }

    pub fn as_stored(&self) -> &str {
        match self {
            Self::Present(handle) => handle,
            Self::Absent => "",
        }
    }

    pub fn as_deref(&self) -> Option<&str> {
        match self {
            Self::Present(handle) => Some(handle),
            Self::Absent => None,
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

impl From<Option<String>> for ReminderHandle {
    fn from(value: Option<String>) -> Self {
        value
            .as_deref()
            .map(Self::from_stored)
            .unwrap_or(Self::Absent)
    }
}

impl From<ReminderHandle> for Option<String> {
    fn from(value: ReminderHandle) -> Self {
        match value {
            ReminderHandle::Present(handle) => Some(handle),
            ReminderHandle::Absent => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub id: String,
    pub description: String,
    #[serde(with = "time::serde::rfc3339")]
    pub due_at: OffsetDateTime,
    pub priority: Priority,
    #[serde(default)]
    pub is_completed: bool,
    #[serde(default)]
    pub reminder_offset_minutes: Option<u32>,
    #[serde(default)]
    pub reminder: ReminderHandle,
}

impl Task {
    pub fn offset_or(&self, default_minutes: u32) -> u32 {
        self.reminder_offset_minutes.unwrap_or(default_minutes)
    }
}

/// The user-editable fields of a task, as submitted by the add and edit forms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskDraft {
    pub description: String,
    pub due_at: OffsetDateTime,
    pub priority: Priority,
    pub reminder_offset_minutes: Option<u32>,
}

impl TaskDraft {
    pub fn new(description: impl Into<String>, due_at: OffsetDateTime, priority: Priority) -> Self {
        Self {
            description: description.into(),
            due_at,
            priority,
            reminder_offset_minutes: None,
        }
    }

    pub fn with_offset(mut self, minutes: u32) -> Self {
        self.reminder_offset_minutes = Some(minutes);
        self
    }

    /// Trims the description and rejects drafts that would create an empty
    /// task or whose due time cannot be shown locally or reminded about.
    pub fn validate(mut self) -> Result<Self, AppError> {
        let trimmed = self.description.trim();
        if trimmed.is_empty() {
            return Err(AppError::validation("description is required"));
        }
        self.description = trimmed.to_string();

        let offset_minutes = self
            .reminder_offset_minutes
            .unwrap_or(DEFAULT_REMINDER_OFFSET_MINUTES);
        let representable = OFFSET_EXTREMES
            .iter()
            .all(|extreme| self.due_at.checked_to_offset(*extreme).is_some())
            && self
                .due_at
                .checked_sub(Duration::minutes(i64::from(offset_minutes)))
                .is_some();
        if !representable {
            return Err(AppError::validation(format!(
                "due time {} is outside the supported range",
                self.due_at
            )));
        }
        Ok(self)
    }

    pub fn into_task(self, id: String) -> Task {
        Task {
            id,
            description: self.description,
            due_at: self.due_at,
            priority: self.priority,
            is_completed: false,
            reminder_offset_minutes: self.reminder_offset_minutes,
            reminder: ReminderHandle::Absent,
        }
    }

    pub fn to_patch(&self, reminder: ReminderHandle) -> TaskPatch {
        TaskPatch {
            description: Some(self.description.clone()),
            due_at: Some(self.due_at),
            priority: Some(self.priority),
            is_completed: None,
            reminder_offset_minutes: Some(self.reminder_offset_minutes),
            reminder: Some(reminder),
        }
    }
}

impl From<&Task> for TaskDraft {
    fn from(task: &Task) -> Self {
        Self {
            description: task.description.clone(),
            due_at: task.due_at,
            priority: task.priority,
            reminder_offset_minutes: task.reminder_offset_minutes,
        }
    }
}

/// Partial update merged into an existing task; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPatch {
    pub description: Option<String>,
    pub due_at: Option<OffsetDateTime>,
    pub priority: Option<Priority>,
    pub is_completed: Option<bool>,
    pub reminder_offset_minutes: Option<Option<u32>>,
    pub reminder: Option<ReminderHandle>,
}

impl TaskPatch {
    pub fn apply(self, task: &mut Task) {
        if let Some(description) = self.description {
            task.description = description;
        }
        if let Some(due_at) = self.due_at {
            task.due_at = due_at;
        }
        if let Some(priority) = self.priority {
            task.priority = priority;
        }
        if let Some(is_completed) = self.is_completed {
            task.is_completed = is_completed;
        }
        if let Some(offset) = self.reminder_offset_minutes {
            task.reminder_offset_minutes = offset;
        }
        if let Some(reminder) = self.reminder {
            task.reminder = reminder;
        }
    }
}
