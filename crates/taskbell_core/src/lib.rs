pub mod clock;
pub mod config;
pub mod error;
pub mod model;
pub mod notify;
pub mod query;
pub mod reminder;
pub mod storage;
pub mod store;
pub mod task_api;

#[cfg(test)]
mod tests {
    use crate::error::AppError;
    use crate::model::{Priority, ReminderHandle, Task};
    use time::macros::datetime;

    #[test]
    fn task_has_required_fields() {
        let task = Task {
            id: "task-1".to_string(),
            description: "demo".to_string(),
            due_at: datetime!(2025-12-20 00:00 UTC),
            priority: Priority::Low,
            is_completed: false,
            reminder_offset_minutes: None,
            reminder: ReminderHandle::Absent,
        };

        assert_eq!(task.id, "task-1");
        assert_eq!(task.description, "demo");
        assert_eq!(task.priority, Priority::Low);
        assert!(!task.is_completed);
        assert_eq!(task.offset_or(15), 15);
        assert!(!task.reminder.is_present());
    }

    #[test]
    fn app_error_exposes_code() {
        let err = AppError::validation("description is required");
        assert_eq!(err.code(), "validation_error");
    }
}
