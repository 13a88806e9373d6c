mod task;

pub use task::{
    DEFAULT_REMINDER_OFFSET_MINUTES, Priority, ReminderHandle, Task, TaskDraft, TaskPatch,
};
