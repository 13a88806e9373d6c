use clap::{Parser, Subcommand};
use taskbell_core::error::AppError;
use taskbell_core::model::Priority;
use taskbell_core::query::{PriorityFilter, SortOrder, TimeBucket};
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time, UtcOffset};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Output JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Override configuration values (format KEY=VALUE)
    #[arg(long = "config-override", value_name = "KEY=VALUE", global = true)]
    pub config_override: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Add a new task
    ///
    /// Example: taskbell add "Buy milk" --due "2025-12-20 11:00" --priority high --remind 15
    Add {
        description: Option<String>,
        /// Due time: RFC3339, "YYYY-MM-DD HH:MM[:SS]" or "YYYY-MM-DD" (local time)
        #[arg(long)]
        due: String,
        #[arg(long)]
        priority: Option<Priority>,
        /// Minutes before the due time to fire the reminder
        #[arg(long, value_name = "MINUTES")]
        remind: Option<u32>,
    },
    /// Edit a task; omitted fields keep their current value
    ///
    /// Example: taskbell edit task-1 --due "2025-12-21 09:00" --remind 60
    Edit {
        id: String,
        #[arg(long)]
        description: Option<String>,
        #[arg(long)]
        due: Option<String>,
        #[arg(long)]
        priority: Option<Priority>,
        #[arg(long, value_name = "MINUTES")]
        remind: Option<u32>,
    },
    /// Mark a task as completed and cancel its reminder
    ///
    /// Example: taskbell done task-1
    Done {
        id: String,
    },
    /// Delete a task and cancel its reminder
    ///
    /// Example: taskbell delete task-1
    Delete {
        id: String,
    },
    /// Remove every completed task
    ClearCompleted,
    /// Remove every task and cancel all reminders
    ClearAll,
    /// Show details of a task
    ///
    /// Example: taskbell show task-1
    Show {
        id: String,
    },
    /// List tasks
    ///
    /// Example: taskbell list --priority high --bucket week --sort desc
    List {
        /// List completed tasks instead of pending ones
        #[arg(long, conflicts_with = "all")]
        completed: bool,
        /// List pending and completed tasks together
        #[arg(long)]
        all: bool,
        #[arg(long, default_value = "all")]
        priority: PriorityFilter,
        /// today, week, month or all
        #[arg(long, default_value = "all")]
        bucket: TimeBucket,
        /// Sort by priority: asc or desc
        #[arg(long)]
        sort: Option<SortOrder>,
    },
    /// List reminders waiting to fire
    Reminders,
    /// Send notifications for reminders that are due
    ///
    /// Example: taskbell notify --at "2025-12-20 18:00"
    Notify {
        /// Deliver reminders due by this time instead of now
        #[arg(long)]
        at: Option<String>,
    },
    /// Keep sending due notifications until interrupted
    Watch,
}

/// Parses a user supplied due time. Inputs without an offset are read in
/// `local`; a bare date means midnight.
pub fn parse_due(raw: &str, local: UtcOffset) -> Result<OffsetDateTime, AppError> {
    let trimmed = raw.trim();
    if let Ok(parsed) = OffsetDateTime::parse(trimmed, &Rfc3339) {
        return Ok(parsed);
    }

    let with_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");
    let without_seconds = format_description!("[year]-[month]-[day] [hour]:[minute]");
    let date_only = format_description!("[year]-[month]-[day]");

    let naive = PrimitiveDateTime::parse(trimmed, &with_seconds)
        .or_else(|_| PrimitiveDateTime::parse(trimmed, &without_seconds))
        .or_else(|_| {
            Date::parse(trimmed, &date_only).map(|date| PrimitiveDateTime::new(date, Time::MIDNIGHT))
        })
        .map_err(|_| {
            AppError::validation(format!(
                "invalid due time '{trimmed}', expected YYYY-MM-DD [HH:MM[:SS]] or RFC3339"
            ))
        })?;

    Ok(naive.assume_offset(local))
}
