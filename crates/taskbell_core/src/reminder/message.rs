use time::OffsetDateTime;
use time::macros::format_description;

pub const REMINDER_TITLE: &str = "Task Reminder";

const MINUTES_PER_HOUR: u32 = 60;
const MINUTES_PER_DAY: u32 = 24 * MINUTES_PER_HOUR;

fn plural(count: u32, unit: &str) -> String {
    if count == 1 {
        format!("{count} {unit}")
    } else {
        format!("{count} {unit}s")
    }
}

/// "due now!" / "due in 15 minutes" / "due in 2 hours" / "due in 1 day".
pub fn lead_time_phrase(offset_minutes: u32) -> String {
    match offset_minutes {
        0 => "due now!".to_string(),
        m if m < MINUTES_PER_HOUR => format!("due in {}", plural(m, "minute")),
        m if m < MINUTES_PER_DAY => format!("due in {}", plural(m / MINUTES_PER_HOUR, "hour")),
        m => format!("due in {}", plural(m / MINUTES_PER_DAY, "day")),
    }
}

/// Short local rendering such as "Dec 20 at 9:05 AM".
pub fn format_due(due_local: OffsetDateTime) -> String {
    let format = format_description!(
        "[month repr:short] [day padding:none] at [hour repr:12 padding:none]:[minute] [period]"
    );
    due_local
        .format(&format)
        .unwrap_or_else(|_| due_local.to_string())
}

/// Notification body: lead time on the first line, due time on the second.
pub fn reminder_body(offset_minutes: u32, due_local: OffsetDateTime) -> String {
    format!(
        "Your task is {}\n{}",
        lead_time_phrase(offset_minutes),
        format_due(due_local)
    )
}

/// One-line preview shown next to the reminder picker.
pub fn reminder_preview(description: &str, offset_minutes: u32) -> String {
    format!(
        "Your task \"{description}\" is {}",
        lead_time_phrase(offset_minutes)
    )
}
