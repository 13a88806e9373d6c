//! Pure projections over a task snapshot: completion, priority and calendar
//! filters plus a stable priority sort.

use crate::error::AppError;
use crate::model::{Priority, Task};
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use time::{Date, Duration, OffsetDateTime};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum PriorityFilter {
    #[default]
    All,
    Only(Priority),
}

impl FromStr for PriorityFilter {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        if raw.trim().eq_ignore_ascii_case("all") {
            return Ok(Self::All);
        }
        raw.parse().map(Self::Only)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum TimeBucket {
    Today,
    ThisWeek,
    ThisMonth,
    #[default]
    All,
}

impl TimeBucket {
    /// Whether `due_at`, seen in the offset of `now_local`, falls in the bucket.
    /// Weeks start on Monday.
    pub fn contains(self, due_at: OffsetDateTime, now_local: OffsetDateTime) -> bool {
        let today = now_local.date();
        let Some(due) = due_at.checked_to_offset(now_local.offset()) else {
            return self == Self::All;
        };
        let due = due.date();

        match self {
            Self::All => true,
            Self::Today => due == today,
            Self::ThisWeek => {
                let monday = week_start(today);
                let sunday = monday.checked_add(Duration::days(6)).unwrap_or(Date::MAX);
                monday <= due && due <= sunday
            }
            Self::ThisMonth => due.year() == today.year() && due.month() == today.month(),
        }
    }
}

fn week_start(day: Date) -> Date {
    let back = i64::from(day.weekday().number_days_from_monday());
    day.checked_sub(Duration::days(back)).unwrap_or(Date::MIN)
}

impl FromStr for TimeBucket {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().replace(['_', ' '], "-").as_str() {
            "today" => Ok(Self::Today),
            "week" | "this-week" => Ok(Self::ThisWeek),
            "month" | "this-month" => Ok(Self::ThisMonth),
            "all" => Ok(Self::All),
            other => Err(AppError::validation(format!(
                "time bucket must be today, week, month or all, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for TimeBucket {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Today => "today",
            Self::ThisWeek => "this-week",
            Self::ThisMonth => "this-month",
            Self::All => "all",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl FromStr for SortOrder {
    type Err = AppError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Self::Asc),
            "desc" => Ok(Self::Desc),
            other => Err(AppError::validation(format!(
                "sort order must be asc or desc, got '{other}'"
            ))),
        }
    }
}

pub fn filter_by_completion(tasks: &[Task], completed: bool) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| task.is_completed == completed)
        .cloned()
        .collect()
}

pub fn filter_by_priority(tasks: &[Task], filter: PriorityFilter) -> Vec<Task> {
    match filter {
        PriorityFilter::All => tasks.to_vec(),
        PriorityFilter::Only(priority) => tasks
            .iter()
            .filter(|task| task.priority == priority)
            .cloned()
            .collect(),
    }
}

pub fn filter_by_time_bucket(
    tasks: &[Task],
    bucket: TimeBucket,
    now_local: OffsetDateTime,
) -> Vec<Task> {
    tasks
        .iter()
        .filter(|task| bucket.contains(task.due_at, now_local))
        .cloned()
        .collect()
}

/// Stable: tasks of equal priority keep their relative order.
pub fn sort_by_priority(mut tasks: Vec<Task>, order: SortOrder) -> Vec<Task> {
    match order {
        SortOrder::Asc => tasks.sort_by_key(|task| task.priority.weight()),
        SortOrder::Desc => tasks.sort_by_key(|task| Reverse(task.priority.weight())),
    }
    tasks
}

pub fn is_overdue(task: &Task, now: OffsetDateTime) -> bool {
    !task.is_completed && task.due_at < now
}

/// A composed view: every filter runs first, the sort (if any) runs last.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TaskQuery {
    pub completed: Option<bool>,
    pub priority: PriorityFilter,
    pub bucket: TimeBucket,
    pub order: Option<SortOrder>,
}

impl TaskQuery {
    pub fn pending() -> Self {
        Self {
            completed: Some(false),
            ..Self::default()
        }
    }

    pub fn completed() -> Self {
        Self {
            completed: Some(true),
            ..Self::default()
        }
    }

    pub fn with_priority(mut self, priority: PriorityFilter) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_bucket(mut self, bucket: TimeBucket) -> Self {
        self.bucket = bucket;
        self
    }

    pub fn sorted(mut self, order: SortOrder) -> Self {
        self.order = Some(order);
        self
    }

    pub fn apply(&self, tasks: &[Task], now_local: OffsetDateTime) -> Vec<Task> {
        let mut view = match self.completed {
            Some(completed) => filter_by_completion(tasks, completed),
            None => tasks.to_vec(),
        };
        view = filter_by_priority(&view, self.priority);
        view = filter_by_time_bucket(&view, self.bucket, now_local);
        match self.order {
            Some(order) => sort_by_priority(view, order),
            None => view,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        PriorityFilter, SortOrder, TaskQuery, TimeBucket, filter_by_completion,
        filter_by_priority, filter_by_time_bucket, is_overdue, sort_by_priority,
    };
    use crate::model::{Priority, ReminderHandle, Task};
    use time::OffsetDateTime;
    use time::macros::{datetime, offset};

    fn task(id: &str, priority: Priority, due_at: OffsetDateTime) -> Task {
        Task {
            id: id.to_string(),
            description: id.to_string(),
            due_at,
            priority,
            is_completed: false,
            reminder_offset_minutes: None,
            reminder: ReminderHandle::Absent,
        }
    }

    fn ids(tasks: &[Task]) -> Vec<&str> {
        tasks.iter().map(|task| task.id.as_str()).collect()
    }

    // Wednesday
    const NOW: OffsetDateTime = datetime!(2025-12-17 12:00 +02:00);

    #[test]
    fn descending_sort_is_stable() {
        let tasks = vec![
            task("A", Priority::Medium, NOW),
            task("B", Priority::Medium, NOW),
            task("C", Priority::High, NOW),
        ];
        let sorted = sort_by_priority(tasks, SortOrder::Desc);
        assert_eq!(ids(&sorted), vec!["C", "A", "B"]);
    }

    #[test]
    fn ascending_sort_is_stable() {
        let tasks = vec![
            task("A", Priority::High, NOW),
            task("B", Priority::Low, NOW),
            task("C", Priority::Medium, NOW),
            task("D", Priority::Low, NOW),
        ];
        let sorted = sort_by_priority(tasks, SortOrder::Asc);
        assert_eq!(ids(&sorted), vec!["B", "D", "C", "A"]);
    }

    #[test]
    fn today_bucket_boundaries() {
        let tasks = vec![
            task("late-tonight", Priority::Low, datetime!(2025-12-17 23:59:59 +02:00)),
            task("after-midnight", Priority::Low, datetime!(2025-12-18 00:00:01 +02:00)),
            task("early-today", Priority::Low, datetime!(2025-12-17 00:00:00 +02:00)),
        ];
        let today = filter_by_time_bucket(&tasks, TimeBucket::Today, NOW);
        assert_eq!(ids(&today), vec!["late-tonight", "early-today"]);
    }

    #[test]
    fn today_uses_local_calendar_date() {
        // 22:30 UTC on the 16th is already the 17th at +02:00.
        let tasks = vec![task("a", Priority::Low, datetime!(2025-12-16 22:30 UTC))];
        assert_eq!(filter_by_time_bucket(&tasks, TimeBucket::Today, NOW).len(), 1);
    }

    #[test]
    fn week_bucket_runs_monday_to_sunday() {
        let tasks = vec![
            task("sun-before", Priority::Low, datetime!(2025-12-14 23:00 +02:00)),
            task("monday", Priority::Low, datetime!(2025-12-15 00:00 +02:00)),
            task("sunday", Priority::Low, datetime!(2025-12-21 23:59 +02:00)),
            task("next-monday", Priority::Low, datetime!(2025-12-22 00:00 +02:00)),
        ];
        let week = filter_by_time_bucket(&tasks, TimeBucket::ThisWeek, NOW);
        assert_eq!(ids(&week), vec!["monday", "sunday"]);
    }

    #[test]
    fn due_time_past_the_local_calendar_only_matches_all() {
        let tasks = vec![task("edge", Priority::Low, datetime!(9999-12-31 23:30 UTC))];
        assert!(filter_by_time_bucket(&tasks, TimeBucket::Today, NOW).is_empty());
        assert!(filter_by_time_bucket(&tasks, TimeBucket::ThisMonth, NOW).is_empty());
        assert_eq!(filter_by_time_bucket(&tasks, TimeBucket::All, NOW).len(), 1);
    }

    #[test]
    fn week_bucket_spans_month_boundary() {
        let now = datetime!(2025-12-31 08:00 UTC).to_offset(offset!(UTC));
        let tasks = vec![
            task("monday", Priority::Low, datetime!(2025-12-29 10:00 UTC)),
            task("sunday", Priority::Low, datetime!(2026-01-04 10:00 UTC)),
            task("next", Priority::Low, datetime!(2026-01-05 10:00 UTC)),
        ];
        let week = filter_by_time_bucket(&tasks, TimeBucket::ThisWeek, now);
        assert_eq!(ids(&week), vec!["monday", "sunday"]);
    }

    #[test]
    fn month_bucket_matches_year_and_month() {
        let tasks = vec![
            task("this", Priority::Low, datetime!(2025-12-01 00:00 +02:00)),
            task("last-year", Priority::Low, datetime!(2024-12-17 12:00 +02:00)),
            task("next", Priority::Low, datetime!(2026-01-01 00:00 +02:00)),
        ];
        let month = filter_by_time_bucket(&tasks, TimeBucket::ThisMonth, NOW);
        assert_eq!(ids(&month), vec!["this"]);
        assert_eq!(filter_by_time_bucket(&tasks, TimeBucket::All, NOW).len(), 3);
    }

    #[test]
    fn priority_and_completion_filters() {
        let mut done = task("done", Priority::High, NOW);
        done.is_completed = true;
        let tasks = vec![task("low", Priority::Low, NOW), done];

        assert_eq!(ids(&filter_by_completion(&tasks, true)), vec!["done"]);
        assert_eq!(ids(&filter_by_completion(&tasks, false)), vec!["low"]);
        assert_eq!(
            ids(&filter_by_priority(&tasks, PriorityFilter::Only(Priority::High))),
            vec!["done"]
        );
        assert_eq!(filter_by_priority(&tasks, PriorityFilter::All).len(), 2);
    }

    #[test]
    fn query_composes_filters_before_sort() {
        let mut done = task("done", Priority::High, NOW);
        done.is_completed = true;
        let tasks = vec![
            task("m1", Priority::Medium, NOW),
            done,
            task("tomorrow", Priority::High, datetime!(2025-12-18 09:00 +02:00)),
            task("h1", Priority::High, NOW),
            task("m2", Priority::Medium, NOW),
        ];

        let view = TaskQuery::pending()
            .with_bucket(TimeBucket::Today)
            .sorted(SortOrder::Desc)
            .apply(&tasks, NOW);
        assert_eq!(ids(&view), vec!["h1", "m1", "m2"]);

        let sort_first = sort_by_priority(tasks.clone(), SortOrder::Desc);
        let filtered_after = TaskQuery::pending()
            .with_bucket(TimeBucket::Today)
            .apply(&sort_first, NOW);
        assert_eq!(ids(&filtered_after), ids(&view));
    }

    #[test]
    fn parses_text_forms() {
        assert_eq!("all".parse::<PriorityFilter>().unwrap(), PriorityFilter::All);
        assert_eq!(
            "High".parse::<PriorityFilter>().unwrap(),
            PriorityFilter::Only(Priority::High)
        );
        assert_eq!("this_week".parse::<TimeBucket>().unwrap(), TimeBucket::ThisWeek);
        assert_eq!("month".parse::<TimeBucket>().unwrap(), TimeBucket::ThisMonth);
        assert_eq!("desc".parse::<SortOrder>().unwrap(), SortOrder::Desc);
        assert_eq!("soon".parse::<TimeBucket>().unwrap_err().code(), "validation_error");
    }

    #[test]
    fn overdue_ignores_completed() {
        let mut past = task("past", Priority::Low, datetime!(2025-12-17 08:00 +02:00));
        assert!(is_overdue(&past, NOW));
        past.is_completed = true;
        assert!(!is_overdue(&past, NOW));
    }
}
