use super::{Database, TaskRepository};
use crate::error::{AppError, Result};
use crate::model::{Priority, ReminderHandle, Task};
use async_trait::async_trait;
use rusqlite::{Row, params};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::debug;

const SELECT_ALL: &str = "SELECT id, description, date, priority, isCompleted, notification_id, \
     notification_minutes_before FROM tasks ORDER BY rowid";

/// Raw column values of one `tasks` row, decoded after the query finishes so
/// that malformed data surfaces as `InvalidData` rather than a SQL error.
struct TaskRow {
    id: String,
    description: String,
    date: String,
    priority: String,
    is_completed: bool,
    notification_id: String,
    notification_minutes_before: Option<i64>,
}

impl TaskRow {
    fn read(row: &Row) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            description: row.get(1)?,
            date: row.get(2)?,
            priority: row.get(3)?,
            is_completed: row.get(4)?,
            notification_id: row.get(5)?,
            notification_minutes_before: row.get(6)?,
        })
    }

    fn decode(self) -> Result<Task> {
        let due_at = OffsetDateTime::parse(&self.date, &Rfc3339).map_err(|_| {
            AppError::invalid_data(format!("task {} has a non RFC3339 date", self.id))
        })?;
        let priority: Priority = self.priority.parse().map_err(|_| {
            AppError::invalid_data(format!(
                "task {} has unknown priority '{}'",
                self.id, self.priority
            ))
        })?;
        let reminder_offset_minutes = self
            .notification_minutes_before
            .map(u32::try_from)
            .transpose()
            .map_err(|_| {
                AppError::invalid_data(format!("task {} has a negative reminder offset", self.id))
            })?;

        Ok(Task {
            id: self.id,
            description: self.description,
            due_at,
            priority,
            is_completed: self.is_completed,
            reminder_offset_minutes,
            reminder: ReminderHandle::from_stored(&self.notification_id),
        })
    }
}

fn format_date(task: &Task) -> Result<String> {
    task.due_at
        .format(&Rfc3339)
        .map_err(|err| AppError::invalid_data(err.to_string()))
}

pub struct SqliteTaskRepository {
    db: Database,
}

impl SqliteTaskRepository {
    pub fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl TaskRepository for SqliteTaskRepository {
    async fn load_all(&self) -> Result<Vec<Task>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(SELECT_ALL)?;
            let rows = stmt
                .query_map([], TaskRow::read)?
                .collect::<rusqlite::Result<Vec<_>>>()?;
            Ok(rows)
        })?;

        let tasks = rows
            .into_iter()
            .map(TaskRow::decode)
            .collect::<Result<Vec<_>>>()?;
        debug!(count = tasks.len(), "loaded tasks from database");
        Ok(tasks)
    }

    async fn insert(&self, task: &Task) -> Result<()> {
        let date = format_date(task)?;
        self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks (id, description, date, priority, isCompleted, \
                 notification_id, notification_minutes_before) \
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7) \
                 ON CONFLICT(id) DO UPDATE SET description = excluded.description, \
                 date = excluded.date, priority = excluded.priority, \
                 isCompleted = excluded.isCompleted, notification_id = excluded.notification_id, \
                 notification_minutes_before = excluded.notification_minutes_before",
                params![
                    task.id,
                    task.description,
                    date,
                    task.priority.as_str(),
                    task.is_completed,
                    task.reminder.as_stored(),
                    task.reminder_offset_minutes,
                ],
            )?;
            Ok(())
        })?;
        debug!(task_id = %task.id, "inserted task row");
        Ok(())
    }

    async fn update(&self, task: &Task) -> Result<()> {
        let date = format_date(task)?;
        let changed = self.db.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE tasks SET description = ?2, date = ?3, priority = ?4, isCompleted = ?5, \
                 notification_id = ?6, notification_minutes_before = ?7 WHERE id = ?1",
                params![
                    task.id,
                    task.description,
                    date,
                    task.priority.as_str(),
                    task.is_completed,
                    task.reminder.as_stored(),
                    task.reminder_offset_minutes,
                ],
            )?;
            Ok(changed)
        })?;
        if changed == 0 {
            return Err(AppError::persistence(format!(
                "task {} has no durable row to update",
                task.id
            )));
        }
        debug!(task_id = %task.id, "updated task row");
        Ok(())
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.db.with_conn(|conn| {
            conn.execute("DELETE FROM tasks WHERE id = ?1", params![id])?;
            Ok(())
        })?;
        debug!(task_id = %id, "deleted task row");
        Ok(())
    }

    async fn delete_completed(&self) -> Result<usize> {
        let removed = self.db.with_conn(|conn| {
            Ok(conn.execute("DELETE FROM tasks WHERE isCompleted = 1", [])?)
        })?;
        debug!(removed, "deleted completed task rows");
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<usize> {
        let removed = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM tasks", [])?))?;
        debug!(removed, "deleted all task rows");
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteTaskRepository;
    use crate::model::{Priority, ReminderHandle, Task};
    use crate::storage::{Database, TaskRepository};
    use time::macros::datetime;

    fn task(id: &str) -> Task {
        Task {
            id: id.to_string(),
            description: format!("task {id}"),
            due_at: datetime!(2025-12-20 09:30:15 UTC),
            priority: Priority::High,
            is_completed: false,
            reminder_offset_minutes: Some(30),
            reminder: ReminderHandle::Present(format!("alarm-{id}")),
        }
    }

    #[tokio::test]
    async fn insert_then_load_preserves_fields_and_order() {
        let repo = SqliteTaskRepository::new(Database::open_in_memory().unwrap());
        let mut second = task("b");
        second.reminder_offset_minutes = None;
        second.reminder = ReminderHandle::Absent;

        repo.insert(&task("a")).await.unwrap();
        repo.insert(&second).await.unwrap();

        let loaded = repo.load_all().await.unwrap();
        assert_eq!(loaded, vec![task("a"), second]);
    }

    #[tokio::test]
    async fn insert_is_idempotent() {
        let repo = SqliteTaskRepository::new(Database::open_in_memory().unwrap());
        repo.insert(&task("a")).await.unwrap();
        repo.insert(&task("a")).await.unwrap();

        assert_eq!(repo.load_all().await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn update_rewrites_row_and_rejects_missing() {
        let repo = SqliteTaskRepository::new(Database::open_in_memory().unwrap());
        let mut row = task("a");
        repo.insert(&row).await.unwrap();

        row.is_completed = true;
        row.reminder = ReminderHandle::Absent;
        repo.update(&row).await.unwrap();
        assert_eq!(repo.load_all().await.unwrap(), vec![row]);

        let err = repo.update(&task("ghost")).await.unwrap_err();
        assert_eq!(err.code(), "persistence_failure");
    }

    #[tokio::test]
    async fn delete_completed_leaves_pending_rows() {
        let repo = SqliteTaskRepository::new(Database::open_in_memory().unwrap());
        let mut done = task("done");
        done.is_completed = true;
        repo.insert(&task("open")).await.unwrap();
        repo.insert(&done).await.unwrap();

        assert_eq!(repo.delete_completed().await.unwrap(), 1);
        let remaining: Vec<_> = repo
            .load_all()
            .await
            .unwrap()
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(remaining, vec!["open"]);

        repo.delete("open").await.unwrap();
        repo.delete("open").await.unwrap();
        assert!(repo.load_all().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn malformed_row_is_invalid_data() {
        let db = Database::open_in_memory().unwrap();
        db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO tasks VALUES ('t', 'd', 'yesterday', 'low', 0, '', NULL)",
                [],
            )?;
            Ok(())
        })
        .unwrap();

        let err = SqliteTaskRepository::new(db).load_all().await.unwrap_err();
        assert_eq!(err.code(), "invalid_data");
    }
}
