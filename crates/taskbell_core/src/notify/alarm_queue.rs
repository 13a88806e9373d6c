use crate::error::{AppError, Result};
use crate::notify::{NotificationBackend, Notifier, ReminderPayload};
use crate::storage::Database;
use async_trait::async_trait;
use rusqlite::params;
use std::sync::atomic::{AtomicU64, Ordering};
use time::OffsetDateTime;
use tracing::{debug, info, warn};

/// Durable notification backend: pending alerts are rows in the `reminders`
/// table, delivered by whoever calls [`AlarmQueue::dispatch_due`].
pub struct AlarmQueue {
    db: Database,
    sequence: AtomicU64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledAlarm {
    pub handle: String,
    pub task_id: String,
    pub fire_at: OffsetDateTime,
    pub payload: ReminderPayload,
}

#[derive(Debug)]
pub struct DeliveryFailure {
    pub handle: String,
    pub task_id: String,
    pub error: AppError,
}

#[derive(Debug, Default)]
pub struct DispatchOutcome {
    pub delivered: Vec<ScheduledAlarm>,
    pub failures: Vec<DeliveryFailure>,
}

fn scheduling_error(err: AppError) -> AppError {
    match err {
        AppError::Persistence(message) => AppError::scheduling(message),
        other => other,
    }
}

/// Stored fire times are whole seconds, rounded up so an alarm never fires
/// before the instant it was scheduled for.
fn fire_second(fire_at: OffsetDateTime) -> i64 {
    fire_at.unix_timestamp() + i64::from(fire_at.nanosecond() > 0)
}

impl AlarmQueue {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            sequence: AtomicU64::new(0),
        }
    }

    fn next_handle(&self) -> String {
        let seq = self.sequence.fetch_add(1, Ordering::Relaxed);
        format!(
            "alarm-{}-{seq}",
            OffsetDateTime::now_utc().unix_timestamp_nanos()
        )
    }

    /// Every pending alarm, earliest first.
    pub fn scheduled(&self) -> Result<Vec<ScheduledAlarm>> {
        self.select(
            "SELECT handle, task_id, fire_at, payload FROM reminders ORDER BY fire_at, handle",
            None,
        )
    }

    /// Alarms whose fire time is at or before `now`.
    pub fn due(&self, now: OffsetDateTime) -> Result<Vec<ScheduledAlarm>> {
        self.select(
            "SELECT handle, task_id, fire_at, payload FROM reminders WHERE fire_at <= ?1 \
             ORDER BY fire_at, handle",
            Some(now.unix_timestamp()),
        )
    }

    fn select(&self, sql: &str, bound: Option<i64>) -> Result<Vec<ScheduledAlarm>> {
        let rows = self.db.with_conn(|conn| {
            let mut stmt = conn.prepare(sql)?;
            let map_row = |row: &rusqlite::Row| -> rusqlite::Result<(String, String, i64, String)> {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            };
            let rows = match bound {
                Some(value) => stmt
                    .query_map(params![value], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
                None => stmt
                    .query_map([], map_row)?
                    .collect::<rusqlite::Result<Vec<_>>>()?,
            };
            Ok(rows)
        })?;

        rows.into_iter()
            .map(|(handle, task_id, fire_at, payload)| {
                let fire_at = OffsetDateTime::from_unix_timestamp(fire_at)
                    .map_err(|err| AppError::invalid_data(err.to_string()))?;
                let payload: ReminderPayload = serde_json::from_str(&payload)
                    .map_err(|err| AppError::invalid_data(err.to_string()))?;
                Ok(ScheduledAlarm {
                    handle,
                    task_id,
                    fire_at,
                    payload,
                })
            })
            .collect()
    }

    /// Delivers every due alarm through `notifier` and removes it from the
    /// queue. A failed delivery is reported but still counts as fired.
    pub fn dispatch_due(&self, now: OffsetDateTime, notifier: &dyn Notifier) -> Result<DispatchOutcome> {
        let mut outcome = DispatchOutcome::default();

        for alarm in self.due(now)? {
            self.db.with_conn(|conn| {
                conn.execute("DELETE FROM reminders WHERE handle = ?1", params![alarm.handle])?;
                Ok(())
            })?;

            match notifier.deliver(&alarm.payload) {
                Ok(()) => {
                    info!(handle = %alarm.handle, task_id = %alarm.task_id, "reminder delivered");
                    outcome.delivered.push(alarm);
                }
                Err(error) => {
                    warn!(handle = %alarm.handle, task_id = %alarm.task_id, %error, "reminder delivery failed");
                    outcome.failures.push(DeliveryFailure {
                        handle: alarm.handle,
                        task_id: alarm.task_id,
                        error,
                    });
                }
            }
        }

        Ok(outcome)
    }
}

#[async_trait]
impl NotificationBackend for AlarmQueue {
    async fn schedule_at(
        &self,
        fire_at: OffsetDateTime,
        payload: &ReminderPayload,
    ) -> Result<String> {
        let handle = self.next_handle();
        let encoded = serde_json::to_string(payload)
            .map_err(|err| AppError::invalid_data(err.to_string()))?;
        self.db
            .with_conn(|conn| {
                conn.execute(
                    "INSERT INTO reminders (handle, task_id, fire_at, payload) VALUES (?1, ?2, ?3, ?4)",
                    params![handle, payload.task_id, fire_second(fire_at), encoded],
                )?;
                Ok(())
            })
            .map_err(scheduling_error)?;
        debug!(%handle, task_id = %payload.task_id, "alarm queued");
        Ok(handle)
    }

    async fn cancel(&self, handle: &str) -> Result<()> {
        let removed = self
            .db
            .with_conn(|conn| Ok(conn.execute("DELETE FROM reminders WHERE handle = ?1", params![handle])?))
            .map_err(scheduling_error)?;
        debug!(%handle, removed, "alarm cancelled");
        Ok(())
    }

    async fn list_scheduled(&self) -> Result<Vec<String>> {
        let handles = self
            .db
            .with_conn(|conn| {
                let mut stmt = conn.prepare("SELECT handle FROM reminders ORDER BY fire_at, handle")?;
                let handles = stmt
                    .query_map([], |row| row.get(0))?
                    .collect::<rusqlite::Result<Vec<String>>>()?;
                Ok(handles)
            })
            .map_err(scheduling_error)?;
        Ok(handles)
    }
}

#[cfg(test)]
mod tests {
    use super::AlarmQueue;
    use crate::error::{AppError, Result};
    use crate::model::Priority;
    use crate::notify::{NotificationBackend, Notifier, ReminderPayload};
    use crate::storage::Database;
    use std::sync::Mutex;
    use time::Duration;
    use time::macros::datetime;

    fn payload(task_id: &str) -> ReminderPayload {
        ReminderPayload {
            task_id: task_id.to_string(),
            description: "Buy milk".to_string(),
            priority: Priority::High,
            due_at: datetime!(2025-12-20 10:00 UTC),
            offset_minutes: 15,
            title: "Task Reminder".to_string(),
            body: "Your task is due in 15 minutes".to_string(),
        }
    }

    #[derive(Default)]
    struct Collecting {
        seen: Mutex<Vec<String>>,
        fail: bool,
    }

    impl Notifier for Collecting {
        fn deliver(&self, payload: &ReminderPayload) -> Result<()> {
            if self.fail {
                return Err(AppError::io("no notification daemon"));
            }
            self.seen.lock().unwrap().push(payload.task_id.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn schedule_list_cancel() {
        let queue = AlarmQueue::new(Database::open_in_memory().unwrap());
        let first = queue
            .schedule_at(datetime!(2025-12-20 09:45 UTC), &payload("a"))
            .await
            .unwrap();
        let second = queue
            .schedule_at(datetime!(2025-12-20 09:30 UTC), &payload("b"))
            .await
            .unwrap();

        assert_ne!(first, second);
        assert_eq!(queue.list_scheduled().await.unwrap(), vec![second.clone(), first.clone()]);

        queue.cancel(&first).await.unwrap();
        queue.cancel(&first).await.unwrap();
        queue.cancel("alarm-unknown").await.unwrap();
        assert_eq!(queue.list_scheduled().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn dispatch_delivers_only_due_alarms() {
        let queue = AlarmQueue::new(Database::open_in_memory().unwrap());
        let fire_at = datetime!(2025-12-20 09:45 UTC);
        queue.schedule_at(fire_at, &payload("due")).await.unwrap();
        let later = queue
            .schedule_at(fire_at + Duration::hours(1), &payload("later"))
            .await
            .unwrap();

        let notifier = Collecting::default();
        let outcome = queue.dispatch_due(fire_at, &notifier).unwrap();

        assert_eq!(outcome.delivered.len(), 1);
        assert!(outcome.failures.is_empty());
        assert_eq!(*notifier.seen.lock().unwrap(), vec!["due".to_string()]);
        assert_eq!(queue.list_scheduled().await.unwrap(), vec![later]);
    }

    #[tokio::test]
    async fn sub_second_fire_time_is_not_delivered_early() {
        let queue = AlarmQueue::new(Database::open_in_memory().unwrap());
        let fire_at = datetime!(2025-12-20 09:45:00.5 UTC);
        queue.schedule_at(fire_at, &payload("a")).await.unwrap();
        let notifier = Collecting::default();

        let early = queue
            .dispatch_due(datetime!(2025-12-20 09:45:00.2 UTC), &notifier)
            .unwrap();
        assert!(early.delivered.is_empty());
        let still_early = queue
            .dispatch_due(datetime!(2025-12-20 09:45:00.9 UTC), &notifier)
            .unwrap();
        assert!(still_early.delivered.is_empty());

        let fired = queue
            .dispatch_due(datetime!(2025-12-20 09:45:01 UTC), &notifier)
            .unwrap();
        assert_eq!(fired.delivered.len(), 1);
        assert_eq!(fired.delivered[0].fire_at, datetime!(2025-12-20 09:45:01 UTC));
    }

    #[tokio::test]
    async fn failed_delivery_is_reported_and_removed() {
        let queue = AlarmQueue::new(Database::open_in_memory().unwrap());
        let fire_at = datetime!(2025-12-20 09:45 UTC);
        queue.schedule_at(fire_at, &payload("a")).await.unwrap();

        let notifier = Collecting {
            fail: true,
            ..Collecting::default()
        };
        let outcome = queue.dispatch_due(fire_at + Duration::minutes(1), &notifier).unwrap();

        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].task_id, "a");
        assert!(queue.scheduled().unwrap().is_empty());
    }

    #[tokio::test]
    async fn scheduled_decodes_payload() {
        let queue = AlarmQueue::new(Database::open_in_memory().unwrap());
        let fire_at = datetime!(2025-12-20 09:45 UTC);
        let handle = queue.schedule_at(fire_at, &payload("a")).await.unwrap();

        let alarms = queue.scheduled().unwrap();
        assert_eq!(alarms.len(), 1);
        assert_eq!(alarms[0].handle, handle);
        assert_eq!(alarms[0].fire_at, fire_at);
        assert_eq!(alarms[0].payload, payload("a"));
    }
}
