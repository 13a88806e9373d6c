//! Durable mirror of the task store.

mod database;
mod sqlite_store;

pub use database::Database;
pub use sqlite_store::SqliteTaskRepository;

use crate::error::{AppError, Result};
use crate::model::Task;
use async_trait::async_trait;
use std::path::PathBuf;

const DATABASE_FILE_NAME: &str = "tasks.db";
const DATABASE_ENV_VAR: &str = "TASKBELL_DB_PATH";

/// Row-per-task durable storage keyed by task id.
///
/// Every write is idempotent for a given id, so callers may retry freely.
#[async_trait]
pub trait TaskRepository: Send + Sync {
    /// Reads every row in insertion order.
    async fn load_all(&self) -> Result<Vec<Task>>;

    async fn insert(&self, task: &Task) -> Result<()>;

    async fn update(&self, task: &Task) -> Result<()>;

    async fn delete(&self, id: &str) -> Result<()>;

    async fn delete_completed(&self) -> Result<usize>;

    async fn delete_all(&self) -> Result<usize>;
}

/// Resolves the database location: env var, then configured path, then the
/// per-user default.
pub fn database_path(configured: Option<&std::path::Path>) -> Result<PathBuf> {
    if let Ok(path) = std::env::var(DATABASE_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if let Some(path) = configured {
        return Ok(path.to_path_buf());
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join("taskbell")
            .join(DATABASE_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("taskbell")
            .join(DATABASE_FILE_NAME))
    }
}
