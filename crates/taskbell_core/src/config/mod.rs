use crate::error::{AppError, Result};
use crate::model::{DEFAULT_REMINDER_OFFSET_MINUTES, Priority};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "TASKBELL_CONFIG_PATH";
const DEFAULT_DISPATCH_INTERVAL_SECS: u64 = 30;

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub default_reminder_minutes: Option<u32>,
    #[serde(default)]
    pub default_priority: Option<Priority>,
    #[serde(default)]
    pub database_path: Option<PathBuf>,
    #[serde(default)]
    pub dispatch_interval_secs: Option<u64>,
}

impl Config {
    pub fn reminder_minutes(&self) -> u32 {
        self.default_reminder_minutes
            .unwrap_or(DEFAULT_REMINDER_OFFSET_MINUTES)
    }

    /// New tasks start at low priority unless configured otherwise.
    pub fn priority(&self) -> Priority {
        self.default_priority.unwrap_or(Priority::Low)
    }

    pub fn dispatch_interval_secs(&self) -> u64 {
        self.dispatch_interval_secs
            .filter(|secs| *secs > 0)
            .unwrap_or(DEFAULT_DISPATCH_INTERVAL_SECS)
    }
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

/// One `KEY=VALUE` override, already validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigOverride {
    ReminderMinutes(u32),
    Priority(Priority),
    DatabasePath(PathBuf),
    DispatchIntervalSecs(u64),
}

pub fn config_path() -> Result<PathBuf> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join("taskbell")
            .join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("taskbell")
            .join(CONFIG_FILE_NAME))
    }
}

/// Never fails: a missing file yields defaults, a broken one yields defaults
/// plus the error so the caller can warn about it.
pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })
}

/// Lower-cases and collapses punctuation so `Reminder-Minutes` and
/// `reminder_minutes` name the same key.
pub fn canonical_key(raw: &str) -> Option<String> {
    let mut cleaned = String::new();
    let mut previous_underscore = false;

    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            cleaned.push(ch.to_ascii_lowercase());
            previous_underscore = false;
        } else if !previous_underscore && !cleaned.is_empty() {
            cleaned.push('_');
            previous_underscore = true;
        }
    }

    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

/// Parses a raw `KEY=VALUE` override string.
pub fn parse_override(raw: &str) -> Result<ConfigOverride> {
    let (key_raw, value_raw) = raw
        .trim()
        .split_once('=')
        .ok_or_else(|| AppError::validation("override must be in KEY=VALUE format"))?;
    let key = canonical_key(key_raw)
        .ok_or_else(|| AppError::validation("override key cannot be empty"))?;
    let value = value_raw.trim();

    match key.as_str() {
        "default_reminder_minutes" | "reminder_minutes" | "remind" => value
            .parse()
            .map(ConfigOverride::ReminderMinutes)
            .map_err(|_| AppError::validation("reminder minutes must be a non-negative integer")),
        "default_priority" | "priority" => value.parse().map(ConfigOverride::Priority),
        "database_path" | "database" | "db" => {
            if value.is_empty() {
                Err(AppError::validation("database path cannot be empty"))
            } else {
                Ok(ConfigOverride::DatabasePath(PathBuf::from(value)))
            }
        }
        "dispatch_interval_secs" | "dispatch_interval" | "interval" => value
            .parse()
            .map(ConfigOverride::DispatchIntervalSecs)
            .map_err(|_| AppError::validation("dispatch interval must be a whole number of seconds")),
        other => Err(AppError::validation(format!("unknown config field '{other}'"))),
    }
}

pub fn merge_overrides(base: &Config, overrides: &[ConfigOverride]) -> Config {
    let mut merged = base.clone();
    for item in overrides {
        match item {
            ConfigOverride::ReminderMinutes(minutes) => {
                merged.default_reminder_minutes = Some(*minutes)
            }
            ConfigOverride::Priority(priority) => merged.default_priority = Some(*priority),
            ConfigOverride::DatabasePath(path) => merged.database_path = Some(path.clone()),
            ConfigOverride::DispatchIntervalSecs(secs) => {
                merged.dispatch_interval_secs = Some(*secs)
            }
        }
    }
    merged
}
