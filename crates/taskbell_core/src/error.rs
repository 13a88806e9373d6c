use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AppError {
    #[error("validation_error - {0}")]
    Validation(String),
    #[error("not_found - task {0} not found")]
    NotFound(String),
    #[error("duplicate_id - task {0} already exists")]
    DuplicateId(String),
    #[error("scheduling_failure - {0}")]
    Scheduling(String),
    #[error("persistence_failure - {0}")]
    Persistence(String),
    #[error("hydration_failure - {0}")]
    Hydration(String),
    #[error("invalid_data - {0}")]
    InvalidData(String),
    #[error("io_error - {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, AppError>;

impl AppError {
    pub fn validation<M: Into<String>>(message: M) -> Self {
        Self::Validation(message.into())
    }

    pub fn not_found<M: Into<String>>(id: M) -> Self {
        Self::NotFound(id.into())
    }

    pub fn scheduling<M: Into<String>>(message: M) -> Self {
        Self::Scheduling(message.into())
    }

    pub fn persistence<M: Into<String>>(message: M) -> Self {
        Self::Persistence(message.into())
    }

    pub fn invalid_data<M: Into<String>>(message: M) -> Self {
        Self::InvalidData(message.into())
    }

    pub fn io<M: Into<String>>(message: M) -> Self {
        Self::Io(message.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation_error",
            Self::NotFound(_) => "not_found",
            Self::DuplicateId(_) => "duplicate_id",
            Self::Scheduling(_) => "scheduling_failure",
            Self::Persistence(_) => "persistence_failure",
            Self::Hydration(_) => "hydration_failure",
            Self::InvalidData(_) => "invalid_data",
            Self::Io(_) => "io_error",
        }
    }

    /// Only hydration failures block the session; everything else degrades.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Hydration(_))
    }
}

impl From<rusqlite::Error> for AppError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Persistence(err.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
