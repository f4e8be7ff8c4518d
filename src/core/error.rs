use thiserror::Error;

use crate::backend::BackendError;

#[derive(Error, Debug)]
pub enum SqlError {
    #[error("Gave up after bounded retry")]
    GaveUp,
    #[error("Constraint violation: {0}")]
    Constraint(String),
    #[error("Deadlock detected: {0}")]
    Deadlock(String),
    #[error("Backend error {code}: {message}")]
    Backend { code: i32, message: String },
    #[error("Backend compiled an empty statement for: {0}")]
    EmptyStatement(String),
    #[error("Query returned no rows")]
    NoRows,
    #[error("Iterator misuse: {0}")]
    IteratorMisuse(&'static str),
    #[error("Column {index} out of range (statement has {count} columns)")]
    ColumnOutOfRange { index: usize, count: usize },
    #[error("Invalid identifier: '{0}'")]
    InvalidIdentifier(String),
    #[error("Bind error: {0}")]
    Bind(String),
    #[error("Decryption error: {0}")]
    Crypt(String),
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl SqlError {
    /// True for the conditions a caller may sensibly retry on its own.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::GaveUp | Self::Deadlock(_))
    }

    #[must_use]
    pub const fn is_constraint(&self) -> bool {
        matches!(self, Self::Constraint(_))
    }
}

impl From<BackendError> for SqlError {
    fn from(err: BackendError) -> Self {
        use crate::backend::ErrorKind;
        match err.kind {
            ErrorKind::Constraint => Self::Constraint(err.message),
            ErrorKind::Deadlock => Self::Deadlock(err.message),
            ErrorKind::Busy | ErrorKind::SchemaChanged | ErrorKind::Other => Self::Backend {
                code: err.code,
                message: err.message,
            },
        }
    }
}
