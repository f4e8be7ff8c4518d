//! Backend seam: the narrow prepare/step/column interface the engine and
//! iterators are written against.
//!
//! A statement produced by a backend keeps whatever it needs of the
//! connection alive, and is finalized exactly once when dropped.

pub mod functions;
pub mod sqlite;

#[cfg(test)]
pub(crate) mod scripted;

use std::borrow::Cow;

use crate::core::Value;

pub use sqlite::{SqliteBackend, SqliteStatement};

/// Four-way classification of backend failures plus everything else.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Busy or locked by another connection; retryable.
    Busy,
    /// A concurrent schema change invalidated the statement.
    SchemaChanged,
    Constraint,
    /// Writer conflict that needs the statement restarted after a pause.
    Deadlock,
    Other,
}

#[derive(Debug, Clone)]
pub struct BackendError {
    pub kind: ErrorKind,
    /// Backend-specific numeric code, informational only.
    pub code: i32,
    pub message: String,
    /// The statement must be reset before it can be stepped again.
    pub needs_reset: bool,
}

impl BackendError {
    pub fn new(kind: ErrorKind, code: i32, message: impl Into<String>) -> Self {
        Self {
            kind,
            code,
            message: message.into(),
            needs_reset: false,
        }
    }

    #[must_use]
    pub const fn with_reset(mut self) -> Self {
        self.needs_reset = true;
        self
    }
}

impl std::fmt::Display for BackendError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({:?}, code {})", self.message, self.kind, self.code)
    }
}

/// Result of stepping a statement once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Row,
    Done,
}

/// A compiled statement owned by exactly one caller.
///
/// Column accessors follow the backend's own conversion rules and are only
/// meaningful after `step` returned `Step::Row`; the engine guards that.
pub trait BackendStatement {
    fn sql(&self) -> &str;

    fn step(&mut self) -> Result<Step, BackendError>;

    /// Rewind to before the first row. Bindings are kept.
    fn reset(&mut self);

    fn clear_bindings(&mut self);

    fn parameter_count(&self) -> usize;

    /// Bind a value to the 1-based parameter `index`.
    fn bind(&mut self, index: usize, value: &Value) -> Result<(), BackendError>;

    fn column_count(&self) -> usize;

    fn column_name(&self, index: usize) -> Option<String>;

    fn column_is_null(&self, index: usize) -> bool;

    fn column_int64(&self, index: usize) -> i64;

    fn column_double(&self, index: usize) -> f64;

    fn column_text(&self, index: usize) -> Option<Cow<'_, str>>;

    fn column_blob(&self, index: usize) -> Option<Cow<'_, [u8]>>;
}

/// A connection to the relational store.
pub trait Backend {
    type Statement: BackendStatement;

    /// Compile `sql`. `Ok(None)` means the backend accepted the text but
    /// produced no statement (empty or comment-only input).
    fn prepare(&self, sql: &str) -> Result<Option<Self::Statement>, BackendError>;

    /// Row id of the most recent successful INSERT on this connection.
    fn last_insert_id(&self) -> i64;

    /// Rows modified by the most recently completed statement.
    fn changes(&self) -> u64;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_error_reset_flag() {
        let err = BackendError::new(ErrorKind::Busy, 6, "database table is locked");
        assert!(!err.needs_reset);
        assert!(err.with_reset().needs_reset);
    }

    #[test]
    fn test_backend_error_display() {
        let err = BackendError::new(ErrorKind::Constraint, 2067, "UNIQUE constraint failed: t.a");
        assert_eq!(
            err.to_string(),
            "UNIQUE constraint failed: t.a (Constraint, code 2067)"
        );
    }
}
