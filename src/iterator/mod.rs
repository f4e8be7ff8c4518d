//! Forward-only cursor over the rows of one prepared statement.
//!
//! States: `Fresh` until the first `next`, `HasRow` while a row is
//! current, `Exhausted` once the statement is done. Column access is only
//! valid in `HasRow`; anything else is reported as misuse instead of
//! returning a made-up value.

use std::borrow::Cow;

use tracing::{debug, warn};

use crate::backend::BackendStatement;
use crate::core::{Outcome, RetryPolicy, SqlError};
use crate::crypt::CryptContext;
use crate::engine::{Executor, Statement};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    Fresh,
    HasRow,
    Exhausted,
}

pub struct RowIterator<S: BackendStatement> {
    statement: Statement<S>,
    executor: Executor,
    state: IteratorState,
    crypt: Option<CryptContext>,
}

impl<S: BackendStatement> RowIterator<S> {
    pub(crate) const fn new(
        statement: Statement<S>,
        executor: Executor,
        crypt: Option<CryptContext>,
    ) -> Self {
        Self {
            statement,
            executor,
            state: IteratorState::Fresh,
            crypt,
        }
    }

    pub const fn state(&self) -> IteratorState {
        self.state
    }

    pub fn sql(&self) -> &str {
        self.statement.sql()
    }

    /// Advance to the next row. `Ok(false)` once the rows are used up, and
    /// from then on without touching the backend.
    ///
    /// A schema change before the first row resets the statement rather
    /// than finalizing and preparing it again: the backend recompiles a
    /// reset statement against the new schema on its next step. After the
    /// first row it ends the iteration with an error.
    pub fn next(&mut self) -> Result<bool, SqlError> {
        if self.state == IteratorState::Exhausted {
            return Ok(false);
        }
        if let Some(crypt) = self.crypt.as_mut() {
            crypt.flush();
        }
        loop {
            match self.executor.execute(RetryPolicy::Forever, &mut self.statement) {
                Outcome::Row => {
                    self.state = IteratorState::HasRow;
                    return Ok(true);
                }
                Outcome::Done => {
                    self.state = IteratorState::Exhausted;
                    return Ok(false);
                }
                Outcome::SchemaChanged if self.state == IteratorState::Fresh => {
                    // Nothing was read yet, so starting over is invisible.
                    debug!(sql = self.statement.sql(), "schema changed, restarting iterator");
                    self.executor.bump(|c| c.schema_retries += 1);
                    self.statement.reset();
                }
                outcome => {
                    self.state = IteratorState::Exhausted;
                    return outcome.into_result().map(|_| false);
                }
            }
        }
    }

    fn current(&self, column: usize) -> Result<&S, SqlError> {
        match self.state {
            IteratorState::Fresh => Err(SqlError::IteratorMisuse("column read before first row")),
            IteratorState::Exhausted => {
                Err(SqlError::IteratorMisuse("column read after iterator was exhausted"))
            }
            IteratorState::HasRow => {
                let inner = self.statement.inner();
                let count = inner.column_count();
                if column >= count {
                    return Err(SqlError::ColumnOutOfRange { index: column, count });
                }
                Ok(inner)
            }
        }
    }

    pub fn int(&self, column: usize) -> Result<i32, SqlError> {
        Ok(self.current(column)?.column_int64(column) as i32)
    }

    pub fn int64(&self, column: usize) -> Result<i64, SqlError> {
        Ok(self.current(column)?.column_int64(column))
    }

    pub fn double(&self, column: usize) -> Result<f64, SqlError> {
        Ok(self.current(column)?.column_double(column))
    }

    /// Text of the column, `None` for SQL NULL. Borrowed until the next
    /// advance.
    pub fn string(&self, column: usize) -> Result<Option<Cow<'_, str>>, SqlError> {
        Ok(self.current(column)?.column_text(column))
    }

    pub fn blob(&self, column: usize) -> Result<Option<Cow<'_, [u8]>>, SqlError> {
        Ok(self.current(column)?.column_blob(column))
    }

    pub fn is_null(&self, column: usize) -> Result<bool, SqlError> {
        Ok(self.current(column)?.column_is_null(column))
    }

    /// A column holding a JSON array (as built by `json_group_array`).
    /// NULL elements are skipped, non-string elements rendered as JSON.
    pub fn string_array(&self, column: usize) -> Result<Option<Vec<String>>, SqlError> {
        let Some(text) = self.current(column)?.column_text(column) else {
            return Ok(None);
        };
        let items: Vec<serde_json::Value> = serde_json::from_str(&text)?;
        Ok(Some(
            items
                .into_iter()
                .filter(|item| !item.is_null())
                .map(|item| match item {
                    serde_json::Value::String(s) => s,
                    other => other.to_string(),
                })
                .collect(),
        ))
    }

    pub fn column_name(&self, column: usize) -> Result<Option<String>, SqlError> {
        Ok(self.current(column)?.column_name(column))
    }

    pub fn column_count(&self) -> Result<usize, SqlError> {
        match self.state {
            IteratorState::HasRow => Ok(self.statement.inner().column_count()),
            _ => Err(SqlError::IteratorMisuse("column count read without a current row")),
        }
    }

    /// Decrypt field `name` of the credential blob in `column`.
    pub fn decrypt(&mut self, column: usize, name: &str) -> Result<Option<String>, SqlError> {
        let Some(ciphertext) = self
            .current(column)?
            .column_text(column)
            .map(Cow::into_owned)
        else {
            return Ok(None);
        };
        let crypt = self
            .crypt
            .as_mut()
            .ok_or_else(|| SqlError::Crypt("iterator has no decryption context".to_string()))?;
        crypt.decrypt(&ciphertext, name)
    }

    /// Release the statement and the decryption context.
    pub fn cleanup(self) {
        drop(self);
    }

    /// Give the statement back, rewound, so it can be driven again through
    /// `SqlEngine::prepared_iterator`.
    pub fn into_statement(mut self) -> Statement<S> {
        self.statement.reset();
        self.statement
    }
}

/// Clean up an iterator that may never have been created.
pub fn cleanup_iterator<S: BackendStatement>(iterator: Option<RowIterator<S>>) {
    match iterator {
        Some(iterator) => iterator.cleanup(),
        None => warn!("cleanup_iterator called without an iterator"),
    }
}
