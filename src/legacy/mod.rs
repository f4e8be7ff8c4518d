//! Abort-on-error adapter for call sites written against the old
//! contract: the database layer either succeeds or takes the process down.
//!
//! The management daemon runs one process per client connection, so an
//! abort here drops that client's connection and nothing else.

use std::borrow::Cow;
use std::panic::Location;

use tracing::error;

use crate::backend::{Backend, BackendStatement};
use crate::core::{SqlError, Value};
use crate::crypt::CryptContext;
use crate::engine::{SqlEngine, Statement};
use crate::iterator::RowIterator;

/// Log `err` and abort the process.
#[track_caller]
pub fn fatal(err: &SqlError) -> ! {
    let location = Location::caller();
    error!(%location, error = %err, "fatal database error, aborting");
    std::process::abort()
}

pub trait OrAbort<T> {
    fn or_abort(self) -> T;
}

impl<T> OrAbort<T> for Result<T, SqlError> {
    #[track_caller]
    fn or_abort(self) -> T {
        match self {
            Ok(value) => value,
            Err(err) => fatal(&err),
        }
    }
}

/// The legacy calling convention over a `SqlEngine`.
pub struct Legacy<'a, B: Backend> {
    db: &'a SqlEngine<B>,
}

impl<'a, B: Backend> Legacy<'a, B> {
    pub const fn new(db: &'a SqlEngine<B>) -> Self {
        Self { db }
    }

    #[track_caller]
    pub fn sql(&self, sql: &str, params: &[Value]) {
        self.db.sql(sql, params).or_abort();
    }

    /// Errors come back to the caller; constraint violations are the
    /// ones it is expected to look at.
    pub fn sql_error(&self, sql: &str, params: &[Value]) -> Result<(), SqlError> {
        self.db.sql_error(sql, params)
    }

    pub fn sql_giveup(&self, sql: &str, params: &[Value]) -> Result<(), SqlError> {
        self.db.sql_giveup(sql, params)
    }

    #[track_caller]
    pub fn query_int(&self, sql: &str, params: &[Value]) -> i32 {
        self.db.query_int(sql, params).or_abort()
    }

    #[track_caller]
    pub fn query_double(&self, sql: &str, params: &[Value]) -> f64 {
        self.db.query_double(sql, params).or_abort()
    }

    /// `None` for no row or NULL; aborts on errors.
    #[track_caller]
    pub fn query_string(&self, sql: &str, params: &[Value]) -> Option<String> {
        self.db.query_string(sql, params).or_abort()
    }

    /// Distinguishes "no row" (`SqlError::NoRows`) and errors, so it is
    /// passed through.
    pub fn query_int64(&self, sql: &str, params: &[Value]) -> Result<i64, SqlError> {
        self.db.query_int64(sql, params)
    }

    #[track_caller]
    pub fn iterator(&self, sql: &str, params: &[Value]) -> LegacyIterator<B::Statement> {
        LegacyIterator {
            inner: self.db.iterator(sql, params).or_abort(),
        }
    }

    #[track_caller]
    pub fn crypt_iterator(
        &self,
        sql: &str,
        params: &[Value],
        crypt: CryptContext,
    ) -> LegacyIterator<B::Statement> {
        LegacyIterator {
            inner: self.db.crypt_iterator(sql, params, crypt).or_abort(),
        }
    }

    pub fn prepared_iterator(
        &self,
        statement: Statement<B::Statement>,
    ) -> LegacyIterator<B::Statement> {
        LegacyIterator {
            inner: self.db.prepared_iterator(statement),
        }
    }
}

/// A `RowIterator` whose misuse and errors abort.
pub struct LegacyIterator<S: BackendStatement> {
    inner: RowIterator<S>,
}

impl<S: BackendStatement> LegacyIterator<S> {
    #[track_caller]
    pub fn next(&mut self) -> bool {
        self.inner.next().or_abort()
    }

    #[track_caller]
    pub fn int(&self, column: usize) -> i32 {
        self.inner.int(column).or_abort()
    }

    #[track_caller]
    pub fn int64(&self, column: usize) -> i64 {
        self.inner.int64(column).or_abort()
    }

    #[track_caller]
    pub fn double(&self, column: usize) -> f64 {
        self.inner.double(column).or_abort()
    }

    #[track_caller]
    pub fn string(&self, column: usize) -> Option<Cow<'_, str>> {
        self.inner.string(column).or_abort()
    }

    #[track_caller]
    pub fn blob(&self, column: usize) -> Option<Cow<'_, [u8]>> {
        self.inner.blob(column).or_abort()
    }

    #[track_caller]
    pub fn string_array(&self, column: usize) -> Option<Vec<String>> {
        self.inner.string_array(column).or_abort()
    }

    #[track_caller]
    pub fn decrypt(&mut self, column: usize, name: &str) -> Option<String> {
        self.inner.decrypt(column, name).or_abort()
    }

    #[track_caller]
    pub fn is_null(&self, column: usize) -> bool {
        self.inner.is_null(column).or_abort()
    }

    #[track_caller]
    pub fn column_name(&self, column: usize) -> Option<String> {
        self.inner.column_name(column).or_abort()
    }

    #[track_caller]
    pub fn column_count(&self) -> usize {
        self.inner.column_count().or_abort()
    }

    pub fn cleanup(self) {
        self.inner.cleanup();
    }

    pub fn into_statement(self) -> Statement<S> {
        self.inner.into_statement()
    }
}
