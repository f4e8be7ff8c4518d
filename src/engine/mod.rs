//! Statement engine: prepare, step, classify and retry.
//!
//! Busy/locked responses and schema changes are expected steady-state
//! conditions when several daemon processes share one database, so they
//! are retried here and never reach callers except as latency. What
//! callers do see is a `Result`; the legacy abort posture lives in
//! `crate::legacy`.

mod executor;
mod scalar;
mod statement;
mod transaction;

use std::thread;

use tracing::{error, trace, warn};

pub use executor::Counters;
pub(crate) use executor::Executor;
pub use statement::Statement;

use crate::backend::{Backend, ErrorKind, SqliteBackend};
use crate::config::{ExecutionPolicy, SqlConfig};
use crate::core::{Outcome, RetryPolicy, SqlError, Value};
use crate::crypt::CryptContext;
use crate::iterator::RowIterator;

pub struct SqlEngine<B: Backend> {
    backend: B,
    executor: Executor,
}

impl SqlEngine<SqliteBackend> {
    /// Open the SQLite database named by `config`.
    pub fn open(config: &SqlConfig) -> Result<Self, SqlError> {
        let backend = SqliteBackend::open(config)?;
        Ok(Self::new(backend, config.execution_policy()))
    }
}

impl<B: Backend> SqlEngine<B> {
    pub fn new(backend: B, policy: ExecutionPolicy) -> Self {
        Self {
            backend,
            executor: Executor::new(policy),
        }
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn policy(&self) -> ExecutionPolicy {
        self.executor.policy
    }

    pub fn counters(&self) -> Counters {
        self.executor.counters()
    }

    /// Compile `sql` and bind `params`.
    ///
    /// Busy responses are retried per `retry`; under `RetryPolicy::Bounded`
    /// exhaustion yields `SqlError::GaveUp`.
    pub fn prepare(
        &self,
        retry: RetryPolicy,
        sql: &str,
        params: &[Value],
    ) -> Result<Statement<B::Statement>, SqlError> {
        trace!(sql, "prepare");
        let mut attempt = 0;
        let inner = loop {
            match self.backend.prepare(sql) {
                Ok(Some(inner)) => break inner,
                Ok(None) => {
                    error!(sql, "backend compiled no statement");
                    return Err(SqlError::EmptyStatement(sql.to_string()));
                }
                Err(err) if matches!(err.kind, ErrorKind::Busy | ErrorKind::SchemaChanged) => {
                    attempt += 1;
                    if !self.executor.retry_busy(retry, attempt) {
                        return Err(SqlError::GaveUp);
                    }
                }
                Err(err) => {
                    if self.executor.policy.log_errors {
                        warn!(sql, error = %err, "prepare failed");
                    }
                    return Err(err.into());
                }
            }
        };
        let mut statement = Statement::new(inner);
        statement.bind_all(params)?;
        Ok(statement)
    }

    /// Step `statement` once. Busy responses are absorbed per `retry`.
    pub fn execute(&self, retry: RetryPolicy, statement: &mut Statement<B::Statement>) -> Outcome {
        self.executor.execute(retry, statement)
    }

    /// Run a statement to completion, discarding any rows.
    ///
    /// A schema change re-prepares and reruns the statement under
    /// `RetryPolicy::Forever`, and gives up under `RetryPolicy::Bounded`.
    /// The statement is finalized on every path.
    pub fn sqlv(&self, retry: RetryPolicy, sql: &str, params: &[Value]) -> Result<(), SqlError> {
        loop {
            let mut statement = self.prepare(retry, sql, params)?;
            loop {
                match self.execute(retry, &mut statement) {
                    Outcome::Row => {}
                    Outcome::Done => return Ok(()),
                    Outcome::SchemaChanged if retry == RetryPolicy::Forever => {
                        self.executor.bump(|c| c.schema_retries += 1);
                        break;
                    }
                    outcome => return outcome.into_result().map(|_| ()),
                }
            }
        }
    }

    /// Run a statement, retrying busy conditions and deadlocks for as long
    /// as it takes.
    ///
    /// Under sustained contention this can block indefinitely; past the
    /// configured threshold of consecutive deadlocks one warning is logged.
    pub fn sql(&self, sql: &str, params: &[Value]) -> Result<(), SqlError> {
        self.retry_deadlocks(sql, || self.sqlv(RetryPolicy::Forever, sql, params))
            .inspect_err(|err| {
                if err.is_constraint() && self.executor.policy.log_errors {
                    warn!(sql, error = %err, "unexpected constraint violation");
                }
            })
    }

    /// Like `sql`, for callers that check unique constraints: a violation
    /// comes back as `SqlError::Constraint`, and is only logged at debug.
    pub fn sql_error(&self, sql: &str, params: &[Value]) -> Result<(), SqlError> {
        self.retry_deadlocks(sql, || self.sqlv(RetryPolicy::Forever, sql, params))
    }

    /// Run a statement with bounded busy retry and no deadlock retry, so
    /// the caller can pace its own retries.
    pub fn sql_giveup(&self, sql: &str, params: &[Value]) -> Result<(), SqlError> {
        self.sqlv(RetryPolicy::Bounded, sql, params)
    }

    fn retry_deadlocks<T>(
        &self,
        sql: &str,
        mut run: impl FnMut() -> Result<T, SqlError>,
    ) -> Result<T, SqlError> {
        let policy = self.executor.policy;
        let mut deadlocks: u32 = 0;
        loop {
            match run() {
                Err(SqlError::Deadlock(message)) => {
                    deadlocks += 1;
                    self.executor.bump(|c| c.deadlock_retries += 1);
                    if deadlocks == policy.deadlock_warn_threshold.saturating_add(1) {
                        self.executor.bump(|c| c.deadlock_warnings += 1);
                        warn!(sql, deadlocks, %message, "deadlocks detected, waiting and retrying");
                    }
                    if !policy.deadlock_sleep.is_zero() {
                        thread::sleep(policy.deadlock_sleep);
                    }
                }
                result => return result,
            }
        }
    }

    /// Start iterating the rows of `sql`.
    pub fn iterator(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<RowIterator<B::Statement>, SqlError> {
        let statement = self.prepare(RetryPolicy::Forever, sql, params)?;
        Ok(RowIterator::new(statement, self.executor.clone(), None))
    }

    /// Start iterating the rows of `sql`, with `crypt` available for
    /// encrypted columns. The iterator owns the context from here on.
    pub fn crypt_iterator(
        &self,
        sql: &str,
        params: &[Value],
        crypt: CryptContext,
    ) -> Result<RowIterator<B::Statement>, SqlError> {
        let statement = self.prepare(RetryPolicy::Forever, sql, params)?;
        Ok(RowIterator::new(statement, self.executor.clone(), Some(crypt)))
    }

    /// Iterate an already prepared statement, for instance one being driven
    /// a second time after `RowIterator::into_statement`.
    pub fn prepared_iterator(&self, statement: Statement<B::Statement>) -> RowIterator<B::Statement> {
        RowIterator::new(statement, self.executor.clone(), None)
    }

    pub fn last_insert_id(&self) -> i64 {
        self.backend.last_insert_id()
    }

    pub fn changes(&self) -> u64 {
        self.backend.changes()
    }
}
