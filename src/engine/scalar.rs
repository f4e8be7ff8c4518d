//! Single-cell queries: the first column of the first row.

use super::{SqlEngine, Statement};
use crate::backend::{Backend, BackendStatement};
use crate::core::{Outcome, RetryPolicy, SqlError, Value};

impl<B: Backend> SqlEngine<B> {
    /// Prepare `sql` and step it to its first row, restarting on schema
    /// changes. `None` when the query yields no rows.
    pub(crate) fn first_row(
        &self,
        sql: &str,
        params: &[Value],
    ) -> Result<Option<Statement<B::Statement>>, SqlError> {
        loop {
            let mut statement = self.prepare(RetryPolicy::Forever, sql, params)?;
            match self.execute(RetryPolicy::Forever, &mut statement) {
                Outcome::Row => {
                    if statement.inner().column_count() == 0 {
                        return Err(SqlError::ColumnOutOfRange { index: 0, count: 0 });
                    }
                    return Ok(Some(statement));
                }
                Outcome::Done => return Ok(None),
                Outcome::SchemaChanged => self.executor.bump(|c| c.schema_retries += 1),
                outcome => return outcome.into_result().map(|_| None),
            }
        }
    }

    /// Integer query. No row is an error.
    pub fn query_int(&self, sql: &str, params: &[Value]) -> Result<i32, SqlError> {
        let statement = self.first_row(sql, params)?.ok_or(SqlError::NoRows)?;
        Ok(statement.inner().column_int64(0) as i32)
    }

    /// 64-bit integer query. `SqlError::NoRows` tells absence apart from 0.
    pub fn query_int64(&self, sql: &str, params: &[Value]) -> Result<i64, SqlError> {
        let statement = self.first_row(sql, params)?.ok_or(SqlError::NoRows)?;
        Ok(statement.inner().column_int64(0))
    }

    /// 64-bit integer query where no row counts as 0.
    pub fn query_int64_or_zero(&self, sql: &str, params: &[Value]) -> Result<i64, SqlError> {
        match self.query_int64(sql, params) {
            Err(SqlError::NoRows) => Ok(0),
            other => other,
        }
    }

    pub fn query_double(&self, sql: &str, params: &[Value]) -> Result<f64, SqlError> {
        let statement = self.first_row(sql, params)?.ok_or(SqlError::NoRows)?;
        Ok(statement.inner().column_double(0))
    }

    /// String query. No row and SQL NULL both give `None`.
    pub fn query_string(&self, sql: &str, params: &[Value]) -> Result<Option<String>, SqlError> {
        let Some(statement) = self.first_row(sql, params)? else {
            return Ok(None);
        };
        let text = statement.inner().column_text(0).map(|text| text.into_owned());
        Ok(text)
    }
}
