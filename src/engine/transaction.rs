use super::SqlEngine;
use crate::backend::Backend;
use crate::core::SqlError;

impl<B: Backend> SqlEngine<B> {
    pub fn begin_immediate(&self) -> Result<(), SqlError> {
        self.sql("BEGIN IMMEDIATE;", &[])
    }

    pub fn begin_exclusive(&self) -> Result<(), SqlError> {
        self.sql("BEGIN EXCLUSIVE;", &[])
    }

    /// Try to take the exclusive lock with bounded retry.
    ///
    /// Returns `false` when another connection held on to it.
    pub fn begin_exclusive_giveup(&self) -> Result<bool, SqlError> {
        match self.sql_giveup("BEGIN EXCLUSIVE;", &[]) {
            Ok(()) => Ok(true),
            Err(SqlError::GaveUp) => Ok(false),
            Err(err) => Err(err),
        }
    }

    pub fn commit(&self) -> Result<(), SqlError> {
        self.sql("COMMIT;", &[])
    }

    pub fn rollback(&self) -> Result<(), SqlError> {
        self.sql("ROLLBACK;", &[])
    }
}
