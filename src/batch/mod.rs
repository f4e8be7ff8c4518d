//! Multi-row INSERT accumulation.
//!
//! The batch does not know the column layout; it only counts rows and
//! decides when the accumulated text is executed. Usage:
//!
//! ```ignore
//! let table = Identifier::new("nvts")?;
//! let columns = [Identifier::new("oid")?, Identifier::new("name")?];
//! let mut batch = Batch::start(500);
//! for nvt in nvts {
//!     if batch.check(&db)? {
//!         batch.push_insert_header(&table, &columns);
//!     } else {
//!         batch.push_str(", ");
//!     }
//!     write!(batch, "({}, {})", insert_literal(Some(&nvt.oid)), insert_literal(nvt.name.as_deref()))?;
//! }
//! batch.close(&db)?;
//! ```

use std::fmt;

use tracing::debug;

use crate::backend::Backend;
use crate::core::{Identifier, SqlError};
use crate::engine::SqlEngine;

pub struct Batch {
    buffer: String,
    count: usize,
    max_rows: usize,
    flushes: usize,
}

impl Batch {
    /// Start a batch flushing every `max_rows` rows; 0 means never flush
    /// before `close`.
    #[must_use]
    pub const fn start(max_rows: usize) -> Self {
        Self {
            buffer: String::new(),
            count: 0,
            max_rows,
            flushes: 0,
        }
    }

    /// Account for one more row, flushing first if the batch is full.
    ///
    /// Returns `true` when the caller must write the statement header
    /// before the row, `false` when it continues the value list.
    pub fn check<B: Backend>(&mut self, db: &SqlEngine<B>) -> Result<bool, SqlError> {
        self.count += 1;
        if self.count == 1 {
            return Ok(true);
        }
        if self.max_rows > 0 && self.count > self.max_rows {
            // On failure the flushed rows are dropped and the batch starts
            // over, so the next check asks for a header again.
            self.flush(db)?;
            self.count = 1;
            return Ok(true);
        }
        Ok(false)
    }

    /// Write `INSERT INTO "table" ("col", ...) VALUES ` as the header.
    pub fn push_insert_header(&mut self, table: &Identifier, columns: &[Identifier]) {
        let columns = columns
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        self.buffer.push_str("INSERT INTO ");
        self.buffer.push_str(&table.to_string());
        self.buffer.push_str(" (");
        self.buffer.push_str(&columns);
        self.buffer.push_str(") VALUES ");
    }

    pub fn push_str(&mut self, text: &str) {
        self.buffer.push_str(text);
    }

    /// The statement text accumulated since the last flush.
    #[must_use]
    pub fn pending(&self) -> &str {
        &self.buffer
    }

    /// Rows accumulated since the last flush.
    #[must_use]
    pub const fn rows(&self) -> usize {
        self.count
    }

    #[must_use]
    pub const fn flushes(&self) -> usize {
        self.flushes
    }

    /// Execute whatever is left and release the buffer.
    pub fn close<B: Backend>(mut self, db: &SqlEngine<B>) -> Result<(), SqlError> {
        if self.count > 0 {
            self.flush(db)?;
        }
        Ok(())
    }

    fn flush<B: Backend>(&mut self, db: &SqlEngine<B>) -> Result<(), SqlError> {
        let rows = if self.max_rows > 0 {
            self.count.min(self.max_rows)
        } else {
            self.count
        };
        let mut sql = std::mem::take(&mut self.buffer);
        self.count = 0;
        if sql.trim().is_empty() {
            return Ok(());
        }
        sql.push(';');
        db.sql(&sql, &[])?;
        self.flushes += 1;
        debug!(rows, flushes = self.flushes, "flushed batch");
        Ok(())
    }
}

impl fmt::Write for Batch {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.buffer.push_str(s);
        Ok(())
    }
}
