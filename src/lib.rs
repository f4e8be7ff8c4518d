// scanmgr-sql - SQL execution and iteration layer of the scan manager
// Retrying statement engine, row iterators, batch writer and quoting over SQLite

// Clippy configuration - allow non-critical warnings
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::match_same_arms)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::multiple_crate_versions)]

// Values, identifiers, errors and step outcomes
pub mod core;

// Execution-policy constants and runtime configuration
pub mod config;

// Backend seam and the SQLite implementation
pub mod backend;

// Statement engine: prepare, execute, retry, scalar queries, transactions
pub mod engine;

// Row iterator over a prepared statement
pub mod iterator;

// Multi-row INSERT accumulator
pub mod batch;

// Per-iterator decryption of credential columns
pub mod crypt;

// SQL literal quoting
pub mod quote;

// Abort-on-error adapter for the old calling convention
pub mod legacy;

// Re-export commonly used types for convenience
pub use crate::backend::{SqliteBackend, SqliteStatement};
pub use crate::batch::Batch;
pub use crate::config::{ExecutionPolicy, SqlConfig};
pub use crate::core::{GIVE_UP_ATTEMPTS, Identifier, Outcome, RetryPolicy, SqlError, Value};
pub use crate::crypt::{Cipher, CryptContext};
pub use crate::engine::{Counters, SqlEngine, Statement};
pub use crate::iterator::{IteratorState, RowIterator, cleanup_iterator};
pub use crate::legacy::{Legacy, OrAbort};
pub use crate::quote::{ascii_escape_and_quote, escape_and_quote, insert_literal, nquote, quote};
