//! SQLite production backend.
//!
//! The connection is opened and configured through rusqlite. Statements are
//! driven through the raw prepare/step/finalize interface because the
//! engine needs to observe every single step result (busy, locked, schema
//! changed) and decide itself whether to retry.

use std::borrow::Cow;
use std::ffi::{CStr, CString, c_char, c_int, c_void};
use std::path::Path;
use std::ptr;
use std::rc::Rc;
use std::time::Duration;

use rusqlite::{Connection, ffi};
use tracing::{debug, info};

use super::{Backend, BackendError, BackendStatement, ErrorKind, Step, functions};
use crate::config::SqlConfig;
use crate::core::{SqlError, Value};

/// Map a (possibly extended) SQLite result code onto the error taxonomy.
pub(crate) fn classify(code: c_int, message: String) -> BackendError {
    let primary = code & 0xff;
    let kind = if code == ffi::SQLITE_BUSY_SNAPSHOT {
        ErrorKind::Deadlock
    } else {
        match primary {
            ffi::SQLITE_BUSY | ffi::SQLITE_LOCKED => ErrorKind::Busy,
            ffi::SQLITE_SCHEMA => ErrorKind::SchemaChanged,
            ffi::SQLITE_CONSTRAINT => ErrorKind::Constraint,
            _ => ErrorKind::Other,
        }
    };
    let err = BackendError::new(kind, code, message);
    if primary == ffi::SQLITE_LOCKED {
        err.with_reset()
    } else {
        err
    }
}

/// True when `sql` holds nothing but whitespace, semicolons and comments.
fn is_blank_sql(mut sql: &str) -> bool {
    loop {
        sql = sql.trim_start_matches(|c: char| c.is_whitespace() || c == ';');
        if let Some(after) = sql.strip_prefix("--") {
            sql = after.split_once('\n').map_or("", |(_, rest)| rest);
        } else if let Some(after) = sql.strip_prefix("/*") {
            // An unterminated block comment runs to the end of the input.
            sql = after.split_once("*/").map_or("", |(_, rest)| rest);
        } else {
            return sql.is_empty();
        }
    }
}

fn errmsg(db: *mut ffi::sqlite3) -> String {
    // SAFETY: db is a live handle; sqlite3_errmsg never returns NULL for one.
    unsafe { CStr::from_ptr(ffi::sqlite3_errmsg(db)) }
        .to_string_lossy()
        .into_owned()
}

/// One connection per worker. Cloning shares the connection.
#[derive(Clone)]
pub struct SqliteBackend {
    conn: Rc<Connection>,
}

impl SqliteBackend {
    /// Open (creating if needed) the database named in `config`.
    pub fn open(config: &SqlConfig) -> Result<Self, SqlError> {
        let conn = if config.is_in_memory() {
            Connection::open_in_memory()?
        } else {
            let path = Path::new(&config.database);
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            Connection::open(path)?
        };
        info!(database = %config.database, "opened database");
        Self::from_connection(conn, config)
    }

    /// Adopt an already opened connection, applying `config`'s settings.
    pub fn from_connection(conn: Connection, config: &SqlConfig) -> Result<Self, SqlError> {
        conn.busy_timeout(Duration::from_millis(config.busy_timeout_ms))?;
        if !config.is_in_memory() {
            conn.pragma_update(None, "journal_mode", &config.journal_mode)?;
        }
        conn.pragma_update(None, "foreign_keys", "ON")?;
        functions::register(&conn)?;
        debug!(
            busy_timeout_ms = config.busy_timeout_ms,
            journal_mode = %config.journal_mode,
            "configured connection"
        );
        Ok(Self {
            conn: Rc::new(conn),
        })
    }

    /// The underlying rusqlite connection, for setup the engine does not
    /// cover (extra functions, backups).
    #[must_use]
    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    fn handle(&self) -> *mut ffi::sqlite3 {
        // SAFETY: the handle stays valid for as long as self.conn lives.
        unsafe { self.conn.handle() }
    }
}

impl Backend for SqliteBackend {
    type Statement = SqliteStatement;

    fn prepare(&self, sql: &str) -> Result<Option<SqliteStatement>, BackendError> {
        let c_sql = CString::new(sql).map_err(|_| {
            BackendError::new(ErrorKind::Other, ffi::SQLITE_MISUSE, "SQL contains null bytes")
        })?;
        let db = self.handle();
        let mut stmt: *mut ffi::sqlite3_stmt = ptr::null_mut();
        let mut tail: *const c_char = ptr::null();

        // SAFETY: db is live, c_sql is NUL-terminated and outlives the call.
        let rc = unsafe { ffi::sqlite3_prepare_v2(db, c_sql.as_ptr(), -1, &raw mut stmt, &raw mut tail) };
        if rc != ffi::SQLITE_OK {
            if !stmt.is_null() {
                // SAFETY: stmt came from prepare and is not used afterwards.
                unsafe { ffi::sqlite3_finalize(stmt) };
            }
            return Err(classify(rc, errmsg(db)));
        }
        if stmt.is_null() {
            return Ok(None);
        }
        // SAFETY: tail points into c_sql, at or after its start.
        let consumed = unsafe { tail.offset_from(c_sql.as_ptr()) }.max(0) as usize;
        let rest = sql.get(consumed..).unwrap_or_default();
        if !is_blank_sql(rest) {
            // SAFETY: stmt came from prepare and is not used afterwards.
            unsafe { ffi::sqlite3_finalize(stmt) };
            return Err(BackendError::new(
                ErrorKind::Other,
                ffi::SQLITE_MISUSE,
                format!("multiple statements not supported: {}", rest.trim()),
            ));
        }
        Ok(Some(SqliteStatement {
            conn: Rc::clone(&self.conn),
            stmt,
            sql: sql.to_string(),
        }))
    }

    fn last_insert_id(&self) -> i64 {
        self.conn.last_insert_rowid()
    }

    fn changes(&self) -> u64 {
        // SAFETY: live handle.
        let changes = unsafe { ffi::sqlite3_changes(self.handle()) };
        changes.max(0) as u64
    }
}

/// A prepared SQLite statement. Finalized on drop.
pub struct SqliteStatement {
    conn: Rc<Connection>,
    stmt: *mut ffi::sqlite3_stmt,
    sql: String,
}

impl SqliteStatement {
    fn db(&self) -> *mut ffi::sqlite3 {
        // SAFETY: the connection is kept alive by self.conn.
        unsafe { self.conn.handle() }
    }

    fn check(&self, rc: c_int) -> Result<(), BackendError> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(classify(rc, errmsg(self.db())))
        }
    }
}

impl Drop for SqliteStatement {
    fn drop(&mut self) {
        // SAFETY: stmt is non-null (checked at prepare) and finalized only here.
        unsafe {
            ffi::sqlite3_finalize(self.stmt);
        }
    }
}

impl BackendStatement for SqliteStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn step(&mut self) -> Result<Step, BackendError> {
        // SAFETY: stmt is a live prepared statement.
        let rc = unsafe { ffi::sqlite3_step(self.stmt) };
        match rc & 0xff {
            ffi::SQLITE_ROW => Ok(Step::Row),
            ffi::SQLITE_DONE => Ok(Step::Done),
            _ => Err(classify(rc, errmsg(self.db()))),
        }
    }

    fn reset(&mut self) {
        // The return value repeats the last step error, which the caller
        // has already seen.
        // SAFETY: live statement.
        unsafe {
            ffi::sqlite3_reset(self.stmt);
        }
    }

    fn clear_bindings(&mut self) {
        // SAFETY: live statement.
        unsafe {
            ffi::sqlite3_clear_bindings(self.stmt);
        }
    }

    fn parameter_count(&self) -> usize {
        // SAFETY: live statement.
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.stmt) };
        count.max(0) as usize
    }

    fn bind(&mut self, index: usize, value: &Value) -> Result<(), BackendError> {
        let idx = index as c_int;
        // SAFETY: live statement; SQLITE_TRANSIENT makes SQLite copy the
        // buffers before the call returns.
        let rc = unsafe {
            match value {
                Value::Null => ffi::sqlite3_bind_null(self.stmt, idx),
                Value::Integer(i) => ffi::sqlite3_bind_int64(self.stmt, idx, *i),
                Value::Real(r) => ffi::sqlite3_bind_double(self.stmt, idx, *r),
                Value::Text(s) => ffi::sqlite3_bind_text(
                    self.stmt,
                    idx,
                    s.as_ptr().cast::<c_char>(),
                    s.len() as c_int,
                    ffi::SQLITE_TRANSIENT(),
                ),
                Value::Blob(b) => ffi::sqlite3_bind_blob(
                    self.stmt,
                    idx,
                    b.as_ptr().cast::<c_void>(),
                    b.len() as c_int,
                    ffi::SQLITE_TRANSIENT(),
                ),
            }
        };
        self.check(rc)
    }

    fn column_count(&self) -> usize {
        // SAFETY: live statement.
        let count = unsafe { ffi::sqlite3_column_count(self.stmt) };
        count.max(0) as usize
    }

    fn column_name(&self, index: usize) -> Option<String> {
        // SAFETY: live statement; the name is copied before returning.
        unsafe {
            let name = ffi::sqlite3_column_name(self.stmt, index as c_int);
            if name.is_null() {
                None
            } else {
                Some(CStr::from_ptr(name).to_string_lossy().into_owned())
            }
        }
    }

    fn column_is_null(&self, index: usize) -> bool {
        // SAFETY: live statement.
        unsafe { ffi::sqlite3_column_type(self.stmt, index as c_int) == ffi::SQLITE_NULL }
    }

    fn column_int64(&self, index: usize) -> i64 {
        // SAFETY: live statement.
        unsafe { ffi::sqlite3_column_int64(self.stmt, index as c_int) }
    }

    fn column_double(&self, index: usize) -> f64 {
        // SAFETY: live statement.
        unsafe { ffi::sqlite3_column_double(self.stmt, index as c_int) }
    }

    fn column_text(&self, index: usize) -> Option<Cow<'_, str>> {
        // SAFETY: the text pointer stays valid until the next step, reset
        // or finalize, all of which need &mut self.
        unsafe {
            let text = ffi::sqlite3_column_text(self.stmt, index as c_int);
            if text.is_null() {
                return None;
            }
            let len = ffi::sqlite3_column_bytes(self.stmt, index as c_int).max(0) as usize;
            Some(String::from_utf8_lossy(std::slice::from_raw_parts(text, len)))
        }
    }

    fn column_blob(&self, index: usize) -> Option<Cow<'_, [u8]>> {
        if self.column_is_null(index) {
            return None;
        }
        // SAFETY: as for column_text.
        unsafe {
            let blob = ffi::sqlite3_column_blob(self.stmt, index as c_int);
            if blob.is_null() {
                return Some(Cow::Borrowed(&[]));
            }
            let len = ffi::sqlite3_column_bytes(self.stmt, index as c_int).max(0) as usize;
            Some(Cow::Borrowed(std::slice::from_raw_parts(blob.cast::<u8>(), len)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SqliteBackend {
        SqliteBackend::open(&SqlConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_classify_codes() {
        assert_eq!(classify(ffi::SQLITE_BUSY, String::new()).kind, ErrorKind::Busy);
        let locked = classify(ffi::SQLITE_LOCKED, String::new());
        assert_eq!(locked.kind, ErrorKind::Busy);
        assert!(locked.needs_reset);
        assert_eq!(classify(ffi::SQLITE_BUSY_SNAPSHOT, String::new()).kind, ErrorKind::Deadlock);
        assert_eq!(classify(ffi::SQLITE_SCHEMA, String::new()).kind, ErrorKind::SchemaChanged);
        assert_eq!(
            classify(ffi::SQLITE_CONSTRAINT_UNIQUE, String::new()).kind,
            ErrorKind::Constraint
        );
        assert_eq!(classify(ffi::SQLITE_ERROR, String::new()).kind, ErrorKind::Other);
    }

    #[test]
    fn test_prepare_step_columns() {
        let db = backend();
        let mut stmt = db
            .prepare("SELECT 1, 'two', 3.5, NULL, x'0102' AS blob;")
            .unwrap()
            .unwrap();
        assert_eq!(stmt.column_count(), 5);
        assert_eq!(stmt.column_name(4).as_deref(), Some("blob"));
        assert_eq!(stmt.step().unwrap(), Step::Row);
        assert_eq!(stmt.column_int64(0), 1);
        assert_eq!(stmt.column_text(1).as_deref(), Some("two"));
        assert!((stmt.column_double(2) - 3.5).abs() < f64::EPSILON);
        assert!(stmt.column_is_null(3));
        assert!(stmt.column_text(3).is_none());
        assert_eq!(stmt.column_blob(4).as_deref(), Some(&[1_u8, 2][..]));
        assert_eq!(stmt.step().unwrap(), Step::Done);
    }

    #[test]
    fn test_prepare_empty_statement() {
        let db = backend();
        assert!(db.prepare("   ").unwrap().is_none());
        assert!(db.prepare("-- only a comment").unwrap().is_none());
    }

    #[test]
    fn test_prepare_rejects_trailing_statement() {
        let db = backend();
        let err = db
            .prepare("CREATE TABLE a (x INTEGER); CREATE TABLE b (y INTEGER);")
            .err()
            .unwrap();
        assert_eq!(err.kind, ErrorKind::Other);
        assert!(err.message.contains("multiple statements"));
        assert!(err.message.contains("CREATE TABLE b"));

        assert!(db.prepare("SELECT 1; ").unwrap().is_some());
        assert!(db.prepare("SELECT 1; -- done\n /* trailing */ ;").unwrap().is_some());
    }

    #[test]
    fn test_is_blank_sql() {
        assert!(is_blank_sql(""));
        assert!(is_blank_sql(" ;\n;"));
        assert!(is_blank_sql("-- note"));
        assert!(is_blank_sql("/* a */ -- b\n"));
        assert!(!is_blank_sql("; SELECT 2"));
        assert!(!is_blank_sql("/* a */ DROP TABLE t"));
    }

    #[test]
    fn test_prepare_syntax_error() {
        let db = backend();
        let err = db.prepare("SELEC 1;").err().unwrap();
        assert_eq!(err.kind, ErrorKind::Other);
        assert!(err.message.contains("syntax error"));
    }

    #[test]
    fn test_bind_and_reset() {
        let db = backend();
        let mut stmt = db.prepare("SELECT ?1 || ?2;").unwrap().unwrap();
        assert_eq!(stmt.parameter_count(), 2);
        stmt.bind(1, &Value::Text("ab".into())).unwrap();
        stmt.bind(2, &Value::Integer(7)).unwrap();
        assert_eq!(stmt.step().unwrap(), Step::Row);
        assert_eq!(stmt.column_text(0).as_deref(), Some("ab7"));

        stmt.reset();
        stmt.bind(2, &Value::Integer(8)).unwrap();
        assert_eq!(stmt.step().unwrap(), Step::Row);
        assert_eq!(stmt.column_text(0).as_deref(), Some("ab8"));
    }

    #[test]
    fn test_bind_out_of_range() {
        let db = backend();
        let mut stmt = db.prepare("SELECT ?1;").unwrap().unwrap();
        let err = stmt.bind(5, &Value::Null).err().unwrap();
        assert_eq!(err.kind, ErrorKind::Other);
    }

    #[test]
    fn test_constraint_classified() {
        let db = backend();
        let mut create = db
            .prepare("CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT UNIQUE);")
            .unwrap()
            .unwrap();
        assert_eq!(create.step().unwrap(), Step::Done);
        for expected in [Ok(Step::Done), Err(ErrorKind::Constraint)] {
            let mut insert = db.prepare("INSERT INTO t (name) VALUES ('a');").unwrap().unwrap();
            assert_eq!(insert.step().map_err(|e| e.kind), expected);
        }
        assert_eq!(db.changes(), 1);
        assert_eq!(db.last_insert_id(), 1);
    }
}
