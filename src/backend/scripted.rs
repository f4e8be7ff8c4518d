//! Scripted in-memory backend for unit tests.
//!
//! Result sets are registered per SQL text. Failures can be queued for the
//! next prepare or step calls, and every call is counted so tests can
//! assert exactly how often the backend was touched.

use std::borrow::Cow;
use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use super::{Backend, BackendError, BackendStatement, ErrorKind, Step};
use crate::core::Value;

#[derive(Default)]
pub(crate) struct Script {
    pub results: HashMap<String, (Vec<String>, Vec<Vec<Value>>)>,
    pub prepare_errors: VecDeque<BackendError>,
    pub step_errors: VecDeque<BackendError>,
    pub always_busy: bool,
    pub prepares: usize,
    pub steps: usize,
    pub resets: usize,
    pub finalized: usize,
    /// SQL of every statement that was stepped to completion, in order.
    pub completed: Vec<String>,
    pub last_insert_id: i64,
}

#[derive(Clone, Default)]
pub(crate) struct ScriptedBackend {
    pub script: Rc<RefCell<Script>>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(self, sql: &str, columns: &[&str], rows: Vec<Vec<Value>>) -> Self {
        self.script.borrow_mut().results.insert(
            sql.to_string(),
            (columns.iter().map(|c| (*c).to_string()).collect(), rows),
        );
        self
    }

    pub fn fail_prepare(&self, kind: ErrorKind, times: usize) {
        let mut script = self.script.borrow_mut();
        for _ in 0..times {
            script.prepare_errors.push_back(error(kind));
        }
    }

    pub fn fail_step(&self, kind: ErrorKind, times: usize) {
        let mut script = self.script.borrow_mut();
        for _ in 0..times {
            script.step_errors.push_back(error(kind));
        }
    }

    pub fn set_always_busy(&self, busy: bool) {
        self.script.borrow_mut().always_busy = busy;
    }

    pub fn prepares(&self) -> usize {
        self.script.borrow().prepares
    }

    pub fn steps(&self) -> usize {
        self.script.borrow().steps
    }

    pub fn resets(&self) -> usize {
        self.script.borrow().resets
    }

    pub fn finalized(&self) -> usize {
        self.script.borrow().finalized
    }

    pub fn completed(&self) -> Vec<String> {
        self.script.borrow().completed.clone()
    }
}

pub(crate) fn error(kind: ErrorKind) -> BackendError {
    let (code, message) = match kind {
        ErrorKind::Busy => (5, "database is locked"),
        ErrorKind::SchemaChanged => (17, "database schema has changed"),
        ErrorKind::Constraint => (2067, "UNIQUE constraint failed"),
        ErrorKind::Deadlock => (517, "deadlock detected"),
        ErrorKind::Other => (1, "generic failure"),
    };
    BackendError::new(kind, code, message)
}

impl Backend for ScriptedBackend {
    type Statement = ScriptedStatement;

    fn prepare(&self, sql: &str) -> Result<Option<ScriptedStatement>, BackendError> {
        let mut script = self.script.borrow_mut();
        script.prepares += 1;
        if let Some(err) = script.prepare_errors.pop_front() {
            return Err(err);
        }
        if sql.trim().is_empty() {
            return Ok(None);
        }
        let (columns, rows) = script.results.get(sql).cloned().unwrap_or_default();
        Ok(Some(ScriptedStatement {
            script: Rc::clone(&self.script),
            sql: sql.to_string(),
            columns,
            rows,
            next: 0,
            current: None,
            params: Vec::new(),
        }))
    }

    fn last_insert_id(&self) -> i64 {
        self.script.borrow().last_insert_id
    }

    fn changes(&self) -> u64 {
        0
    }
}

pub(crate) struct ScriptedStatement {
    script: Rc<RefCell<Script>>,
    sql: String,
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
    next: usize,
    current: Option<usize>,
    pub params: Vec<Value>,
}

impl ScriptedStatement {
    fn cell(&self, index: usize) -> &Value {
        self.current
            .and_then(|row| self.rows[row].get(index))
            .unwrap_or(&Value::Null)
    }
}

impl Drop for ScriptedStatement {
    fn drop(&mut self) {
        self.script.borrow_mut().finalized += 1;
    }
}

impl BackendStatement for ScriptedStatement {
    fn sql(&self) -> &str {
        &self.sql
    }

    fn step(&mut self) -> Result<Step, BackendError> {
        let mut script = self.script.borrow_mut();
        script.steps += 1;
        if script.always_busy {
            return Err(error(ErrorKind::Busy));
        }
        if let Some(err) = script.step_errors.pop_front() {
            return Err(err);
        }
        if self.next < self.rows.len() {
            self.current = Some(self.next);
            self.next += 1;
            Ok(Step::Row)
        } else {
            self.current = None;
            script.completed.push(self.sql.clone());
            Ok(Step::Done)
        }
    }

    fn reset(&mut self) {
        self.script.borrow_mut().resets += 1;
        self.next = 0;
        self.current = None;
    }

    fn clear_bindings(&mut self) {
        self.params.clear();
    }

    fn parameter_count(&self) -> usize {
        self.sql.matches('?').count()
    }

    fn bind(&mut self, index: usize, value: &Value) -> Result<(), BackendError> {
        if index == 0 || index > self.parameter_count() {
            return Err(BackendError::new(ErrorKind::Other, 25, "column index out of range"));
        }
        if self.params.len() < index {
            self.params.resize(index, Value::Null);
        }
        self.params[index - 1] = value.clone();
        Ok(())
    }

    fn column_count(&self) -> usize {
        self.columns.len()
    }

    fn column_name(&self, index: usize) -> Option<String> {
        self.columns.get(index).cloned()
    }

    fn column_is_null(&self, index: usize) -> bool {
        self.cell(index).is_null()
    }

    fn column_int64(&self, index: usize) -> i64 {
        match self.cell(index) {
            Value::Integer(i) => *i,
            Value::Real(r) => *r as i64,
            Value::Text(s) => s.trim().parse().unwrap_or(0),
            Value::Null | Value::Blob(_) => 0,
        }
    }

    fn column_double(&self, index: usize) -> f64 {
        match self.cell(index) {
            Value::Integer(i) => *i as f64,
            Value::Real(r) => *r,
            Value::Text(s) => s.trim().parse().unwrap_or(0.0),
            Value::Null | Value::Blob(_) => 0.0,
        }
    }

    fn column_text(&self, index: usize) -> Option<Cow<'_, str>> {
        match self.cell(index) {
            Value::Null => None,
            Value::Text(s) => Some(Cow::Borrowed(s)),
            Value::Blob(b) => Some(String::from_utf8_lossy(b)),
            other => Some(Cow::Owned(other.to_string())),
        }
    }

    fn column_blob(&self, index: usize) -> Option<Cow<'_, [u8]>> {
        match self.cell(index) {
            Value::Null => None,
            Value::Blob(b) => Some(Cow::Borrowed(b)),
            Value::Text(s) => Some(Cow::Borrowed(s.as_bytes())),
            other => Some(Cow::Owned(other.to_string().into_bytes())),
        }
    }
}
