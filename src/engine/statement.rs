use crate::backend::BackendStatement;
use crate::core::{SqlError, Value};

/// A prepared statement owned by one caller.
///
/// Dropping it (or calling `finalize`) releases the backend statement. The
/// value cannot be used afterwards, so a statement is finalized exactly
/// once.
pub struct Statement<S: BackendStatement> {
    inner: S,
}

impl<S: BackendStatement> Statement<S> {
    pub(crate) const fn new(inner: S) -> Self {
        Self { inner }
    }

    pub fn sql(&self) -> &str {
        self.inner.sql()
    }

    pub fn parameter_count(&self) -> usize {
        self.inner.parameter_count()
    }

    /// Bind `value` to the 1-based parameter `index`.
    pub fn bind(&mut self, index: usize, value: impl Into<Value>) -> Result<(), SqlError> {
        let value = value.into();
        self.inner
            .bind(index, &value)
            .map_err(|err| SqlError::Bind(format!("parameter {index}: {}", err.message)))
    }

    pub fn bind_int64(&mut self, index: usize, value: i64) -> Result<(), SqlError> {
        self.bind(index, Value::Integer(value))
    }

    pub fn bind_double(&mut self, index: usize, value: f64) -> Result<(), SqlError> {
        self.bind(index, Value::Real(value))
    }

    pub fn bind_text(&mut self, index: usize, value: &str) -> Result<(), SqlError> {
        self.bind(index, Value::Text(value.to_string()))
    }

    pub fn bind_blob(&mut self, index: usize, value: &[u8]) -> Result<(), SqlError> {
        self.bind(index, Value::Blob(value.to_vec()))
    }

    pub fn bind_null(&mut self, index: usize) -> Result<(), SqlError> {
        self.bind(index, Value::Null)
    }

    /// Bind `params` to parameters 1..=n.
    pub fn bind_all(&mut self, params: &[Value]) -> Result<(), SqlError> {
        let expected = self.inner.parameter_count();
        if params.len() > expected {
            return Err(SqlError::Bind(format!(
                "{} values for {expected} parameters in: {}",
                params.len(),
                self.inner.sql()
            )));
        }
        for (i, value) in params.iter().enumerate() {
            self.inner
                .bind(i + 1, value)
                .map_err(|err| SqlError::Bind(format!("parameter {}: {}", i + 1, err.message)))?;
        }
        Ok(())
    }

    /// Rewind so the statement can be driven again. Bindings are kept.
    pub fn reset(&mut self) {
        self.inner.reset();
    }

    pub fn clear_bindings(&mut self) {
        self.inner.clear_bindings();
    }

    pub fn finalize(self) {
        drop(self);
    }

    pub(crate) const fn inner(&self) -> &S {
        &self.inner
    }

    pub(crate) const fn inner_mut(&mut self) -> &mut S {
        &mut self.inner
    }
}
