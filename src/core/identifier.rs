use crate::core::SqlError;

/// A table or column name that may be interpolated into SQL text.
///
/// Identifiers cannot be bound as parameters, so they are the one thing
/// still formatted into statements. Construction validates the name, and
/// `Display` renders it double-quoted.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier(String);

impl Identifier {
    pub fn new(name: impl Into<String>) -> Result<Self, SqlError> {
        let name = name.into();
        let mut chars = name.chars();
        let valid_start = chars
            .next()
            .is_some_and(|c| c.is_ascii_alphabetic() || c == '_');
        if !valid_start || !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
            return Err(SqlError::InvalidIdentifier(name));
        }
        Ok(Self(name))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Identifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"{}\"", self.0)
    }
}

impl TryFrom<&str> for Identifier {
    type Error = SqlError;

    fn try_from(name: &str) -> Result<Self, Self::Error> {
        Self::new(name)
    }
}
