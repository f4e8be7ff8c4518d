use crate::backend::{BackendError, ErrorKind, Step};
use crate::core::SqlError;

/// How long the engine keeps retrying busy/locked responses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Retry until the backend stops reporting busy, sleeping with
    /// escalating back-off after the first few attempts.
    Forever,
    /// Retry at most `GIVE_UP_ATTEMPTS` times, without sleeping, then
    /// report `Outcome::GaveUp`.
    Bounded,
}

/// Attempts made under `RetryPolicy::Bounded` before giving up.
pub const GIVE_UP_ATTEMPTS: u32 = 10;

/// Classification of a single execution attempt.
#[derive(Debug)]
pub enum Outcome {
    /// One row is ready for column access.
    Row,
    /// The statement ran to completion.
    Done,
    /// Busy or locked. Only surfaced internally, the retry loop absorbs it.
    Busy(BackendError),
    /// The schema changed under the statement; it has to be prepared again.
    SchemaChanged,
    Error(BackendError),
    Constraint(BackendError),
    Deadlock(BackendError),
    GaveUp,
}

impl Outcome {
    /// Classify the result of one backend step.
    #[must_use]
    pub fn classify(result: Result<Step, BackendError>) -> Self {
        match result {
            Ok(Step::Row) => Self::Row,
            Ok(Step::Done) => Self::Done,
            Err(err) => match err.kind {
                ErrorKind::Busy => Self::Busy(err),
                ErrorKind::SchemaChanged => Self::SchemaChanged,
                ErrorKind::Constraint => Self::Constraint(err),
                ErrorKind::Deadlock => Self::Deadlock(err),
                ErrorKind::Other => Self::Error(err),
            },
        }
    }

    /// Row/Done become a step; everything else becomes the matching error.
    /// A schema change that reaches this point was not retried, so it
    /// counts as giving up.
    pub fn into_result(self) -> Result<Step, SqlError> {
        match self {
            Self::Row => Ok(Step::Row),
            Self::Done => Ok(Step::Done),
            Self::SchemaChanged | Self::GaveUp => Err(SqlError::GaveUp),
            Self::Busy(err) | Self::Error(err) | Self::Constraint(err) | Self::Deadlock(err) => {
                Err(err.into())
            }
        }
    }

    #[must_use]
    pub const fn is_row(&self) -> bool {
        matches!(self, Self::Row)
    }

    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::Row | Self::Busy(_))
    }
}
