//! Execution-policy constants and their loading.
//!
//! Priority: explicit file > `/etc/scanmgr/sql.toml` / `./scanmgr-sql.toml`
//! for values, overridden by `SCANMGR_SQL_*` environment variables.

use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::core::SqlError;

/// Fixed pause between deadlock retries in `sql()`.
pub const DEADLOCK_SLEEP: Duration = Duration::from_micros(1000);

/// Consecutive deadlocks tolerated before a warning is logged.
pub const DEADLOCK_THRESHOLD: u32 = 25;

/// Step of the escalating sleep between unbounded busy retries.
pub const BUSY_SLEEP_STEP: Duration = Duration::from_millis(10);

/// Upper bound of that sleep.
pub const BUSY_SLEEP_MAX: Duration = Duration::from_secs(5);

/// Busy retries attempted back to back before sleeping starts.
pub const BUSY_SPIN_ATTEMPTS: u32 = 10;

const CONFIG_PATHS: [&str; 2] = ["/etc/scanmgr/sql.toml", "./scanmgr-sql.toml"];

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SqlConfig {
    /// Database file, or `:memory:`.
    pub database: String,
    /// Busy wait inside the backend itself. 0 leaves all busy handling to
    /// the engine's retry loop.
    pub busy_timeout_ms: u64,
    pub busy_sleep_step_us: u64,
    pub busy_sleep_max_us: u64,
    pub deadlock_sleep_us: u64,
    pub deadlock_warn_threshold: u32,
    pub log_errors: bool,
    pub journal_mode: String,
}

fn default_database() -> String {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("scanmgr")
        .join("tasks.db")
        .to_string_lossy()
        .into_owned()
}

impl Default for SqlConfig {
    fn default() -> Self {
        Self {
            database: default_database(),
            busy_timeout_ms: 0,
            busy_sleep_step_us: BUSY_SLEEP_STEP.as_micros() as u64,
            busy_sleep_max_us: BUSY_SLEEP_MAX.as_micros() as u64,
            deadlock_sleep_us: DEADLOCK_SLEEP.as_micros() as u64,
            deadlock_warn_threshold: DEADLOCK_THRESHOLD,
            log_errors: true,
            journal_mode: "WAL".to_string(),
        }
    }
}

impl SqlConfig {
    /// Load configuration: defaults, then a config file, then environment.
    ///
    /// When `path` is given it must exist; otherwise the first of the
    /// standard locations that exists is used, if any.
    pub fn load(path: Option<&Path>) -> Result<Self, SqlError> {
        let defaults = serde_json::to_string(&Self::default())?;
        let mut builder =
            Config::builder().add_source(File::from_str(&defaults, FileFormat::Json));

        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
            debug!(path = %path.display(), "loading sql config");
        } else if let Some(found) = CONFIG_PATHS.iter().find(|p| Path::new(p).exists()) {
            builder = builder.add_source(File::with_name(found));
            debug!(path = found, "loading sql config");
        }

        builder = builder.add_source(Environment::with_prefix("SCANMGR_SQL").try_parsing(true));

        let config = builder.build()?.try_deserialize::<Self>()?;
        Ok(config)
    }

    /// Defaults with an in-memory database.
    #[must_use]
    pub fn in_memory() -> Self {
        Self {
            database: ":memory:".to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn is_in_memory(&self) -> bool {
        self.database == ":memory:"
    }

    #[must_use]
    pub const fn execution_policy(&self) -> ExecutionPolicy {
        ExecutionPolicy {
            busy_sleep_step: Duration::from_micros(self.busy_sleep_step_us),
            busy_sleep_max: Duration::from_micros(self.busy_sleep_max_us),
            deadlock_sleep: Duration::from_micros(self.deadlock_sleep_us),
            deadlock_warn_threshold: self.deadlock_warn_threshold,
            log_errors: self.log_errors,
        }
    }
}

/// Tuning the statement engine is constructed with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionPolicy {
    pub busy_sleep_step: Duration,
    pub busy_sleep_max: Duration,
    pub deadlock_sleep: Duration,
    pub deadlock_warn_threshold: u32,
    /// Log failed statements. Turned off for quiet cancellation at shutdown.
    pub log_errors: bool,
}

impl Default for ExecutionPolicy {
    fn default() -> Self {
        Self {
            busy_sleep_step: BUSY_SLEEP_STEP,
            busy_sleep_max: BUSY_SLEEP_MAX,
            deadlock_sleep: DEADLOCK_SLEEP,
            deadlock_warn_threshold: DEADLOCK_THRESHOLD,
            log_errors: true,
        }
    }
}

impl ExecutionPolicy {
    /// No sleeping at all; for tests that drive retry loops hard.
    #[must_use]
    pub const fn without_sleeps(mut self) -> Self {
        self.busy_sleep_step = Duration::ZERO;
        self.busy_sleep_max = Duration::ZERO;
        self.deadlock_sleep = Duration::ZERO;
        self
    }

    #[must_use]
    pub const fn quiet(mut self) -> Self {
        self.log_errors = false;
        self
    }

    /// Pause before busy retry number `attempt` (1-based) under the
    /// unbounded policy.
    #[must_use]
    pub fn busy_sleep(&self, attempt: u32) -> Duration {
        if attempt <= BUSY_SPIN_ATTEMPTS {
            return Duration::ZERO;
        }
        self.busy_sleep_step
            .saturating_mul(attempt - BUSY_SPIN_ATTEMPTS)
            .min(self.busy_sleep_max)
    }
}
