use std::cell::Cell;
use std::rc::Rc;
use std::thread;

use tracing::{debug, warn};

use super::Statement;
use crate::backend::BackendStatement;
use crate::config::ExecutionPolicy;
use crate::core::{GIVE_UP_ATTEMPTS, Outcome, RetryPolicy};

/// Retry and contention statistics of one engine and its iterators.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Counters {
    pub busy_retries: u64,
    pub schema_retries: u64,
    pub deadlock_retries: u64,
    pub deadlock_warnings: u64,
}

/// The stepping half of the engine, shared with the iterators it creates.
#[derive(Clone)]
pub(crate) struct Executor {
    pub policy: ExecutionPolicy,
    counters: Rc<Cell<Counters>>,
}

impl Executor {
    pub fn new(policy: ExecutionPolicy) -> Self {
        Self {
            policy,
            counters: Rc::new(Cell::new(Counters::default())),
        }
    }

    pub fn counters(&self) -> Counters {
        self.counters.get()
    }

    pub fn bump(&self, update: impl FnOnce(&mut Counters)) {
        let mut counters = self.counters.get();
        update(&mut counters);
        self.counters.set(counters);
    }

    /// Decide whether busy attempt number `attempt` gets another try,
    /// sleeping first where the policy asks for it.
    pub fn retry_busy(&self, retry: RetryPolicy, attempt: u32) -> bool {
        match retry {
            RetryPolicy::Bounded if attempt >= GIVE_UP_ATTEMPTS => false,
            RetryPolicy::Bounded => {
                self.bump(|c| c.busy_retries += 1);
                true
            }
            RetryPolicy::Forever => {
                self.bump(|c| c.busy_retries += 1);
                let pause = self.policy.busy_sleep(attempt);
                if !pause.is_zero() {
                    thread::sleep(pause);
                }
                true
            }
        }
    }

    /// Step the statement once, absorbing busy/locked responses according
    /// to `retry`. Never returns `Outcome::Busy`.
    pub fn execute<S: BackendStatement>(
        &self,
        retry: RetryPolicy,
        statement: &mut Statement<S>,
    ) -> Outcome {
        let mut attempt = 0;
        loop {
            match Outcome::classify(statement.inner_mut().step()) {
                Outcome::Busy(err) => {
                    attempt += 1;
                    if err.needs_reset {
                        statement.reset();
                    }
                    if !self.retry_busy(retry, attempt) {
                        debug!(sql = statement.sql(), attempt, "giving up on busy statement");
                        return Outcome::GaveUp;
                    }
                }
                Outcome::Error(err) => {
                    if self.policy.log_errors {
                        warn!(sql = statement.sql(), error = %err, "step failed");
                    }
                    return Outcome::Error(err);
                }
                Outcome::Constraint(err) => {
                    debug!(sql = statement.sql(), error = %err, "constraint violation");
                    return Outcome::Constraint(err);
                }
                outcome => return outcome,
            }
        }
    }
}
