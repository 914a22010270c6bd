//! Sequential saga execution with reverse-order compensation.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::error::{SagaCompensationError, SagaError, StepFailure};
use crate::saga::{CompletedStep, ErasedStep, Saga};

/// Runs sagas step by step.
///
/// The coordinator holds no per-run state, so one instance can drive any
/// number of concurrent sagas for unrelated entities.
#[derive(Debug, Clone, Default)]
pub struct SagaCoordinator {
    step_timeout: Option<Duration>,
}

impl SagaCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bound every forward action; expiry counts as a forward failure.
    ///
    /// A step cut off by the timeout is treated like any failed step: it is
    /// not compensated, only the steps before it are.
    pub fn with_step_timeout(mut self, timeout: Duration) -> Self {
        self.step_timeout = Some(timeout);
        self
    }

    pub fn step_timeout(&self) -> Option<Duration> {
        self.step_timeout
    }

    /// Execute `saga` against `ctx`.
    ///
    /// Step *n+1* starts only after step *n* settled. On a forward failure at
    /// step *k*, steps `1..k` are compensated in strict reverse order, each
    /// with its own forward output. Compensation failures are collected, not
    /// retried, and the remaining compensations still run.
    ///
    /// Returns the accumulated context on success; an empty saga returns `ctx`
    /// unchanged.
    pub async fn run<C, E>(&self, saga: &Saga<C, E>, mut ctx: C) -> Result<C, SagaError<E>>
    where
        C: Send + Sync + 'static,
        E: core::fmt::Display + Send + 'static,
    {
        let mut completed: Vec<Box<dyn CompletedStep<C, E>>> = Vec::with_capacity(saga.len());

        for step in saga.steps() {
            let step_name = step.name();
            debug!(saga = saga.name(), step = step_name, "saga step started");

            match self.forward(step.as_ref(), &mut ctx).await {
                Ok(done) => {
                    debug!(saga = saga.name(), step = step_name, "saga step completed");
                    completed.push(done);
                }
                Err(cause) => {
                    warn!(
                        saga = saga.name(),
                        step = step_name,
                        error = %cause,
                        to_compensate = completed.len(),
                        "saga step failed; compensating"
                    );
                    return Err(unwind(saga.name(), step_name, cause, completed, &ctx).await);
                }
            }
        }

        info!(saga = saga.name(), steps = saga.len(), "saga completed");
        Ok(ctx)
    }

    async fn forward<C, E>(
        &self,
        step: &dyn ErasedStep<C, E>,
        ctx: &mut C,
    ) -> Result<Box<dyn CompletedStep<C, E>>, StepFailure<E>>
    where
        C: Send + Sync + 'static,
        E: Send + 'static,
    {
        match self.step_timeout {
            None => step.forward(ctx).await.map_err(StepFailure::Backend),
            Some(limit) => match tokio::time::timeout(limit, step.forward(ctx)).await {
                Ok(result) => result.map_err(StepFailure::Backend),
                Err(_) => Err(StepFailure::TimedOut { after: limit }),
            },
        }
    }
}

async fn unwind<C, E>(
    saga: &'static str,
    failed_step: &'static str,
    cause: StepFailure<E>,
    completed: Vec<Box<dyn CompletedStep<C, E>>>,
    ctx: &C,
) -> SagaError<E>
where
    C: Send + Sync + 'static,
    E: core::fmt::Display + Send + 'static,
{
    let mut compensated = Vec::with_capacity(completed.len());
    let mut failures = Vec::new();

    for done in completed.into_iter().rev() {
        match done.compensate(ctx).await {
            Ok(()) => {
                debug!(saga, step = done.name(), "compensation completed");
                compensated.push(done.name());
            }
            Err(err) => {
                let residue = done.residue();
                error!(
                    saga,
                    step = done.name(),
                    error = %err,
                    residue = %residue,
                    "compensation failed; manual cleanup required"
                );
                failures.push(SagaCompensationError {
                    step: done.name(),
                    residue,
                    cause: err,
                });
            }
        }
    }

    if failures.is_empty() {
        warn!(saga, step = failed_step, "saga rolled back");
        SagaError::RolledBack {
            saga,
            step: failed_step,
            cause,
            compensated,
        }
    } else {
        error!(
            saga,
            step = failed_step,
            failed_compensations = failures.len(),
            "saga rollback incomplete"
        );
        SagaError::IncompleteRollback {
            saga,
            step: failed_step,
            cause,
            compensated,
            failures,
        }
    }
}
