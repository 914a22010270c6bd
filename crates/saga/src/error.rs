//! Saga error taxonomy.
//!
//! These types are generic over the backend error `E` of the concrete saga,
//! so `Display`/`Error` are implemented by hand.

use std::error::Error;
use std::fmt;
use std::time::Duration;

/// Why a forward action failed.
#[derive(Debug)]
pub enum StepFailure<E> {
    /// The backend rejected or failed the operation.
    Backend(E),
    /// The coordinator's step timeout expired first.
    TimedOut { after: Duration },
}

impl<E> StepFailure<E> {
    pub fn backend(&self) -> Option<&E> {
        match self {
            StepFailure::Backend(e) => Some(e),
            StepFailure::TimedOut { .. } => None,
        }
    }
}

impl<E: fmt::Display> fmt::Display for StepFailure<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StepFailure::Backend(e) => fmt::Display::fmt(e, f),
            StepFailure::TimedOut { after } => write!(f, "step timed out after {after:?}"),
        }
    }
}

impl<E: Error + 'static> Error for StepFailure<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            StepFailure::Backend(e) => e.source(),
            StepFailure::TimedOut { .. } => None,
        }
    }
}

/// A compensation that itself failed. Not retried.
#[derive(Debug)]
pub struct SagaCompensationError<E> {
    /// Step whose compensation failed.
    pub step: &'static str,
    /// What that step created and is still observable.
    pub residue: String,
    pub cause: E,
}

impl<E: fmt::Display> fmt::Display for SagaCompensationError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "compensation of step '{}' failed ({}); left behind: {}",
            self.step, self.cause, self.residue
        )
    }
}

impl<E: Error + 'static> Error for SagaCompensationError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(&self.cause)
    }
}

/// User-visible classification of a saga run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SagaOutcome {
    Completed,
    /// Failed, and every completed step was undone.
    RolledBack,
    /// Failed, and at least one compensation failed: an inconsistency exists.
    NeedsCleanup,
}

impl SagaOutcome {
    pub fn of<T, E>(result: &Result<T, SagaError<E>>) -> Self {
        match result {
            Ok(_) => SagaOutcome::Completed,
            Err(e) => e.outcome(),
        }
    }

    pub fn user_message(self) -> &'static str {
        match self {
            SagaOutcome::Completed => "operation completed",
            SagaOutcome::RolledBack => "operation failed, no partial state left behind",
            SagaOutcome::NeedsCleanup => {
                "operation failed - some cleanup may be needed, contact an administrator"
            }
        }
    }
}

/// Failure of a saga run.
#[derive(Debug)]
pub enum SagaError<E> {
    /// A forward action failed and all prior steps were compensated.
    RolledBack {
        saga: &'static str,
        step: &'static str,
        cause: StepFailure<E>,
        /// Compensated steps, in the order they were undone.
        compensated: Vec<&'static str>,
    },
    /// A forward action failed and at least one compensation failed too.
    ///
    /// Requires out-of-band repair of every `failures[i].residue`.
    IncompleteRollback {
        saga: &'static str,
        step: &'static str,
        cause: StepFailure<E>,
        compensated: Vec<&'static str>,
        failures: Vec<SagaCompensationError<E>>,
    },
}

impl<E> SagaError<E> {
    pub fn outcome(&self) -> SagaOutcome {
        match self {
            SagaError::RolledBack { .. } => SagaOutcome::RolledBack,
            SagaError::IncompleteRollback { .. } => SagaOutcome::NeedsCleanup,
        }
    }

    pub fn user_message(&self) -> &'static str {
        self.outcome().user_message()
    }

    pub fn saga(&self) -> &'static str {
        match self {
            SagaError::RolledBack { saga, .. } | SagaError::IncompleteRollback { saga, .. } => saga,
        }
    }

    /// Step whose forward action failed.
    pub fn failed_step(&self) -> &'static str {
        match self {
            SagaError::RolledBack { step, .. } | SagaError::IncompleteRollback { step, .. } => step,
        }
    }

    /// The original forward failure.
    pub fn cause(&self) -> &StepFailure<E> {
        match self {
            SagaError::RolledBack { cause, .. } | SagaError::IncompleteRollback { cause, .. } => {
                cause
            }
        }
    }

    pub fn compensated(&self) -> &[&'static str] {
        match self {
            SagaError::RolledBack { compensated, .. }
            | SagaError::IncompleteRollback { compensated, .. } => compensated,
        }
    }

    pub fn compensation_failures(&self) -> &[SagaCompensationError<E>] {
        match self {
            SagaError::RolledBack { .. } => &[],
            SagaError::IncompleteRollback { failures, .. } => failures,
        }
    }

    /// Everything left behind that needs manual cleanup.
    pub fn residues(&self) -> Vec<&str> {
        self.compensation_failures()
            .iter()
            .map(|f| f.residue.as_str())
            .collect()
    }
}

impl<E: fmt::Display> fmt::Display for SagaError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SagaError::RolledBack {
                saga, step, cause, ..
            } => write!(
                f,
                "saga '{saga}' failed at step '{step}': {cause}; rolled back cleanly"
            ),
            SagaError::IncompleteRollback {
                saga,
                step,
                cause,
                failures,
                ..
            } => {
                write!(
                    f,
                    "saga '{saga}' failed at step '{step}': {cause}; rollback incomplete"
                )?;
                for failure in failures {
                    write!(f, "; {failure}")?;
                }
                Ok(())
            }
        }
    }
}

impl<E: Error + 'static> Error for SagaError<E> {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        Some(self.cause())
    }
}
