//! Saga mechanics (framework only, no business rules).
//!
//! - A saga is an ordered list of steps, each a forward action plus its compensation
//! - Steps run strictly sequentially against independently-failing backends
//! - On a forward failure, completed steps are compensated in strict reverse order
//! - A failed compensation is recorded, never retried, and surfaced as
//!   [`SagaError::IncompleteRollback`]
//!
//! Concrete sagas (which backends, which order) live in the infra layer.

pub mod coordinator;
pub mod error;
pub mod saga;
pub mod step;

pub use coordinator::SagaCoordinator;
pub use error::{SagaCompensationError, SagaError, SagaOutcome, StepFailure};
pub use saga::Saga;
pub use step::SagaStep;
