//! Saga definitions: an ordered, named list of steps.
//!
//! Steps are type-erased so one saga can mix steps with different outputs;
//! each completed step is captured together with its own output, which is what
//! its compensation later receives.

use std::sync::Arc;

use async_trait::async_trait;

use crate::SagaStep;

/// Ordered list of steps for one kind of compound operation.
///
/// The definition chooses the order; the coordinator only guarantees that
/// compensation unwinds exactly that order in reverse.
pub struct Saga<C, E> {
    name: &'static str,
    steps: Vec<Box<dyn ErasedStep<C, E>>>,
}

impl<C, E> Saga<C, E>
where
    C: Send + Sync + 'static,
    E: Send + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            steps: Vec::new(),
        }
    }

    /// Append a step (builder style).
    pub fn step<S>(mut self, step: S) -> Self
    where
        S: SagaStep<C, E> + 'static,
    {
        self.steps.push(Box::new(Arc::new(step)));
        self
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Step names in execution order.
    pub fn step_names(&self) -> Vec<&'static str> {
        self.steps.iter().map(|s| s.name()).collect()
    }

    pub(crate) fn steps(&self) -> &[Box<dyn ErasedStep<C, E>>] {
        &self.steps
    }
}

impl<C, E> core::fmt::Debug for Saga<C, E> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Saga")
            .field("name", &self.name)
            .field(
                "steps",
                &self.steps.iter().map(|s| s.name()).collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// A step with its output type erased.
#[async_trait]
pub(crate) trait ErasedStep<C, E>: Send + Sync {
    fn name(&self) -> &'static str;

    async fn forward(&self, ctx: &mut C) -> Result<Box<dyn CompletedStep<C, E>>, E>;
}

/// A step whose forward action succeeded, holding what it created.
#[async_trait]
pub(crate) trait CompletedStep<C, E>: Send + Sync {
    fn name(&self) -> &'static str;

    fn residue(&self) -> String;

    async fn compensate(&self, ctx: &C) -> Result<(), E>;
}

struct Completed<S, O> {
    step: Arc<S>,
    output: O,
}

#[async_trait]
impl<C, E, S> ErasedStep<C, E> for Arc<S>
where
    S: SagaStep<C, E> + 'static,
    C: Send + Sync + 'static,
    E: Send + 'static,
{
    fn name(&self) -> &'static str {
        <S as SagaStep<C, E>>::name(&**self)
    }

    async fn forward(&self, ctx: &mut C) -> Result<Box<dyn CompletedStep<C, E>>, E> {
        let output = <S as SagaStep<C, E>>::forward(&**self, ctx).await?;
        Ok(Box::new(Completed {
            step: Arc::clone(self),
            output,
        }))
    }
}

#[async_trait]
impl<C, E, S, O> CompletedStep<C, E> for Completed<S, O>
where
    S: SagaStep<C, E, Output = O> + 'static,
    O: Send + Sync + 'static,
    C: Send + Sync + 'static,
    E: Send + 'static,
{
    fn name(&self) -> &'static str {
        <S as SagaStep<C, E>>::name(&*self.step)
    }

    fn residue(&self) -> String {
        <S as SagaStep<C, E>>::residue(&*self.step, &self.output)
    }

    async fn compensate(&self, ctx: &C) -> Result<(), E> {
        <S as SagaStep<C, E>>::compensate(&*self.step, ctx, &self.output).await
    }
}
