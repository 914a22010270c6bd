use async_trait::async_trait;

/// One forward action plus the compensation that undoes it.
///
/// `C` is the saga context: the request plus everything earlier steps
/// produced. `E` is the backend error type shared by all steps of a saga.
///
/// A forward action that fails must leave no durable effect of its own; if a
/// backend can fail after a partial write, the step retries or cleans up
/// internally before returning the error.
#[async_trait]
pub trait SagaStep<C, E>: Send + Sync
where
    C: Send + Sync,
    E: Send,
{
    /// What the forward action created; handed back to [`Self::compensate`].
    type Output: Send + Sync + 'static;

    /// Stable step name (logs, error reports).
    fn name(&self) -> &'static str;

    /// Perform the step. May read and extend the accumulated context.
    async fn forward(&self, ctx: &mut C) -> Result<Self::Output, E>;

    /// Undo exactly what [`Self::forward`] created.
    ///
    /// Steps without durable effects (lookups, validation, an irreversible
    /// final step) keep the default no-op.
    async fn compensate(&self, _ctx: &C, _output: &Self::Output) -> Result<(), E> {
        Ok(())
    }

    /// Human-readable description of what stays behind if compensation fails.
    fn residue(&self, _output: &Self::Output) -> String {
        self.name().to_string()
    }
}
