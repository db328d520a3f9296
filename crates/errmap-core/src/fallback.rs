//! Mapper-level fallback handlers
//!
//! The fallback runs once per dispatch when every scheme declined. Whatever
//! outcome it leaves on the context is what `dispatch` returns.

use std::fmt;

use async_trait::async_trait;

use crate::context::HandlingContext;
use crate::errors::BoxError;

/// Handler consulted when no scheme produced a decisive outcome
#[async_trait]
pub trait FallbackHandler: Send + Sync {
    /// Set the final outcome on `ctx`
    async fn handle(&self, ctx: &mut HandlingContext<'_>) -> Result<(), BoxError>;
}

/// Default fallback: propagate the original error
#[derive(Debug, Clone, Copy, Default)]
pub struct RethrowFallback;

#[async_trait]
impl FallbackHandler for RethrowFallback {
    async fn handle(&self, ctx: &mut HandlingContext<'_>) -> Result<(), BoxError> {
        ctx.rethrow();
        Ok(())
    }
}

/// Fallback built from a synchronous closure
pub struct FnFallback<F> {
    f: F,
}

impl<F> fmt::Debug for FnFallback<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FnFallback(..)")
    }
}

#[async_trait]
impl<F> FallbackHandler for FnFallback<F>
where
    F: Fn(&mut HandlingContext<'_>) -> Result<(), BoxError> + Send + Sync,
{
    async fn handle(&self, ctx: &mut HandlingContext<'_>) -> Result<(), BoxError> {
        (self.f)(ctx)
    }
}

/// Wrap a closure as a [`FallbackHandler`]
pub fn fallback_fn<F>(f: F) -> FnFallback<F>
where
    F: Fn(&mut HandlingContext<'_>) -> Result<(), BoxError> + Send + Sync,
{
    FnFallback { f }
}

/// Run `handler` and hand back the outcome it left on the context
pub async fn run_fallback<H>(
    handler: &H,
    ctx: &mut HandlingContext<'_>,
) -> Result<crate::Outcome, BoxError>
where
    H: FallbackHandler + ?Sized,
{
    handler.handle(ctx).await?;
    Ok(ctx.take_outcome())
}
