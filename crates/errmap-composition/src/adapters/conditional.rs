//! Conditional convention adapter
//!
//! Runs an inner convention only when the error is of a given type and/or
//! a predicate over the handling context holds. When the condition fails
//! the context is left untouched, which reads as `Skip`.

use std::sync::Arc;

use async_trait::async_trait;
use errmap_core::{BoxError, Convention, HandlingContext, HostContext, SharedError};

type ContextPredicate = Arc<dyn Fn(&HandlingContext<'_>) -> bool + Send + Sync>;

#[derive(Clone, Copy)]
struct ErrorType {
    name: &'static str,
    matches: fn(&SharedError) -> bool,
}

/// Adapter guarding an inner convention with a condition
pub struct ConditionalConvention<C> {
    inner: C,
    error_type: Option<ErrorType>,
    predicate: Option<ContextPredicate>,
}

impl<C: Convention> ConditionalConvention<C> {
    /// Guard `inner` with no condition yet
    pub fn new(inner: C) -> Self {
        Self {
            inner,
            error_type: None,
            predicate: None,
        }
    }

    /// Run `inner` only for errors of type `E`
    pub fn for_error<E>(inner: C) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::new(inner).with_error_type::<E>()
    }

    /// Require the error to be of type `E`
    pub fn with_error_type<E>(mut self) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.error_type = Some(ErrorType {
            name: std::any::type_name::<E>(),
            matches: |error| error.downcast_ref::<E>().is_some(),
        });
        self
    }

    /// Require `predicate` to hold
    pub fn with_predicate<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&HandlingContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.predicate = Some(Arc::new(predicate));
        self
    }

    /// Whether the inner convention would run for `ctx`
    pub fn matches(&self, ctx: &HandlingContext<'_>) -> bool {
        let type_matches = self
            .error_type
            .map_or(true, |error_type| (error_type.matches)(ctx.error()));
        type_matches
            && self
                .predicate
                .as_ref()
                .map_or(true, |predicate| predicate(ctx))
    }

    /// The guarded convention
    pub fn inner(&self) -> &C {
        &self.inner
    }
}

impl<C> std::fmt::Debug for ConditionalConvention<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConditionalConvention")
            .field("error_type", &self.error_type.map(|error_type| error_type.name))
            .field("predicate", &self.predicate.is_some())
            .finish()
    }
}

#[async_trait]
impl<C: Convention> Convention for ConditionalConvention<C> {
    async fn apply(
        &self,
        ctx: &mut HandlingContext<'_>,
        host: &HostContext,
    ) -> Result<(), BoxError> {
        if !self.matches(ctx) {
            tracing::trace!(
                scheme = ctx.scheme(),
                error_type = self.error_type.map(|error_type| error_type.name),
                "Condition not met, skipping convention"
            );
            return Ok(());
        }
        self.inner.apply(ctx, host).await
    }
}
