//! Exception mapper (dispatcher)
//!
//! Walks the registered schemes in registration order and returns the
//! first decisive outcome. When every scheme declines, the fallback handler
//! decides. Faults raised by handlers, conventions or the fallback, panics
//! included, never reach the caller: they are logged and the original
//! error is rethrown.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use errmap_core::{
    run_fallback, DispatchFault, FallbackHandler, HandlingContext, MappingContext, Outcome,
    Payload, SharedError,
};
use futures::FutureExt;

use crate::builder::ExceptionMapperBuilder;
use crate::cache::HandlerCache;
use crate::registry::SchemeRegistry;

/// Scheme name reported to the fallback handler's context
pub const FALLBACK_SCHEME: &str = "fallback";

/// Dispatches errors to the registered schemes
pub struct ExceptionMapper {
    schemes: SchemeRegistry,
    disabled: HashSet<String>,
    cache: HandlerCache,
    fallback: Arc<dyn FallbackHandler>,
}

impl std::fmt::Debug for ExceptionMapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionMapper")
            .field("schemes", &self.schemes)
            .field("disabled", &self.disabled)
            .field("cache", &self.cache)
            .finish()
    }
}

impl ExceptionMapper {
    pub(crate) fn new(
        schemes: SchemeRegistry,
        disabled: HashSet<String>,
        cache: HandlerCache,
        fallback: Arc<dyn FallbackHandler>,
    ) -> Self {
        Self {
            schemes,
            disabled,
            cache,
            fallback,
        }
    }

    /// Start building a mapper
    pub fn builder() -> ExceptionMapperBuilder {
        ExceptionMapperBuilder::new()
    }

    /// Dispatch `error` with a fresh mapping context
    pub async fn dispatch(&self, error: SharedError) -> Outcome {
        let mut mapping = MappingContext::new();
        self.dispatch_with(error, &mut mapping).await
    }

    /// Dispatch `error` with a caller-supplied mapping context
    ///
    /// The returned outcome is decisive unless the fallback handler left a
    /// non-decisive one.
    pub async fn dispatch_with(&self, error: SharedError, mapping: &mut MappingContext) -> Outcome {
        let result = AssertUnwindSafe(self.try_dispatch(&error, mapping))
            .catch_unwind()
            .await;

        let fault = match result {
            Ok(Ok(outcome)) => return outcome,
            Ok(Err(fault)) => fault,
            Err(panic) => DispatchFault::panicked(&*panic),
        };

        tracing::warn!(
            error = %error,
            fault = %fault,
            "Exception handling failed, rethrowing original error"
        );
        Outcome::rethrow(error)
    }

    async fn try_dispatch(
        &self,
        error: &SharedError,
        mapping: &mut MappingContext,
    ) -> Result<Outcome, DispatchFault> {
        for registration in self.schemes.all() {
            let scheme = registration.name();

            if self.disabled.contains(scheme) {
                tracing::trace!(scheme, "Scheme disabled by configuration");
                continue;
            }
            if !mapping.accepts_scheme(registration) {
                tracing::trace!(scheme, "Scheme rejected by filter");
                continue;
            }

            let handler = self.cache.get_handler(registration).await?;
            let outcome = handler.handle(error, mapping).await?;

            if outcome.is_decisive() {
                tracing::trace!(scheme, handling = %outcome.handling(), "Scheme decided");
                return Ok(outcome);
            }
            tracing::trace!(scheme, "Scheme declined");
        }

        tracing::trace!("No scheme decided, running fallback");
        let mut ctx = HandlingContext::new(FALLBACK_SCHEME, error.clone(), mapping);
        run_fallback(self.fallback.as_ref(), &mut ctx)
            .await
            .map_err(DispatchFault::fallback)
    }

    /// Dispatch `error` and consume the outcome
    ///
    /// Returns the substitute value for `Handled` and `Return`, or the error
    /// to propagate for `Rethrow`.
    ///
    /// # Panics
    ///
    /// Panics if a custom fallback handler leaves a non-decisive outcome.
    pub async fn map_exception(&self, error: SharedError) -> Result<Option<Payload>, SharedError> {
        self.dispatch(error).await.get_result()
    }

    /// [`map_exception`](Self::map_exception) with a caller-supplied
    /// mapping context
    pub async fn map_exception_with(
        &self,
        error: SharedError,
        mapping: &mut MappingContext,
    ) -> Result<Option<Payload>, SharedError> {
        self.dispatch_with(error, mapping).await.get_result()
    }

    /// Registered scheme names, in dispatch order
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.schemes.names()
    }

    /// Whether `scheme` is excluded from dispatch by configuration
    pub fn is_disabled(&self, scheme: &str) -> bool {
        self.disabled.contains(scheme)
    }

    /// The handler cache
    pub fn handler_cache(&self) -> &HandlerCache {
        &self.cache
    }
}
