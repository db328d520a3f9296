//! Generic convention-driven scheme handler
//!
//! Runs a scheme's conventions in order until one commits to a decisive
//! outcome. Scheme-specific behavior comes from [`SchemeOptions`] (policy,
//! host locator, fallback delegate, return value support), not from
//! specialized handler types.

use std::sync::Arc;

use async_trait::async_trait;
use errmap_core::{
    DispatchFault, HandlingContext, HostContext, MappingContext, Outcome, PolicyDecision,
    ResolvedConvention, SchemeHandler, SchemeOptions, SchemeServices, SharedError,
};
use once_cell::sync::OnceCell;

struct Resolved {
    options: SchemeOptions,
    conventions: Arc<[ResolvedConvention]>,
}

/// Scheme handler iterating the scheme's registered conventions
pub struct ConventionSchemeHandler {
    scheme: String,
    services: SchemeServices,
    resolved: OnceCell<Resolved>,
}

impl std::fmt::Debug for ConventionSchemeHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConventionSchemeHandler")
            .field("scheme", &self.scheme)
            .field("initialized", &self.resolved.get().is_some())
            .finish()
    }
}

impl ConventionSchemeHandler {
    /// Create an uninitialized handler for `scheme`
    pub fn new(scheme: impl Into<String>, services: SchemeServices) -> Self {
        Self {
            scheme: scheme.into(),
            services,
            resolved: OnceCell::new(),
        }
    }

    /// Options resolved by `initialize`
    pub fn options(&self) -> Option<&SchemeOptions> {
        self.resolved.get().map(|resolved| &resolved.options)
    }

    fn locate_host(options: &SchemeOptions, mapping: &MappingContext) -> Option<HostContext> {
        match &options.host_locator {
            Some(locator) => locator.locate(mapping),
            None => Some(HostContext::empty()),
        }
    }
}

#[async_trait]
impl SchemeHandler for ConventionSchemeHandler {
    async fn initialize(&self, scheme: &str) -> Result<(), DispatchFault> {
        self.resolved.get_or_try_init(|| {
            let conventions = self
                .services
                .conventions()
                .instances_for(scheme)
                .map_err(|source| DispatchFault::misconfigured(scheme, source))?;
            tracing::debug!(
                scheme,
                conventions = conventions.len(),
                "Resolved scheme conventions"
            );
            Ok::<_, DispatchFault>(Resolved {
                options: self.services.options(scheme),
                conventions,
            })
        })?;
        Ok(())
    }

    async fn handle(
        &self,
        error: &SharedError,
        mapping: &mut MappingContext,
    ) -> Result<Outcome, DispatchFault> {
        let resolved = self
            .resolved
            .get()
            .ok_or_else(|| DispatchFault::not_initialized(&self.scheme))?;
        let options = &resolved.options;
        let scheme = options.scheme_name.as_str();

        let Some(host) = Self::locate_host(options, mapping) else {
            tracing::trace!(scheme, "No host context found, scheme declines");
            return Ok(Outcome::no_result());
        };

        let mut ctx = HandlingContext::new(scheme, error.clone(), mapping);

        if let Some(policy) = &options.policy {
            if let PolicyDecision::Decline { reason } = policy.apply(&mut ctx, options) {
                tracing::trace!(scheme, %reason, "Policy declined scheme");
                return Ok(Outcome::no_result());
            }
        }

        for entry in resolved.conventions.iter() {
            let registration = entry.registration();
            let convention = registration.convention_type();

            if !ctx.accepts(registration) {
                tracing::trace!(scheme, convention, "Convention filtered out");
                continue;
            }

            entry
                .convention()
                .apply(&mut ctx, &host)
                .await
                .map_err(|source| DispatchFault::convention(scheme, convention, source))?;

            match ctx.take_outcome() {
                Outcome::Skip => {
                    tracing::trace!(scheme, convention, "Convention skipped");
                }
                Outcome::NoResult => {
                    tracing::trace!(scheme, convention, "Convention declined the scheme");
                    return Ok(Outcome::no_result());
                }
                Outcome::Return(_) if !options.accepts_return_values => {
                    tracing::trace!(
                        scheme,
                        convention,
                        "Scheme does not accept return values, continuing"
                    );
                }
                decisive => {
                    tracing::trace!(
                        scheme,
                        convention,
                        handling = %decisive.handling(),
                        "Convention decided"
                    );
                    return Ok(decisive);
                }
            }
        }

        if let Some(fallback) = &options.fallback {
            fallback
                .respond(&mut ctx, &host)
                .await
                .map_err(|source| DispatchFault::handler(scheme, source))?;
            tracing::trace!(scheme, "Scheme fallback handled the error");
            return Ok(Outcome::handled());
        }

        Ok(Outcome::no_result())
    }
}
