//! Exception mapper builder
//!
//! The composition root: schemes, conventions, options, configuration and
//! the fallback handler are collected here at setup time and frozen into an
//! [`ExceptionMapper`] by [`ExceptionMapperBuilder::build`]. Nothing is
//! registered after that point.

use std::collections::HashSet;
use std::sync::Arc;

use errmap_core::{
    ConfigError, ConventionRegistration, FallbackHandler, MapperConfig, RethrowFallback,
    SchemeHandler, SchemeOptions, SchemeOptionsStore, SchemeRegistration, SchemeServices,
};

use crate::cache::HandlerCache;
use crate::conventions::{ConventionCollection, ConventionRegistry};
use crate::handler::ConventionSchemeHandler;
use crate::mapper::ExceptionMapper;
use crate::registry::SchemeRegistry;

/// Builder for [`ExceptionMapper`]
pub struct ExceptionMapperBuilder {
    schemes: SchemeRegistry,
    conventions: ConventionRegistry,
    options: SchemeOptionsStore,
    config: MapperConfig,
    fallback: Arc<dyn FallbackHandler>,
}

impl std::fmt::Debug for ExceptionMapperBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExceptionMapperBuilder")
            .field("schemes", &self.schemes)
            .field("conventions", &self.conventions)
            .field("config", &self.config)
            .finish()
    }
}

impl Default for ExceptionMapperBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ExceptionMapperBuilder {
    /// Create a builder with no schemes and the rethrowing fallback
    pub fn new() -> Self {
        Self {
            schemes: SchemeRegistry::new(),
            conventions: ConventionRegistry::new(),
            options: SchemeOptionsStore::new(),
            config: MapperConfig::default(),
            fallback: Arc::new(RethrowFallback),
        }
    }

    /// Register a scheme whose handlers are built by `factory`
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateScheme`] if `name` is taken.
    pub fn add_scheme<H, F>(&mut self, name: &str, factory: F) -> Result<&mut Self, ConfigError>
    where
        H: SchemeHandler + 'static,
        F: Fn(&SchemeServices) -> H + Send + Sync + 'static,
    {
        self.add_scheme_registration(SchemeRegistration::new(name, factory))
    }

    /// Register a prepared scheme registration
    pub fn add_scheme_registration(
        &mut self,
        registration: SchemeRegistration,
    ) -> Result<&mut Self, ConfigError> {
        let name = registration.name().to_string();
        self.schemes.register(registration)?;
        self.conventions.ensure_scheme(&name);
        Ok(self)
    }

    /// Register a scheme handled by its conventions
    ///
    /// Returns the scheme's convention collection so conventions can be
    /// added straight away.
    pub fn add_convention_scheme(
        &mut self,
        name: &str,
    ) -> Result<&mut ConventionCollection, ConfigError> {
        let scheme = name.to_string();
        self.add_scheme(name, move |services: &SchemeServices| {
            ConventionSchemeHandler::new(scheme.clone(), services.clone())
        })?;
        Ok(self.conventions.collection_mut(name))
    }

    /// Register a convention-driven scheme with options
    ///
    /// The options are only touched once the scheme is registered.
    pub fn add_convention_scheme_with<F>(
        &mut self,
        name: &str,
        configure: F,
    ) -> Result<&mut ConventionCollection, ConfigError>
    where
        F: FnOnce(&mut SchemeOptions),
    {
        self.add_convention_scheme(name)?;
        self.options.configure(name, configure);
        Ok(self.conventions.collection_mut(name))
    }

    /// Adjust the options of `name`
    pub fn configure_scheme<F>(&mut self, name: &str, configure: F) -> &mut Self
    where
        F: FnOnce(&mut SchemeOptions),
    {
        self.options.configure(name, configure);
        self
    }

    /// Convention collection of `name`
    ///
    /// The scheme must be registered by the time [`build`](Self::build)
    /// runs.
    pub fn map_exceptions(&mut self, name: &str) -> &mut ConventionCollection {
        self.conventions.collection_mut(name)
    }

    /// Add a prepared convention registration to `name`
    pub fn add_convention(&mut self, name: &str, registration: ConventionRegistration) -> &mut Self {
        self.conventions
            .collection_mut(name)
            .add_registration(registration);
        self
    }

    /// Replace the mapper-level fallback handler
    pub fn fallback<H: FallbackHandler + 'static>(&mut self, handler: H) -> &mut Self {
        self.fallback = Arc::new(handler);
        self
    }

    /// Merge declarative configuration
    ///
    /// Scheme names are checked against the registry at build time. A
    /// rejected configuration is not merged.
    pub fn apply_config(&mut self, config: &MapperConfig) -> Result<&mut Self, ConfigError> {
        self.config.merge_with(config)?;
        Ok(self)
    }

    /// Validate the setup and freeze it into a mapper
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::UnknownScheme`] when conventions, options or
    /// configuration refer to a scheme that was never registered,
    /// [`ConfigError::InvalidConfig`] for a configuration that fails
    /// validation, and [`ConfigError::MalformedConvention`] for invalid
    /// registrations.
    pub fn build(mut self) -> Result<ExceptionMapper, ConfigError> {
        self.config.validate()?;
        let referenced = self
            .conventions
            .schemes()
            .chain(self.options.schemes())
            .chain(self.config.referenced_schemes());
        for name in referenced {
            if !self.schemes.contains(name) {
                return Err(ConfigError::unknown_scheme(name));
            }
        }
        self.conventions.validate()?;

        for (name, settings) in &self.config.schemes {
            self.options
                .configure(name, |options| settings.apply_to(options));
        }
        let disabled: HashSet<String> = self.config.disabled_schemes.iter().cloned().collect();

        tracing::debug!(
            schemes = self.schemes.len(),
            disabled = disabled.len(),
            "Built exception mapper"
        );

        let services = SchemeServices::new(Arc::new(self.conventions), Arc::new(self.options));
        Ok(ExceptionMapper::new(
            self.schemes,
            disabled,
            HandlerCache::new(services),
            self.fallback,
        ))
    }
}
