//! Scheme registry
//!
//! Holds every scheme registration under its unique name and enumerates
//! them in registration order, which is the order the mapper consults them.

use errmap_core::{ConfigError, SchemeRegistration};
use indexmap::IndexMap;

/// Insertion-ordered registry of schemes
#[derive(Clone, Default)]
pub struct SchemeRegistry {
    schemes: IndexMap<String, SchemeRegistration>,
}

impl std::fmt::Debug for SchemeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemeRegistry")
            .field("schemes", &self.schemes.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SchemeRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a scheme
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::DuplicateScheme`] if a scheme with the same
    /// name is already registered; the registry is left unchanged.
    pub fn register(&mut self, registration: SchemeRegistration) -> Result<(), ConfigError> {
        if self.schemes.contains_key(registration.name()) {
            return Err(ConfigError::duplicate_scheme(registration.name()));
        }

        tracing::debug!(
            scheme = registration.name(),
            handler = registration.handler_type(),
            "Registered exception mapping scheme"
        );
        self.schemes
            .insert(registration.name().to_string(), registration);
        Ok(())
    }

    /// Look up a scheme by name
    pub fn lookup(&self, name: &str) -> Option<&SchemeRegistration> {
        self.schemes.get(name)
    }

    /// Every scheme, in registration order
    pub fn all(&self) -> impl Iterator<Item = &SchemeRegistration> {
        self.schemes.values()
    }

    /// Every scheme name, in registration order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// Check if a scheme is registered
    pub fn contains(&self, name: &str) -> bool {
        self.schemes.contains_key(name)
    }

    /// Number of registered schemes
    pub fn len(&self) -> usize {
        self.schemes.len()
    }

    /// Whether no scheme is registered
    pub fn is_empty(&self) -> bool {
        self.schemes.is_empty()
    }
}
