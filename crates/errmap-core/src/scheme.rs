//! Scheme handlers, their registrations and per-scheme options
//!
//! A scheme is a named, independently configured strategy for turning an
//! error into an [`Outcome`]. The mapper creates one handler per scheme on
//! first use through the registration's factory, initializes it once, and
//! reuses it for every later dispatch.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::{HandlingContext, MappingContext};
use crate::convention::{ConventionSource, HostContext};
use crate::errors::{BoxError, DispatchFault};
use crate::outcome::{Outcome, SharedError};

/// A named strategy for handling errors
#[async_trait]
pub trait SchemeHandler: Send + Sync {
    /// One-time setup, called with the name the handler was registered under
    ///
    /// The mapper guarantees this runs at most once per scheme, even under
    /// concurrent first use, and that `handle` is never called before it
    /// completed successfully.
    async fn initialize(&self, _scheme: &str) -> Result<(), DispatchFault> {
        Ok(())
    }

    /// Handle `error`
    ///
    /// Any outcome is legal. `NoResult` and `Skip` both mean the scheme
    /// declined and the mapper moves on to the next scheme.
    async fn handle(
        &self,
        error: &SharedError,
        mapping: &mut MappingContext,
    ) -> Result<Outcome, DispatchFault>;
}

/// Factory creating a scheme handler from the mapper's services
pub type HandlerFactory = Arc<dyn Fn(&SchemeServices) -> Arc<dyn SchemeHandler> + Send + Sync>;

/// Registration of a scheme: its unique name and how to build its handler
#[derive(Clone)]
pub struct SchemeRegistration {
    name: String,
    handler_type: &'static str,
    factory: HandlerFactory,
}

impl SchemeRegistration {
    /// Register handlers of type `H` built by `factory` under `name`
    pub fn new<H, F>(name: impl Into<String>, factory: F) -> Self
    where
        H: SchemeHandler + 'static,
        F: Fn(&SchemeServices) -> H + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            handler_type: std::any::type_name::<H>(),
            factory: Arc::new(move |services| Arc::new(factory(services)) as Arc<dyn SchemeHandler>),
        }
    }

    /// Register a handler built by a type-erased factory
    pub fn from_factory(
        name: impl Into<String>,
        handler_type: &'static str,
        factory: HandlerFactory,
    ) -> Self {
        Self {
            name: name.into(),
            handler_type,
            factory,
        }
    }

    /// Unique scheme name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Type name of the handler
    pub fn handler_type(&self) -> &'static str {
        self.handler_type
    }

    /// Build a fresh, uninitialized handler
    pub fn create_handler(&self, services: &SchemeServices) -> Arc<dyn SchemeHandler> {
        (self.factory)(services)
    }
}

impl fmt::Debug for SchemeRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeRegistration")
            .field("name", &self.name)
            .field("handler_type", &self.handler_type)
            .finish()
    }
}

/// Services a handler factory may draw on
#[derive(Clone)]
pub struct SchemeServices {
    conventions: Arc<dyn ConventionSource>,
    options: Arc<SchemeOptionsStore>,
}

impl SchemeServices {
    /// Bundle the mapper's convention source and options
    pub fn new(conventions: Arc<dyn ConventionSource>, options: Arc<SchemeOptionsStore>) -> Self {
        Self {
            conventions,
            options,
        }
    }

    /// Convention instances per scheme
    pub fn conventions(&self) -> &Arc<dyn ConventionSource> {
        &self.conventions
    }

    /// Options of `scheme`, defaults when never configured
    pub fn options(&self, scheme: &str) -> SchemeOptions {
        self.options.get(scheme)
    }
}

impl fmt::Debug for SchemeServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeServices")
            .field("options", &self.options)
            .finish()
    }
}

/// Decision of a [`SchemePolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PolicyDecision {
    /// Run the scheme's conventions
    Proceed,
    /// The scheme answers `NoResult`
    Decline {
        /// Why the scheme declined
        reason: String,
    },
}

impl PolicyDecision {
    /// Create a decline decision
    pub fn decline(reason: impl Into<String>) -> Self {
        Self::Decline {
            reason: reason.into(),
        }
    }
}

/// Gate run by a convention-based scheme before any convention
///
/// A policy may also narrow which conventions run by setting a convention
/// filter on the context.
pub trait SchemePolicy: Send + Sync {
    /// Decide whether the scheme proceeds for this error
    fn apply(&self, ctx: &mut HandlingContext<'_>, options: &SchemeOptions) -> PolicyDecision;
}

/// Per-scheme delegate run when no convention decided
///
/// A delegate that returns `Ok` settles the error as `Handled`.
#[async_trait]
pub trait SchemeFallback: Send + Sync {
    /// React to an error no convention handled
    async fn respond(
        &self,
        ctx: &mut HandlingContext<'_>,
        host: &HostContext,
    ) -> Result<(), BoxError>;
}

/// Locates the host handle of a scheme in the mapping context
#[derive(Clone)]
pub struct HostLocator(Arc<dyn Fn(&MappingContext) -> Option<HostContext> + Send + Sync>);

impl HostLocator {
    /// Locator from an arbitrary lookup
    pub fn new<F>(locate: F) -> Self
    where
        F: Fn(&MappingContext) -> Option<HostContext> + Send + Sync + 'static,
    {
        Self(Arc::new(locate))
    }

    /// Locate the mapping data entry stored under type `T`
    pub fn by_type<T: Any + Send + Sync>() -> Self {
        Self::new(|mapping| {
            mapping
                .data()
                .get_shared::<T>()
                .map(|host| HostContext::new(host))
        })
    }

    /// Locate the mapping data entry stored under `name`
    pub fn by_name(name: &'static str) -> Self {
        Self::new(move |mapping| {
            mapping
                .data()
                .get_payload(&crate::data::DataKey::named(name))
                .cloned()
                .map(HostContext::new)
        })
    }

    /// Run the lookup
    pub fn locate(&self, mapping: &MappingContext) -> Option<HostContext> {
        (self.0)(mapping)
    }
}

impl fmt::Debug for HostLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("HostLocator(..)")
    }
}

/// Options of one scheme
///
/// Never-configured schemes get `Default`, with their name filled in.
#[derive(Clone)]
pub struct SchemeOptions {
    /// Name of the scheme these options belong to
    pub scheme_name: String,
    /// Whether `Return` outcomes from conventions are honored
    ///
    /// When false, a convention's `Return` is treated as `Skip`.
    pub accepts_return_values: bool,
    /// Whether the scheme proceeds when a policy finds no metadata for it
    pub implicit_mapping: bool,
    /// Gate run before the conventions
    pub policy: Option<Arc<dyn SchemePolicy>>,
    /// How to find the host handle; without one the host context is empty
    pub host_locator: Option<HostLocator>,
    /// Delegate run when no convention decided
    pub fallback: Option<Arc<dyn SchemeFallback>>,
}

impl SchemeOptions {
    /// Default options for `scheme`
    pub fn for_scheme(scheme: impl Into<String>) -> Self {
        Self {
            scheme_name: scheme.into(),
            ..Self::default()
        }
    }

    /// Set the policy
    pub fn with_policy<P: SchemePolicy + 'static>(mut self, policy: P) -> Self {
        self.policy = Some(Arc::new(policy));
        self
    }

    /// Set the host locator
    pub fn with_host_locator(mut self, locator: HostLocator) -> Self {
        self.host_locator = Some(locator);
        self
    }

    /// Set the fallback delegate
    pub fn with_fallback<F: SchemeFallback + 'static>(mut self, fallback: F) -> Self {
        self.fallback = Some(Arc::new(fallback));
        self
    }
}

impl Default for SchemeOptions {
    fn default() -> Self {
        Self {
            scheme_name: String::new(),
            accepts_return_values: true,
            implicit_mapping: true,
            policy: None,
            host_locator: None,
            fallback: None,
        }
    }
}

impl fmt::Debug for SchemeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemeOptions")
            .field("scheme_name", &self.scheme_name)
            .field("accepts_return_values", &self.accepts_return_values)
            .field("implicit_mapping", &self.implicit_mapping)
            .field("policy", &self.policy.is_some())
            .field("host_locator", &self.host_locator.is_some())
            .field("fallback", &self.fallback.is_some())
            .finish()
    }
}

/// Options of every configured scheme, keyed by name
#[derive(Debug, Clone, Default)]
pub struct SchemeOptionsStore {
    options: HashMap<String, SchemeOptions>,
}

impl SchemeOptionsStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Options of `scheme`, defaults when never configured
    pub fn get(&self, scheme: &str) -> SchemeOptions {
        self.options
            .get(scheme)
            .cloned()
            .unwrap_or_else(|| SchemeOptions::for_scheme(scheme))
    }

    /// Mutate the options of `scheme`, starting from defaults
    pub fn configure<F>(&mut self, scheme: &str, configure: F)
    where
        F: FnOnce(&mut SchemeOptions),
    {
        let options = self
            .options
            .entry(scheme.to_string())
            .or_insert_with(|| SchemeOptions::for_scheme(scheme));
        configure(options);
        options.scheme_name = scheme.to_string();
    }

    /// Whether `scheme` was ever configured
    pub fn contains(&self, scheme: &str) -> bool {
        self.options.contains_key(scheme)
    }

    /// Names of every configured scheme
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.options.keys().map(String::as_str)
    }
}
