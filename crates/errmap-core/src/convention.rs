//! Conventions, their registrations and the filters that select them
//!
//! A convention is a unit of policy: it looks at the error on a
//! [`HandlingContext`] and either commits to an [`Outcome`](crate::Outcome)
//! or leaves the context untouched to let the next convention try.
//! Registrations carry the metadata (tags, order) the scheme handler reads
//! for filtering, so conventions never have to expose it themselves.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use crate::context::HandlingContext;
use crate::errors::{BoxError, ConfigError};
use crate::outcome::Payload;

/// Host-owned handle handed to every convention
///
/// The engine never looks inside; a scheme's
/// [`HostLocator`](crate::HostLocator) finds it in the mapping context and
/// conventions downcast it to the host's own type.
#[derive(Clone, Default)]
pub struct HostContext {
    handle: Option<Payload>,
}

impl HostContext {
    /// Wrap a host handle
    pub fn new(handle: Payload) -> Self {
        Self {
            handle: Some(handle),
        }
    }

    /// A context without host handle
    pub fn empty() -> Self {
        Self::default()
    }

    /// Whether a host handle is present
    pub fn is_present(&self) -> bool {
        self.handle.is_some()
    }

    /// Borrow the host handle as a `T`
    pub fn get<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.handle
            .as_ref()
            .and_then(|handle| handle.downcast_ref::<T>())
    }

    /// The raw host handle
    pub fn payload(&self) -> Option<&Payload> {
        self.handle.as_ref()
    }
}

impl fmt::Debug for HostContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostContext")
            .field("present", &self.is_present())
            .finish()
    }
}

/// A unit of exception mapping policy
///
/// Instances are shared by every concurrent dispatch and must not keep
/// per-request state; everything request-scoped lives on the context.
#[async_trait]
pub trait Convention: Send + Sync {
    /// Inspect the error on `ctx` and optionally set a decisive outcome
    ///
    /// Leaving the outcome at `Skip` passes the error on to the next
    /// convention. Setting `NoResult` makes the whole scheme decline.
    /// Returning an error is a fault: the mapper logs it and rethrows the
    /// original error.
    async fn apply(&self, ctx: &mut HandlingContext<'_>, host: &HostContext)
        -> Result<(), BoxError>;
}

/// Factory creating a convention instance
pub type ConventionFactory = Arc<dyn Fn() -> Arc<dyn Convention> + Send + Sync>;

/// A registered convention: factory, tags and order
#[derive(Clone)]
pub struct ConventionRegistration {
    convention_type: &'static str,
    factory: ConventionFactory,
    tags: BTreeSet<String>,
    order: i32,
}

impl ConventionRegistration {
    /// Register an existing convention instance
    pub fn from_instance<C: Convention + 'static>(convention: C) -> Self {
        Self::from_arc(Arc::new(convention))
    }

    /// Register an existing shared convention instance
    pub fn from_arc<C: Convention + 'static>(convention: Arc<C>) -> Self {
        let convention: Arc<dyn Convention> = convention;
        Self {
            convention_type: std::any::type_name::<C>(),
            factory: Arc::new(move || convention.clone()),
            tags: BTreeSet::new(),
            order: 0,
        }
    }

    /// Register a convention created on first use by `factory`
    pub fn from_factory<C, F>(factory: F) -> Self
    where
        C: Convention + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        Self {
            convention_type: std::any::type_name::<C>(),
            factory: Arc::new(move || Arc::new(factory()) as Arc<dyn Convention>),
            tags: BTreeSet::new(),
            order: 0,
        }
    }

    /// Replace the tags
    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.set_tags(tags);
        self
    }

    /// Replace the order
    pub fn with_order(mut self, order: i32) -> Self {
        self.order = order;
        self
    }

    /// Replace the tags in place
    pub fn set_tags<I, S>(&mut self, tags: I) -> &mut Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    /// Replace the order in place
    pub fn set_order(&mut self, order: i32) -> &mut Self {
        self.order = order;
        self
    }

    /// Type name of the registered convention
    pub fn convention_type(&self) -> &'static str {
        self.convention_type
    }

    /// User-defined tags, compared case-sensitively
    pub fn tags(&self) -> &BTreeSet<String> {
        &self.tags
    }

    /// Check if the registration carries `tag`
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    /// Sort key within the scheme; ties keep insertion order
    pub fn order(&self) -> i32 {
        self.order
    }

    /// Create an instance through the factory
    pub fn instantiate(&self) -> Arc<dyn Convention> {
        (self.factory)()
    }

    /// Validate the registration for `scheme`
    pub fn validate(&self, scheme: &str) -> Result<(), ConfigError> {
        if self.tags.iter().any(|tag| tag.trim().is_empty()) {
            return Err(ConfigError::malformed_convention(
                scheme,
                format!("convention '{}' has a blank tag", self.convention_type),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for ConventionRegistration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConventionRegistration")
            .field("convention_type", &self.convention_type)
            .field("tags", &self.tags)
            .field("order", &self.order)
            .finish()
    }
}

/// Predicate deciding which registered conventions may run
#[derive(Clone)]
pub struct ConventionFilter(Arc<dyn Fn(&ConventionRegistration) -> bool + Send + Sync>);

impl ConventionFilter {
    /// Filter from an arbitrary predicate
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&ConventionRegistration) -> bool + Send + Sync + 'static,
    {
        Self(Arc::new(predicate))
    }

    /// Accept conventions sharing at least one of `tags`
    ///
    /// An empty tag set accepts every convention.
    pub fn tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags: BTreeSet<String> = tags.into_iter().map(Into::into).collect();
        Self::new(move |registration| tags_admit(&tags, registration.tags()))
    }

    /// Accept conventions accepted by every filter in `filters`
    pub fn all<I>(filters: I) -> Self
    where
        I: IntoIterator<Item = ConventionFilter>,
    {
        let filters: Vec<ConventionFilter> = filters.into_iter().collect();
        Self::new(move |registration| filters.iter().all(|filter| filter.accepts(registration)))
    }

    /// Evaluate the filter
    pub fn accepts(&self, registration: &ConventionRegistration) -> bool {
        (self.0)(registration)
    }
}

impl fmt::Debug for ConventionFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ConventionFilter(..)")
    }
}

/// Tag admission rule: an empty filter set admits everything, otherwise
/// the sets must overlap
pub fn tags_admit(filter: &BTreeSet<String>, convention: &BTreeSet<String>) -> bool {
    filter.is_empty() || !filter.is_disjoint(convention)
}

/// A convention instance paired with the registration it came from
#[derive(Clone)]
pub struct ResolvedConvention {
    convention: Arc<dyn Convention>,
    registration: Arc<ConventionRegistration>,
}

impl ResolvedConvention {
    /// Pair an instance with its registration
    pub fn new(convention: Arc<dyn Convention>, registration: Arc<ConventionRegistration>) -> Self {
        Self {
            convention,
            registration,
        }
    }

    /// The convention instance
    pub fn convention(&self) -> &Arc<dyn Convention> {
        &self.convention
    }

    /// The originating registration
    pub fn registration(&self) -> &Arc<ConventionRegistration> {
        &self.registration
    }
}

impl fmt::Debug for ResolvedConvention {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResolvedConvention")
            .field("registration", &self.registration)
            .finish()
    }
}

/// Source of per-scheme convention instances
pub trait ConventionSource: Send + Sync {
    /// Instantiated conventions of `scheme`, sorted by order
    ///
    /// Instances are created once per scheme and reused by every dispatch.
    fn instances_for(&self, scheme: &str) -> Result<Arc<[ResolvedConvention]>, ConfigError>;

    /// Registration that produced `convention` within `scheme`
    ///
    /// Only instances already created by [`instances_for`](Self::instances_for)
    /// are known.
    fn registration_for(
        &self,
        scheme: &str,
        convention: &Arc<dyn Convention>,
    ) -> Option<Arc<ConventionRegistration>>;
}
