//! Convention registry
//!
//! Registrations are collected per scheme while the mapper is being built.
//! Instances are created lazily, once per scheme, the first time a handler
//! asks for them, and then shared by every dispatch.

use std::collections::HashSet;
use std::sync::Arc;

use errmap_core::{
    BoxError, ConfigError, Convention, ConventionRegistration, ConventionSource, HandlingContext,
    HostContext, Outcome, ResolvedConvention, SharedError,
};
use indexmap::IndexMap;
use once_cell::sync::OnceCell;

use crate::adapters::{ConditionalConvention, DelegateConvention};

/// Conventions registered to one scheme, in registration order
#[derive(Debug, Clone)]
pub struct ConventionCollection {
    scheme: String,
    registrations: Vec<ConventionRegistration>,
}

impl ConventionCollection {
    /// Create an empty collection for `scheme`
    pub fn new(scheme: impl Into<String>) -> Self {
        Self {
            scheme: scheme.into(),
            registrations: Vec::new(),
        }
    }

    /// Name of the scheme the collection belongs to
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// Register a convention instance shared by every dispatch
    pub fn add<C: Convention + 'static>(&mut self, convention: C) -> &mut ConventionRegistration {
        self.add_registration(ConventionRegistration::from_instance(convention))
    }

    /// Register an already shared convention instance
    pub fn add_arc<C: Convention + 'static>(
        &mut self,
        convention: Arc<C>,
    ) -> &mut ConventionRegistration {
        self.add_registration(ConventionRegistration::from_arc(convention))
    }

    /// Register a convention built on first use by `factory`
    pub fn add_factory<C, F>(&mut self, factory: F) -> &mut ConventionRegistration
    where
        C: Convention + 'static,
        F: Fn() -> C + Send + Sync + 'static,
    {
        self.add_registration(ConventionRegistration::from_factory(factory))
    }

    /// Append a prepared registration
    pub fn add_registration(
        &mut self,
        registration: ConventionRegistration,
    ) -> &mut ConventionRegistration {
        self.registrations.push(registration);
        let last = self.registrations.len() - 1;
        &mut self.registrations[last]
    }

    /// Map errors of type `E` to the outcome computed by `f`
    pub fn map_error<E, F>(&mut self, f: F) -> &mut ConventionRegistration
    where
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&E) -> Outcome + Send + Sync + 'static,
    {
        let convention = DelegateConvention::new(move |ctx, _host| {
            if let Some(error) = ctx.error_as::<E>() {
                let outcome = f(error);
                ctx.set_outcome(outcome);
            }
            Ok(())
        });
        self.add(ConditionalConvention::for_error::<E>(convention))
    }

    /// Map every error to the outcome computed by `f`
    pub fn map_all<F>(&mut self, f: F) -> &mut ConventionRegistration
    where
        F: Fn(&SharedError) -> Outcome + Send + Sync + 'static,
    {
        self.add(DelegateConvention::new(
            move |ctx: &mut HandlingContext<'_>, _host: &HostContext| -> Result<(), BoxError> {
                let outcome = f(ctx.error());
                ctx.set_outcome(outcome);
                Ok(())
            },
        ))
    }

    /// Registrations in registration order
    pub fn registrations(&self) -> &[ConventionRegistration] {
        &self.registrations
    }

    /// Number of registrations
    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    /// Whether the collection is empty
    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.registrations
            .iter()
            .try_for_each(|registration| registration.validate(&self.scheme))
    }
}

#[derive(Debug)]
struct SchemeConventions {
    collection: ConventionCollection,
    instances: OnceCell<Arc<[ResolvedConvention]>>,
}

/// Convention registrations of every scheme, with lazily created instances
#[derive(Default)]
pub struct ConventionRegistry {
    schemes: IndexMap<String, SchemeConventions>,
}

impl std::fmt::Debug for ConventionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConventionRegistry")
            .field(
                "schemes",
                &self
                    .schemes
                    .iter()
                    .map(|(name, conventions)| (name.as_str(), conventions.collection.len()))
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ConventionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            schemes: IndexMap::new(),
        }
    }

    /// Collection of `scheme`, created on first access
    ///
    /// Any instances already created for the scheme are discarded.
    pub fn collection_mut(&mut self, scheme: &str) -> &mut ConventionCollection {
        let entry = self
            .schemes
            .entry(scheme.to_string())
            .or_insert_with(|| SchemeConventions {
                collection: ConventionCollection::new(scheme),
                instances: OnceCell::new(),
            });
        entry.instances = OnceCell::new();
        &mut entry.collection
    }

    /// Declare `scheme` without registering conventions to it
    pub fn ensure_scheme(&mut self, scheme: &str) {
        self.collection_mut(scheme);
    }

    /// Collection of `scheme`, if it was declared
    pub fn collection(&self, scheme: &str) -> Option<&ConventionCollection> {
        self.schemes
            .get(scheme)
            .map(|conventions| &conventions.collection)
    }

    /// Names of declared schemes
    pub fn schemes(&self) -> impl Iterator<Item = &str> {
        self.schemes.keys().map(String::as_str)
    }

    /// Validate every registration
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.schemes
            .values()
            .try_for_each(|conventions| conventions.collection.validate())
    }

    /// An instance backs at most one registration per scheme
    fn instantiate(
        collection: &ConventionCollection,
    ) -> Result<Arc<[ResolvedConvention]>, ConfigError> {
        collection.validate()?;

        let mut registrations: Vec<Arc<ConventionRegistration>> = collection
            .registrations()
            .iter()
            .cloned()
            .map(Arc::new)
            .collect();
        // Stable: equal orders keep registration order
        registrations.sort_by_key(|registration| registration.order());

        let resolved: Vec<ResolvedConvention> = registrations
            .into_iter()
            .map(|registration| {
                ResolvedConvention::new(registration.instantiate(), registration)
            })
            .collect();

        let mut seen = HashSet::with_capacity(resolved.len());
        for convention in &resolved {
            if !seen.insert(instance_key(convention.convention())) {
                return Err(ConfigError::malformed_convention(
                    collection.scheme(),
                    format!(
                        "convention '{}' instance is registered more than once",
                        convention.registration().convention_type()
                    ),
                ));
            }
        }

        tracing::debug!(
            scheme = collection.scheme(),
            conventions = resolved.len(),
            "Instantiated conventions"
        );
        Ok(resolved.into())
    }
}

impl ConventionSource for ConventionRegistry {
    fn instances_for(&self, scheme: &str) -> Result<Arc<[ResolvedConvention]>, ConfigError> {
        match self.schemes.get(scheme) {
            Some(conventions) => conventions
                .instances
                .get_or_try_init(|| Self::instantiate(&conventions.collection))
                .cloned(),
            None => Err(ConfigError::unknown_scheme(scheme)),
        }
    }

    fn registration_for(
        &self,
        scheme: &str,
        convention: &Arc<dyn Convention>,
    ) -> Option<Arc<ConventionRegistration>> {
        let key = instance_key(convention);
        self.schemes
            .get(scheme)?
            .instances
            .get()?
            .iter()
            .find(|resolved| instance_key(resolved.convention()) == key)
            .map(|resolved| resolved.registration().clone())
    }
}

fn instance_key(convention: &Arc<dyn Convention>) -> usize {
    Arc::as_ptr(convention) as *const () as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Noop;

    #[async_trait]
    impl Convention for Noop {
        async fn apply(
            &self,
            _ctx: &mut HandlingContext<'_>,
            _host: &HostContext,
        ) -> Result<(), BoxError> {
            Ok(())
        }
    }

    fn names(instances: &[ResolvedConvention]) -> Vec<String> {
        instances
            .iter()
            .map(|resolved| resolved.registration().tags().iter().cloned().collect())
            .collect()
    }

    #[test]
    fn test_instances_sorted_by_order_then_registration() {
        let mut registry = ConventionRegistry::new();
        let collection = registry.collection_mut("s1");
        collection.add(Noop).set_tags(["a"]).set_order(2);
        collection.add(Noop).set_tags(["b"]);
        collection.add(Noop).set_tags(["c"]).set_order(-1);
        collection.add(Noop).set_tags(["d"]);

        let instances = registry.instances_for("s1").unwrap();
        assert_eq!(names(&instances), vec!["c", "b", "d", "a"]);
    }

    #[test]
    fn test_instances_are_created_once() {
        let created = Arc::new(AtomicUsize::new(0));
        let counter = created.clone();

        let mut registry = ConventionRegistry::new();
        registry.collection_mut("s1").add_factory(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Noop
        });
        assert_eq!(created.load(Ordering::SeqCst), 0);

        let first = registry.instances_for("s1").unwrap();
        let second = registry.instances_for("s1").unwrap();
        assert_eq!(created.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(first[0].convention(), second[0].convention()));
    }

    #[test]
    fn test_unknown_scheme_is_an_error() {
        let mut registry = ConventionRegistry::new();
        registry.ensure_scheme("empty");

        assert_eq!(registry.instances_for("empty").map(|i| i.len()), Ok(0));
        assert_matches!(
            registry.instances_for("missing"),
            Err(ConfigError::UnknownScheme { name }) if name == "missing"
        );
    }

    #[test]
    fn test_registration_lookup_by_instance() {
        let mut registry = ConventionRegistry::new();
        registry
            .collection_mut("s1")
            .add(Noop)
            .set_tags(["x"])
            .set_order(3);

        let instances = registry.instances_for("s1").unwrap();
        let registration = registry.registration_for("s1", instances[0].convention());
        assert_eq!(registration.as_ref().map(|r| r.order()), Some(3));
        assert!(registration.is_some_and(|r| r.has_tag("x")));

        let stranger: Arc<dyn Convention> = Arc::new(Noop);
        assert!(registry.registration_for("s1", &stranger).is_none());
        assert!(registry
            .registration_for("s2", instances[0].convention())
            .is_none());
    }

    #[test]
    fn test_shared_instance_resolves_per_scheme() {
        let shared = Arc::new(Noop);
        let mut registry = ConventionRegistry::new();
        registry
            .collection_mut("a")
            .add_arc(shared.clone())
            .set_tags(["from-a"]);
        registry
            .collection_mut("b")
            .add_arc(shared.clone())
            .set_tags(["from-b"]);

        let in_a = registry.instances_for("a").unwrap();
        let in_b = registry.instances_for("b").unwrap();
        assert!(Arc::ptr_eq(in_a[0].convention(), in_b[0].convention()));

        let from_a = registry.registration_for("a", in_a[0].convention());
        let from_b = registry.registration_for("b", in_b[0].convention());
        assert!(from_a.is_some_and(|r| r.has_tag("from-a") && !r.has_tag("from-b")));
        assert!(from_b.is_some_and(|r| r.has_tag("from-b")));
    }

    #[test]
    fn test_shared_instance_twice_in_one_scheme_is_malformed() {
        let shared = Arc::new(Noop);
        let mut registry = ConventionRegistry::new();
        let collection = registry.collection_mut("s1");
        collection.add_arc(shared.clone()).set_tags(["x"]);
        collection.add_arc(shared).set_tags(["y"]);

        assert_matches!(
            registry.instances_for("s1"),
            Err(ConfigError::MalformedConvention { scheme, .. }) if scheme == "s1"
        );
    }

    #[test]
    fn test_malformed_registration_is_reported() {
        let mut registry = ConventionRegistry::new();
        registry.collection_mut("s1").add(Noop).set_tags([""]);

        assert_matches!(
            registry.validate(),
            Err(ConfigError::MalformedConvention { scheme, .. }) if scheme == "s1"
        );
        assert_matches!(
            registry.instances_for("s1"),
            Err(ConfigError::MalformedConvention { .. })
        );
    }

    #[test]
    fn test_collection_order_is_registration_order() {
        let mut collection = ConventionCollection::new("s1");
        assert!(collection.is_empty());
        collection.add(Noop).set_order(5);
        collection.add(Noop);

        let orders: Vec<i32> = collection
            .registrations()
            .iter()
            .map(|r| r.order())
            .collect();
        assert_eq!(orders, vec![5, 0]);
        assert_eq!(collection.scheme(), "s1");
    }
}
