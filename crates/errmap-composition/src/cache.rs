//! Handler cache
//!
//! One handler per scheme name, created and initialized on first use.
//! The map stores a shared initialization future per name: it is inserted
//! under the lock, and every caller awaits it after the lock is released,
//! so initialization runs at most once even under concurrent first use.
//! A failed initialization stays cached; the scheme is broken for the
//! lifetime of the cache.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use errmap_core::{DispatchFault, SchemeHandler, SchemeRegistration, SchemeServices};
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;

type InitResult = Result<Arc<dyn SchemeHandler>, Arc<DispatchFault>>;
type InitHandle = Shared<BoxFuture<'static, InitResult>>;

/// Lazily initialized scheme handlers, keyed by scheme name
pub struct HandlerCache {
    services: SchemeServices,
    entries: Mutex<HashMap<String, InitHandle>>,
}

impl std::fmt::Debug for HandlerCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerCache")
            .field(
                "entries",
                &format!("HashMap with {} entries", self.entries.lock().len()),
            )
            .finish()
    }
}

impl HandlerCache {
    /// Create an empty cache building handlers from `services`
    pub fn new(services: SchemeServices) -> Self {
        Self {
            services,
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// The initialized handler of `registration`
    ///
    /// # Errors
    ///
    /// Returns [`DispatchFault::Initialization`] if the handler failed to
    /// initialize, now or on an earlier call.
    pub async fn get_handler(
        &self,
        registration: &SchemeRegistration,
    ) -> Result<Arc<dyn SchemeHandler>, DispatchFault> {
        let scheme = registration.name();
        let handle = {
            let mut entries = self.entries.lock();
            match entries.get(scheme) {
                Some(handle) => {
                    tracing::trace!(scheme, "Handler cache hit");
                    handle.clone()
                }
                None => {
                    tracing::debug!(
                        scheme,
                        handler = registration.handler_type(),
                        "Creating exception handler"
                    );
                    let handle = self.initialize(registration);
                    entries.insert(scheme.to_string(), handle.clone());
                    handle
                }
            }
        };

        handle
            .await
            .map_err(|source| DispatchFault::Initialization {
                scheme: scheme.to_string(),
                source,
            })
    }

    fn initialize(&self, registration: &SchemeRegistration) -> InitHandle {
        let handler = registration.create_handler(&self.services);
        let scheme = registration.name().to_string();

        async move {
            let initialized = AssertUnwindSafe(handler.initialize(&scheme))
                .catch_unwind()
                .await
                .unwrap_or_else(|panic| Err(DispatchFault::panicked(&*panic)));

            match initialized {
                Ok(()) => {
                    tracing::debug!(scheme = %scheme, "Exception handler initialized");
                    Ok(handler)
                }
                Err(fault) => {
                    tracing::warn!(
                        scheme = %scheme,
                        error = %fault,
                        "Exception handler failed to initialize"
                    );
                    Err(Arc::new(fault))
                }
            }
        }
        .boxed()
        .shared()
    }

    /// Whether a handler for `scheme` was created, initialized or not
    pub fn is_cached(&self, scheme: &str) -> bool {
        self.entries.lock().contains_key(scheme)
    }

    /// Number of cached handlers
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Whether no handler was created yet
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Services handed to handler factories
    pub fn services(&self) -> &SchemeServices {
        &self.services
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conventions::ConventionRegistry;
    use assert_matches::assert_matches;
    use async_trait::async_trait;
    use errmap_core::{MappingContext, Outcome, SchemeOptionsStore, SharedError};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        initialized: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl SchemeHandler for Counting {
        async fn initialize(&self, scheme: &str) -> Result<(), DispatchFault> {
            self.initialized.fetch_add(1, Ordering::SeqCst);
            tokio::task::yield_now().await;
            if self.fail {
                return Err(DispatchFault::handler(scheme, "no backing store"));
            }
            Ok(())
        }

        async fn handle(
            &self,
            _error: &SharedError,
            _mapping: &mut MappingContext,
        ) -> Result<Outcome, DispatchFault> {
            Ok(Outcome::handled())
        }
    }

    fn cache() -> HandlerCache {
        HandlerCache::new(SchemeServices::new(
            Arc::new(ConventionRegistry::new()),
            Arc::new(SchemeOptionsStore::new()),
        ))
    }

    fn counting(name: &str, initialized: &Arc<AtomicUsize>, fail: bool) -> SchemeRegistration {
        let initialized = initialized.clone();
        SchemeRegistration::new(name, move |_: &SchemeServices| Counting {
            initialized: initialized.clone(),
            fail,
        })
    }

    #[tokio::test]
    async fn test_handler_is_reused() {
        let initialized = Arc::new(AtomicUsize::new(0));
        let registration = counting("s1", &initialized, false);
        let cache = cache();
        assert!(cache.is_empty());

        let first = cache.get_handler(&registration).await.unwrap();
        let second = cache.get_handler(&registration).await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
        assert!(cache.is_cached("s1"));
        assert_eq!(cache.len(), 1);
    }

    #[tokio::test]
    async fn test_concurrent_first_use_initializes_once() {
        let initialized = Arc::new(AtomicUsize::new(0));
        let registration = counting("s1", &initialized, false);
        let cache = cache();

        let results = futures::future::join_all(
            (0..16).map(|_| cache.get_handler(&registration)),
        )
        .await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_initialization_is_permanent() {
        let initialized = Arc::new(AtomicUsize::new(0));
        let registration = counting("s1", &initialized, true);
        let cache = cache();

        assert_matches!(
            cache.get_handler(&registration).await.err(),
            Some(DispatchFault::Initialization { scheme, .. }) if scheme == "s1"
        );
        assert_matches!(
            cache.get_handler(&registration).await.err(),
            Some(DispatchFault::Initialization { .. })
        );
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_concurrent_waiters_share_the_failure() {
        let initialized = Arc::new(AtomicUsize::new(0));
        let registration = counting("s1", &initialized, true);
        let cache = cache();

        let results = futures::future::join_all(
            (0..8).map(|_| cache.get_handler(&registration)),
        )
        .await;

        let sources: Vec<Arc<DispatchFault>> = results
            .into_iter()
            .filter_map(|result| match result.err() {
                Some(DispatchFault::Initialization { source, .. }) => Some(source),
                _ => None,
            })
            .collect();
        assert_eq!(sources.len(), 8);
        assert!(sources.iter().all(|source| Arc::ptr_eq(source, &sources[0])));
        assert_eq!(initialized.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_schemes_are_cached_separately() {
        let initialized = Arc::new(AtomicUsize::new(0));
        let cache = cache();

        cache
            .get_handler(&counting("s1", &initialized, false))
            .await
            .unwrap();
        cache
            .get_handler(&counting("s2", &initialized, false))
            .await
            .unwrap();

        assert_eq!(initialized.load(Ordering::SeqCst), 2);
        assert_eq!(cache.len(), 2);
    }
}
