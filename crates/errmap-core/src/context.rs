//! Mapping and handling contexts
//!
//! A [`MappingContext`] lives for one `dispatch` call and is shared by every
//! scheme that runs during it. A [`HandlingContext`] is created by a scheme
//! handler for one (error, scheme) pair and borrows the mapping context, so
//! conventions can reach ambient host data without owning it.

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::convention::{ConventionFilter, ConventionRegistration};
use crate::data::DataBag;
use crate::outcome::{Outcome, SharedError};
use crate::scheme::SchemeRegistration;

/// Predicate deciding which schemes a dispatch may consult
pub type SchemeFilter = Arc<dyn Fn(&SchemeRegistration) -> bool + Send + Sync>;

/// Per-dispatch context
#[derive(Clone, Default)]
pub struct MappingContext {
    data: DataBag,
    scheme_filter: Option<SchemeFilter>,
}

impl MappingContext {
    /// Empty context accepting every scheme
    pub fn new() -> Self {
        Self::default()
    }

    /// Context seeded with host data
    pub fn with_data(data: DataBag) -> Self {
        Self {
            data,
            scheme_filter: None,
        }
    }

    /// Restrict the dispatch to schemes accepted by `filter`
    pub fn with_scheme_filter<F>(mut self, filter: F) -> Self
    where
        F: Fn(&SchemeRegistration) -> bool + Send + Sync + 'static,
    {
        self.set_scheme_filter(filter);
        self
    }

    /// Replace the scheme filter
    pub fn set_scheme_filter<F>(&mut self, filter: F)
    where
        F: Fn(&SchemeRegistration) -> bool + Send + Sync + 'static,
    {
        self.scheme_filter = Some(Arc::new(filter));
    }

    /// Remove the scheme filter
    pub fn clear_scheme_filter(&mut self) {
        self.scheme_filter = None;
    }

    /// Current scheme filter
    pub fn scheme_filter(&self) -> Option<&SchemeFilter> {
        self.scheme_filter.as_ref()
    }

    /// Whether `scheme` passes the filter; true when no filter is set
    pub fn accepts_scheme(&self, scheme: &SchemeRegistration) -> bool {
        self.scheme_filter
            .as_ref()
            .map_or(true, |filter| filter(scheme))
    }

    /// Ambient host data
    pub fn data(&self) -> &DataBag {
        &self.data
    }

    /// Mutable ambient host data
    pub fn data_mut(&mut self) -> &mut DataBag {
        &mut self.data
    }
}

impl fmt::Debug for MappingContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MappingContext")
            .field("data", &self.data)
            .field("scheme_filter", &self.scheme_filter.is_some())
            .finish()
    }
}

/// Per-(error, scheme) context handed to conventions
pub struct HandlingContext<'a> {
    scheme: String,
    error: SharedError,
    mapping: &'a mut MappingContext,
    convention_filter: Option<ConventionFilter>,
    outcome: Outcome,
    data: DataBag,
}

impl<'a> HandlingContext<'a> {
    /// Context for handling `error` within `scheme`
    ///
    /// The outcome starts at `Skip`.
    pub fn new(
        scheme: impl Into<String>,
        error: SharedError,
        mapping: &'a mut MappingContext,
    ) -> Self {
        Self {
            scheme: scheme.into(),
            error,
            mapping,
            convention_filter: None,
            outcome: Outcome::Skip,
            data: DataBag::new(),
        }
    }

    /// Name of the scheme handling the error
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    /// The error being handled
    pub fn error(&self) -> &SharedError {
        &self.error
    }

    /// The error being handled, if it is an `E`
    pub fn error_as<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// The enclosing mapping context
    pub fn mapping_context(&self) -> &MappingContext {
        &*self.mapping
    }

    /// The enclosing mapping context, mutably
    pub fn mapping_context_mut(&mut self) -> &mut MappingContext {
        &mut *self.mapping
    }

    /// Current convention filter
    pub fn convention_filter(&self) -> Option<&ConventionFilter> {
        self.convention_filter.as_ref()
    }

    /// Replace the convention filter
    pub fn set_convention_filter(&mut self, filter: ConventionFilter) {
        self.convention_filter = Some(filter);
    }

    /// Remove the convention filter
    pub fn clear_convention_filter(&mut self) {
        self.convention_filter = None;
    }

    /// Whether a convention registered as `registration` may run
    pub fn accepts(&self, registration: &ConventionRegistration) -> bool {
        self.convention_filter
            .as_ref()
            .map_or(true, |filter| filter.accepts(registration))
    }

    /// Current outcome
    pub fn outcome(&self) -> &Outcome {
        &self.outcome
    }

    /// Replace the current outcome
    pub fn set_outcome(&mut self, outcome: Outcome) {
        self.outcome = outcome;
    }

    /// Take the current outcome, leaving `Skip`
    pub fn take_outcome(&mut self) -> Outcome {
        std::mem::take(&mut self.outcome)
    }

    /// Consume the context, yielding its outcome
    pub fn into_outcome(self) -> Outcome {
        self.outcome
    }

    /// Handling-scoped data, separate from the mapping context's
    pub fn data(&self) -> &DataBag {
        &self.data
    }

    /// Handling-scoped data, mutably
    pub fn data_mut(&mut self) -> &mut DataBag {
        &mut self.data
    }

    /// Mark the error handled
    pub fn handled(&mut self) {
        self.outcome = Outcome::handled();
    }

    /// Propagate the error being handled
    pub fn rethrow(&mut self) {
        self.outcome = Outcome::rethrow(self.error.clone());
    }

    /// Replace the error with `value`
    pub fn returning<T: Any + Send + Sync>(&mut self, value: T) {
        self.outcome = Outcome::returning(value);
    }
}

impl fmt::Debug for HandlingContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandlingContext")
            .field("scheme", &self.scheme)
            .field("error", &format_args!("{}", self.error))
            .field("convention_filter", &self.convention_filter.is_some())
            .field("outcome", &self.outcome)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::outcome::Handling;
    use assert_matches::assert_matches;

    #[derive(Debug, thiserror::Error)]
    #[error("argument error")]
    struct ArgumentError;

    #[derive(Debug, thiserror::Error)]
    #[error("timeout")]
    struct Timeout;

    #[test]
    fn test_outcome_starts_at_skip() {
        let mut mapping = MappingContext::new();
        let ctx = HandlingContext::new("s1", Arc::new(ArgumentError), &mut mapping);

        assert_eq!(ctx.outcome().handling(), Handling::Skip);
        assert_eq!(ctx.scheme(), "s1");
        assert!(ctx.error_as::<ArgumentError>().is_some());
        assert!(ctx.error_as::<Timeout>().is_none());
    }

    #[test]
    fn test_rethrow_uses_the_same_error() {
        let error: SharedError = Arc::new(ArgumentError);
        let mut mapping = MappingContext::new();
        let mut ctx = HandlingContext::new("s1", error.clone(), &mut mapping);

        ctx.rethrow();
        assert_matches!(ctx.into_outcome(), Outcome::Rethrow(raised) if Arc::ptr_eq(&raised, &error));
    }

    #[test]
    fn test_take_outcome_resets_to_skip() {
        let mut mapping = MappingContext::new();
        let mut ctx = HandlingContext::new("s1", Arc::new(ArgumentError), &mut mapping);

        ctx.returning(7i32);
        assert_eq!(ctx.take_outcome().downcast_return::<i32>(), Some(&7));
        assert_eq!(ctx.outcome().handling(), Handling::Skip);
    }

    #[test]
    fn test_handling_context_reaches_mapping_data() {
        let mut mapping = MappingContext::new();
        mapping.data_mut().insert(5u8);

        {
            let mut ctx = HandlingContext::new("s1", Arc::new(ArgumentError), &mut mapping);
            assert_eq!(ctx.mapping_context().data().get::<u8>(), Some(&5));
            ctx.mapping_context_mut().data_mut().insert_named("seen", true);
            ctx.data_mut().insert(1u16);
        }

        assert_eq!(mapping.data().get_named::<bool>("seen"), Some(&true));
        assert_eq!(mapping.data().get::<u16>(), None);
    }

    #[test]
    fn test_convention_filter_defaults_to_accept() {
        struct Noop;

        #[async_trait::async_trait]
        impl crate::Convention for Noop {
            async fn apply(
                &self,
                _ctx: &mut HandlingContext<'_>,
                _host: &crate::HostContext,
            ) -> Result<(), crate::BoxError> {
                Ok(())
            }
        }

        let registration = ConventionRegistration::from_instance(Noop).with_tags(["x"]);
        let mut mapping = MappingContext::new();
        let mut ctx = HandlingContext::new("s1", Arc::new(ArgumentError), &mut mapping);

        assert!(ctx.accepts(&registration));
        ctx.set_convention_filter(ConventionFilter::tags(["y"]));
        assert!(!ctx.accepts(&registration));
        ctx.clear_convention_filter();
        assert!(ctx.accepts(&registration));
    }
}
