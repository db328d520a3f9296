#![deny(clippy::await_holding_lock)]
//! # errmap Core - Exception Handling Foundation
//!
//! This crate provides the foundational types of the errmap dispatch engine.
//! It holds no dispatch logic of its own: the registries, the handler cache
//! and the dispatcher live in `errmap-composition`.
//!
//! ## Outcome Algebra
//! - [`Outcome`]: `Rethrow`, `Handled`, `Return`, `NoResult`, `Skip`
//! - Decisive outcomes (`Rethrow`, `Handled`, `Return`) terminate iteration
//! - [`Outcome::get_result`] consumes a decisive outcome
//!
//! ## Contexts
//! - [`MappingContext`]: one per dispatch call, carries the scheme filter
//!   and the ambient data bag supplied by the host
//! - [`HandlingContext`]: one per (error, scheme) pair, carries the
//!   convention filter and the current outcome
//!
//! ## Extension Seams
//! - [`Convention`]: a unit of policy run by a scheme handler
//! - [`SchemeHandler`]: a named, independently configured strategy
//! - [`FallbackHandler`]: what happens when no scheme decides

#![forbid(unsafe_code)]

/// Mapper configuration loading and validation
pub mod config;

/// Mapping and handling contexts
pub mod context;

/// Convention trait, registrations and filters
pub mod convention;

/// Opaque key/value data bag
pub mod data;

/// Unified error handling
pub mod errors;

/// Mapper-level fallback handlers
pub mod fallback;

/// Outcome algebra
pub mod outcome;

/// Scheme handler trait, registrations and options
pub mod scheme;

pub use config::{MapperConfig, SchemeSettings};
pub use context::{HandlingContext, MappingContext, SchemeFilter};
pub use convention::{
    Convention, ConventionFactory, ConventionFilter, ConventionRegistration, ConventionSource,
    HostContext, ResolvedConvention, tags_admit,
};
pub use data::{DataBag, DataKey};
pub use errors::{BoxError, ConfigError, DispatchFault, OutcomeError};
pub use fallback::{fallback_fn, run_fallback, FallbackHandler, FnFallback, RethrowFallback};
pub use outcome::{Handling, Outcome, Payload, SharedError};
pub use scheme::{
    HandlerFactory, HostLocator, PolicyDecision, SchemeFallback, SchemeHandler, SchemeOptions,
    SchemeOptionsStore, SchemePolicy, SchemeRegistration, SchemeServices,
};
