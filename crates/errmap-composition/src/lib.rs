#![deny(clippy::await_holding_lock)]
//! errmap Composition - Registries, Handler Cache and Dispatcher
//!
//! This crate assembles the types from `errmap-core` into a working
//! exception mapper.
//!
//! # Architecture
//!
//! ## Registries
//! - [`SchemeRegistry`]: named schemes in registration (= dispatch) order
//! - [`ConventionRegistry`]: per-scheme conventions, instantiated once and
//!   sorted by order
//!
//! ## Lifecycle
//! - [`HandlerCache`]: one handler per scheme, initialized at most once
//!   even under concurrent first use
//! - [`ConventionSchemeHandler`]: the generic handler walking a scheme's
//!   conventions
//!
//! ## Entry Point
//! - [`ExceptionMapperBuilder`]: composition root, validated at `build`
//! - [`ExceptionMapper`]: `dispatch`, `map_exception`
//!
//! # Usage
//!
//! ```rust,ignore
//! use errmap_composition::{ExceptionMapper, MetadataPolicy};
//! use errmap_core::Outcome;
//!
//! let mut builder = ExceptionMapper::builder();
//! builder
//!     .add_convention_scheme_with("http", |options| {
//!         options.policy = Some(std::sync::Arc::new(MetadataPolicy));
//!     })?
//!     .map_error::<std::io::Error, _>(|_| Outcome::returning(503u16))
//!     .set_tags(["io"]);
//! let mapper = builder.build()?;
//!
//! let outcome = mapper.dispatch(std::sync::Arc::new(error)).await;
//! ```

#![forbid(unsafe_code)]

/// Ready-made convention adapters
pub mod adapters;

/// Exception mapper builder
pub mod builder;

/// Handler cache with at-most-once initialization
pub mod cache;

/// Convention registry
pub mod conventions;

/// Generic convention-driven scheme handler
pub mod handler;

/// Exception mapper (dispatcher)
pub mod mapper;

/// Metadata-driven scheme policy
pub mod policy;

/// Scheme registry
pub mod registry;

pub use adapters::{ConditionalConvention, DelegateConvention};
pub use builder::ExceptionMapperBuilder;
pub use cache::HandlerCache;
pub use conventions::{ConventionCollection, ConventionRegistry};
pub use handler::ConventionSchemeHandler;
pub use mapper::{ExceptionMapper, FALLBACK_SCHEME};
pub use policy::{MappingMetadata, MetadataPolicy};
pub use registry::SchemeRegistry;
