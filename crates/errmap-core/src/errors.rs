//! Error types for errmap
//!
//! Three families, kept apart because they travel differently:
//! configuration errors surface to the integrator at setup time, dispatch
//! faults are recovered by the mapper and never reach the caller, and
//! outcome errors signal misuse of a non-decisive [`Outcome`](crate::Outcome).

use std::sync::Arc;

use crate::outcome::Handling;

/// Boxed error returned by conventions and fallback delegates
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Configuration error raised while registering schemes and conventions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    /// A scheme with the same name has already been registered
    #[error("An exception mapping scheme named '{name}' has already been registered")]
    DuplicateScheme {
        /// Name of the scheme
        name: String,
    },

    /// A scheme name was referenced but never registered
    #[error("Unknown exception mapping scheme '{name}'")]
    UnknownScheme {
        /// Name of the scheme
        name: String,
    },

    /// A convention registration could not be accepted
    #[error("Malformed convention registration for scheme '{scheme}': {reason}")]
    MalformedConvention {
        /// Name of the scheme the convention was registered to
        scheme: String,
        /// Why the registration was rejected
        reason: String,
    },

    /// Mapper configuration failed validation
    #[error("Invalid mapper configuration: {message}")]
    InvalidConfig {
        /// Error message describing the invalid setting
        message: String,
    },

    /// Mapper configuration could not be read
    #[error("Failed to read mapper configuration from {path}: {message}")]
    ConfigIo {
        /// Path of the configuration file
        path: String,
        /// Error message from the underlying reader or parser
        message: String,
    },
}

impl ConfigError {
    /// Create a duplicate scheme error
    pub fn duplicate_scheme(name: impl Into<String>) -> Self {
        Self::DuplicateScheme { name: name.into() }
    }

    /// Create an unknown scheme error
    pub fn unknown_scheme(name: impl Into<String>) -> Self {
        Self::UnknownScheme { name: name.into() }
    }

    /// Create a malformed convention error
    pub fn malformed_convention(scheme: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedConvention {
            scheme: scheme.into(),
            reason: reason.into(),
        }
    }

    /// Create an invalid configuration error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Create a configuration I/O error
    pub fn config_io(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ConfigIo {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// Fault raised inside a scheme handler, convention or fallback while an
/// error was being handled
///
/// The mapper logs these and answers with `Rethrow(original error)`; they
/// are never handed to the caller of `dispatch`.
#[derive(Debug, thiserror::Error)]
pub enum DispatchFault {
    /// A convention returned an error
    #[error("Convention '{convention}' in scheme '{scheme}' failed")]
    Convention {
        /// Name of the scheme
        scheme: String,
        /// Type name of the convention
        convention: &'static str,
        /// Error returned by the convention
        #[source]
        source: BoxError,
    },

    /// A scheme handler returned an error
    #[error("Exception handler for scheme '{scheme}' failed")]
    Handler {
        /// Name of the scheme
        scheme: String,
        /// Error returned by the handler or its fallback delegate
        #[source]
        source: BoxError,
    },

    /// A scheme handler could not be initialized
    ///
    /// The failure is shared by every caller that awaited the same
    /// initialization.
    #[error("Exception handler for scheme '{scheme}' failed to initialize")]
    Initialization {
        /// Name of the scheme
        scheme: String,
        /// Fault raised by `initialize`, shared by every waiter
        #[source]
        source: Arc<DispatchFault>,
    },

    /// A scheme handler was used before `initialize` completed
    #[error("Exception handler for scheme '{scheme}' has not been initialized")]
    NotInitialized {
        /// Name of the scheme
        scheme: String,
    },

    /// A configuration problem discovered while resolving a scheme
    #[error("Scheme '{scheme}' is misconfigured")]
    Misconfigured {
        /// Name of the scheme
        scheme: String,
        /// Configuration error found while resolving
        #[source]
        source: ConfigError,
    },

    /// The mapper-level fallback handler returned an error
    #[error("Fallback exception handler failed")]
    Fallback {
        /// Error returned by the fallback handler
        #[source]
        source: BoxError,
    },

    /// Extension code panicked while handling an error
    #[error("Exception handling panicked: {message}")]
    Panicked {
        /// Panic payload rendered as text
        message: String,
    },
}

impl DispatchFault {
    /// Create a convention fault
    pub fn convention(
        scheme: impl Into<String>,
        convention: &'static str,
        source: impl Into<BoxError>,
    ) -> Self {
        Self::Convention {
            scheme: scheme.into(),
            convention,
            source: source.into(),
        }
    }

    /// Create a handler fault
    pub fn handler(scheme: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Self::Handler {
            scheme: scheme.into(),
            source: source.into(),
        }
    }

    /// Create a not-initialized fault
    pub fn not_initialized(scheme: impl Into<String>) -> Self {
        Self::NotInitialized {
            scheme: scheme.into(),
        }
    }

    /// Create a misconfiguration fault
    pub fn misconfigured(scheme: impl Into<String>, source: ConfigError) -> Self {
        Self::Misconfigured {
            scheme: scheme.into(),
            source,
        }
    }

    /// Create a fallback fault
    pub fn fallback(source: impl Into<BoxError>) -> Self {
        Self::Fallback {
            source: source.into(),
        }
    }

    /// Create a panic fault from a caught panic payload
    pub fn panicked(payload: &(dyn std::any::Any + Send)) -> Self {
        let message = if let Some(message) = payload.downcast_ref::<&'static str>() {
            (*message).to_string()
        } else if let Some(message) = payload.downcast_ref::<String>() {
            message.clone()
        } else {
            "non-string panic payload".to_string()
        };
        Self::Panicked { message }
    }
}

/// Misuse of an [`Outcome`](crate::Outcome)
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum OutcomeError {
    /// `get_result` was called on a non-decisive outcome
    #[error("Outcome '{handling}' does not contain a returnable result")]
    InvalidState {
        /// Handling strategy of the offending outcome
        handling: Handling,
    },
}
