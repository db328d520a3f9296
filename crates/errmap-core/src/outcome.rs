//! Outcome algebra for exception handling
//!
//! An [`Outcome`] is the tagged result of one attempt to handle an error.
//! Outcomes are built through the factory functions, never mutated, and
//! consumed exactly once by whoever receives them: either by extracting the
//! value with [`Outcome::get_result`] or by propagating the captured error.
//!
//! Decisive outcomes (`Rethrow`, `Handled`, `Return`) stop every dispatch
//! loop. `Skip` means "this convention declines, try the next convention in
//! the same scheme"; `NoResult` means "this whole scheme declines, try the
//! next scheme".

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use crate::errors::OutcomeError;

/// The error being handled
///
/// Shared so that `Rethrow` carries the very same value the caller passed
/// in; identity is observable with [`Arc::ptr_eq`].
pub type SharedError = Arc<dyn std::error::Error + Send + Sync + 'static>;

/// Opaque value carried by [`Outcome::Return`] and stored in data bags
pub type Payload = Arc<dyn Any + Send + Sync>;

/// Handling strategy of an outcome, without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Handling {
    /// The captured error should be propagated
    Rethrow,
    /// The error is handled and nothing further is needed
    Handled,
    /// The error is replaced by a substitute value
    Return,
    /// The scheme declined; the mapper proceeds to the next scheme
    NoResult,
    /// The convention declined; the scheme proceeds to the next convention
    Skip,
}

impl Handling {
    /// Whether this strategy terminates the enclosing iteration
    pub fn is_decisive(self) -> bool {
        matches!(self, Self::Rethrow | Self::Handled | Self::Return)
    }
}

impl fmt::Display for Handling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Rethrow => "rethrow",
            Self::Handled => "handled",
            Self::Return => "return",
            Self::NoResult => "no-result",
            Self::Skip => "skip",
        };
        f.write_str(name)
    }
}

/// Result of attempting to handle an error
#[derive(Clone, Default)]
pub enum Outcome {
    /// Propagate the captured error, which may differ from the input error
    Rethrow(SharedError),
    /// Handled, nothing to return
    Handled,
    /// Handled, the caller receives the carried value (which may be absent)
    Return(Option<Payload>),
    /// The scheme declined
    NoResult,
    /// The convention declined
    #[default]
    Skip,
}

impl Outcome {
    /// A handled outcome with no value
    pub fn handled() -> Self {
        Self::Handled
    }

    /// An outcome that propagates `error`
    pub fn rethrow(error: SharedError) -> Self {
        Self::Rethrow(error)
    }

    /// An outcome that propagates a freshly wrapped error
    pub fn rethrow_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Rethrow(Arc::new(error))
    }

    /// An outcome that returns `value` to the caller
    pub fn returning<T: Any + Send + Sync>(value: T) -> Self {
        Self::Return(Some(Arc::new(value)))
    }

    /// An outcome that returns an already shared payload, or nothing
    pub fn return_payload(payload: Option<Payload>) -> Self {
        Self::Return(payload)
    }

    /// An outcome that returns no value without raising
    pub fn return_none() -> Self {
        Self::Return(None)
    }

    /// The scheme-level "try the next scheme" outcome
    pub fn no_result() -> Self {
        Self::NoResult
    }

    /// The convention-level "try the next convention" outcome
    pub fn skip() -> Self {
        Self::Skip
    }

    /// Handling strategy of this outcome
    pub fn handling(&self) -> Handling {
        match self {
            Self::Rethrow(_) => Handling::Rethrow,
            Self::Handled => Handling::Handled,
            Self::Return(_) => Handling::Return,
            Self::NoResult => Handling::NoResult,
            Self::Skip => Handling::Skip,
        }
    }

    /// Whether this outcome terminates the enclosing iteration
    pub fn is_decisive(&self) -> bool {
        self.handling().is_decisive()
    }

    /// The error a `Rethrow` outcome propagates
    pub fn source_error(&self) -> Option<&SharedError> {
        match self {
            Self::Rethrow(error) => Some(error),
            _ => None,
        }
    }

    /// The payload of a `Return` outcome
    pub fn payload(&self) -> Option<&Payload> {
        match self {
            Self::Return(payload) => payload.as_ref(),
            _ => None,
        }
    }

    /// The payload of a `Return` outcome, if it is a `T`
    pub fn downcast_return<T: Any>(&self) -> Option<&T> {
        self.payload().and_then(|payload| payload.downcast_ref::<T>())
    }

    /// Consume the outcome, reporting misuse instead of panicking
    ///
    /// The outer `Result` fails with [`OutcomeError::InvalidState`] for
    /// `NoResult` and `Skip`. The inner `Result` is what a caller acts on:
    /// the payload for `Handled` (always `None`) and `Return`, or the
    /// captured error for `Rethrow`.
    pub fn try_get_result(self) -> Result<Result<Option<Payload>, SharedError>, OutcomeError> {
        match self {
            Self::Handled => Ok(Ok(None)),
            Self::Return(payload) => Ok(Ok(payload)),
            Self::Rethrow(error) => Ok(Err(error)),
            other => Err(OutcomeError::InvalidState {
                handling: other.handling(),
            }),
        }
    }

    /// Consume the outcome
    ///
    /// Returns the payload for `Handled`/`Return` and re-raises the captured
    /// error for `Rethrow`.
    ///
    /// # Panics
    ///
    /// Panics on `NoResult` and `Skip`: a non-decisive outcome reaching a
    /// consumer means the dispatcher contract was violated.
    pub fn get_result(self) -> Result<Option<Payload>, SharedError> {
        match self.try_get_result() {
            Ok(result) => result,
            Err(err) => panic!("{err}"),
        }
    }
}

impl fmt::Debug for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rethrow(error) => f
                .debug_tuple("Rethrow")
                .field(&format_args!("{error}"))
                .finish(),
            Self::Handled => f.write_str("Handled"),
            Self::Return(Some(_)) => f.write_str("Return(<payload>)"),
            Self::Return(None) => f.write_str("Return(None)"),
            Self::NoResult => f.write_str("NoResult"),
            Self::Skip => f.write_str("Skip"),
        }
    }
}
