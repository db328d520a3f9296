//! Convention adapters for the composition system
//!
//! Adapters wrap plain closures or other conventions and expose the
//! [`Convention`](errmap_core::Convention) trait, so simple mappings can be
//! registered without a dedicated type.

mod conditional;
mod delegate;

pub use conditional::ConditionalConvention;
pub use delegate::DelegateConvention;
