//! Error types for the reactive core.
//!
//! Only programming-contract violations are hard errors. Everything advisory
//! (invalid watch sources, unsupported options, hooks used outside a bridge)
//! goes through [`crate::diagnostics`] instead.

use thiserror::Error;

/// Hard failures raised by reactive primitives.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReactiveError {
    /// A computed cell was written to but was created without a setter.
    #[error("computed value is readonly: it was created without a setter")]
    NotWritable,

    /// The target object was frozen with `prevent_extensions` and cannot be
    /// wrapped, swapped in, or extended with new keys.
    #[error("target object {id} is not extensible and cannot be observed")]
    NonExtensibleTarget {
        /// Identity of the rejected target.
        id: u64,
    },

    /// A computed value was read while it was already being computed.
    #[error("circular dependency detected while computing value {id}")]
    CircularDependency {
        /// Identity of the computed value that was re-entered.
        id: u64,
    },

    /// A list write landed further past the end than a single write may
    /// grow the list.
    #[error("index {index} is out of range for a list of length {len}")]
    IndexOutOfRange { index: usize, len: usize },
}

/// Convenience alias used across the crate.
pub type Result<T> = std::result::Result<T, ReactiveError>;
