//! Domain error types.
//!
//! These errors represent validation failures in the domain layer.
//! They are distinct from store and protocol errors.

use super::InvalidId;

/// Domain-level validation errors.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DomainError {
    /// Malformed identifier
    #[error(transparent)]
    InvalidId(#[from] InvalidId),

    /// Route registration data is inconsistent
    #[error("invalid route: {0}")]
    InvalidRoute(&'static str),
}
