//! Store error types.

use crate::domain::DomainError;

/// Errors returned by the rider, route and trip stores.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// No record with this id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// The record exists but is in a state that forbids the operation
    #[error("conflict: {0}")]
    Conflict(String),

    /// Rejected input
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The store could not be reached
    #[error("store unavailable: {0}")]
    Unavailable(String),

    /// The call did not complete in time; its effect is unknown
    #[error("store call timed out: {0}")]
    Timeout(&'static str),
}

impl StoreError {
    pub(crate) fn not_found(kind: &'static str, id: impl ToString) -> Self {
        StoreError::NotFound {
            kind,
            id: id.to_string(),
        }
    }

    /// Whether retrying the call may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Timeout(_))
    }
}

impl From<DomainError> for StoreError {
    fn from(err: DomainError) -> Self {
        StoreError::InvalidArgument(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = StoreError::not_found("route", "route_9");
        assert_eq!(err.to_string(), "route not found: route_9");

        let err = StoreError::Timeout("reserve_seats");
        assert_eq!(err.to_string(), "store call timed out: reserve_seats");
    }

    #[test]
    fn transient_classification() {
        assert!(StoreError::Unavailable("down".into()).is_transient());
        assert!(StoreError::Timeout("get_route").is_transient());
        assert!(!StoreError::Conflict("assigned".into()).is_transient());
        assert!(!StoreError::not_found("trip", "t").is_transient());
    }
}
