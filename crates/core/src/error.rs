//! Errors produced by aggregate command handling.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Deterministic outcome of rejecting a command.
///
/// Every variant is a business decision made against current aggregate state.
/// Storage and transport failures live in the infrastructure error types, and
/// authorization is decided at the HTTP boundary before a command is ever
/// dispatched.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// The input itself is unacceptable: empty names, malformed emails,
    /// non-positive amounts.
    #[error("validation failed: {0}")]
    Validation(String),

    /// The command contradicts current state, e.g. creating an aggregate
    /// twice or addressing it from the wrong tenant.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier failed to parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// The aggregate was never created, or has been deleted.
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_carry_the_reason() {
        assert_eq!(
            DomainError::validation("expense amount must be positive").to_string(),
            "validation failed: expense amount must be positive"
        );
        assert_eq!(
            DomainError::invariant("user already exists").to_string(),
            "invariant violated: user already exists"
        );
        assert_eq!(DomainError::NotFound.to_string(), "not found");
    }
}
