//! Deterministic business failures shared by every domain module.
//!
//! Anything to do with storage, transport or serialization stays out of this
//! enum; those live with the infrastructure that caused them.

use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-range input.
    #[error("validation failed: {0}")]
    Validation(String),

    /// A rule the domain must never break would have been broken.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier string did not parse.
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    #[error("not found")]
    NotFound,

    /// Stale revision, duplicate code, or another writer got there first.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorized")]
    Unauthorized,

    /// Free stock cannot cover the requested reserve or commit.
    #[error("insufficient inventory: {0}")]
    InsufficientInventory(String),

    /// The operation is not legal from the current lifecycle state,
    /// e.g. cancelling an order that already shipped.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// A second payment was attempted against a settled order.
    #[error("already paid")]
    AlreadyPaid,
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

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    pub fn insufficient_inventory(msg: impl Into<String>) -> Self {
        Self::InsufficientInventory(msg.into())
    }

    pub fn invalid_state(msg: impl Into<String>) -> Self {
        Self::InvalidState(msg.into())
    }
}
