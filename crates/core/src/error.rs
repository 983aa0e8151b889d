//! Domain error model.

use thiserror::Error;

use crate::id::{ReservationId, StockKey};
use crate::validation::ValidationErrors;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Business failures (validation, insufficient stock, reservation misuse,
/// lock contention) are ordinary values callers branch on. Only
/// `ConsistencyViolation` and `Storage` are meant to abort a request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Malformed or out-of-policy request, with every rejected field.
    #[error("validation failed: {0}")]
    Validation(ValidationErrors),

    /// Not enough free units to satisfy the request.
    #[error("insufficient stock (requested: {requested}, available: {available})")]
    InsufficientStock { requested: i64, available: i64 },

    /// The hold lapsed before it was confirmed.
    #[error("reservation {0} has expired")]
    ReservationExpired(ReservationId),

    #[error("reservation {0} not found")]
    ReservationNotFound(ReservationId),

    /// No stock record exists for the product in this store.
    #[error("no stock record for {0}")]
    StockNotFound(StockKey),

    /// The stock record was soft-deactivated and accepts no new holds.
    #[error("stock record {0} is inactive")]
    ProductInactive(StockKey),

    /// The per-product critical section could not be acquired in time.
    #[error("timed out after {waited_ms}ms waiting for stock lock on {key}")]
    LockTimeout { key: StockKey, waited_ms: u64 },

    /// The caller cancelled before the mutation was applied.
    #[error("operation cancelled before it was applied")]
    Cancelled,

    /// An invariant was found broken. Indicates a bug.
    #[error("consistency violation: {0}")]
    ConsistencyViolation(String),

    /// The backing store failed.
    #[error("storage failure: {0}")]
    Storage(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(errors: ValidationErrors) -> Self {
        Self::Validation(errors)
    }

    /// Validation failure on a single field.
    pub fn invalid_field(field: &str, code: &str, message: impl Into<String>) -> Self {
        Self::Validation(ValidationErrors::single(field, code, message))
    }

    pub fn insufficient(requested: i64, available: i64) -> Self {
        Self::InsufficientStock {
            requested,
            available,
        }
    }

    pub fn consistency(msg: impl Into<String>) -> Self {
        Self::ConsistencyViolation(msg.into())
    }

    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// Safe to retry with backoff.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout { .. })
    }

    /// Must abort the request rather than be handled as a business outcome.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::ConsistencyViolation(_) | Self::Storage(_))
    }
}

impl From<ValidationErrors> for DomainError {
    fn from(value: ValidationErrors) -> Self {
        Self::Validation(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::id::{ProductId, StoreId};

    #[test]
    fn only_lock_timeouts_are_retryable() {
        let key = StockKey::new(StoreId::new(), ProductId(7));
        assert!(DomainError::LockTimeout { key, waited_ms: 10 }.is_retryable());
        assert!(!DomainError::insufficient(3, 1).is_retryable());
        assert!(!DomainError::consistency("reserved > on_hand").is_retryable());
    }

    #[test]
    fn fatal_errors_are_consistency_and_storage() {
        assert!(DomainError::consistency("x").is_fatal());
        assert!(DomainError::storage("down").is_fatal());
        assert!(!DomainError::insufficient(1, 0).is_fatal());
        assert!(!DomainError::ReservationNotFound(ReservationId::new()).is_fatal());
    }

    #[test]
    fn validation_message_lists_every_field() {
        let mut errors = ValidationErrors::new();
        errors.push("quantity", "non_zero", "quantity must be non-zero");
        errors.push("reason", "required", "reason is required");
        let msg = DomainError::from(errors).to_string();
        assert!(msg.contains("quantity: quantity must be non-zero"));
        assert!(msg.contains("reason: reason is required"));
    }
}
