//! Storage seams behind the ledger.
//!
//! The engine only needs keyed get/save for stock records, an indexed
//! reservation table and an append-only mutation log. Any engine (SQL,
//! embedded KV, ...) can sit behind these traits; the in-memory versions
//! are for tests/dev.

#[cfg(test)]
pub(crate) mod faulty;
mod mutation_log;
mod reservation;
mod stock;

use bazaar_core::{DomainError, StockKey};

pub use mutation_log::{InMemoryMutationLog, MutationLog};
pub use reservation::{InMemoryReservationStore, ReservationStore};
pub use stock::{InMemoryStockStore, StockStore};

/// Storage adapter error.
#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("stale write on {key} (expected version {expected}, stored {actual})")]
    VersionConflict {
        key: StockKey,
        expected: u64,
        actual: u64,
    },
    #[error("mutation log out of order on {key} (last {last}, appended {found})")]
    OutOfOrder { key: StockKey, last: u64, found: u64 },
    #[error("storage error: {0}")]
    Storage(String),
}

impl StoreError {
    pub(crate) fn poisoned() -> Self {
        Self::Storage("store lock poisoned".to_string())
    }
}

impl From<StoreError> for DomainError {
    fn from(value: StoreError) -> Self {
        match value {
            // The ledger writes under the per-key lock, so a stale or
            // out-of-order write means something bypassed it.
            StoreError::VersionConflict { .. } | StoreError::OutOfOrder { .. } => {
                DomainError::consistency(value.to_string())
            }
            StoreError::Storage(msg) => DomainError::storage(msg),
        }
    }
}
