//! Store wrappers that fail on demand, for error-path tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};

use bazaar_core::{ReservationId, StockKey};
use bazaar_inventory::{Reservation, StockMutation};

use super::{InMemoryMutationLog, InMemoryReservationStore, MutationLog, ReservationStore, StoreError};

#[derive(Debug, Default)]
pub(crate) struct FaultyReservationStore {
    inner: InMemoryReservationStore,
    fail_saves: AtomicBool,
}

impl FaultyReservationStore {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

impl ReservationStore for FaultyReservationStore {
    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        self.inner.get(id)
    }

    fn save(&self, reservation: &Reservation) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("disk full".to_string()));
        }
        self.inner.save(reservation)
    }

    fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reservation>, StoreError> {
        self.inner.list_expired(now, limit)
    }

    fn list_active(&self, key: &StockKey) -> Result<Vec<Reservation>, StoreError> {
        self.inner.list_active(key)
    }
}

#[derive(Debug, Default)]
pub(crate) struct FaultyMutationLog {
    inner: InMemoryMutationLog,
    fail_appends: AtomicBool,
}

impl FaultyMutationLog {
    pub(crate) fn arc() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn fail_appends(&self, fail: bool) {
        self.fail_appends.store(fail, Ordering::SeqCst);
    }
}

impl MutationLog for FaultyMutationLog {
    fn append(&self, mutation: StockMutation) -> Result<(), StoreError> {
        if self.fail_appends.load(Ordering::SeqCst) {
            return Err(StoreError::Storage("log down".to_string()));
        }
        self.inner.append(mutation)
    }

    fn last_sequence(&self, key: &StockKey) -> Result<u64, StoreError> {
        self.inner.last_sequence(key)
    }

    fn history(&self, key: &StockKey, since: Option<DateTime<Utc>>) -> Result<Vec<StockMutation>, StoreError> {
        self.inner.history(key, since)
    }
}
