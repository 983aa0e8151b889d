use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use bazaar_core::{ReservationId, StockKey};
use bazaar_inventory::Reservation;

use super::StoreError;

/// Reservation table, indexed on (product, status, expires_at).
pub trait ReservationStore: Send + Sync {
    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError>;

    /// Insert or replace; keeps the active/expiry indexes in step with `status`.
    fn save(&self, reservation: &Reservation) -> Result<(), StoreError>;

    /// Active holds whose `expires_at < now`, soonest-expiring first.
    fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reservation>, StoreError>;

    /// Active holds against one stock record.
    fn list_active(&self, key: &StockKey) -> Result<Vec<Reservation>, StoreError>;
}

impl<S> ReservationStore for Arc<S>
where
    S: ReservationStore + ?Sized,
{
    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        (**self).get(id)
    }

    fn save(&self, reservation: &Reservation) -> Result<(), StoreError> {
        (**self).save(reservation)
    }

    fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reservation>, StoreError> {
        (**self).list_expired(now, limit)
    }

    fn list_active(&self, key: &StockKey) -> Result<Vec<Reservation>, StoreError> {
        (**self).list_active(key)
    }
}

#[derive(Debug, Default)]
struct Tables {
    by_id: HashMap<ReservationId, Reservation>,
    /// Active holds ordered by expiry.
    expiry_index: BTreeSet<(DateTime<Utc>, ReservationId)>,
    /// Active holds per stock record.
    active_by_key: HashMap<StockKey, BTreeSet<ReservationId>>,
}

impl Tables {
    fn unindex(&mut self, r: &Reservation) {
        self.expiry_index.remove(&(r.expires_at(), r.id()));
        if let Some(ids) = self.active_by_key.get_mut(&r.key()) {
            ids.remove(&r.id());
            if ids.is_empty() {
                self.active_by_key.remove(&r.key());
            }
        }
    }

    fn index(&mut self, r: &Reservation) {
        if r.is_active() {
            self.expiry_index.insert((r.expires_at(), r.id()));
            self.active_by_key.entry(r.key()).or_default().insert(r.id());
        }
    }
}

/// In-memory reservation store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryReservationStore {
    tables: RwLock<Tables>,
}

impl InMemoryReservationStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl ReservationStore for InMemoryReservationStore {
    fn get(&self, id: ReservationId) -> Result<Option<Reservation>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables.by_id.get(&id).cloned())
    }

    fn save(&self, reservation: &Reservation) -> Result<(), StoreError> {
        let mut tables = self.tables.write().map_err(|_| StoreError::poisoned())?;
        if let Some(previous) = tables.by_id.get(&reservation.id()).cloned() {
            tables.unindex(&previous);
        }
        tables.index(reservation);
        tables.by_id.insert(reservation.id(), reservation.clone());
        Ok(())
    }

    fn list_expired(&self, now: DateTime<Utc>, limit: usize) -> Result<Vec<Reservation>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables
            .expiry_index
            .iter()
            .take_while(|(expires_at, _)| *expires_at < now)
            .take(limit)
            .filter_map(|(_, id)| tables.by_id.get(id).cloned())
            .collect())
    }

    fn list_active(&self, key: &StockKey) -> Result<Vec<Reservation>, StoreError> {
        let tables = self.tables.read().map_err(|_| StoreError::poisoned())?;
        Ok(tables
            .active_by_key
            .get(key)
            .map(|ids| ids.iter().filter_map(|id| tables.by_id.get(id).cloned()).collect())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{CartId, ProductId, StoreId};
    use bazaar_inventory::{ReleaseReason, ReservationContext};
    use chrono::Duration;

    fn hold(key: StockKey, now: DateTime<Utc>, ttl: Duration) -> Reservation {
        Reservation::new(
            ReservationId::new(),
            key,
            1,
            ReservationContext::for_cart(CartId::new()),
            now,
            ttl,
        )
        .unwrap()
    }

    #[test]
    fn expired_scan_returns_only_active_past_due_holds_in_expiry_order() {
        let store = InMemoryReservationStore::new();
        let now = Utc::now();
        let key = StockKey::new(StoreId::new(), ProductId(1));

        let late = hold(key, now - Duration::hours(3), Duration::hours(1));
        let early = hold(key, now - Duration::hours(5), Duration::hours(1));
        let fresh = hold(key, now, Duration::hours(1));
        let released = hold(key, now - Duration::hours(5), Duration::minutes(1));
        for r in [&late, &early, &fresh, &released] {
            store.save(r).unwrap();
        }
        store
            .save(&released.release(ReleaseReason::Cancelled, now).unwrap())
            .unwrap();

        let expired = store.list_expired(now, 10).unwrap();
        let ids: Vec<_> = expired.iter().map(|r| r.id()).collect();
        assert_eq!(ids, vec![early.id(), late.id()]);

        assert_eq!(store.list_expired(now, 1).unwrap().len(), 1);
    }

    #[test]
    fn active_index_follows_status_changes() {
        let store = InMemoryReservationStore::new();
        let now = Utc::now();
        let key = StockKey::new(StoreId::new(), ProductId(2));
        let a = hold(key, now, Duration::hours(1));
        let b = hold(key, now, Duration::hours(1));
        store.save(&a).unwrap();
        store.save(&b).unwrap();
        assert_eq!(store.list_active(&key).unwrap().len(), 2);

        store.save(&a.confirm(now).unwrap()).unwrap();
        let active = store.list_active(&key).unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id(), b.id());
        assert!(!store.get(a.id()).unwrap().unwrap().is_active());
    }
}
