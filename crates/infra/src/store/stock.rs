use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use bazaar_core::{StockKey, StoreId};
use bazaar_inventory::StockRecord;

use super::StoreError;

/// Stock records keyed by (store, product).
pub trait StockStore: Send + Sync {
    fn get(&self, key: &StockKey) -> Result<Option<StockRecord>, StoreError>;

    /// Insert or replace `record`.
    ///
    /// `expected_version` is the version the caller read (`None` for a new
    /// record); the write is rejected if the stored record has moved on.
    fn save(&self, record: &StockRecord, expected_version: Option<u64>) -> Result<(), StoreError>;

    /// All records of one store, ordered by product.
    fn list(&self, store_id: StoreId) -> Result<Vec<StockRecord>, StoreError>;
}

impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    fn get(&self, key: &StockKey) -> Result<Option<StockRecord>, StoreError> {
        (**self).get(key)
    }

    fn save(&self, record: &StockRecord, expected_version: Option<u64>) -> Result<(), StoreError> {
        (**self).save(record, expected_version)
    }

    fn list(&self, store_id: StoreId) -> Result<Vec<StockRecord>, StoreError> {
        (**self).list(store_id)
    }
}

/// In-memory stock store for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryStockStore {
    records: RwLock<BTreeMap<StockKey, StockRecord>>,
}

impl InMemoryStockStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl StockStore for InMemoryStockStore {
    fn get(&self, key: &StockKey) -> Result<Option<StockRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records.get(key).cloned())
    }

    fn save(&self, record: &StockRecord, expected_version: Option<u64>) -> Result<(), StoreError> {
        let mut records = self.records.write().map_err(|_| StoreError::poisoned())?;
        let key = record.key();
        match (records.get(&key), expected_version) {
            (None, None) => {}
            (Some(stored), Some(expected)) if stored.version() == expected => {}
            (stored, expected) => {
                return Err(StoreError::VersionConflict {
                    key,
                    expected: expected.unwrap_or(0),
                    actual: stored.map_or(0, |s| s.version()),
                });
            }
        }
        records.insert(key, record.clone());
        Ok(())
    }

    fn list(&self, store_id: StoreId) -> Result<Vec<StockRecord>, StoreError> {
        let records = self.records.read().map_err(|_| StoreError::poisoned())?;
        Ok(records
            .values()
            .filter(|r| r.store_id() == store_id)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::ProductId;
    use bazaar_inventory::StockThresholds;
    use chrono::Utc;

    #[test]
    fn save_rejects_stale_versions() {
        let store = InMemoryStockStore::new();
        let now = Utc::now();
        let key = StockKey::new(StoreId::new(), ProductId(1));
        let r0 = StockRecord::new(key, StockThresholds::default(), now);
        store.save(&r0, None).unwrap();

        // Creating twice is a conflict.
        assert!(matches!(store.save(&r0, None), Err(StoreError::VersionConflict { .. })));

        let r1 = r0.adjust_on_hand(5, now).unwrap();
        store.save(&r1, Some(0)).unwrap();

        let stale = r0.adjust_on_hand(9, now).unwrap();
        let err = store.save(&stale, Some(0)).unwrap_err();
        assert!(matches!(err, StoreError::VersionConflict { expected: 0, actual: 1, .. }));

        assert_eq!(store.get(&key).unwrap().unwrap().on_hand(), 5);
    }

    #[test]
    fn list_is_scoped_to_one_store() {
        let store = InMemoryStockStore::new();
        let now = Utc::now();
        let mine = StoreId::new();
        let theirs = StoreId::new();
        for (s, p) in [(mine, 2), (mine, 1), (theirs, 1)] {
            let r = StockRecord::new(StockKey::new(s, ProductId(p)), StockThresholds::default(), now);
            store.save(&r, None).unwrap();
        }

        let listed = store.list(mine).unwrap();
        assert_eq!(listed.len(), 2);
        assert!(listed.iter().all(|r| r.store_id() == mine));
    }
}
