use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use chrono::{DateTime, Utc};

use bazaar_core::StockKey;
use bazaar_inventory::StockMutation;

use super::StoreError;

/// Append-only stock audit log.
pub trait MutationLog: Send + Sync {
    /// Append the next entry. Sequences must increase by exactly one per key.
    fn append(&self, mutation: StockMutation) -> Result<(), StoreError>;

    /// Sequence of the last entry for `key` (0 when empty).
    fn last_sequence(&self, key: &StockKey) -> Result<u64, StoreError>;

    /// Entries for `key` in application order, optionally only those after `since`.
    fn history(
        &self,
        key: &StockKey,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StockMutation>, StoreError>;
}

impl<L> MutationLog for Arc<L>
where
    L: MutationLog + ?Sized,
{
    fn append(&self, mutation: StockMutation) -> Result<(), StoreError> {
        (**self).append(mutation)
    }

    fn last_sequence(&self, key: &StockKey) -> Result<u64, StoreError> {
        (**self).last_sequence(key)
    }

    fn history(
        &self,
        key: &StockKey,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StockMutation>, StoreError> {
        (**self).history(key, since)
    }
}

/// In-memory append-only log for tests/dev.
#[derive(Debug, Default)]
pub struct InMemoryMutationLog {
    streams: RwLock<HashMap<StockKey, Vec<StockMutation>>>,
}

impl InMemoryMutationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn arc() -> Arc<Self> {
        Arc::new(Self::new())
    }
}

impl MutationLog for InMemoryMutationLog {
    fn append(&self, mutation: StockMutation) -> Result<(), StoreError> {
        let mut streams = self.streams.write().map_err(|_| StoreError::poisoned())?;
        let stream = streams.entry(mutation.key).or_default();
        let last = stream.last().map(|m| m.sequence).unwrap_or(0);
        if mutation.sequence != last + 1 {
            return Err(StoreError::OutOfOrder {
                key: mutation.key,
                last,
                found: mutation.sequence,
            });
        }
        stream.push(mutation);
        Ok(())
    }

    fn last_sequence(&self, key: &StockKey) -> Result<u64, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::poisoned())?;
        Ok(streams
            .get(key)
            .and_then(|s| s.last())
            .map(|m| m.sequence)
            .unwrap_or(0))
    }

    fn history(
        &self,
        key: &StockKey,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<StockMutation>, StoreError> {
        let streams = self.streams.read().map_err(|_| StoreError::poisoned())?;
        Ok(streams
            .get(key)
            .map(|s| {
                s.iter()
                    .filter(|m| since.map_or(true, |t| m.occurred_at > t))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}
