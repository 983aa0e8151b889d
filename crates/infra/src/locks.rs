//! Per-product critical sections.
//!
//! Each stock key gets its own lock; the table itself is only held long
//! enough to look the entry up, so different products never wait on each
//! other. Acquisition waits at most `timeout` and then fails with
//! `LockTimeout`.

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use tracing::debug;

use bazaar_core::{DomainError, DomainResult, StockKey};

#[derive(Debug, Default)]
struct KeyLock {
    held: Mutex<bool>,
    released: Condvar,
}

/// Lock table keyed by stock record.
#[derive(Debug)]
pub struct ProductLocks {
    table: Mutex<HashMap<StockKey, Arc<KeyLock>>>,
    timeout: Duration,
}

impl ProductLocks {
    pub fn new(timeout: Duration) -> Self {
        Self {
            table: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Enter the critical section for `key`. Released when the guard drops.
    pub fn acquire(&self, key: StockKey) -> DomainResult<ProductGuard> {
        let lock = {
            let mut table = self
                .table
                .lock()
                .map_err(|_| DomainError::storage("lock table poisoned"))?;
            table.entry(key).or_default().clone()
        };

        let started = Instant::now();
        let held = lock
            .held
            .lock()
            .map_err(|_| DomainError::storage("stock lock poisoned"))?;
        let (mut held, wait) = lock
            .released
            .wait_timeout_while(held, self.timeout, |held| *held)
            .map_err(|_| DomainError::storage("stock lock poisoned"))?;

        if wait.timed_out() && *held {
            let waited_ms = started.elapsed().as_millis() as u64;
            debug!(%key, waited_ms, "stock lock wait timed out");
            return Err(DomainError::LockTimeout { key, waited_ms });
        }

        *held = true;
        drop(held);

        Ok(ProductGuard {
            key,
            lock: Some(lock),
        })
    }
}

/// Proof that the caller is inside `key`'s critical section.
#[derive(Debug)]
pub struct ProductGuard {
    key: StockKey,
    lock: Option<Arc<KeyLock>>,
}

impl ProductGuard {
    pub fn key(&self) -> StockKey {
        self.key
    }
}

impl Drop for ProductGuard {
    fn drop(&mut self) {
        if let Some(lock) = self.lock.take() {
            let mut held = match lock.held.lock() {
                Ok(h) => h,
                Err(poisoned) => poisoned.into_inner(),
            };
            *held = false;
            drop(held);
            lock.released.notify_one();
        }
    }
}
