use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{DomainError, DomainResult, ProductId, StockKey, StoreId};

/// Low-stock level used when a record has none configured.
pub const DEFAULT_MIN_LEVEL: i64 = 10;

/// Snapshot of the two stored counters.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevels {
    pub on_hand: i64,
    pub reserved: i64,
}

impl StockLevels {
    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }
}

/// Alerting thresholds for one stock record.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockThresholds {
    pub min_level: Option<i64>,
    pub max_level: Option<i64>,
}

impl StockThresholds {
    pub fn new(min_level: Option<i64>, max_level: Option<i64>) -> Self {
        Self {
            min_level,
            max_level,
        }
    }

    pub fn validate(&self) -> DomainResult<()> {
        if self.min_level.is_some_and(|m| m < 0) {
            return Err(DomainError::invalid_field(
                "minLevel",
                "out_of_range",
                "minLevel cannot be negative",
            ));
        }
        if let (Some(min), Some(max)) = (self.min_level, self.max_level) {
            if max < min {
                return Err(DomainError::invalid_field(
                    "maxLevel",
                    "out_of_range",
                    "maxLevel cannot be below minLevel",
                ));
            }
        }
        Ok(())
    }
}

/// Stock of one product in one store.
///
/// `available` is always derived from `on_hand - reserved` and never stored.
/// Transitions are pure: each returns the next record and leaves `self` untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockRecord {
    key: StockKey,
    on_hand: i64,
    reserved: i64,
    thresholds: StockThresholds,
    is_active: bool,
    last_updated_at: DateTime<Utc>,
    version: u64,
}

impl StockRecord {
    /// A freshly stocked product: nothing on hand, nothing held.
    pub fn new(key: StockKey, thresholds: StockThresholds, at: DateTime<Utc>) -> Self {
        Self {
            key,
            on_hand: 0,
            reserved: 0,
            thresholds,
            is_active: true,
            last_updated_at: at,
            version: 0,
        }
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn store_id(&self) -> StoreId {
        self.key.store_id
    }

    pub fn product_id(&self) -> ProductId {
        self.key.product_id
    }

    pub fn on_hand(&self) -> i64 {
        self.on_hand
    }

    pub fn reserved(&self) -> i64 {
        self.reserved
    }

    pub fn available(&self) -> i64 {
        self.on_hand - self.reserved
    }

    pub fn levels(&self) -> StockLevels {
        StockLevels {
            on_hand: self.on_hand,
            reserved: self.reserved,
        }
    }

    pub fn thresholds(&self) -> StockThresholds {
        self.thresholds
    }

    pub fn min_level(&self) -> i64 {
        self.thresholds.min_level.unwrap_or(DEFAULT_MIN_LEVEL)
    }

    pub fn max_level(&self) -> Option<i64> {
        self.thresholds.max_level
    }

    pub fn is_active(&self) -> bool {
        self.is_active
    }

    pub fn last_updated_at(&self) -> DateTime<Utc> {
        self.last_updated_at
    }

    /// Number of mutations applied since creation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// `0 <= reserved <= on_hand`.
    pub fn check_invariants(&self) -> DomainResult<()> {
        if self.on_hand < 0 || self.reserved < 0 || self.reserved > self.on_hand {
            return Err(DomainError::consistency(format!(
                "stock record {} has on_hand={} reserved={}",
                self.key, self.on_hand, self.reserved
            )));
        }
        Ok(())
    }

    /// Apply a signed delta to on-hand.
    ///
    /// Fails with `InsufficientStock` when the result would drop below what is held.
    pub fn adjust_on_hand(&self, delta: i64, at: DateTime<Utc>) -> DomainResult<Self> {
        if delta == 0 {
            return Err(DomainError::invalid_field("quantity", "non_zero", "quantity must be non-zero"));
        }
        let on_hand = self
            .on_hand
            .checked_add(delta)
            .ok_or_else(|| DomainError::invalid_field("quantity", "out_of_range", "on-hand would overflow"))?;
        if on_hand < self.reserved {
            return Err(DomainError::insufficient(-delta, self.available()));
        }
        Ok(self.next(on_hand, self.reserved, at))
    }

    /// Hold `qty` units. All or nothing.
    pub fn increment_reserved(&self, qty: i64, at: DateTime<Utc>) -> DomainResult<Self> {
        ensure_positive(qty)?;
        if !self.is_active {
            return Err(DomainError::ProductInactive(self.key));
        }
        if self.available() < qty {
            return Err(DomainError::insufficient(qty, self.available()));
        }
        Ok(self.next(self.on_hand, self.reserved + qty, at))
    }

    /// Give back `qty` held units, clamping at zero.
    ///
    /// Returns the next record and the number of units that could not be
    /// released because nothing was held for them.
    pub fn decrement_reserved(&self, qty: i64, at: DateTime<Utc>) -> DomainResult<(Self, i64)> {
        ensure_positive(qty)?;
        let released = qty.min(self.reserved);
        Ok((self.next(self.on_hand, self.reserved - released, at), qty - released))
    }

    /// Turn `qty` held units into a permanent deduction.
    ///
    /// On-hand and reserved both drop by `qty`, so `available` is unchanged.
    pub fn commit_reserved(&self, qty: i64, at: DateTime<Utc>) -> DomainResult<Self> {
        ensure_positive(qty)?;
        if self.reserved < qty {
            return Err(DomainError::consistency(format!(
                "cannot commit {qty} held units on {}: only {} reserved",
                self.key, self.reserved
            )));
        }
        Ok(self.next(self.on_hand - qty, self.reserved - qty, at))
    }

    pub fn with_thresholds(&self, thresholds: StockThresholds, at: DateTime<Utc>) -> DomainResult<Self> {
        thresholds.validate()?;
        let mut next = self.next(self.on_hand, self.reserved, at);
        next.thresholds = thresholds;
        Ok(next)
    }

    pub fn with_active(&self, is_active: bool, at: DateTime<Utc>) -> Self {
        let mut next = self.next(self.on_hand, self.reserved, at);
        next.is_active = is_active;
        next
    }

    fn next(&self, on_hand: i64, reserved: i64, at: DateTime<Utc>) -> Self {
        Self {
            key: self.key,
            on_hand,
            reserved,
            thresholds: self.thresholds,
            is_active: self.is_active,
            last_updated_at: at,
            version: self.version + 1,
        }
    }
}

fn ensure_positive(qty: i64) -> DomainResult<()> {
    if qty <= 0 {
        return Err(DomainError::invalid_field(
            "quantity",
            "non_positive",
            "quantity must be positive",
        ));
    }
    Ok(())
}
