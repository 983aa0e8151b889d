//! Stock ledger: the only writer of stock records.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};

use bazaar_core::{Clock, DomainError, DomainResult, StockKey, StoreId};
use bazaar_inventory::{
    StockMutation, StockOperationRequest, StockOperationType, StockOperationValidator, StockRecord,
    StockThresholds,
};

use crate::config::InventoryConfig;
use crate::locks::{ProductGuard, ProductLocks};
use crate::store::{MutationLog, StockStore};

/// Per-product stock accounting.
///
/// Every read-check-write runs inside the key's critical section and leaves
/// one audit entry behind, appended in the order the changes were applied.
pub struct StockLedger {
    stock: Arc<dyn StockStore>,
    log: Arc<dyn MutationLog>,
    clock: Arc<dyn Clock>,
    locks: ProductLocks,
    validator: StockOperationValidator,
}

impl core::fmt::Debug for StockLedger {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("StockLedger")
            .field("lock_timeout", &self.locks.timeout())
            .finish_non_exhaustive()
    }
}

impl StockLedger {
    pub fn new(
        stock: Arc<dyn StockStore>,
        log: Arc<dyn MutationLog>,
        clock: Arc<dyn Clock>,
        config: &InventoryConfig,
    ) -> Self {
        Self {
            stock,
            log,
            clock,
            locks: ProductLocks::new(config.lock_timeout),
            validator: StockOperationValidator::new(),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    pub fn validator(&self) -> &StockOperationValidator {
        &self.validator
    }

    /// Enter `key`'s critical section.
    pub fn lock(&self, key: StockKey) -> DomainResult<ProductGuard> {
        self.locks.acquire(key)
    }

    /// Create the record for a newly stocked product. Returns the existing
    /// record unchanged if there already is one.
    pub fn register(&self, key: StockKey, thresholds: StockThresholds) -> DomainResult<StockRecord> {
        if !key.product_id.is_valid() {
            return Err(DomainError::invalid_field(
                "productId",
                "required",
                "productId must be greater than zero",
            ));
        }
        thresholds.validate()?;

        let _guard = self.lock(key)?;
        if let Some(existing) = self.stock.get(&key)? {
            return Ok(existing);
        }
        let record = StockRecord::new(key, thresholds, self.now());
        self.stock.save(&record, None)?;
        info!(%key, "stock record registered");
        Ok(record)
    }

    /// Current record (consistent snapshot taken inside the critical section).
    pub fn get(&self, key: StockKey) -> DomainResult<StockRecord> {
        let guard = self.lock(key)?;
        self.load(&guard)
    }

    pub fn get_available(&self, key: StockKey) -> DomainResult<i64> {
        Ok(self.get(key)?.available())
    }

    /// All records of one store (read-only, not locked).
    pub fn list(&self, store_id: StoreId) -> DomainResult<Vec<StockRecord>> {
        Ok(self.stock.list(store_id)?)
    }

    /// Audit entries for `key` in application order.
    pub fn history(&self, key: StockKey, since: Option<DateTime<Utc>>) -> DomainResult<Vec<StockMutation>> {
        Ok(self.log.history(&key, since)?)
    }

    pub fn adjust_on_hand(
        &self,
        key: StockKey,
        delta: i64,
        operation: StockOperationType,
        reference: Option<String>,
    ) -> DomainResult<StockRecord> {
        let guard = self.lock(key)?;
        self.adjust_on_hand_locked(&guard, delta, operation, reference)
    }

    pub fn increment_reserved(&self, key: StockKey, qty: i64, reference: Option<String>) -> DomainResult<StockRecord> {
        let guard = self.lock(key)?;
        self.increment_reserved_locked(&guard, qty, reference)
    }

    pub fn decrement_reserved(&self, key: StockKey, qty: i64, reference: Option<String>) -> DomainResult<StockRecord> {
        let guard = self.lock(key)?;
        self.decrement_reserved_locked(&guard, qty, reference)
    }

    /// Back-office and order-side entry point for on-hand changes.
    ///
    /// Holds need a reservation record, so `Reservation`/`Release` requests
    /// are refused here.
    pub fn apply_operation(&self, store_id: StoreId, request: &StockOperationRequest) -> DomainResult<StockRecord> {
        self.validator.validate(request)?;

        let Some(delta) = request.operation.on_hand_delta(request.quantity) else {
            return Err(DomainError::invalid_field(
                "operationType",
                "unsupported_operation",
                format!("{} must go through the reservation manager", request.operation),
            ));
        };

        let key = StockKey::new(store_id, request.product_id);
        let record = self.adjust_on_hand(key, delta, request.operation, request.audit_reference())?;
        info!(
            %key,
            operation = %request.operation,
            quantity = request.quantity,
            user_id = ?request.user_id,
            reason = ?request.reason,
            on_hand = record.on_hand(),
            "stock operation applied"
        );
        Ok(record)
    }

    pub fn set_thresholds(&self, key: StockKey, thresholds: StockThresholds) -> DomainResult<StockRecord> {
        let guard = self.lock(key)?;
        let before = self.load(&guard)?;
        let after = before.with_thresholds(thresholds, self.now())?;
        self.stock.save(&after, Some(before.version()))?;
        Ok(after)
    }

    /// Soft-deactivate: existing holds can still be released or confirmed,
    /// new ones are refused.
    pub fn deactivate(&self, key: StockKey) -> DomainResult<StockRecord> {
        self.set_active(key, false)
    }

    pub fn reactivate(&self, key: StockKey) -> DomainResult<StockRecord> {
        self.set_active(key, true)
    }

    fn set_active(&self, key: StockKey, active: bool) -> DomainResult<StockRecord> {
        let guard = self.lock(key)?;
        let before = self.load(&guard)?;
        if before.is_active() == active {
            return Ok(before);
        }
        let after = before.with_active(active, self.now());
        self.stock.save(&after, Some(before.version()))?;
        info!(%key, active, "stock record activation changed");
        Ok(after)
    }

    pub(crate) fn load(&self, guard: &ProductGuard) -> DomainResult<StockRecord> {
        let key = guard.key();
        let record = self.stock.get(&key)?.ok_or(DomainError::StockNotFound(key))?;
        if let Err(e) = record.check_invariants() {
            error!(%key, error = %e, "stored stock record violates invariants");
            return Err(e);
        }
        Ok(record)
    }

    pub(crate) fn adjust_on_hand_locked(
        &self,
        guard: &ProductGuard,
        delta: i64,
        operation: StockOperationType,
        reference: Option<String>,
    ) -> DomainResult<StockRecord> {
        let before = self.load(guard)?;
        let after = before.adjust_on_hand(delta, self.now())?;
        self.commit(guard, &before, after, operation, delta, reference)
    }

    pub(crate) fn increment_reserved_locked(
        &self,
        guard: &ProductGuard,
        qty: i64,
        reference: Option<String>,
    ) -> DomainResult<StockRecord> {
        let before = self.load(guard)?;
        let after = before.increment_reserved(qty, self.now())?;
        self.commit(guard, &before, after, StockOperationType::Reservation, qty, reference)
    }

    pub(crate) fn decrement_reserved_locked(
        &self,
        guard: &ProductGuard,
        qty: i64,
        reference: Option<String>,
    ) -> DomainResult<StockRecord> {
        let before = self.load(guard)?;
        let (after, unmatched) = before.decrement_reserved(qty, self.now())?;
        if unmatched > 0 {
            // Releasing more than is held means a hold was freed twice upstream.
            warn!(
                key = %guard.key(),
                requested = qty,
                reserved = before.reserved(),
                unmatched,
                "reserved count clamped at zero"
            );
        }
        if after.reserved() == before.reserved() {
            return Ok(before);
        }
        self.commit(guard, &before, after, StockOperationType::Release, qty, reference)
    }

    /// Permanently deduct `qty` held units: on-hand and reserved drop together.
    pub(crate) fn commit_reserved_locked(
        &self,
        guard: &ProductGuard,
        qty: i64,
        reference: Option<String>,
    ) -> DomainResult<StockRecord> {
        let before = self.load(guard)?;
        let after = before.commit_reserved(qty, self.now()).inspect_err(|e| {
            if e.is_fatal() {
                error!(key = %guard.key(), error = %e, "cannot commit held stock");
            }
        })?;
        self.commit(guard, &before, after, StockOperationType::Sale, qty, reference)
    }

    fn commit(
        &self,
        guard: &ProductGuard,
        before: &StockRecord,
        after: StockRecord,
        operation: StockOperationType,
        quantity: i64,
        reference: Option<String>,
    ) -> DomainResult<StockRecord> {
        let key = guard.key();
        if after.key() != key {
            return Err(DomainError::consistency(format!(
                "write to {} attempted under the lock for {key}",
                after.key()
            )));
        }
        if let Err(e) = after.check_invariants() {
            error!(%key, error = %e, "refusing to write stock record that violates invariants");
            return Err(e);
        }

        let sequence = self.log.last_sequence(&key)? + 1;
        self.stock.save(&after, Some(before.version()))?;
        let mutation = StockMutation::between(sequence, operation, quantity, before, &after, reference);
        if let Err(e) = self.log.append(mutation) {
            // No audit row, no change: put the previous record back while the lock is held.
            if let Err(restore) = self.stock.save(before, Some(after.version())) {
                error!(%key, sequence, error = %e, restore_error = %restore, "audit append failed and stock record could not be restored");
                return Err(DomainError::consistency(format!(
                    "{key}: record v{} saved without audit entry {sequence}: {restore}",
                    after.version()
                )));
            }
            error!(%key, sequence, error = %e, "audit append failed; stock record restored");
            return Err(e.into());
        }

        debug!(
            %key,
            %operation,
            quantity,
            sequence,
            on_hand = after.on_hand(),
            reserved = after.reserved(),
            "stock mutation applied"
        );
        Ok(after)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use bazaar_core::{ManualClock, OrderId, ProductId, UserId};
    use bazaar_inventory::{StockLevels, verify_chain};

    use crate::store::faulty::FaultyMutationLog;
    use crate::store::{InMemoryMutationLog, InMemoryStockStore};

    fn ledger() -> StockLedger {
        StockLedger::new(
            InMemoryStockStore::arc(),
            InMemoryMutationLog::arc(),
            ManualClock::arc(Utc::now()),
            &InventoryConfig::default().with_lock_timeout(Duration::from_millis(50)),
        )
    }

    fn stocked(ledger: &StockLedger, on_hand: i64) -> StockKey {
        let key = StockKey::new(StoreId::new(), ProductId(1));
        ledger.register(key, StockThresholds::default()).unwrap();
        ledger
            .adjust_on_hand(key, on_hand, StockOperationType::Addition, None)
            .unwrap();
        key
    }

    #[test]
    fn register_is_idempotent() {
        let ledger = ledger();
        let key = stocked(&ledger, 4);
        let again = ledger
            .register(key, StockThresholds::new(Some(1), None))
            .unwrap();
        assert_eq!(again.on_hand(), 4);
        assert_eq!(again.min_level(), 10);
    }

    #[test]
    fn unknown_product_is_not_found() {
        let ledger = ledger();
        let key = StockKey::new(StoreId::new(), ProductId(99));
        assert_eq!(ledger.get_available(key).unwrap_err(), DomainError::StockNotFound(key));
    }

    #[test]
    fn removing_held_units_is_refused_and_state_unchanged() {
        let ledger = ledger();
        let key = stocked(&ledger, 10);
        ledger.increment_reserved(key, 6, None).unwrap();

        let err = ledger
            .adjust_on_hand(key, -5, StockOperationType::Subtraction, None)
            .unwrap_err();
        assert_eq!(err, DomainError::insufficient(5, 4));
        assert_eq!(ledger.get(key).unwrap().levels(), StockLevels { on_hand: 10, reserved: 6 });
    }

    #[test]
    fn over_reservation_fails_with_no_partial_hold() {
        let ledger = ledger();
        let key = stocked(&ledger, 2);
        let err = ledger.increment_reserved(key, 5, None).unwrap_err();
        assert_eq!(err, DomainError::insufficient(5, 2));
        assert_eq!(ledger.get(key).unwrap().levels(), StockLevels { on_hand: 2, reserved: 0 });
    }

    #[test]
    fn double_decrement_clamps_and_writes_nothing_the_second_time() {
        let ledger = ledger();
        let key = stocked(&ledger, 5);
        ledger.increment_reserved(key, 2, None).unwrap();
        ledger.decrement_reserved(key, 2, None).unwrap();
        let entries = ledger.history(key, None).unwrap().len();

        let record = ledger.decrement_reserved(key, 2, None).unwrap();
        assert_eq!(record.reserved(), 0);
        assert_eq!(ledger.history(key, None).unwrap().len(), entries);
    }

    #[test]
    fn every_change_is_audited_in_order() {
        let ledger = ledger();
        let key = stocked(&ledger, 10);
        ledger.increment_reserved(key, 3, Some("cart:a".into())).unwrap();
        ledger.decrement_reserved(key, 1, None).unwrap();
        ledger
            .adjust_on_hand(key, -2, StockOperationType::Damage, Some("broken".into()))
            .unwrap();

        let log = ledger.history(key, None).unwrap();
        let ops: Vec<_> = log.iter().map(|m| m.operation).collect();
        assert_eq!(
            ops,
            vec![
                StockOperationType::Addition,
                StockOperationType::Reservation,
                StockOperationType::Release,
                StockOperationType::Damage,
            ]
        );
        assert!(verify_chain(&log).is_ok());
        assert_eq!(log[1].reference.as_deref(), Some("cart:a"));
        assert_eq!(log[3].new_stock, StockLevels { on_hand: 8, reserved: 2 });
    }

    #[test]
    fn failed_audit_append_leaves_the_record_untouched() {
        let log = FaultyMutationLog::arc();
        let ledger = StockLedger::new(
            InMemoryStockStore::arc(),
            log.clone(),
            ManualClock::arc(Utc::now()),
            &InventoryConfig::default(),
        );
        let key = stocked(&ledger, 10);

        log.fail_appends(true);
        let err = ledger
            .adjust_on_hand(key, -4, StockOperationType::Damage, Some("crushed".into()))
            .unwrap_err();
        assert_eq!(err, DomainError::storage("log down"));
        assert_eq!(ledger.get(key).unwrap().on_hand(), 10);
        let log_entries = ledger.history(key, None).unwrap();
        assert_eq!(log_entries.last().map(|m| m.new_stock.on_hand), Some(10));

        log.fail_appends(false);
        assert_eq!(
            ledger
                .adjust_on_hand(key, -4, StockOperationType::Damage, Some("crushed".into()))
                .unwrap()
                .on_hand(),
            6
        );
        assert!(verify_chain(&ledger.history(key, None).unwrap()).is_ok());
    }

    #[test]
    fn apply_operation_validates_and_maps_signs() {
        let ledger = ledger();
        let key = stocked(&ledger, 10);

        let sale = StockOperationRequest::new(key.product_id, StockOperationType::Sale, 3).with_order(OrderId::new());
        assert_eq!(ledger.apply_operation(key.store_id, &sale).unwrap().on_hand(), 7);

        let adjust = StockOperationRequest::new(key.product_id, StockOperationType::Adjustment, -2)
            .with_reason("recount")
            .with_user(UserId::new());
        assert_eq!(ledger.apply_operation(key.store_id, &adjust).unwrap().on_hand(), 5);

        let bad = StockOperationRequest::new(key.product_id, StockOperationType::Adjustment, 0);
        assert!(matches!(
            ledger.apply_operation(key.store_id, &bad),
            Err(DomainError::Validation(errors)) if errors.has("quantity", "non_zero")
        ));

        let hold = StockOperationRequest::new(key.product_id, StockOperationType::Reservation, 1)
            .with_order(OrderId::new());
        assert!(matches!(
            ledger.apply_operation(key.store_id, &hold),
            Err(DomainError::Validation(errors)) if errors.has("operationType", "unsupported_operation")
        ));
    }

    #[test]
    fn operations_time_out_while_the_product_is_locked() {
        let ledger = ledger();
        let key = stocked(&ledger, 10);
        let _guard = ledger.lock(key).unwrap();

        let err = ledger.increment_reserved(key, 1, None).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn deactivated_records_refuse_new_holds_but_release_existing_ones() {
        let ledger = ledger();
        let key = stocked(&ledger, 10);
        ledger.increment_reserved(key, 4, None).unwrap();
        ledger.deactivate(key).unwrap();

        assert_eq!(
            ledger.increment_reserved(key, 1, None).unwrap_err(),
            DomainError::ProductInactive(key)
        );
        assert_eq!(ledger.decrement_reserved(key, 4, None).unwrap().reserved(), 0);

        ledger.reactivate(key).unwrap();
        assert!(ledger.increment_reserved(key, 1, None).is_ok());
    }
}
