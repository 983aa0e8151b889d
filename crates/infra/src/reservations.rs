//! Reservation lifecycle on top of the stock ledger.

use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, error, info};

use bazaar_core::{DomainError, DomainResult, ReservationId, StockKey};
use bazaar_inventory::{
    ReleaseReason, Reservation, ReservationContext, ReservationStatus, StockOperationRequest,
    StockOperationType, StockRecord,
};

use crate::cancel::CancellationFlag;
use crate::carts::CartActivityTracker;
use crate::ledger::StockLedger;
use crate::store::ReservationStore;

/// Creates, confirms and releases holds.
///
/// Each transition takes the product's critical section once and performs
/// the ledger change and the reservation write inside it, so the sum of
/// Active holds always matches the record's `reserved`.
pub struct ReservationManager {
    ledger: Arc<StockLedger>,
    reservations: Arc<dyn ReservationStore>,
    carts: Arc<CartActivityTracker>,
    default_ttl: Duration,
}

impl core::fmt::Debug for ReservationManager {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ReservationManager")
            .field("default_ttl", &self.default_ttl)
            .finish_non_exhaustive()
    }
}

impl ReservationManager {
    pub fn new(
        ledger: Arc<StockLedger>,
        reservations: Arc<dyn ReservationStore>,
        carts: Arc<CartActivityTracker>,
        default_ttl: StdDuration,
    ) -> Self {
        Self {
            ledger,
            reservations,
            carts,
            default_ttl: Duration::from_std(default_ttl).unwrap_or_else(|_| bazaar_inventory::default_reservation_ttl()),
        }
    }

    pub fn ledger(&self) -> &Arc<StockLedger> {
        &self.ledger
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.ledger.now()
    }

    /// Hold `qty` units of `key` for `ttl` (the configured default when `None`).
    pub fn reserve(
        &self,
        key: StockKey,
        qty: i64,
        ttl: Option<StdDuration>,
        context: ReservationContext,
    ) -> DomainResult<Reservation> {
        self.reserve_cancellable(key, qty, ttl, context, &CancellationFlag::new())
    }

    /// `reserve`, abandoned if `cancel` is set before the hold is applied.
    pub fn reserve_cancellable(
        &self,
        key: StockKey,
        qty: i64,
        ttl: Option<StdDuration>,
        context: ReservationContext,
        cancel: &CancellationFlag,
    ) -> DomainResult<Reservation> {
        self.validate_hold(key, qty, &context)?;
        let ttl = match ttl {
            Some(ttl) => Duration::from_std(ttl)
                .map_err(|_| DomainError::invalid_field("ttl", "out_of_range", "ttl is too large"))?,
            None => self.default_ttl,
        };

        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }
        let guard = self.ledger.lock(key)?;
        if cancel.is_cancelled() {
            return Err(DomainError::Cancelled);
        }

        let now = self.now();
        let reservation = Reservation::new(ReservationId::new(), key, qty, context, now, ttl)?;
        self.ledger
            .increment_reserved_locked(&guard, qty, Some(reservation.audit_reference()))?;

        if let Err(e) = self.reservations.save(&reservation) {
            // Undo the hold so reserved keeps matching the Active reservations.
            error!(%key, reservation_id = %reservation.id(), error = %e, "failed to persist reservation; rolling back hold");
            self.ledger
                .decrement_reserved_locked(&guard, qty, Some(reservation.audit_reference()))?;
            return Err(e.into());
        }
        drop(guard);

        if let Some(cart_id) = reservation.cart_id() {
            self.carts.hold_placed(cart_id, &reservation, now);
        }
        info!(
            %key,
            reservation_id = %reservation.id(),
            quantity = qty,
            expires_at = %reservation.expires_at(),
            "stock reserved"
        );
        Ok(reservation)
    }

    /// Turn an Active, unexpired hold into a permanent deduction.
    ///
    /// Confirming an already Confirmed hold returns it unchanged.
    pub fn confirm(&self, id: ReservationId) -> DomainResult<Reservation> {
        let key = self.get(id)?.key();
        let guard = self.ledger.lock(key)?;
        let current = self.get(id)?;
        if current.status() == ReservationStatus::Confirmed {
            return Ok(current);
        }

        let now = self.now();
        let confirmed = current.confirm(now)?;
        self.transition(&current, &confirmed, || {
            self.ledger
                .commit_reserved_locked(&guard, current.quantity(), Some(current.audit_reference()))
        })?;
        drop(guard);

        if let Some(cart_id) = confirmed.cart_id() {
            self.carts.hold_checked_out(cart_id, id);
        }
        info!(%key, reservation_id = %id, quantity = confirmed.quantity(), "reservation confirmed");
        Ok(confirmed)
    }

    /// Give an Active hold back. Releasing a hold that is already terminal is
    /// a no-op that returns the stored reservation.
    pub fn release(&self, id: ReservationId, reason: ReleaseReason) -> DomainResult<Reservation> {
        let stored = self.get(id)?;
        if stored.status().is_terminal() {
            debug!(reservation_id = %id, status = ?stored.status(), "release of terminal reservation ignored");
            return Ok(stored);
        }

        let key = stored.key();
        let guard = self.ledger.lock(key)?;
        let current = self.get(id)?;
        if current.status().is_terminal() {
            return Ok(current);
        }

        let now = self.now();
        if reason == ReleaseReason::Expired && !current.is_expired_at(now) {
            return Err(DomainError::invalid_field(
                "reason",
                "out_of_range",
                "reservation has not expired yet",
            ));
        }

        let released = current.release(reason, now)?;
        self.transition(&current, &released, || {
            self.ledger
                .decrement_reserved_locked(&guard, current.quantity(), Some(current.audit_reference()))
        })?;
        drop(guard);

        if let Some(cart_id) = released.cart_id() {
            let by_shopper = released.status() != ReservationStatus::Expired;
            self.carts.hold_closed(cart_id, id, by_shopper, now);
        }
        info!(
            %key,
            reservation_id = %id,
            quantity = released.quantity(),
            status = ?released.status(),
            reason = %released.release_reason().map(ToString::to_string).unwrap_or_default(),
            "reservation released"
        );
        Ok(released)
    }

    pub fn get(&self, id: ReservationId) -> DomainResult<Reservation> {
        self.reservations
            .get(id)?
            .ok_or(DomainError::ReservationNotFound(id))
    }

    /// Active holds against one stock record.
    pub fn active_for(&self, key: StockKey) -> DomainResult<Vec<Reservation>> {
        Ok(self.reservations.list_active(&key)?)
    }

    /// Active holds past their expiry, soonest first.
    pub fn expired(&self, now: DateTime<Utc>, limit: usize) -> DomainResult<Vec<Reservation>> {
        Ok(self.reservations.list_expired(now, limit)?)
    }

    /// Check that Active holds add up to the record's `reserved`.
    pub fn reconcile(&self, key: StockKey) -> DomainResult<()> {
        let guard = self.ledger.lock(key)?;
        let record = self.ledger.load(&guard)?;
        let held: i64 = self
            .reservations
            .list_active(&key)?
            .iter()
            .map(Reservation::quantity)
            .sum();
        if held != record.reserved() {
            let e = DomainError::consistency(format!(
                "{key}: active reservations hold {held} units but reserved is {}",
                record.reserved()
            ));
            error!(%key, held, reserved = record.reserved(), "reservation totals drifted from ledger");
            return Err(e);
        }
        Ok(())
    }

    fn validate_hold(&self, key: StockKey, qty: i64, context: &ReservationContext) -> DomainResult<()> {
        let mut request = StockOperationRequest::new(key.product_id, StockOperationType::Reservation, qty);
        request.order_id = context.order_id;
        request.cart_id = context.cart_id;
        request.user_id = context.user_id;
        request.reference = context.reference.clone();
        self.ledger.validator().validate(&request)?;
        Ok(())
    }

    /// Persist `next`, then run the ledger step. A failed ledger step puts
    /// `current` back, so the hold and `reserved` never disagree. Must be
    /// called with the product's guard held.
    fn transition<F>(&self, current: &Reservation, next: &Reservation, ledger_step: F) -> DomainResult<()>
    where
        F: FnOnce() -> DomainResult<StockRecord>,
    {
        self.reservations.save(next)?;
        let Err(e) = ledger_step() else {
            return Ok(());
        };
        if let Err(restore) = self.reservations.save(current) {
            error!(
                reservation_id = %current.id(),
                status = ?next.status(),
                error = %e,
                restore_error = %restore,
                "ledger step failed and reservation could not be restored"
            );
            return Err(DomainError::consistency(format!(
                "reservation {} left {:?} after failed ledger step: {restore}",
                current.id(),
                next.status()
            )));
        }
        error!(reservation_id = %current.id(), status = ?next.status(), error = %e, "ledger step failed; reservation restored");
        Err(e)
    }
}
