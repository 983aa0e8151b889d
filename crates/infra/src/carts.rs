//! Cart activity tracking for abandoned-cart reporting.
//!
//! Purely a reporting concern: nothing here reads or writes stock records.

use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use bazaar_core::{CartId, ReservationId, StockKey};
use bazaar_inventory::Reservation;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CartLine {
    pub reservation_id: ReservationId,
    pub key: StockKey,
    pub quantity: i64,
}

/// Cart reported as abandoned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AbandonedCart {
    pub cart_id: CartId,
    pub last_activity_at: DateTime<Utc>,
    pub flagged_at: DateTime<Utc>,
    /// Holds still open when the cart was flagged.
    pub lines: Vec<CartLine>,
    pub held_units: i64,
}

#[derive(Debug, Clone)]
struct CartActivity {
    last_activity_at: DateTime<Utc>,
    lines: BTreeMap<ReservationId, CartLine>,
    flagged_at: Option<DateTime<Utc>>,
}

impl CartActivity {
    fn new(at: DateTime<Utc>) -> Self {
        Self {
            last_activity_at: at,
            lines: BTreeMap::new(),
            flagged_at: None,
        }
    }

    fn touch(&mut self, at: DateTime<Utc>) {
        if at > self.last_activity_at {
            self.last_activity_at = at;
        }
        self.flagged_at = None;
    }

    fn report(&self, cart_id: CartId, flagged_at: DateTime<Utc>) -> AbandonedCart {
        let lines: Vec<CartLine> = self.lines.values().cloned().collect();
        AbandonedCart {
            cart_id,
            last_activity_at: self.last_activity_at,
            flagged_at,
            held_units: lines.iter().map(|l| l.quantity).sum(),
            lines,
        }
    }
}

/// Last-activity bookkeeping per cart.
#[derive(Debug, Default)]
pub struct CartActivityTracker {
    carts: RwLock<HashMap<CartId, CartActivity>>,
}

impl CartActivityTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Any shopper action on the cart (viewed, edited, ...).
    pub fn record_activity(&self, cart_id: CartId, at: DateTime<Utc>) {
        if let Ok(mut carts) = self.carts.write() {
            carts.entry(cart_id).or_insert_with(|| CartActivity::new(at)).touch(at);
        }
    }

    /// A hold was placed for the cart.
    pub fn hold_placed(&self, cart_id: CartId, reservation: &Reservation, at: DateTime<Utc>) {
        if let Ok(mut carts) = self.carts.write() {
            let cart = carts.entry(cart_id).or_insert_with(|| CartActivity::new(at));
            cart.touch(at);
            cart.lines.insert(
                reservation.id(),
                CartLine {
                    reservation_id: reservation.id(),
                    key: reservation.key(),
                    quantity: reservation.quantity(),
                },
            );
        }
    }

    /// A hold was given back. `by_shopper` is false for sweeper expiry, which
    /// is not cart activity. A cart left with no open holds is forgotten.
    pub fn hold_closed(&self, cart_id: CartId, reservation_id: ReservationId, by_shopper: bool, at: DateTime<Utc>) {
        if let Ok(mut carts) = self.carts.write() {
            let empty = carts.get_mut(&cart_id).map(|cart| {
                cart.lines.remove(&reservation_id);
                if by_shopper {
                    cart.touch(at);
                }
                cart.lines.is_empty()
            });
            if empty == Some(true) {
                carts.remove(&cart_id);
            }
        }
    }

    /// A hold was confirmed at checkout. A cart with nothing left open is forgotten.
    pub fn hold_checked_out(&self, cart_id: CartId, reservation_id: ReservationId) {
        if let Ok(mut carts) = self.carts.write() {
            let empty = carts.get_mut(&cart_id).map(|cart| {
                cart.lines.remove(&reservation_id);
                cart.lines.is_empty()
            });
            if empty == Some(true) {
                carts.remove(&cart_id);
            }
        }
    }

    /// Flag carts idle for longer than `idle_after`. Returns only carts
    /// flagged by this call; already-flagged carts are not reported twice.
    /// Idle carts holding nothing are dropped instead of reported.
    pub fn flag_abandoned(&self, now: DateTime<Utc>, idle_after: Duration) -> Vec<AbandonedCart> {
        let Ok(mut carts) = self.carts.write() else {
            return vec![];
        };
        carts.retain(|_, c| !c.lines.is_empty() || c.last_activity_at + idle_after >= now);
        let mut flagged: Vec<AbandonedCart> = carts
            .iter_mut()
            .filter(|(_, c)| c.flagged_at.is_none() && c.last_activity_at + idle_after < now)
            .map(|(id, c)| {
                c.flagged_at = Some(now);
                c.report(*id, now)
            })
            .collect();
        flagged.sort_by_key(|c| c.last_activity_at);
        flagged
    }

    /// Number of carts currently tracked.
    pub fn len(&self) -> usize {
        self.carts.read().map(|c| c.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every cart currently flagged as abandoned.
    pub fn abandoned(&self) -> Vec<AbandonedCart> {
        let Ok(carts) = self.carts.read() else {
            return vec![];
        };
        let mut out: Vec<AbandonedCart> = carts
            .iter()
            .filter_map(|(id, c)| c.flagged_at.map(|at| c.report(*id, at)))
            .collect();
        out.sort_by_key(|c| c.last_activity_at);
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bazaar_core::{ProductId, StoreId};
    use bazaar_inventory::ReservationContext;

    fn hold(cart: CartId, qty: i64, at: DateTime<Utc>) -> Reservation {
        Reservation::new(
            ReservationId::new(),
            StockKey::new(StoreId::new(), ProductId(1)),
            qty,
            ReservationContext::for_cart(cart),
            at,
            Duration::hours(1),
        )
        .unwrap()
    }

    #[test]
    fn idle_carts_are_flagged_once() {
        let tracker = CartActivityTracker::new();
        let t0 = Utc::now();
        let idle = CartId::new();
        let busy = CartId::new();
        tracker.hold_placed(idle, &hold(idle, 2, t0), t0);
        tracker.hold_placed(idle, &hold(idle, 3, t0), t0);
        tracker.record_activity(busy, t0 + Duration::minutes(50));

        let flagged = tracker.flag_abandoned(t0 + Duration::minutes(61), Duration::hours(1));
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].cart_id, idle);
        assert_eq!(flagged[0].held_units, 5);
        assert_eq!(flagged[0].lines.len(), 2);

        assert!(tracker.flag_abandoned(t0 + Duration::minutes(62), Duration::hours(1)).is_empty());
        assert_eq!(tracker.abandoned().len(), 1);
    }

    #[test]
    fn shopper_activity_clears_the_flag() {
        let tracker = CartActivityTracker::new();
        let t0 = Utc::now();
        let cart = CartId::new();
        tracker.hold_placed(cart, &hold(cart, 1, t0), t0);

        assert_eq!(tracker.flag_abandoned(t0 + Duration::minutes(61), Duration::hours(1)).len(), 1);
        tracker.record_activity(cart, t0 + Duration::minutes(70));
        assert!(tracker.abandoned().is_empty());
    }

    #[test]
    fn expiry_is_not_activity() {
        let tracker = CartActivityTracker::new();
        let t0 = Utc::now();
        let cart = CartId::new();
        let expiring = hold(cart, 1, t0);
        tracker.hold_placed(cart, &expiring, t0);
        tracker.hold_placed(cart, &hold(cart, 2, t0), t0);

        tracker.hold_closed(cart, expiring.id(), false, t0 + Duration::minutes(59));
        let flagged = tracker.flag_abandoned(t0 + Duration::minutes(61), Duration::hours(1));
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].last_activity_at, t0);
        assert_eq!(flagged[0].held_units, 2);
    }

    #[test]
    fn carts_with_nothing_held_are_not_retained() {
        let tracker = CartActivityTracker::new();
        let t0 = Utc::now();
        for _ in 0..1_000 {
            let cart = CartId::new();
            let r = hold(cart, 1, t0);
            tracker.hold_placed(cart, &r, t0);
            tracker.hold_closed(cart, r.id(), true, t0);
        }
        let browsing = CartId::new();
        tracker.record_activity(browsing, t0);
        assert_eq!(tracker.len(), 1);

        assert!(tracker.flag_abandoned(t0 + Duration::days(1), Duration::hours(1)).is_empty());
        assert!(tracker.abandoned().is_empty());
        assert_eq!(tracker.len(), 0);
    }

    #[test]
    fn checked_out_carts_are_forgotten() {
        let tracker = CartActivityTracker::new();
        let t0 = Utc::now();
        let cart = CartId::new();
        let r = hold(cart, 1, t0);
        tracker.hold_placed(cart, &r, t0);
        tracker.hold_checked_out(cart, r.id());

        assert!(tracker.flag_abandoned(t0 + Duration::days(1), Duration::hours(1)).is_empty());
    }
}
