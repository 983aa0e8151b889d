use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use bazaar_core::{CartId, DomainError, DomainResult, OrderId, ReservationId, StockKey, UserId};

/// Hold duration used when the caller does not pick one.
pub fn default_reservation_ttl() -> Duration {
    Duration::hours(24)
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReservationStatus {
    Active,
    Confirmed,
    Released,
    Expired,
}

impl ReservationStatus {
    pub fn is_terminal(self) -> bool {
        !matches!(self, Self::Active)
    }
}

/// Why a hold was taken.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HoldReason {
    CartHold,
    OrderHold,
    Manual,
}

/// Why a hold was given back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseReason {
    /// Removed from the cart or the order was cancelled.
    Cancelled,
    Refunded,
    /// Reclaimed after `expires_at` passed. Ends in `Expired`, not `Released`.
    Expired,
    Other(String),
}

impl ReleaseReason {
    pub fn terminal_status(&self) -> ReservationStatus {
        match self {
            Self::Expired => ReservationStatus::Expired,
            _ => ReservationStatus::Released,
        }
    }
}

impl core::fmt::Display for ReleaseReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Cancelled => f.write_str("cancelled"),
            Self::Refunded => f.write_str("refunded"),
            Self::Expired => f.write_str("expired"),
            Self::Other(s) => f.write_str(s),
        }
    }
}

/// Who a hold belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationContext {
    pub reason: HoldReason,
    pub order_id: Option<OrderId>,
    pub cart_id: Option<CartId>,
    pub user_id: Option<UserId>,
    pub reference: Option<String>,
}

impl ReservationContext {
    pub fn for_cart(cart_id: CartId) -> Self {
        Self {
            reason: HoldReason::CartHold,
            order_id: None,
            cart_id: Some(cart_id),
            user_id: None,
            reference: None,
        }
    }

    pub fn for_order(order_id: OrderId) -> Self {
        Self {
            reason: HoldReason::OrderHold,
            order_id: Some(order_id),
            cart_id: None,
            user_id: None,
            reference: None,
        }
    }

    /// Back-office hold. Still needs an order id for traceability.
    pub fn manual(order_id: OrderId, user_id: UserId) -> Self {
        Self {
            reason: HoldReason::Manual,
            order_id: Some(order_id),
            cart_id: None,
            user_id: Some(user_id),
            reference: None,
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_order(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_user(mut self, user_id: UserId) -> Self {
        self.user_id = Some(user_id);
        self
    }
}

/// A time-boxed claim on available stock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    id: ReservationId,
    key: StockKey,
    quantity: i64,
    context: ReservationContext,
    created_at: DateTime<Utc>,
    expires_at: DateTime<Utc>,
    status: ReservationStatus,
    resolved_at: Option<DateTime<Utc>>,
    release_reason: Option<ReleaseReason>,
}

impl Reservation {
    pub fn new(
        id: ReservationId,
        key: StockKey,
        quantity: i64,
        context: ReservationContext,
        created_at: DateTime<Utc>,
        ttl: Duration,
    ) -> DomainResult<Self> {
        if quantity <= 0 {
            return Err(DomainError::invalid_field(
                "quantity",
                "non_positive",
                "quantity must be positive",
            ));
        }
        if ttl <= Duration::zero() {
            return Err(DomainError::invalid_field("ttl", "out_of_range", "ttl must be positive"));
        }
        Ok(Self {
            id,
            key,
            quantity,
            context,
            created_at,
            expires_at: created_at + ttl,
            status: ReservationStatus::Active,
            resolved_at: None,
            release_reason: None,
        })
    }

    pub fn id(&self) -> ReservationId {
        self.id
    }

    pub fn key(&self) -> StockKey {
        self.key
    }

    pub fn quantity(&self) -> i64 {
        self.quantity
    }

    pub fn context(&self) -> &ReservationContext {
        &self.context
    }

    pub fn cart_id(&self) -> Option<CartId> {
        self.context.cart_id
    }

    pub fn order_id(&self) -> Option<OrderId> {
        self.context.order_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    pub fn status(&self) -> ReservationStatus {
        self.status
    }

    pub fn resolved_at(&self) -> Option<DateTime<Utc>> {
        self.resolved_at
    }

    pub fn release_reason(&self) -> Option<&ReleaseReason> {
        self.release_reason.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.status == ReservationStatus::Active
    }

    /// `expires_at` lies strictly in the past.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at < now
    }

    /// Reference written into the audit log for ledger changes made on behalf of this hold.
    pub fn audit_reference(&self) -> String {
        format!("reservation:{}", self.id)
    }

    /// Active and unexpired → Confirmed.
    pub fn confirm(&self, now: DateTime<Utc>) -> DomainResult<Self> {
        match self.status {
            ReservationStatus::Active if self.is_expired_at(now) => {
                Err(DomainError::ReservationExpired(self.id))
            }
            ReservationStatus::Active => Ok(self.resolve(ReservationStatus::Confirmed, None, now)),
            ReservationStatus::Expired => Err(DomainError::ReservationExpired(self.id)),
            // No live hold under this id any more.
            ReservationStatus::Released | ReservationStatus::Confirmed => {
                Err(DomainError::ReservationNotFound(self.id))
            }
        }
    }

    /// Active → Released (or Expired when the reason is `Expired`).
    pub fn release(&self, reason: ReleaseReason, now: DateTime<Utc>) -> DomainResult<Self> {
        if self.status.is_terminal() {
            return Err(DomainError::consistency(format!(
                "reservation {} is already {:?}",
                self.id, self.status
            )));
        }
        let status = reason.terminal_status();
        Ok(self.resolve(status, Some(reason), now))
    }

    fn resolve(&self, status: ReservationStatus, reason: Option<ReleaseReason>, now: DateTime<Utc>) -> Self {
        let mut next = self.clone();
        next.status = status;
        next.resolved_at = Some(now);
        next.release_reason = reason;
        next
    }
}
